//! Facet materialization, facet counts and impact analysis.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use sea_orm::sea_query::{
    Alias, Cond, Condition, Expr, Func, Query, QueryStatementBuilder, SelectStatement, SimpleExpr,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};

use crate::baseline::BaselineContext;
use crate::db::*;
use crate::filter::{FilterScope, entity_in, facet_rows, matching_entities};
use crate::sql::{build_stmt, col_name, exec, query_all, query_count, query_one};
use vitrine_core::{
    EntityRequest, FacetGroupRef, FacetGroupRelations, FacetGroupStatistics, FacetImpact,
    FacetRelation, FacetStatistics, FacetStatisticsDepth, FacetSummary, FacetSummaryRequest,
    VitrineError, VitrineResult,
};

/// Rebuilds the facet rows of one collection from its faceted references.
pub(crate) async fn refresh_facets(conn: &DatabaseConnection, collection: &str) -> VitrineResult<u64> {
    let select = Query::select()
        .expr(Expr::val(collection))
        .column((VitrineReferences::Table, VitrineReferences::EntityId))
        .column((VitrineReferences::Table, VitrineReferences::ReferenceType))
        .column((VitrineReferences::Table, VitrineReferences::ReferencedPk))
        .column((VitrineReferences::Table, VitrineReferences::GroupPk))
        .from(VitrineReferences::Table)
        .inner_join(
            VitrineEntities::Table,
            Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))
                .equals((VitrineReferences::Table, VitrineReferences::EntityId)),
        )
        .and_where(Expr::col((VitrineReferences::Table, VitrineReferences::Collection)).eq(collection))
        .and_where(Expr::col((VitrineReferences::Table, VitrineReferences::Faceted)).eq(true))
        .and_where(Expr::col((VitrineEntities::Table, VitrineEntities::Dropped)).eq(false))
        .to_owned();
    let insert = Query::insert()
        .into_table(VitrineFacets::Table)
        .columns([
            VitrineFacets::Collection,
            VitrineFacets::EntityId,
            VitrineFacets::ReferenceType,
            VitrineFacets::FacetPk,
            VitrineFacets::GroupPk,
        ])
        .select_from(select)
        .map_err(|err| VitrineError::storage(err.to_string()))?
        .to_owned();
    let delete = Query::delete()
        .from_table(VitrineFacets::Table)
        .and_where(Expr::col(VitrineFacets::Collection).eq(collection))
        .to_owned();

    let tx = conn.begin().await?;
    exec(&tx, &delete).await?;
    let rows = exec(&tx, &insert).await?;
    tx.commit().await?;
    log::debug!("facets of `{collection}` refreshed: {rows} rows");
    Ok(rows)
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct GroupKey {
    pub reference_type: String,
    pub group: Option<i64>,
}

impl GroupKey {
    fn is_in(&self, refs: &[FacetGroupRef]) -> bool {
        refs.iter()
            .any(|group| group.reference_type == self.reference_type && group.group == self.group)
    }
}

/// Selected facet ids per group.
pub(crate) type Selection = BTreeMap<GroupKey, BTreeSet<i64>>;

pub(crate) fn relation_of(relations: &FacetGroupRelations, key: &GroupKey) -> FacetRelation {
    if key.is_in(&relations.negation) {
        FacetRelation::Not
    } else if key.is_in(&relations.conjunction) {
        FacetRelation::And
    } else {
        FacetRelation::Or
    }
}

/// Facet filter in terms of "entity has facet" tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FacetPredicate {
    HasAny(String, Vec<i64>),
    HasAll(String, Vec<i64>),
    HasNone(String, Vec<i64>),
    And(Vec<FacetPredicate>),
    Or(Vec<FacetPredicate>),
}

/// Combines the selected groups: non-disjunctive groups are AND-ed, disjunctive
/// groups are OR-ed, and the two parts are OR-ed together.
pub(crate) fn plan(relations: &FacetGroupRelations, selection: &Selection) -> Option<FacetPredicate> {
    let mut conjunctive = Vec::new();
    let mut disjunctive = Vec::new();
    for (key, facets) in selection.iter().filter(|(_, facets)| !facets.is_empty()) {
        let facets = facets.iter().copied().collect::<Vec<_>>();
        let reference_type = key.reference_type.clone();
        let predicate = match relation_of(relations, key) {
            FacetRelation::Or => FacetPredicate::HasAny(reference_type, facets),
            FacetRelation::And => FacetPredicate::HasAll(reference_type, facets),
            FacetRelation::Not => FacetPredicate::HasNone(reference_type, facets),
        };
        if key.is_in(&relations.disjunction) {
            disjunctive.push(predicate);
        } else {
            conjunctive.push(predicate);
        }
    }
    let conjunctive = match conjunctive.len() {
        0 => None,
        1 => conjunctive.pop(),
        _ => Some(FacetPredicate::And(conjunctive)),
    };
    match (conjunctive, disjunctive.is_empty()) {
        (None, true) => None,
        (Some(conjunctive), true) => Some(conjunctive),
        (None, false) => Some(FacetPredicate::Or(disjunctive)),
        (Some(conjunctive), false) => {
            disjunctive.insert(0, conjunctive);
            Some(FacetPredicate::Or(disjunctive))
        }
    }
}

fn having_facets(collection: &str, reference_type: &str, facets: &[i64]) -> SelectStatement {
    let mut rows = facet_rows(collection, reference_type);
    rows.and_where(Expr::col(VitrineFacets::FacetPk).is_in(facets.iter().copied()));
    rows
}

pub(crate) fn render(collection: &str, predicate: &FacetPredicate) -> Condition {
    match predicate {
        FacetPredicate::HasAny(reference_type, facets) => {
            entity_in(having_facets(collection, reference_type, facets))
        }
        FacetPredicate::HasAll(reference_type, facets) => {
            facets.iter().fold(Cond::all(), |cond, facet| {
                cond.add(entity_in(having_facets(collection, reference_type, &[*facet])))
            })
        }
        FacetPredicate::HasNone(reference_type, facets) => {
            entity_in(having_facets(collection, reference_type, facets)).not()
        }
        FacetPredicate::And(children) => children
            .iter()
            .fold(Cond::all(), |cond, child| cond.add(render(collection, child))),
        FacetPredicate::Or(children) => children
            .iter()
            .fold(Cond::any(), |cond, child| cond.add(render(collection, child))),
    }
}

/// Selection with `facet` added to its group.
fn with_facet(selection: &Selection, key: &GroupKey, facet: i64) -> Selection {
    let mut hypothetical = selection.clone();
    hypothetical.entry(key.clone()).or_default().insert(facet);
    hypothetical
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct FacetEntry {
    key: GroupKey,
    facet: i64,
}

/// Distinct facets carried by the baseline.
async fn baseline_facets(
    conn: &DatabaseConnection,
    context: &BaselineContext,
) -> VitrineResult<Vec<FacetEntry>> {
    let select = Query::select()
        .distinct()
        .columns([
            VitrineFacets::ReferenceType,
            VitrineFacets::FacetPk,
            VitrineFacets::GroupPk,
        ])
        .from(VitrineFacets::Table)
        .and_where(Expr::col(VitrineFacets::Collection).eq(context.entity_type()))
        .and_where(Expr::col(VitrineFacets::EntityId).in_subquery(context.members()))
        .to_owned();
    let mut entries = Vec::new();
    for row in query_all(conn, &select).await? {
        entries.push(FacetEntry {
            key: GroupKey {
                reference_type: row.try_get("", &col_name(VitrineFacets::ReferenceType))?,
                group: row.try_get("", &col_name(VitrineFacets::GroupPk))?,
            },
            facet: row.try_get("", &col_name(VitrineFacets::FacetPk))?,
        });
    }
    entries.sort();
    Ok(entries)
}

async fn facet_counts(
    conn: &DatabaseConnection,
    context: &BaselineContext,
    user_filter: Condition,
) -> VitrineResult<HashMap<FacetEntry, u64>> {
    let select = Query::select()
        .columns([
            VitrineFacets::ReferenceType,
            VitrineFacets::FacetPk,
            VitrineFacets::GroupPk,
        ])
        .expr_as(Func::count(Expr::col(VitrineFacets::EntityId)), Alias::new("hits"))
        .from(VitrineFacets::Table)
        .and_where(Expr::col(VitrineFacets::Collection).eq(context.entity_type()))
        .and_where(Expr::col(VitrineFacets::EntityId).in_subquery(context.members()))
        .and_where(
            Expr::col(VitrineFacets::EntityId).in_subquery(matching_entities(user_filter)),
        )
        .group_by_columns([
            VitrineFacets::ReferenceType,
            VitrineFacets::FacetPk,
            VitrineFacets::GroupPk,
        ])
        .to_owned();
    let mut counts = HashMap::new();
    for row in query_all(conn, &select).await? {
        let entry = FacetEntry {
            key: GroupKey {
                reference_type: row.try_get("", &col_name(VitrineFacets::ReferenceType))?,
                group: row.try_get("", &col_name(VitrineFacets::GroupPk))?,
            },
            facet: row.try_get("", &col_name(VitrineFacets::FacetPk))?,
        };
        let hits: i64 = row.try_get("", "hits")?;
        counts.insert(entry, hits.max(0) as u64);
    }
    Ok(counts)
}

fn count_within(context: &BaselineContext, condition: Condition) -> SelectStatement {
    Query::select()
        .expr_as(
            Func::count(Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))),
            Alias::new("hits"),
        )
        .from(VitrineEntities::Table)
        .cond_where(context.contains().add(condition))
        .to_owned()
}

/// Bind parameters allowed in one impact statement; below the SQLite and Postgres limits.
const MAX_BIND_PARAMS: usize = 30_000;

/// Splits consecutive statements into batches of at most `max_statements` whose bind
/// counts stay within `max_binds`. A statement heavier than `max_binds` runs alone.
fn bounded_batches(binds: &[usize], max_statements: usize, max_binds: usize) -> Vec<Range<usize>> {
    let max_statements = max_statements.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut load = 0;
    for (index, weight) in binds.iter().enumerate() {
        let full = index - start >= max_statements || load + weight > max_binds;
        if index > start && full {
            batches.push(start..index);
            start = index;
            load = 0;
        }
        load += weight;
    }
    if start < binds.len() {
        batches.push(start..binds.len());
    }
    batches
}

/// Counts matches of several hypothetical filters with one round trip.
async fn batch_counts(
    conn: &DatabaseConnection,
    counts: Vec<SelectStatement>,
) -> VitrineResult<Vec<u64>> {
    let mut select = Query::select();
    let aliases = (0..counts.len())
        .map(|index| format!("c{index}"))
        .collect::<Vec<_>>();
    for (count, alias) in counts.into_iter().zip(&aliases) {
        select.expr_as(
            SimpleExpr::SubQuery(None, Box::new(count.into_sub_query_statement())),
            Alias::new(alias.as_str()),
        );
    }
    let Some(row) = query_one(conn, &select).await? else {
        return Ok(vec![0; aliases.len()]);
    };
    aliases
        .iter()
        .map(|alias| {
            let count: i64 = row.try_get("", alias)?;
            Ok::<_, VitrineError>(count.max(0) as u64)
        })
        .collect()
}

/// Facet statistics of `request` over the materialized baseline.
pub(crate) async fn facet_summary(
    conn: &DatabaseConnection,
    context: &BaselineContext,
    request: &EntityRequest,
    summary: &FacetSummaryRequest,
    scope: &FilterScope<'_>,
    impact_batch_size: usize,
) -> VitrineResult<FacetSummary> {
    let collection = context.entity_type();
    let available = baseline_facets(conn, context).await?;
    let group_of = available
        .iter()
        .map(|entry| ((entry.key.reference_type.as_str(), entry.facet), entry.key.group))
        .collect::<HashMap<_, _>>();

    let mut selection = Selection::new();
    for (reference_type, ids) in request.filter.selected_facets() {
        for facet in ids {
            let key = GroupKey {
                reference_type: reference_type.to_string(),
                group: group_of.get(&(reference_type, *facet)).copied().flatten(),
            };
            selection.entry(key).or_default().insert(*facet);
        }
    }
    let relations = &summary.groups;
    let others = scope.condition(&request.filter.user_filter_without_facets())?;
    let user_filter = |selection: &Selection| match plan(relations, selection) {
        Some(predicate) => others.clone().add(render(collection, &predicate)),
        None => others.clone(),
    };

    let counts = facet_counts(conn, context, user_filter(&selection)).await?;

    let mut impacts: HashMap<FacetEntry, FacetImpact> = HashMap::new();
    if summary.depth == FacetStatisticsDepth::Impact {
        let current = query_count(conn, &count_within(context, user_filter(&selection)), "hits")
            .await?;
        let candidates = available
            .iter()
            .filter(|entry| {
                !selection
                    .get(&entry.key)
                    .is_some_and(|selected| selected.contains(&entry.facet))
            })
            .collect::<Vec<_>>();
        let backend = conn.get_database_backend();
        let mut statements = candidates
            .iter()
            .map(|entry| {
                count_within(
                    context,
                    user_filter(&with_facet(&selection, &entry.key, entry.facet)),
                )
            })
            .map(Some)
            .collect::<Vec<_>>();
        let binds = statements
            .iter()
            .flatten()
            .map(|statement| build_stmt(backend, statement).1.0.len())
            .collect::<Vec<_>>();
        for range in bounded_batches(&binds, impact_batch_size, MAX_BIND_PARAMS) {
            let batch = statements[range.clone()]
                .iter_mut()
                .filter_map(Option::take)
                .collect::<Vec<_>>();
            let matches = batch_counts(conn, batch).await?;
            for (entry, match_count) in candidates[range].iter().zip(matches) {
                impacts.insert(
                    (*entry).clone(),
                    FacetImpact {
                        difference: match_count as i64 - current as i64,
                        match_count,
                    },
                );
            }
        }
        log::debug!(
            "facet impact of `{collection}` computed for {} candidates",
            candidates.len()
        );
    }

    let mut groups: BTreeMap<GroupKey, Vec<FacetStatistics>> = BTreeMap::new();
    for entry in &available {
        let relation = relation_of(relations, &entry.key);
        let raw = counts.get(entry).copied().unwrap_or_default();
        let count = match relation {
            FacetRelation::Not => context.size().saturating_sub(raw),
            _ => raw,
        };
        groups.entry(entry.key.clone()).or_default().push(FacetStatistics {
            facet: entry.facet,
            requested: selection
                .get(&entry.key)
                .is_some_and(|selected| selected.contains(&entry.facet)),
            count,
            impact: impacts.get(entry).copied(),
        });
    }
    Ok(FacetSummary {
        groups: groups
            .into_iter()
            .map(|(key, facets)| FacetGroupStatistics {
                relation: relation_of(relations, &key),
                reference_type: key.reference_type,
                group: key.group,
                facets,
            })
            .collect(),
    })
}
