//! Hierarchy placements, cardinality statistics and parent chains.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use sea_orm::sea_query::{Cond, Condition, Expr, Order, Query};
use sea_orm::DatabaseConnection;

use crate::baseline::BaselineContext;
use crate::buffer::PlacementRow;
use crate::db::*;
use crate::filter::matching_entities;
use crate::sql::{col_name, query_all};
use vitrine_core::{
    Entity, EntityParents, HierarchyIndex, HierarchyItem, HierarchyNodeStatistics,
    HierarchyStatistics, NestedIntervalHierarchy, ReferenceParents, VitrineError, VitrineResult,
};

/// In-memory hierarchy indexes, one per hierarchical entity type.
pub struct Hierarchies {
    section_size: u16,
    levels: u16,
    indexes: RwLock<HashMap<String, Arc<dyn HierarchyIndex>>>,
}

impl Hierarchies {
    pub fn new(section_size: u16, levels: u16) -> Self {
        Self {
            section_size,
            levels,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, hierarchy_type: &str) -> VitrineResult<Option<Arc<dyn HierarchyIndex>>> {
        let indexes = self
            .indexes
            .read()
            .map_err(|_| VitrineError::storage("hierarchy registry poisoned"))?;
        Ok(indexes.get(hierarchy_type).cloned())
    }

    /// Like [`Hierarchies::get`] but fails for types that are not hierarchical.
    pub fn require(&self, hierarchy_type: &str) -> VitrineResult<Arc<dyn HierarchyIndex>> {
        self.get(hierarchy_type)?.ok_or_else(|| {
            VitrineError::invalid(format!("`{hierarchy_type}` is not a hierarchical entity type"))
        })
    }

    pub fn ensure(&self, hierarchy_type: &str) -> VitrineResult<Arc<dyn HierarchyIndex>> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| VitrineError::storage("hierarchy registry poisoned"))?;
        if let Some(index) = indexes.get(hierarchy_type) {
            return Ok(index.clone());
        }
        let index: Arc<dyn HierarchyIndex> =
            Arc::new(NestedIntervalHierarchy::new(self.section_size, self.levels)?);
        indexes.insert(hierarchy_type.to_string(), index.clone());
        Ok(index)
    }

    /// Replays persisted own placements, parents before children, at their stored bounds.
    pub(crate) async fn rebuild(&self, conn: &DatabaseConnection) -> VitrineResult<usize> {
        let select = Query::select()
            .column((
                VitrineHierarchyPlacements::Table,
                VitrineHierarchyPlacements::HierarchyType,
            ))
            .column((VitrineHierarchyPlacements::Table, VitrineHierarchyPlacements::NodeCode))
            .column((
                VitrineHierarchyPlacements::Table,
                VitrineHierarchyPlacements::ParentCode,
            ))
            .column((VitrineHierarchyPlacements::Table, VitrineHierarchyPlacements::LeftBound))
            .from(VitrineHierarchyPlacements::Table)
            .inner_join(
                VitrineEntities::Table,
                Expr::col((VitrineEntities::Table, VitrineEntities::EntityId)).equals((
                    VitrineHierarchyPlacements::Table,
                    VitrineHierarchyPlacements::EntityId,
                )),
            )
            .and_where(
                Expr::col((
                    VitrineHierarchyPlacements::Table,
                    VitrineHierarchyPlacements::HierarchyType,
                ))
                .equals((VitrineEntities::Table, VitrineEntities::EntityType)),
            )
            .order_by(
                (VitrineHierarchyPlacements::Table, VitrineHierarchyPlacements::HierarchyType),
                Order::Asc,
            )
            .order_by(
                (VitrineHierarchyPlacements::Table, VitrineHierarchyPlacements::Level),
                Order::Asc,
            )
            .order_by(
                (VitrineHierarchyPlacements::Table, VitrineHierarchyPlacements::LeftBound),
                Order::Asc,
            )
            .to_owned();
        let rows = query_all(conn, &select).await?;
        for row in &rows {
            let hierarchy_type: String =
                row.try_get("", &col_name(VitrineHierarchyPlacements::HierarchyType))?;
            let code: String = row.try_get("", &col_name(VitrineHierarchyPlacements::NodeCode))?;
            let parent: Option<String> =
                row.try_get("", &col_name(VitrineHierarchyPlacements::ParentCode))?;
            let left_bound: i64 =
                row.try_get("", &col_name(VitrineHierarchyPlacements::LeftBound))?;
            let index = self.ensure(&hierarchy_type)?;
            index.restore_item(&code, parent.as_deref(), left_bound)?;
        }
        Ok(rows.len())
    }
}

pub(crate) fn placement_row(entity_id: i64, hierarchy_type: &str, item: &HierarchyItem) -> PlacementRow {
    PlacementRow {
        entity_id,
        hierarchy_type: hierarchy_type.to_string(),
        node_code: item.code.clone(),
        parent_code: item.parent_code.clone(),
        left_bound: item.left_bound,
        right_bound: item.right_bound,
        level: item.level,
    }
}

/// Places a newly written hierarchical entity, or checks that an existing one stays put.
/// The flag tells whether the item was created by this call.
pub(crate) fn own_item(
    index: &dyn HierarchyIndex,
    entity: &Entity,
) -> VitrineResult<(HierarchyItem, bool)> {
    let code = entity.primary_key.to_string();
    let parent = entity
        .hierarchy
        .and_then(|placement| placement.parent)
        .map(|parent| parent.to_string());
    match index.item(&code)? {
        Some(item) if item.parent_code == parent => Ok((item, false)),
        Some(item) => Err(VitrineError::invalid_state(format!(
            "entity {code} cannot move from parent {:?} to {:?}",
            item.parent_code, parent
        ))),
        None => {
            let item = match parent {
                Some(parent) => index.create_item(&code, &parent)?,
                None => index.create_root_item(&code)?,
            };
            Ok((item, true))
        }
    }
}

/// Placements borrowed from referenced hierarchical entities.
pub(crate) fn borrowed_placements(
    hierarchies: &Hierarchies,
    entity: &Entity,
    entity_id: i64,
) -> VitrineResult<Vec<PlacementRow>> {
    let mut rows = Vec::new();
    let mut seen = BTreeSet::new();
    for reference in entity.references.iter().filter(|reference| !reference.dropped) {
        if reference.reference_type == entity.entity_type {
            continue;
        }
        let Some(index) = hierarchies.get(&reference.reference_type)? else {
            continue;
        };
        let code = reference.referenced_primary_key.to_string();
        if !seen.insert((reference.reference_type.clone(), code.clone())) {
            continue;
        }
        match index.item(&code)? {
            Some(item) => rows.push(placement_row(entity_id, &reference.reference_type, &item)),
            None => log::warn!(
                "entity {} references unknown {} node {code}; placement skipped",
                entity.primary_key,
                reference.reference_type
            ),
        }
    }
    Ok(rows)
}

fn parse_code(code: &str) -> VitrineResult<i64> {
    code.parse::<i64>()
        .map_err(|_| VitrineError::storage(format!("hierarchy code `{code}` is not a primary key")))
}

/// Counts every entity once per node on the path from its placements up to the roots.
pub(crate) fn cardinalities(
    index: &dyn HierarchyIndex,
    placements: &HashMap<i64, Vec<String>>,
) -> VitrineResult<HashMap<String, u64>> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for codes in placements.values() {
        let mut covered = BTreeSet::new();
        for code in codes {
            if index.item(code)?.is_none() {
                continue;
            }
            covered.insert(code.clone());
            for ancestor in index.parent_items(code)? {
                covered.insert(ancestor.code);
            }
        }
        for code in covered {
            *counts.entry(code).or_default() += 1;
        }
    }
    Ok(counts)
}

/// Builds the statistics tree top-down, descending only into populated nodes.
pub(crate) fn statistics_tree(
    index: &dyn HierarchyIndex,
    counts: &HashMap<String, u64>,
    root: Option<&str>,
) -> VitrineResult<Vec<HierarchyNodeStatistics>> {
    let level = match root {
        Some(root) => index.child_items(root)?,
        None => index.root_items()?,
    };
    let mut nodes = Vec::new();
    for item in level {
        let Some(cardinality) = counts.get(&item.code).copied() else {
            continue;
        };
        nodes.push(HierarchyNodeStatistics {
            primary_key: parse_code(&item.code)?,
            cardinality,
            children: statistics_tree(index, counts, Some(&item.code))?,
        });
    }
    Ok(nodes)
}

pub(crate) async fn hierarchy_statistics(
    conn: &DatabaseConnection,
    context: &BaselineContext,
    user_filter: Condition,
    index: &dyn HierarchyIndex,
    hierarchy_type: &str,
    root: Option<i64>,
) -> VitrineResult<HierarchyStatistics> {
    let root = root.map(|root| root.to_string());
    if let Some(root) = &root {
        if index.item(root)?.is_none() {
            return Err(VitrineError::no_such_item(root));
        }
    }
    let select = Query::select()
        .column(VitrineHierarchyPlacements::EntityId)
        .column(VitrineHierarchyPlacements::NodeCode)
        .from(VitrineHierarchyPlacements::Table)
        .cond_where(
            Cond::all()
                .add(Expr::col(VitrineHierarchyPlacements::HierarchyType).eq(hierarchy_type))
                .add(
                    Expr::col(VitrineHierarchyPlacements::EntityId)
                        .in_subquery(context.members()),
                )
                .add(
                    Expr::col(VitrineHierarchyPlacements::EntityId)
                        .in_subquery(matching_entities(user_filter)),
                ),
        )
        .to_owned();
    let mut placements: HashMap<i64, Vec<String>> = HashMap::new();
    for row in query_all(conn, &select).await? {
        let entity_id: i64 = row.try_get("", &col_name(VitrineHierarchyPlacements::EntityId))?;
        let code: String = row.try_get("", &col_name(VitrineHierarchyPlacements::NodeCode))?;
        placements.entry(entity_id).or_default().push(code);
    }
    let counts = cardinalities(index, &placements)?;
    log::debug!(
        "hierarchy `{hierarchy_type}` statistics over {} entities",
        placements.len()
    );
    Ok(HierarchyStatistics {
        hierarchy_type: hierarchy_type.to_string(),
        nodes: statistics_tree(index, &counts, root.as_deref())?,
    })
}

fn chain(index: &dyn HierarchyIndex, code: &str) -> VitrineResult<Vec<i64>> {
    if index.item(code)?.is_none() {
        return Ok(Vec::new());
    }
    index
        .parent_items(code)?
        .iter()
        .map(|item| parse_code(&item.code))
        .collect()
}

/// Ancestor chains of `entity`: its own (without itself) and one per referenced node
/// (ending with that node).
pub(crate) fn entity_parents(
    index: &dyn HierarchyIndex,
    entity: &Entity,
    hierarchy_type: &str,
) -> VitrineResult<EntityParents> {
    let parents = if entity.entity_type == hierarchy_type {
        chain(index, &entity.primary_key.to_string())?
    } else {
        Vec::new()
    };
    let mut references = Vec::new();
    for reference in entity
        .references
        .iter()
        .filter(|reference| !reference.dropped && reference.reference_type == hierarchy_type)
    {
        let code = reference.referenced_primary_key.to_string();
        let mut parents = chain(index, &code)?;
        if index.item(&code)?.is_some() {
            parents.push(reference.referenced_primary_key);
        }
        references.push(ReferenceParents {
            referenced_primary_key: reference.referenced_primary_key,
            parents,
        });
    }
    Ok(EntityParents {
        primary_key: entity.primary_key,
        parents,
        references,
    })
}
