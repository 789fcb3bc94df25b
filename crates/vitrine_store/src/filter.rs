//! Renders filter constraints as conditions over `vitrine_entities` rows.
//!
//! Every constraint becomes `vitrine_entities.entity_id [NOT] IN (subquery)` or a
//! plain predicate on the entity row, so the result can be attached to any
//! statement whose outer `FROM` is the entity table.

use sea_orm::sea_query::{
    CaseStatement, Cond, Condition, Expr, Order, Query, QueryStatementBuilder, SelectStatement,
    SimpleExpr,
};

use crate::Hierarchies;
use crate::db::*;
use vitrine_core::{
    EntityRequest, FilterConstraint, PriceQuery, Scalar, VitrineError, VitrineResult,
};

pub(crate) struct FilterScope<'a> {
    pub collection: &'a str,
    pub locale: Option<&'a str>,
    pub price: Option<&'a PriceQuery>,
    pub hierarchies: &'a Hierarchies,
}

impl<'a> FilterScope<'a> {
    pub fn new(request: &'a EntityRequest, hierarchies: &'a Hierarchies) -> Self {
        Self {
            collection: &request.entity_type,
            locale: request.locale.as_deref(),
            price: request.price.as_ref(),
            hierarchies,
        }
    }

    /// Conjunction of `constraints`; an empty slice yields an empty (always true) condition.
    pub fn condition(&self, constraints: &[FilterConstraint]) -> VitrineResult<Condition> {
        constraints.iter().try_fold(Cond::all(), |cond, constraint| {
            Ok(cond.add(self.constraint(constraint)?))
        })
    }

    fn constraint(&self, constraint: &FilterConstraint) -> VitrineResult<Condition> {
        let condition = match constraint {
            FilterConstraint::And(children) => self.condition(children)?,
            FilterConstraint::Or(children) => {
                children.iter().try_fold(Cond::any(), |cond, child| {
                    Ok::<_, VitrineError>(cond.add(self.constraint(child)?))
                })?
            }
            FilterConstraint::Not(inner) => self.constraint(inner)?.not(),
            FilterConstraint::PrimaryKeyIn(primary_keys) => Cond::all().add(
                Expr::col((VitrineEntities::Table, VitrineEntities::PrimaryKey))
                    .is_in(primary_keys.iter().copied()),
            ),
            FilterConstraint::AttributeEquals { name, value } => {
                let mut rows = self.attribute_rows(name);
                rows.and_where(scalar_matches(value));
                entity_in(rows)
            }
            FilterConstraint::AttributeInSet { name, values } => {
                let texts = values
                    .iter()
                    .filter_map(|value| match value {
                        Scalar::Text(text) => Some(text.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>();
                let numbers = values
                    .iter()
                    .filter(|value| !matches!(value, Scalar::Text(_)))
                    .filter_map(Scalar::as_number)
                    .collect::<Vec<_>>();
                let mut rows = self.attribute_rows(name);
                rows.and_where(
                    Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::ValueText))
                        .is_in(texts)
                        .or(Expr::col((
                            VitrineAttributeValues::Table,
                            VitrineAttributeValues::ValueNumber,
                        ))
                        .is_in(numbers)),
                );
                entity_in(rows)
            }
            FilterConstraint::AttributeBetween { name, from, to } => {
                let mut rows = self.attribute_rows(name);
                rows.and_where(between_values(*from, *to));
                entity_in(rows)
            }
            FilterConstraint::AttributeIsNull { name } => Cond::all().add(
                Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))
                    .not_in_subquery(self.attribute_rows(name)),
            ),
            FilterConstraint::PriceBetween { from, to } => {
                let price = self.price.ok_or_else(|| {
                    VitrineError::invalid("price filter requires a price list and currency")
                })?;
                let selling = selling_price(price);
                let mut cond = Cond::all().add(Expr::expr(selling.clone()).is_not_null());
                if let Some(from) = from {
                    cond = cond.add(Expr::expr(selling.clone()).gte(*from));
                }
                if let Some(to) = to {
                    cond = cond.add(Expr::expr(selling).lte(*to));
                }
                cond
            }
            FilterConstraint::Facet {
                reference_type,
                ids,
            } => {
                let mut rows = facet_rows(self.collection, reference_type);
                rows.and_where(Expr::col(VitrineFacets::FacetPk).is_in(ids.iter().copied()));
                entity_in(rows)
            }
            FilterConstraint::ReferenceHaving {
                reference_type,
                ids,
            } => {
                let mut rows = Query::select()
                    .column(VitrineReferences::EntityId)
                    .from(VitrineReferences::Table)
                    .and_where(Expr::col(VitrineReferences::Collection).eq(self.collection))
                    .and_where(Expr::col(VitrineReferences::ReferenceType).eq(reference_type.as_str()))
                    .to_owned();
                if !ids.is_empty() {
                    rows.and_where(
                        Expr::col(VitrineReferences::ReferencedPk).is_in(ids.iter().copied()),
                    );
                }
                entity_in(rows)
            }
            FilterConstraint::HierarchyWithin {
                hierarchy_type,
                parent,
                excluding_parent,
            } => {
                let index = self.hierarchies.require(hierarchy_type)?;
                let code = parent.to_string();
                let item = index
                    .item(&code)?
                    .ok_or_else(|| VitrineError::no_such_item(&code))?;
                let mut rows = placement_rows(hierarchy_type);
                rows.and_where(Expr::col(VitrineHierarchyPlacements::LeftBound).gte(item.left_bound))
                    .and_where(
                        Expr::col(VitrineHierarchyPlacements::RightBound).lte(item.right_bound),
                    );
                if *excluding_parent {
                    rows.and_where(Expr::col(VitrineHierarchyPlacements::NodeCode).ne(code));
                }
                entity_in(rows)
            }
            FilterConstraint::HierarchyWithinRoot { hierarchy_type } => {
                entity_in(placement_rows(hierarchy_type))
            }
        };
        Ok(condition)
    }

    /// Attribute rows without a locale or in the requested one.
    pub fn visible_locale(&self) -> SimpleExpr {
        let unlocalized = Expr::col((VitrineAttributes::Table, VitrineAttributes::Locale)).eq("");
        match self.locale {
            Some(locale) => unlocalized
                .or(Expr::col((VitrineAttributes::Table, VitrineAttributes::Locale)).eq(locale)),
            None => unlocalized,
        }
    }

    /// Entity-level index rows of attribute `name` visible in the requested locale.
    fn attribute_rows(&self, name: &str) -> SelectStatement {
        Query::select()
            .column((VitrineAttributes::Table, VitrineAttributes::EntityId))
            .from(VitrineAttributes::Table)
            .inner_join(
                VitrineAttributeValues::Table,
                Expr::col((
                    VitrineAttributeValues::Table,
                    VitrineAttributeValues::AttributeId,
                ))
                .equals((VitrineAttributes::Table, VitrineAttributes::AttributeId)),
            )
            .and_where(
                Expr::col((VitrineAttributes::Table, VitrineAttributes::Collection))
                    .eq(self.collection),
            )
            .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::ReferenceId)).is_null())
            .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::Name)).eq(name))
            .and_where(self.visible_locale())
            .to_owned()
    }
}

fn scalar_matches(value: &Scalar) -> SimpleExpr {
    match value {
        Scalar::Text(text) => {
            Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::ValueText))
                .eq(text.as_str())
        }
        other => Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::ValueNumber))
            .eq(other.as_number().unwrap_or_default()),
    }
}

/// Numbers inside `[from, to]` or ranges overlapping it; missing bounds are open.
fn between_values(from: Option<f64>, to: Option<f64>) -> SimpleExpr {
    let number = || Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::ValueNumber));
    let range_from = || Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::RangeFrom));
    let range_to = || Expr::col((VitrineAttributeValues::Table, VitrineAttributeValues::RangeTo));

    let mut numeric = number().is_not_null();
    let mut overlap = range_from().is_not_null().or(range_to().is_not_null());
    if let Some(from) = from {
        numeric = numeric.and(number().gte(from));
        overlap = overlap.and(range_to().is_null().or(range_to().gte(from)));
    }
    if let Some(to) = to {
        numeric = numeric.and(number().lte(to));
        overlap = overlap.and(range_from().is_null().or(range_from().lte(to)));
    }
    numeric.or(overlap)
}

pub(crate) fn entity_in(rows: SelectStatement) -> Condition {
    Cond::all().add(
        Expr::col((VitrineEntities::Table, VitrineEntities::EntityId)).in_subquery(rows),
    )
}

/// Non-dropped entities of one collection.
pub(crate) fn live_entities(entity_type: &str) -> Condition {
    Cond::all()
        .add(Expr::col((VitrineEntities::Table, VitrineEntities::EntityType)).eq(entity_type))
        .add(Expr::col((VitrineEntities::Table, VitrineEntities::Dropped)).eq(false))
}

/// `SELECT entity_id FROM vitrine_entities WHERE condition`.
pub(crate) fn matching_entities(condition: Condition) -> SelectStatement {
    Query::select()
        .column((VitrineEntities::Table, VitrineEntities::EntityId))
        .from(VitrineEntities::Table)
        .cond_where(condition)
        .to_owned()
}

pub(crate) fn facet_rows(collection: &str, reference_type: &str) -> SelectStatement {
    Query::select()
        .column(VitrineFacets::EntityId)
        .from(VitrineFacets::Table)
        .and_where(Expr::col(VitrineFacets::Collection).eq(collection))
        .and_where(Expr::col(VitrineFacets::ReferenceType).eq(reference_type))
        .to_owned()
}

fn placement_rows(hierarchy_type: &str) -> SelectStatement {
    Query::select()
        .column(VitrineHierarchyPlacements::EntityId)
        .from(VitrineHierarchyPlacements::Table)
        .and_where(Expr::col(VitrineHierarchyPlacements::HierarchyType).eq(hierarchy_type))
        .to_owned()
}

/// Selling price of the enclosing `vitrine_entities` row.
///
/// Picks the first indexed price in the requested currency from the highest
/// priority price list that has one, valid at the requested moment.
pub(crate) fn selling_price(price: &PriceQuery) -> SimpleExpr {
    let mut priority = CaseStatement::new();
    for (rank, list) in price.price_lists.iter().enumerate() {
        priority = priority.case(
            Expr::col((VitrinePrices::Table, VitrinePrices::PriceList)).eq(list.as_str()),
            rank as i64,
        );
    }
    let priority = priority.finally(price.price_lists.len() as i64);

    let mut select = Query::select()
        .column((VitrinePrices::Table, VitrinePrices::PriceWithTax))
        .from(VitrinePrices::Table)
        .and_where(
            Expr::col((VitrinePrices::Table, VitrinePrices::EntityId))
                .equals((VitrineEntities::Table, VitrineEntities::EntityId)),
        )
        .and_where(
            Expr::col((VitrinePrices::Table, VitrinePrices::Currency)).eq(price.currency.as_str()),
        )
        .and_where(
            Expr::col((VitrinePrices::Table, VitrinePrices::PriceList))
                .is_in(price.price_lists.iter().map(String::as_str)),
        )
        .to_owned();
    if let Some(moment) = price.valid_at {
        select
            .and_where(
                Expr::col((VitrinePrices::Table, VitrinePrices::ValidFrom))
                    .is_null()
                    .or(Expr::col((VitrinePrices::Table, VitrinePrices::ValidFrom)).lte(moment)),
            )
            .and_where(
                Expr::col((VitrinePrices::Table, VitrinePrices::ValidTo))
                    .is_null()
                    .or(Expr::col((VitrinePrices::Table, VitrinePrices::ValidTo)).gte(moment)),
            );
    }
    select
        .order_by_expr(priority.into(), Order::Asc)
        .order_by((VitrinePrices::Table, VitrinePrices::PriceId), Order::Asc)
        .limit(1);
    SimpleExpr::SubQuery(None, Box::new(select.into_sub_query_statement()))
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{Query, QueryStatementWriter, SqliteQueryBuilder};

    use super::{FilterScope, live_entities};
    use crate::Hierarchies;
    use crate::db::VitrineEntities;
    use vitrine_core::{
        EntityRequest, FilterConstraint, HierarchyIndex, PriceQuery, VitrineError,
    };

    fn render(request: &EntityRequest, hierarchies: &Hierarchies) -> String {
        let scope = FilterScope::new(request, hierarchies);
        let condition = scope
            .condition(&request.filter.baseline)
            .expect("condition");
        Query::select()
            .column(VitrineEntities::EntityId)
            .from(VitrineEntities::Table)
            .cond_where(live_entities(&request.entity_type).add(condition))
            .to_string(SqliteQueryBuilder)
    }

    #[test]
    fn attribute_constraints_filter_on_index_rows() {
        let hierarchies = Hierarchies::new(8, 3);
        let request = EntityRequest::new("PRODUCT")
            .with_baseline(FilterConstraint::attribute_equals("code", "A"))
            .with_baseline(FilterConstraint::AttributeIsNull {
                name: "ean".to_string(),
            });
        let sql = render(&request, &hierarchies);
        assert!(sql.contains("\"vitrine_attributes\".\"name\" = 'code'"));
        assert!(sql.contains("\"value_text\" = 'A'"));
        assert!(sql.contains("NOT IN"));
        assert!(sql.contains("\"locale\" = ''"));
    }

    #[test]
    fn price_filter_needs_price_query() {
        let hierarchies = Hierarchies::new(8, 3);
        let request = EntityRequest::new("PRODUCT").with_baseline(FilterConstraint::PriceBetween {
            from: Some(10.0),
            to: None,
        });
        let scope = FilterScope::new(&request, &hierarchies);
        let err = scope
            .condition(&request.filter.baseline)
            .expect_err("missing price query");
        assert!(matches!(err, VitrineError::Validation { .. }));

        let request = request.with_price(PriceQuery {
            price_lists: vec!["vip".to_string(), "basic".to_string()],
            currency: "EUR".to_string(),
            valid_at: None,
        });
        let sql = render(&request, &hierarchies);
        assert!(sql.contains("CASE"));
        assert!(sql.contains("LIMIT 1"));
        assert!(sql.contains("\"price_with_tax\""));
    }

    #[test]
    fn hierarchy_within_uses_interval_bounds() {
        let hierarchies = Hierarchies::new(8, 3);
        let index = hierarchies.ensure("CATEGORY").expect("index");
        index.create_root_item("1").expect("root");
        let child = index.create_item("2", "1").expect("child");
        let request = EntityRequest::new("PRODUCT").with_baseline(FilterConstraint::HierarchyWithin {
            hierarchy_type: "CATEGORY".to_string(),
            parent: 2,
            excluding_parent: true,
        });
        let sql = render(&request, &hierarchies);
        assert!(sql.contains(&format!("\"left_bound\" >= {}", child.left_bound)));
        assert!(sql.contains(&format!("\"right_bound\" <= {}", child.right_bound)));
        assert!(sql.contains("\"node_code\" <> '2'"));

        let missing = EntityRequest::new("PRODUCT").with_baseline(FilterConstraint::HierarchyWithin {
            hierarchy_type: "CATEGORY".to_string(),
            parent: 99,
            excluding_parent: false,
        });
        let scope = FilterScope::new(&missing, &hierarchies);
        let err = scope
            .condition(&missing.filter.baseline)
            .expect_err("unknown parent");
        assert!(matches!(err, VitrineError::NoSuchHierarchyItem { .. }));
    }
}
