//! Attribute and selling-price histograms over the materialized baseline.
//!
//! A histogram ignores every user-filter constraint on its own axis, so it shows
//! the distribution the user would see without having narrowed that axis.

use std::collections::BTreeMap;

use sea_orm::sea_query::{Alias, Expr, Func, Query};
use sea_orm::DatabaseConnection;

use crate::baseline::BaselineContext;
use crate::db::*;
use crate::filter::{FilterScope, matching_entities, selling_price};
use crate::sql::{col_name, query_all};
use vitrine_core::{
    AttributeHistogramRequest, EntityRequest, EntitySchema, Histogram, VitrineError,
    VitrineResult, build_histogram,
};

pub(crate) async fn attribute_histograms(
    conn: &DatabaseConnection,
    context: &BaselineContext,
    request: &EntityRequest,
    histograms: &AttributeHistogramRequest,
    schema: &EntitySchema,
    scope: &FilterScope<'_>,
) -> VitrineResult<BTreeMap<String, Histogram>> {
    let mut result = BTreeMap::new();
    for name in &histograms.attributes {
        if !schema.attribute(name).is_some_and(|attribute| attribute.filterable) {
            return Err(VitrineError::invalid(format!(
                "attribute `{name}` of `{}` is not filterable",
                schema.name
            )));
        }
        let user_filter = scope.condition(&request.filter.user_filter_without_attribute(name))?;
        let value = (VitrineAttributeValues::Table, VitrineAttributeValues::ValueNumber);
        let select = Query::select()
            .column(value)
            .expr_as(
                Func::count(Expr::col((VitrineAttributes::Table, VitrineAttributes::EntityId))),
                Alias::new("occurrences"),
            )
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
                    .eq(context.entity_type()),
            )
            .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::ReferenceId)).is_null())
            .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::Name)).eq(name.as_str()))
            .and_where(scope.visible_locale())
            .and_where(Expr::col(value).is_not_null())
            .and_where(
                Expr::col((VitrineAttributes::Table, VitrineAttributes::EntityId))
                    .in_subquery(context.members()),
            )
            .and_where(
                Expr::col((VitrineAttributes::Table, VitrineAttributes::EntityId))
                    .in_subquery(matching_entities(user_filter)),
            )
            .group_by_col(value)
            .to_owned();
        let mut values = Vec::new();
        for row in query_all(conn, &select).await? {
            let value: f64 = row.try_get("", &col_name(VitrineAttributeValues::ValueNumber))?;
            let occurrences: i64 = row.try_get("", "occurrences")?;
            values.push((value, occurrences.max(0) as u64));
        }
        if let Some(histogram) = build_histogram(&values, histograms.bucket_count)? {
            result.insert(name.clone(), histogram);
        }
    }
    Ok(result)
}

pub(crate) async fn price_histogram(
    conn: &DatabaseConnection,
    context: &BaselineContext,
    request: &EntityRequest,
    bucket_count: u16,
    scope: &FilterScope<'_>,
) -> VitrineResult<Option<Histogram>> {
    let Some(price) = &request.price else {
        return Err(VitrineError::invalid(
            "price histogram requires a currency and price lists",
        ));
    };
    let user_filter = scope.condition(&request.filter.user_filter_without_price())?;
    let select = Query::select()
        .expr_as(selling_price(price), Alias::new("selling_price"))
        .from(VitrineEntities::Table)
        .cond_where(context.contains().add(user_filter))
        .to_owned();
    let mut values = Vec::new();
    for row in query_all(conn, &select).await? {
        let amount: Option<f64> = row.try_get("", "selling_price")?;
        if let Some(amount) = amount {
            values.push((amount, 1));
        }
    }
    log::debug!(
        "price histogram of `{}` over {} priced entities",
        context.entity_type(),
        values.len()
    );
    build_histogram(&values, bucket_count)
}
