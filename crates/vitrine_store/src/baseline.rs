//! Request-scoped materialization of the baseline filter.
//!
//! A [`BaselineContext`] owns the rows it wrote to `vitrine_baseline_results`
//! under a fresh name. Call [`BaselineContext::release`] when done; a context that
//! is dropped unreleased schedules the cleanup on the current tokio runtime.

use sea_orm::sea_query::{Condition, Expr, Query, SelectStatement};
use sea_orm::{DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use crate::db::*;
use crate::filter::{FilterScope, entity_in, live_entities};
use crate::sql::exec;
use vitrine_core::{EntityRequest, FilterConstraint, VitrineError, VitrineResult};

pub struct BaselineContext {
    conn: DatabaseConnection,
    entity_type: String,
    result_name: String,
    size: u64,
    hierarchy_scope: Option<(String, i64)>,
    released: bool,
}

impl BaselineContext {
    /// Runs the baseline part of `request` once and stores the matching entity ids.
    pub(crate) async fn open(
        conn: &DatabaseConnection,
        owner: &str,
        request: &EntityRequest,
        scope: &FilterScope<'_>,
    ) -> VitrineResult<Self> {
        let condition = live_entities(&request.entity_type)
            .add(scope.condition(&request.filter.baseline)?);
        let result_name = Uuid::new_v4().to_string();
        let select = Query::select()
            .expr(Expr::val(result_name.as_str()))
            .column((VitrineEntities::Table, VitrineEntities::EntityId))
            .expr(Expr::val(owner))
            .from(VitrineEntities::Table)
            .cond_where(condition)
            .to_owned();
        let insert = Query::insert()
            .into_table(VitrineBaselineResults::Table)
            .columns([
                VitrineBaselineResults::ResultName,
                VitrineBaselineResults::EntityId,
                VitrineBaselineResults::Owner,
            ])
            .select_from(select)
            .map_err(|err| VitrineError::storage(err.to_string()))?
            .to_owned();
        let tx = conn.begin().await?;
        let size = exec(&tx, &insert).await?;
        tx.commit().await?;
        log::debug!(
            "baseline {result_name} of `{}` materialized {size} entities",
            request.entity_type
        );
        Ok(Self {
            conn: conn.clone(),
            entity_type: request.entity_type.clone(),
            result_name,
            size,
            hierarchy_scope: hierarchy_scope(&request.filter.baseline),
            released: false,
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn result_name(&self) -> &str {
        &self.result_name
    }

    /// Number of entities matched by the baseline filter.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hierarchy node the baseline is scoped to, if it filters by one.
    pub fn hierarchy_scope(&self) -> Option<(&str, i64)> {
        self.hierarchy_scope
            .as_ref()
            .map(|(hierarchy_type, parent)| (hierarchy_type.as_str(), *parent))
    }

    /// `SELECT entity_id` of the materialized rows.
    pub(crate) fn members(&self) -> SelectStatement {
        Query::select()
            .column(VitrineBaselineResults::EntityId)
            .from(VitrineBaselineResults::Table)
            .and_where(Expr::col(VitrineBaselineResults::ResultName).eq(self.result_name.as_str()))
            .to_owned()
    }

    /// Restricts `vitrine_entities` rows to the baseline.
    pub(crate) fn contains(&self) -> Condition {
        entity_in(self.members())
    }

    pub(crate) fn check_request(&self, request: &EntityRequest) -> VitrineResult<()> {
        if self.released {
            return Err(VitrineError::invalid_state(format!(
                "baseline {} was already released",
                self.result_name
            )));
        }
        if request.entity_type != self.entity_type {
            return Err(VitrineError::invalid(format!(
                "baseline of `{}` cannot serve a `{}` request",
                self.entity_type, request.entity_type
            )));
        }
        Ok(())
    }

    pub async fn release(mut self) -> VitrineResult<()> {
        self.released = true;
        delete_results(&self.conn, &self.result_name).await?;
        log::debug!("baseline {} released", self.result_name);
        Ok(())
    }
}

impl Drop for BaselineContext {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let conn = self.conn.clone();
        let result_name = std::mem::take(&mut self.result_name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = delete_results(&conn, &result_name).await {
                        log::warn!("failed to release baseline {result_name}: {err}");
                    }
                });
            }
            Err(_) => log::warn!("baseline {result_name} dropped outside a runtime; rows kept"),
        }
    }
}

async fn delete_results(conn: &DatabaseConnection, result_name: &str) -> VitrineResult<()> {
    let delete = Query::delete()
        .from_table(VitrineBaselineResults::Table)
        .and_where(Expr::col(VitrineBaselineResults::ResultName).eq(result_name))
        .to_owned();
    exec(conn, &delete).await?;
    Ok(())
}

/// Drops rows left behind by contexts that never got released.
/// Removes baselines an earlier process of the same owner never released.
pub(crate) async fn purge_stale(conn: &DatabaseConnection, owner: &str) -> VitrineResult<u64> {
    let delete = Query::delete()
        .from_table(VitrineBaselineResults::Table)
        .and_where(Expr::col(VitrineBaselineResults::Owner).eq(owner))
        .to_owned();
    exec(conn, &delete).await
}

fn hierarchy_scope(baseline: &[FilterConstraint]) -> Option<(String, i64)> {
    baseline.iter().find_map(|constraint| match constraint {
        FilterConstraint::HierarchyWithin {
            hierarchy_type,
            parent,
            ..
        } => Some((hierarchy_type.clone(), *parent)),
        FilterConstraint::And(children) => hierarchy_scope(children),
        _ => None,
    })
}
