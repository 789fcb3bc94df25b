//! One entity collection: buffered versioned writes and baseline-cached reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Alias, Condition, Expr, Func, Order, Query};
use sea_orm::TransactionTrait;
use tokio::sync::{Mutex, MutexGuard};

use crate::baseline::BaselineContext;
use crate::buffer::{EntityRow, RowWrite, WriteBuffers};
use crate::catalog::CatalogState;
use crate::db::*;
use crate::facet::{facet_summary, refresh_facets};
use crate::filter::{FilterScope, live_entities};
use crate::hierarchy::{
    borrowed_placements, entity_parents, hierarchy_statistics, own_item, placement_row,
};
use crate::histogram::{attribute_histograms, price_histogram};
use crate::sql::{col_name, is_unique_violation, query_all, query_count, query_one};
use crate::upsert::{
    ExistingEntity, ExistingSnapshot, FieldUpsert, apply_writes, claim_unique_values,
    existing_entity, explain_unique_failure,
};
use vitrine_core::{
    CollectionReadApi, CollectionWriteApi, ComplexResponse, DataChunk, Entity, EntityParents,
    EntityRequest, EntitySchema, FacetSummary, HierarchyItem, HierarchyStatistics, Histogram,
    OrderDirection,
    VitrineError, VitrineResult,
};

pub struct EntityCollection {
    entity_type: String,
    state: Arc<CatalogState>,
    buffers: Mutex<WriteBuffers>,
}

impl EntityCollection {
    pub(crate) fn new(entity_type: &str, state: Arc<CatalogState>) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            state,
            buffers: Mutex::new(WriteBuffers::default()),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Exclusive write access, waiting at most the configured lock timeout.
    async fn lock(&self) -> VitrineResult<MutexGuard<'_, WriteBuffers>> {
        tokio::time::timeout(self.state.limits.lock_timeout, self.buffers.lock())
            .await
            .map_err(|_| VitrineError::concurrent_write(&self.entity_type))
    }

    fn schema(&self) -> VitrineResult<Arc<EntitySchema>> {
        self.state.schema(&self.entity_type)?.ok_or_else(|| {
            VitrineError::invalid_state(format!("no schema stored for `{}`", self.entity_type))
        })
    }

    fn check_request(&self, request: &EntityRequest) -> VitrineResult<()> {
        if request.entity_type != self.entity_type {
            return Err(VitrineError::invalid(format!(
                "`{}` collection cannot answer a `{}` request",
                self.entity_type, request.entity_type
            )));
        }
        Ok(())
    }

    /// Plans every row write of one `store_entity` call without touching `buffers`.
    /// A hierarchy item placed here is taken back when planning fails.
    async fn stage(
        &self,
        buffers: &WriteBuffers,
        entity: &Entity,
        schema: &EntitySchema,
    ) -> VitrineResult<WriteBuffers> {
        let state = &self.state;
        if buffers.keys.contains_key(&entity.primary_key) {
            return Err(VitrineError::invalid_state(format!(
                "entity {} of `{}` written twice before a flush",
                entity.primary_key, self.entity_type
            )));
        }
        let stored = existing_entity(&state.conn, &self.entity_type, entity.primary_key).await?;
        if stored.is_some() && !state.is_live() {
            return Err(VitrineError::invalid_state(format!(
                "entity {} of `{}` already exists; updates need transactional mode",
                entity.primary_key, self.entity_type
            )));
        }
        let stale_tombstone =
            stored.filter(|stored| stored.dropped && entity.version <= stored.version);
        if let Some(stored) = stale_tombstone {
            log::debug!(
                "stale write of tombstoned entity {} of `{}` ignored (v{} <= v{})",
                entity.primary_key,
                self.entity_type,
                entity.version,
                stored.version
            );
            return Ok(WriteBuffers::default());
        }

        let mut created = None;
        let node = if schema.hierarchical {
            let index = state.hierarchies.ensure(&self.entity_type)?;
            let (item, fresh) = own_item(index.as_ref(), entity)?;
            if fresh {
                created = Some(item.code.clone());
            }
            Some(item)
        } else {
            None
        };
        match self
            .stage_rows(buffers, entity, schema, stored, node.as_ref())
            .await
        {
            Ok(mut staged) => {
                staged.created_nodes.extend(created);
                Ok(staged)
            }
            Err(err) => {
                self.forget_nodes(created.as_slice());
                Err(err)
            }
        }
    }

    /// Drops hierarchy items whose entities never reached storage, newest first.
    fn forget_nodes(&self, codes: &[String]) {
        if codes.is_empty() {
            return;
        }
        let index = match self.state.hierarchies.get(&self.entity_type) {
            Ok(Some(index)) => index,
            Ok(None) => return,
            Err(err) => {
                log::warn!("hierarchy of `{}` not rolled back: {err}", self.entity_type);
                return;
            }
        };
        for code in codes.iter().rev() {
            if let Err(err) = index.remove_item(code) {
                log::warn!(
                    "hierarchy item `{code}` of `{}` not rolled back: {err}",
                    self.entity_type
                );
            }
        }
    }

    async fn stage_rows(
        &self,
        buffers: &WriteBuffers,
        entity: &Entity,
        schema: &EntitySchema,
        stored: Option<ExistingEntity>,
        node: Option<&HierarchyItem>,
    ) -> VitrineResult<WriteBuffers> {
        let state = &self.state;
        let mut staged = WriteBuffers::default();
        let row = |entity_id| -> VitrineResult<EntityRow> {
            Ok(EntityRow {
                entity_id,
                primary_key: entity.primary_key,
                version: entity.version,
                dropped: entity.dropped,
                bounds: node.map(|item| (item.left_bound, item.right_bound, item.level)),
                locales: serde_json::to_string(&entity.locales)?,
                body: serde_json::to_vec(entity)?,
            })
        };

        let entity_id = match stored {
            None => {
                let entity_id = state.ids.next_entity_id().await?;
                staged.entities.push(RowWrite::Insert(row(entity_id)?));
                if let Some(item) = node {
                    staged
                        .placements
                        .push(RowWrite::Insert(placement_row(entity_id, &self.entity_type, item)));
                }
                if !entity.dropped {
                    staged.placements.extend(
                        borrowed_placements(&state.hierarchies, entity, entity_id)?
                            .into_iter()
                            .map(RowWrite::Insert),
                    );
                    let mut upsert = FieldUpsert {
                        schema,
                        ids: &state.ids,
                        staged: &mut staged,
                    };
                    upsert
                        .attributes(entity_id, None, &entity.attributes, None)
                        .await?;
                    upsert.prices(entity_id, &entity.prices, None).await?;
                    let changed = upsert
                        .references(entity_id, &entity.references, None)
                        .await?;
                    staged.references_changed = changed;
                }
                entity_id
            }
            Some(stored) => {
                let entity_id = stored.entity_id;
                let replace_body = entity.version > stored.version;
                if stored.dropped && replace_body && !entity.dropped {
                    log::debug!(
                        "entity {} of `{}` restored from its tombstone",
                        entity.primary_key,
                        self.entity_type
                    );
                }
                let snapshot = ExistingSnapshot::load(&state.conn, entity_id).await?;
                if replace_body {
                    staged.entities.push(RowWrite::Update(entity_id, row(entity_id)?));
                }
                let mut upsert = FieldUpsert {
                    schema,
                    ids: &state.ids,
                    staged: &mut staged,
                };
                if entity.dropped && replace_body {
                    let changed = upsert.drop_all(&snapshot);
                    staged.placements.push(RowWrite::Delete(entity_id));
                    staged.references_changed = changed;
                } else {
                    upsert
                        .attributes(entity_id, None, &entity.attributes, Some(&snapshot.attributes))
                        .await?;
                    upsert
                        .prices(entity_id, &entity.prices, Some(&snapshot.prices))
                        .await?;
                    let changed = upsert
                        .references(entity_id, &entity.references, Some(&snapshot))
                        .await?;
                    if (replace_body || changed) && !entity.dropped {
                        staged.placements.push(RowWrite::Delete(entity_id));
                        staged.placements.extend(
                            borrowed_placements(&state.hierarchies, entity, entity_id)?
                                .into_iter()
                                .map(RowWrite::Insert),
                        );
                    }
                    staged.references_changed = changed;
                }
                entity_id
            }
        };
        staged.keys.insert(entity.primary_key, entity_id);
        claim_unique_values(
            &state.conn,
            &self.entity_type,
            entity.primary_key,
            entity_id,
            &mut staged,
            &buffers.unique_values,
        )
        .await?;
        Ok(staged)
    }

    /// Writes everything buffered in one transaction. Buffers are dropped on failure.
    async fn flush_locked(&self, buffers: &mut WriteBuffers, refresh: bool) -> VitrineResult<()> {
        let conn = &self.state.conn;
        if buffers.is_empty() {
            if refresh {
                refresh_facets(conn, &self.entity_type).await?;
            }
            return Ok(());
        }
        let writes = buffers.drain();
        if let Err(err) = self.commit_writes(&writes).await {
            self.forget_nodes(&writes.created_nodes);
            return Err(err);
        }
        log::debug!(
            "flushed `{}`: {} entities, {} attributes, {} prices, {} references, {} placements",
            self.entity_type,
            writes.entities.len(),
            writes.attributes.len(),
            writes.prices.len(),
            writes.references.len(),
            writes.placements.len()
        );
        if refresh || writes.references_changed {
            refresh_facets(conn, &self.entity_type).await?;
        }
        Ok(())
    }

    async fn commit_writes(&self, writes: &WriteBuffers) -> VitrineResult<()> {
        let conn = &self.state.conn;
        let tx = conn.begin().await?;
        if let Err(err) = apply_writes(&tx, &self.entity_type, writes).await {
            tx.rollback().await?;
            if is_unique_violation(&err) {
                return Err(explain_unique_failure(conn, &self.entity_type, writes).await?);
            }
            return Err(err.into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Flushes buffered writes, refreshing facets only when references changed.
    pub(crate) async fn flush_pending(&self) -> VitrineResult<()> {
        let mut buffers = self.lock().await?;
        self.flush_locked(&mut buffers, false).await
    }

    async fn complex(
        &self,
        context: &BaselineContext,
        request: &EntityRequest,
    ) -> VitrineResult<ComplexResponse> {
        let require = &request.require;
        let chunk = self.find_entities_by_request(request, Some(context)).await?;
        let facet_summary = match &require.facet_summary {
            Some(_) => Some(self.compute_facet_summary(context, request).await?),
            None => None,
        };
        let attribute_histograms = self.compute_attribute_histograms(context, request).await?;
        let price_histogram = match require.price_histogram {
            Some(bucket_count) => {
                self.compute_price_histogram(context, request, bucket_count)
                    .await?
            }
            None => None,
        };
        let parents = match &require.parents {
            Some(parents) => Some(
                self.find_parents(&chunk.entities, &parents.hierarchy_type)
                    .await?,
            ),
            None => None,
        };
        let hierarchy_statistics = match &require.hierarchy_statistics {
            Some(statistics) => {
                let root = statistics.root.or_else(|| {
                    context
                        .hierarchy_scope()
                        .filter(|(hierarchy_type, _)| *hierarchy_type == statistics.hierarchy_type)
                        .map(|(_, parent)| parent)
                });
                Some(
                    self.compute_hierarchy_statistics(
                        context,
                        request,
                        &statistics.hierarchy_type,
                        root,
                    )
                    .await?,
                )
            }
            None => None,
        };
        Ok(ComplexResponse {
            chunk,
            facet_summary,
            attribute_histograms,
            price_histogram,
            parents,
            hierarchy_statistics,
        })
    }
}

fn decode(row: &sea_orm::QueryResult) -> VitrineResult<Entity> {
    let body: Vec<u8> = row.try_get("", &col_name(VitrineEntities::Body))?;
    Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl CollectionWriteApi for EntityCollection {
    async fn store_entity(&self, entity: Entity) -> VitrineResult<()> {
        if entity.entity_type != self.entity_type {
            return Err(VitrineError::invalid(format!(
                "`{}` entity cannot be stored in the `{}` collection",
                entity.entity_type, self.entity_type
            )));
        }
        let schema = self.schema()?;
        let mut buffers = self.lock().await?;
        let staged = self.stage(&buffers, &entity, &schema).await?;
        buffers.absorb(staged);
        if self.state.is_live() || buffers.is_full(self.state.limits.flush_threshold) {
            self.flush_locked(&mut buffers, false).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> VitrineResult<()> {
        let mut buffers = self.lock().await?;
        self.flush_locked(&mut buffers, true).await
    }

    async fn generate_next_primary_key(&self) -> VitrineResult<i64> {
        self.state.ids.next_primary_key(&self.entity_type).await
    }

    async fn count_buffer_entities(&self) -> VitrineResult<usize> {
        let buffers = self.lock().await?;
        Ok(buffers.buffered_entities())
    }
}

#[async_trait]
impl CollectionReadApi for EntityCollection {
    type Context = BaselineContext;

    async fn find_entity_by_primary_key(&self, primary_key: i64) -> VitrineResult<Option<Entity>> {
        let select = Query::select()
            .column(VitrineEntities::Body)
            .from(VitrineEntities::Table)
            .cond_where(live_entities(&self.entity_type))
            .and_where(
                Expr::col((VitrineEntities::Table, VitrineEntities::PrimaryKey)).eq(primary_key),
            )
            .to_owned();
        match query_one(&self.state.conn, &select).await? {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_entities_by_request(
        &self,
        request: &EntityRequest,
        context: Option<&BaselineContext>,
    ) -> VitrineResult<DataChunk> {
        self.check_request(request)?;
        let scope = FilterScope::new(request, &self.state.hierarchies);
        let user_filter = scope.condition(&request.filter.user_filter)?;
        let condition: Condition = match context {
            Some(context) => {
                context.check_request(request)?;
                context.contains().add(user_filter)
            }
            None => live_entities(&self.entity_type)
                .add(scope.condition(&request.filter.baseline)?)
                .add(user_filter),
        };
        let count = Query::select()
            .expr_as(
                Func::count(Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))),
                Alias::new("total"),
            )
            .from(VitrineEntities::Table)
            .cond_where(condition.clone())
            .to_owned();
        let total_count = query_count(&self.state.conn, &count, "total").await?;
        let order = match request.order {
            OrderDirection::Asc => Order::Asc,
            OrderDirection::Desc => Order::Desc,
        };
        let page = Query::select()
            .column((VitrineEntities::Table, VitrineEntities::Body))
            .from(VitrineEntities::Table)
            .cond_where(condition)
            .order_by((VitrineEntities::Table, VitrineEntities::PrimaryKey), order)
            .limit(u64::from(request.page.size))
            .offset(request.page.offset())
            .to_owned();
        let entities = query_all(&self.state.conn, &page)
            .await?
            .iter()
            .map(decode)
            .collect::<VitrineResult<Vec<_>>>()?;
        Ok(DataChunk {
            entities,
            page: request.page,
            total_count,
        })
    }

    async fn count_stored_entities(&self) -> VitrineResult<u64> {
        let select = Query::select()
            .expr_as(
                Func::count(Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))),
                Alias::new("total"),
            )
            .from(VitrineEntities::Table)
            .cond_where(live_entities(&self.entity_type))
            .to_owned();
        query_count(&self.state.conn, &select, "total").await
    }

    async fn open_context(&self, request: &EntityRequest) -> VitrineResult<BaselineContext> {
        self.check_request(request)?;
        let scope = FilterScope::new(request, &self.state.hierarchies);
        BaselineContext::open(&self.state.conn, &self.state.baseline_owner, request, &scope).await
    }

    async fn fetch_complex(&self, request: &EntityRequest) -> VitrineResult<ComplexResponse> {
        if !request.require.is_complex() {
            let chunk = self.find_entities_by_request(request, None).await?;
            return Ok(ComplexResponse {
                chunk,
                facet_summary: None,
                attribute_histograms: BTreeMap::new(),
                price_histogram: None,
                parents: None,
                hierarchy_statistics: None,
            });
        }
        let context = self.open_context(request).await?;
        let response = self.complex(&context, request).await;
        let released = context.release().await;
        let response = response?;
        released?;
        Ok(response)
    }

    async fn compute_facet_summary(
        &self,
        context: &BaselineContext,
        request: &EntityRequest,
    ) -> VitrineResult<FacetSummary> {
        self.check_request(request)?;
        context.check_request(request)?;
        let summary = request.require.facet_summary.clone().unwrap_or_default();
        let scope = FilterScope::new(request, &self.state.hierarchies);
        facet_summary(
            &self.state.conn,
            context,
            request,
            &summary,
            &scope,
            self.state.limits.impact_batch_size,
        )
        .await
    }

    async fn compute_attribute_histograms(
        &self,
        context: &BaselineContext,
        request: &EntityRequest,
    ) -> VitrineResult<BTreeMap<String, Histogram>> {
        self.check_request(request)?;
        context.check_request(request)?;
        let Some(histograms) = &request.require.attribute_histograms else {
            return Ok(BTreeMap::new());
        };
        let schema = self.schema()?;
        let scope = FilterScope::new(request, &self.state.hierarchies);
        attribute_histograms(&self.state.conn, context, request, histograms, &schema, &scope)
            .await
    }

    async fn compute_price_histogram(
        &self,
        context: &BaselineContext,
        request: &EntityRequest,
        bucket_count: u16,
    ) -> VitrineResult<Option<Histogram>> {
        self.check_request(request)?;
        context.check_request(request)?;
        let scope = FilterScope::new(request, &self.state.hierarchies);
        price_histogram(&self.state.conn, context, request, bucket_count, &scope).await
    }

    async fn find_parents(
        &self,
        entities: &[Entity],
        hierarchy_type: &str,
    ) -> VitrineResult<Vec<EntityParents>> {
        let index = self.state.hierarchies.require(hierarchy_type)?;
        entities
            .iter()
            .map(|entity| entity_parents(index.as_ref(), entity, hierarchy_type))
            .collect()
    }

    async fn compute_hierarchy_statistics(
        &self,
        context: &BaselineContext,
        request: &EntityRequest,
        hierarchy_type: &str,
        root: Option<i64>,
    ) -> VitrineResult<HierarchyStatistics> {
        self.check_request(request)?;
        context.check_request(request)?;
        let index = self.state.hierarchies.require(hierarchy_type)?;
        let scope = FilterScope::new(request, &self.state.hierarchies);
        let user_filter = scope.condition(&request.filter.user_filter)?;
        hierarchy_statistics(
            &self.state.conn,
            context,
            user_filter,
            index.as_ref(),
            hierarchy_type,
            root,
        )
        .await
    }
}
