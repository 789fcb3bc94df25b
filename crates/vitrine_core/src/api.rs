use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    ComplexResponse, DataChunk, Entity, EntityParents, EntityRequest, EntitySchema, FacetSummary,
    HierarchyStatistics, Histogram, VitrineResult,
};

#[async_trait]
pub trait CatalogApi {
    /// Creates or replaces the schema of one collection.
    async fn store_schema(&self, schema: EntitySchema) -> VitrineResult<()>;

    async fn store_serialization_header(&self, entity_type: &str, header: Vec<u8>)
    -> VitrineResult<()>;

    async fn load_serialization_header(&self, entity_type: &str) -> VitrineResult<Option<Vec<u8>>>;

    /// Leaves bulk mode. Without `restore` the secondary indexes are built as well.
    async fn go_live(&self, restore: bool) -> VitrineResult<()>;
}

#[async_trait]
pub trait CollectionWriteApi {
    async fn store_entity(&self, entity: Entity) -> VitrineResult<()>;
    async fn flush(&self) -> VitrineResult<()>;
    async fn generate_next_primary_key(&self) -> VitrineResult<i64>;
    async fn count_buffer_entities(&self) -> VitrineResult<usize>;
}

#[async_trait]
pub trait CollectionReadApi {
    type Context: Send + Sync;

    async fn find_entity_by_primary_key(&self, primary_key: i64) -> VitrineResult<Option<Entity>>;

    /// Uses the materialized baseline when `context` is given, the plain filter otherwise.
    async fn find_entities_by_request(
        &self,
        request: &EntityRequest,
        context: Option<&Self::Context>,
    ) -> VitrineResult<DataChunk>;

    async fn count_stored_entities(&self) -> VitrineResult<u64>;

    async fn open_context(&self, request: &EntityRequest) -> VitrineResult<Self::Context>;

    async fn fetch_complex(&self, request: &EntityRequest) -> VitrineResult<ComplexResponse>;

    async fn compute_facet_summary(
        &self,
        context: &Self::Context,
        request: &EntityRequest,
    ) -> VitrineResult<FacetSummary>;

    async fn compute_attribute_histograms(
        &self,
        context: &Self::Context,
        request: &EntityRequest,
    ) -> VitrineResult<BTreeMap<String, Histogram>>;

    async fn compute_price_histogram(
        &self,
        context: &Self::Context,
        request: &EntityRequest,
        bucket_count: u16,
    ) -> VitrineResult<Option<Histogram>>;

    async fn find_parents(
        &self,
        entities: &[Entity],
        hierarchy_type: &str,
    ) -> VitrineResult<Vec<EntityParents>>;

    async fn compute_hierarchy_statistics(
        &self,
        context: &Self::Context,
        request: &EntityRequest,
        hierarchy_type: &str,
        root: Option<i64>,
    ) -> VitrineResult<HierarchyStatistics>;
}
