use std::collections::HashSet;

use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use vitrine_store::{
    AttributeSchema, AttributeValue, BaselineContext, Catalog, CatalogApi, CollectionReadApi,
    CollectionWriteApi, Entity, EntityRequest, EntitySchema, HierarchyIndex, QueryConfig,
    VitrineConfig, VitrineError, VitrineResult,
};
use tempfile::tempdir;

async fn list_tables(catalog: &Catalog) -> VitrineResult<HashSet<String>> {
    let rows = catalog
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(VitrineError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(VitrineError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_catalog_tables() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("catalog.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    let tables = list_tables(&catalog).await?;
    for table in [
        "vitrine_entities",
        "vitrine_hierarchy_placements",
        "vitrine_attributes",
        "vitrine_attribute_values",
        "vitrine_prices",
        "vitrine_references",
        "vitrine_facets",
        "vitrine_sequences",
        "vitrine_schemas",
        "vitrine_serialization_headers",
        "vitrine_catalog_state",
        "vitrine_baseline_results",
    ] {
        assert!(tables.contains(table), "missing table {table}");
    }
    assert!(!catalog.is_live());
    Ok(())
}

#[tokio::test]
async fn reopening_restores_schemas_state_and_headers() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("catalog.sqlite").to_string_lossy());
    {
        let catalog = Catalog::open(&config, base).await?;
        catalog
            .store_schema(
                EntitySchema::new("CATEGORY")
                    .hierarchical()
                    .with_attribute(AttributeSchema::new("code").unique()),
            )
            .await?;
        catalog
            .store_serialization_header("CATEGORY", vec![1, 2, 3])
            .await?;
        let categories = catalog.collection("CATEGORY")?;
        categories
            .store_entity(
                Entity::new("CATEGORY", 1)
                    .with_parent(None)
                    .with_attribute(AttributeValue::new("code", "root")),
            )
            .await?;
        categories
            .store_entity(
                Entity::new("CATEGORY", 2)
                    .with_parent(Some(1))
                    .with_attribute(AttributeValue::new("code", "child")),
            )
            .await?;
        assert_eq!(categories.count_buffer_entities().await?, 2);
        assert_eq!(categories.generate_next_primary_key().await?, 1);
        assert_eq!(categories.generate_next_primary_key().await?, 2);

        catalog.go_live(false).await?;
        assert!(catalog.is_live());
        assert_eq!(categories.count_buffer_entities().await?, 0);
        assert_eq!(categories.count_stored_entities().await?, 2);
    }

    let catalog = Catalog::open(&config, base).await?;
    assert!(catalog.is_live());
    let schemas = catalog.schemas()?;
    assert!(schemas.is_hierarchical("CATEGORY"));
    assert_eq!(
        catalog.load_serialization_header("CATEGORY").await?,
        Some(vec![1, 2, 3])
    );
    assert_eq!(catalog.load_serialization_header("PRODUCT").await?, None);

    let index = catalog.hierarchies().require("CATEGORY")?;
    let child = index.item("2")?.expect("restored child");
    assert_eq!(child.parent_code.as_deref(), Some("1"));
    assert_eq!(index.parent_items("2")?.len(), 1);

    let categories = catalog.collection("CATEGORY")?;
    assert_eq!(categories.generate_next_primary_key().await?, 3);

    // Live catalogs accept new children next to the restored ones.
    categories
        .store_entity(Entity::new("CATEGORY", 3).with_parent(Some(1)))
        .await?;
    let children = index.child_items("1")?;
    assert_eq!(children.len(), 2);
    assert!(children[0].right_bound < children[1].left_bound);
    Ok(())
}

#[tokio::test]
async fn restore_mode_goes_live_without_rebuilding() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("catalog.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(EntitySchema::new("PRODUCT")).await?;
    catalog.go_live(true).await?;
    assert!(catalog.is_live());

    let products = catalog.collection("PRODUCT")?;
    products.store_entity(Entity::new("PRODUCT", 1)).await?;
    assert_eq!(products.count_buffer_entities().await?, 0);
    products
        .store_entity(Entity::new("PRODUCT", 1).with_version(2))
        .await?;
    let stored = products
        .find_entity_by_primary_key(1)
        .await?
        .expect("stored entity");
    assert_eq!(stored.version, 2);
    Ok(())
}

#[tokio::test]
async fn surrogate_ids_stay_unique_across_going_live() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let mut config = VitrineConfig::default_sqlite(base.join("catalog.sqlite").to_string_lossy());
    if let Some(write) = config.write.as_mut() {
        write.flush_threshold = Some(4);
    }
    let catalog = Catalog::open(&config, base).await?;
    let ids = catalog.ids();
    assert!(!ids.is_transactional());

    let mut seen = HashSet::new();
    let mut previous = 0;
    for _ in 0..6 {
        let id = ids.next_entity_id().await?;
        assert!(id > previous);
        assert!(seen.insert(id));
        previous = id;
    }
    let reference = ids.next_reference_id().await?;
    assert_eq!(reference, 1);

    catalog.go_live(false).await?;
    assert!(ids.is_transactional());
    // Ids reserved in bulk but never handed out are skipped, not reissued.
    let live = ids.next_entity_id().await?;
    assert!(live > previous);
    assert!(seen.insert(live));
    assert!(ids.next_entity_id().await? > live);
    Ok(())
}

async fn baseline_rows(catalog: &Catalog, context: &BaselineContext) -> VitrineResult<u64> {
    let rows = catalog
        .connection()
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT entity_id FROM vitrine_baseline_results WHERE result_name = ?",
            [sea_orm::Value::from(context.result_name())],
        ))
        .await
        .map_err(VitrineError::from)?;
    Ok(rows.len() as u64)
}

fn owned_config(base: &std::path::Path, owner: &str) -> VitrineConfig {
    let mut config = VitrineConfig::default_sqlite(base.join("catalog.sqlite").to_string_lossy());
    config.query = Some(QueryConfig {
        impact_batch_size: None,
        baseline_owner: Some(owner.to_string()),
    });
    config
}

#[tokio::test]
async fn opening_purges_only_baselines_of_the_same_owner() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let first = Catalog::open(&owned_config(base, "first"), base).await?;
    first.store_schema(EntitySchema::new("PRODUCT")).await?;
    let products = first.collection("PRODUCT")?;
    for primary_key in 1..=3 {
        products.store_entity(Entity::new("PRODUCT", primary_key)).await?;
    }
    products.flush().await?;
    let context = products.open_context(&EntityRequest::new("PRODUCT")).await?;
    assert_eq!(context.size(), 3);
    assert_eq!(baseline_rows(&first, &context).await?, 3);

    let _second = Catalog::open(&owned_config(base, "second"), base).await?;
    assert_eq!(baseline_rows(&first, &context).await?, 3);

    let _restarted = Catalog::open(&owned_config(base, "first"), base).await?;
    assert_eq!(baseline_rows(&first, &context).await?, 0);
    context.release().await?;
    Ok(())
}
