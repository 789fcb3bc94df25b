use vitrine_store::{
    AttributeSchema, AttributeValue, Catalog, CatalogApi, CollectionReadApi, CollectionWriteApi,
    Entity, EntityRequest, EntitySchema, FilterConstraint, HierarchyIndex, Value, VitrineConfig,
    VitrineError, VitrineResult,
};
use tempfile::tempdir;

fn product_schema() -> EntitySchema {
    EntitySchema::new("PRODUCT")
        .with_attribute(AttributeSchema::new("code").unique().filterable())
        .with_attribute(AttributeSchema::new("width").filterable())
        .with_attribute(AttributeSchema::new("note"))
}

async fn matching(catalog: &Catalog, constraint: FilterConstraint) -> VitrineResult<Vec<i64>> {
    let request = EntityRequest::new("PRODUCT").with_user_filter(constraint);
    let chunk = catalog
        .collection("PRODUCT")?
        .find_entities_by_request(&request, None)
        .await?;
    Ok(chunk
        .entities
        .iter()
        .map(|entity| entity.primary_key)
        .collect())
}

#[tokio::test]
async fn versioned_upserts_apply_only_newer_values() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    catalog.go_live(false).await?;
    let products = catalog.collection("PRODUCT")?;

    products
        .store_entity(
            Entity::new("PRODUCT", 10)
                .with_attribute(AttributeValue::new("code", "P-10"))
                .with_attribute(AttributeValue::new("width", 5i64)),
        )
        .await?;
    assert_eq!(
        matching(&catalog, FilterConstraint::attribute_equals("width", 5i64)).await?,
        vec![10]
    );

    // Same attribute version: the index keeps the old value.
    products
        .store_entity(
            Entity::new("PRODUCT", 10)
                .with_version(2)
                .with_attribute(AttributeValue::new("code", "P-10"))
                .with_attribute(AttributeValue::new("width", 7i64)),
        )
        .await?;
    assert_eq!(
        matching(&catalog, FilterConstraint::attribute_equals("width", 5i64)).await?,
        vec![10]
    );
    assert!(matching(&catalog, FilterConstraint::attribute_equals("width", 7i64))
        .await?
        .is_empty());

    products
        .store_entity(
            Entity::new("PRODUCT", 10)
                .with_version(3)
                .with_attribute(AttributeValue::new("code", "P-10"))
                .with_attribute(AttributeValue::new("width", 7i64).with_version(2)),
        )
        .await?;
    assert!(matching(&catalog, FilterConstraint::attribute_equals("width", 5i64))
        .await?
        .is_empty());
    assert_eq!(
        matching(&catalog, FilterConstraint::attribute_equals("width", 7i64)).await?,
        vec![10]
    );

    products
        .store_entity(
            Entity::new("PRODUCT", 10)
                .with_version(4)
                .with_attribute(AttributeValue::new("code", "P-10"))
                .with_attribute(AttributeValue::new("width", 7i64).with_version(3).dropped()),
        )
        .await?;
    assert!(matching(&catalog, FilterConstraint::attribute_equals("width", 7i64))
        .await?
        .is_empty());
    assert_eq!(
        matching(
            &catalog,
            FilterConstraint::AttributeIsNull {
                name: "width".to_string()
            }
        )
        .await?,
        vec![10]
    );

    products
        .store_entity(
            Entity::new("PRODUCT", 10)
                .with_version(5)
                .with_attribute(AttributeValue::new("code", "P-10"))
                .with_attribute(AttributeValue::new("width", 9i64).with_version(4)),
        )
        .await?;
    assert_eq!(
        matching(&catalog, FilterConstraint::attribute_equals("width", 9i64)).await?,
        vec![10]
    );

    let stored = products
        .find_entity_by_primary_key(10)
        .await?
        .expect("stored entity");
    assert_eq!(stored.version, 5);
    assert_eq!(products.count_stored_entities().await?, 1);
    Ok(())
}

#[tokio::test]
async fn tombstones_hide_entities_until_reinserted() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    catalog.go_live(false).await?;
    let products = catalog.collection("PRODUCT")?;

    products
        .store_entity(
            Entity::new("PRODUCT", 5)
                .with_attribute(AttributeValue::new("code", "B"))
                .with_attribute(AttributeValue::new("width", 3i64)),
        )
        .await?;
    let mut tombstone = Entity::new("PRODUCT", 5).with_version(2);
    tombstone.dropped = true;
    products.store_entity(tombstone).await?;

    assert!(products.find_entity_by_primary_key(5).await?.is_none());
    assert_eq!(products.count_stored_entities().await?, 0);
    assert!(matching(&catalog, FilterConstraint::attribute_equals("width", 3i64))
        .await?
        .is_empty());

    // The dropped entity released its unique value.
    products
        .store_entity(Entity::new("PRODUCT", 6).with_attribute(AttributeValue::new("code", "B")))
        .await?;

    products
        .store_entity(
            Entity::new("PRODUCT", 5)
                .with_version(3)
                .with_attribute(AttributeValue::new("code", "C"))
                .with_attribute(AttributeValue::new("width", 4i64)),
        )
        .await?;
    let restored = products
        .find_entity_by_primary_key(5)
        .await?
        .expect("restored entity");
    assert_eq!(restored.version, 3);
    assert!(!restored.dropped);
    assert_eq!(
        matching(&catalog, FilterConstraint::attribute_equals("width", 4i64)).await?,
        vec![5]
    );
    assert_eq!(products.count_stored_entities().await?, 2);
    Ok(())
}

#[tokio::test]
async fn stale_writes_leave_tombstones_alone() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    catalog.go_live(false).await?;
    let products = catalog.collection("PRODUCT")?;

    products
        .store_entity(
            Entity::new("PRODUCT", 5)
                .with_attribute(AttributeValue::new("code", "B"))
                .with_attribute(AttributeValue::new("width", 3i64)),
        )
        .await?;
    let mut tombstone = Entity::new("PRODUCT", 5).with_version(2);
    tombstone.dropped = true;
    products.store_entity(tombstone).await?;

    // Replaying the first write neither revives nor re-indexes the entity.
    for version in [1, 2] {
        products
            .store_entity(
                Entity::new("PRODUCT", 5)
                    .with_version(version)
                    .with_attribute(AttributeValue::new("code", "B"))
                    .with_attribute(AttributeValue::new("width", 3i64)),
            )
            .await?;
    }
    assert!(products.find_entity_by_primary_key(5).await?.is_none());
    assert!(matching(&catalog, FilterConstraint::attribute_equals("width", 3i64))
        .await?
        .is_empty());

    products
        .store_entity(Entity::new("PRODUCT", 6).with_attribute(AttributeValue::new("code", "B")))
        .await?;
    assert_eq!(products.count_stored_entities().await?, 1);
    Ok(())
}

#[tokio::test]
async fn rejected_writes_do_not_place_hierarchy_items() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog
        .store_schema(
            EntitySchema::new("CATEGORY")
                .hierarchical()
                .with_attribute(AttributeSchema::new("code").unique()),
        )
        .await?;
    catalog.go_live(false).await?;
    let categories = catalog.collection("CATEGORY")?;

    categories
        .store_entity(
            Entity::new("CATEGORY", 1)
                .with_parent(None)
                .with_attribute(AttributeValue::new("code", "X")),
        )
        .await?;
    let err = categories
        .store_entity(
            Entity::new("CATEGORY", 2)
                .with_parent(Some(1))
                .with_attribute(AttributeValue::new("code", "X")),
        )
        .await
        .expect_err("duplicate code");
    assert!(matches!(
        err,
        VitrineError::UniqueValueViolation { primary_key: 1, .. }
    ));
    let index = catalog.hierarchies().require("CATEGORY")?;
    assert!(index.item("2")?.is_none());
    assert!(index.child_items("1")?.is_empty());

    // The rejected entity may land anywhere on its next attempt.
    categories
        .store_entity(
            Entity::new("CATEGORY", 2)
                .with_parent(None)
                .with_attribute(AttributeValue::new("code", "Y")),
        )
        .await?;
    let placed = index.item("2")?.expect("placed item");
    assert_eq!(placed.parent_code, None);
    assert_eq!(index.root_items()?.len(), 2);
    assert_eq!(categories.count_stored_entities().await?, 2);
    Ok(())
}

#[tokio::test]
async fn unique_values_name_their_owner() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    catalog.go_live(false).await?;
    let products = catalog.collection("PRODUCT")?;

    products
        .store_entity(Entity::new("PRODUCT", 1).with_attribute(AttributeValue::new("code", "A")))
        .await?;
    let stored = products
        .find_entity_by_primary_key(1)
        .await?
        .expect("stored entity");
    assert_eq!(
        stored.attribute("code", None).map(|attribute| &attribute.value),
        Some(&Value::from("A"))
    );
    let err = products
        .store_entity(Entity::new("PRODUCT", 2).with_attribute(AttributeValue::new("code", "A")))
        .await
        .expect_err("duplicate code");
    match err {
        VitrineError::UniqueValueViolation {
            attribute,
            value,
            primary_key,
        } => {
            assert_eq!(attribute, "code");
            assert_eq!(value, "A");
            assert_eq!(primary_key, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(products.find_entity_by_primary_key(2).await?.is_none());

    // Non-unique attributes may repeat.
    products
        .store_entity(
            Entity::new("PRODUCT", 3)
                .with_attribute(AttributeValue::new("code", "Z"))
                .with_attribute(AttributeValue::new("note", "A")),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn bulk_buffers_detect_duplicate_unique_values() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    let products = catalog.collection("PRODUCT")?;

    products
        .store_entity(Entity::new("PRODUCT", 1).with_attribute(AttributeValue::new("code", "A")))
        .await?;
    let err = products
        .store_entity(Entity::new("PRODUCT", 2).with_attribute(AttributeValue::new("code", "A")))
        .await
        .expect_err("duplicate code");
    assert!(matches!(
        err,
        VitrineError::UniqueValueViolation { primary_key: 1, .. }
    ));

    let err = products
        .store_entity(Entity::new("PRODUCT", 1).with_version(2))
        .await
        .expect_err("second write before flush");
    assert!(matches!(err, VitrineError::InvalidState { .. }));

    products.flush().await?;
    let err = products
        .store_entity(Entity::new("PRODUCT", 1).with_version(2))
        .await
        .expect_err("update in bulk mode");
    assert!(matches!(err, VitrineError::InvalidState { .. }));
    assert_eq!(products.count_stored_entities().await?, 1);
    Ok(())
}

#[tokio::test]
async fn bulk_mode_flushes_when_a_buffer_fills() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let mut config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    if let Some(write) = config.write.as_mut() {
        write.flush_threshold = Some(3);
    }
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(EntitySchema::new("PRODUCT")).await?;
    let products = catalog.collection("PRODUCT")?;

    for primary_key in 1..=6 {
        products
            .store_entity(Entity::new("PRODUCT", primary_key))
            .await?;
    }
    assert_eq!(products.count_stored_entities().await?, 6);
    assert_eq!(products.count_buffer_entities().await?, 0);

    products.store_entity(Entity::new("PRODUCT", 7)).await?;
    assert_eq!(products.count_stored_entities().await?, 6);
    assert_eq!(products.count_buffer_entities().await?, 1);

    products.flush().await?;
    assert_eq!(products.count_stored_entities().await?, 7);
    assert_eq!(products.count_buffer_entities().await?, 0);

    // Nothing buffered: flushing again is a no-op.
    products.flush().await?;
    assert_eq!(products.count_stored_entities().await?, 7);
    Ok(())
}

#[tokio::test]
async fn rejects_mismatched_types_and_unknown_collections() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;

    assert!(matches!(
        catalog.collection("BRAND"),
        Err(VitrineError::NotFound { .. })
    ));
    let products = catalog.collection("PRODUCT")?;
    let err = products
        .store_entity(Entity::new("BRAND", 1))
        .await
        .expect_err("wrong collection");
    assert!(matches!(err, VitrineError::Validation { .. }));
    let err = products
        .find_entities_by_request(&EntityRequest::new("BRAND"), None)
        .await
        .expect_err("wrong request type");
    assert!(matches!(err, VitrineError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn plain_requests_skip_the_baseline() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = VitrineConfig::default_sqlite(base.join("store.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog.store_schema(product_schema()).await?;
    let products = catalog.collection("PRODUCT")?;
    for primary_key in 1..=3i64 {
        products
            .store_entity(
                Entity::new("PRODUCT", primary_key)
                    .with_attribute(AttributeValue::new("width", primary_key)),
            )
            .await?;
    }
    products.flush().await?;

    let request = EntityRequest::new("PRODUCT")
        .with_user_filter(FilterConstraint::attribute_between("width", Some(2.0), None));
    assert!(!request.require.is_complex());
    let response = products.fetch_complex(&request).await?;
    assert_eq!(response.chunk, products.find_entities_by_request(&request, None).await?);
    assert_eq!(response.chunk.total_count, 2);
    assert!(response.facet_summary.is_none());
    assert!(response.attribute_histograms.is_empty());
    assert!(response.hierarchy_statistics.is_none());
    Ok(())
}
