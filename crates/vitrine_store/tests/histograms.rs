use vitrine_store::{
    AttributeHistogramRequest, AttributeSchema, AttributeValue, Catalog, CatalogApi,
    CollectionReadApi, CollectionWriteApi, Entity, EntityRequest, EntitySchema, FilterConstraint,
    Price, PriceQuery, VitrineConfig, VitrineError, VitrineResult,
};
use tempfile::tempdir;

/// Products 1..=5 with widths 10..=50 and prices 100..=500; product 5 is tall.
async fn seeded_catalog(base: &std::path::Path) -> VitrineResult<Catalog> {
    let config = VitrineConfig::default_sqlite(base.join("histograms.sqlite").to_string_lossy());
    let catalog = Catalog::open(&config, base).await?;
    catalog
        .store_schema(
            EntitySchema::new("PRODUCT")
                .with_prices()
                .with_attribute(AttributeSchema::new("width").filterable())
                .with_attribute(AttributeSchema::new("height").filterable())
                .with_attribute(AttributeSchema::new("note")),
        )
        .await?;
    let products = catalog.collection("PRODUCT")?;
    for primary_key in 1..=5i64 {
        let height = if primary_key == 5 { 2i64 } else { 1i64 };
        let amount = (primary_key * 100) as f64;
        products
            .store_entity(
                Entity::new("PRODUCT", primary_key)
                    .with_attribute(AttributeValue::new("width", primary_key * 10))
                    .with_attribute(AttributeValue::new("height", height))
                    .with_attribute(AttributeValue::new("note", primary_key))
                    .with_price(Price::new(primary_key, "basic", "CZK", amount, amount)),
            )
            .await?;
    }
    products.flush().await?;
    Ok(catalog)
}

fn width_histogram(request: EntityRequest, bucket_count: u16) -> EntityRequest {
    let mut request = request;
    request.require.attribute_histograms = Some(AttributeHistogramRequest {
        bucket_count,
        attributes: vec!["width".to_string()],
    });
    request
}

fn basic_prices() -> PriceQuery {
    PriceQuery {
        price_lists: vec!["basic".to_string()],
        currency: "CZK".to_string(),
        valid_at: None,
    }
}

#[tokio::test]
async fn attribute_histogram_splits_the_value_range() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let request = width_histogram(EntityRequest::new("PRODUCT"), 2);
    let response = catalog
        .collection("PRODUCT")?
        .fetch_complex(&request)
        .await?;
    let histogram = response
        .attribute_histograms
        .get("width")
        .expect("width histogram");
    assert_eq!(histogram.min, 10.0);
    assert_eq!(histogram.max, 50.0);
    assert_eq!(histogram.buckets.len(), 2);
    assert_eq!(histogram.buckets[0].threshold, 10.0);
    assert_eq!(histogram.buckets[0].occurrences, 2);
    assert_eq!(histogram.buckets[1].threshold, 30.0);
    assert_eq!(histogram.buckets[1].occurrences, 3);
    assert_eq!(histogram.overall_count, response.chunk.total_count);
    Ok(())
}

#[tokio::test]
async fn attribute_histogram_ignores_its_own_filter() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let products = catalog.collection("PRODUCT")?;

    let narrowed = width_histogram(
        EntityRequest::new("PRODUCT").with_user_filter(FilterConstraint::attribute_between(
            "width",
            Some(10.0),
            Some(20.0),
        )),
        2,
    );
    let response = products.fetch_complex(&narrowed).await?;
    assert_eq!(response.chunk.total_count, 2);
    let histogram = response
        .attribute_histograms
        .get("width")
        .expect("width histogram");
    assert_eq!(histogram.overall_count, 5);

    // Filters on other attributes still apply.
    let short = width_histogram(
        EntityRequest::new("PRODUCT")
            .with_user_filter(FilterConstraint::attribute_between(
                "width",
                Some(10.0),
                Some(20.0),
            ))
            .with_user_filter(FilterConstraint::attribute_equals("height", 1i64)),
        2,
    );
    let response = products.fetch_complex(&short).await?;
    let histogram = response
        .attribute_histograms
        .get("width")
        .expect("width histogram");
    assert_eq!(histogram.min, 10.0);
    assert_eq!(histogram.max, 40.0);
    assert_eq!(histogram.overall_count, 4);
    let occurrences = histogram
        .buckets
        .iter()
        .map(|bucket| bucket.occurrences)
        .collect::<Vec<_>>();
    assert_eq!(occurrences, vec![2, 2]);
    Ok(())
}

#[tokio::test]
async fn attribute_histogram_requires_filterable_attributes() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let mut request = EntityRequest::new("PRODUCT");
    request.require.attribute_histograms = Some(AttributeHistogramRequest {
        bucket_count: 4,
        attributes: vec!["note".to_string()],
    });
    let err = catalog
        .collection("PRODUCT")?
        .fetch_complex(&request)
        .await
        .expect_err("note is not filterable");
    assert!(matches!(err, VitrineError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn price_histogram_ignores_price_filters() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let products = catalog.collection("PRODUCT")?;

    let request = EntityRequest::new("PRODUCT")
        .with_price(basic_prices())
        .with_user_filter(FilterConstraint::PriceBetween {
            from: None,
            to: Some(250.0),
        });
    let context = products.open_context(&request).await?;
    let chunk = products
        .find_entities_by_request(&request, Some(&context))
        .await?;
    assert_eq!(chunk.total_count, 2);
    let histogram = products
        .compute_price_histogram(&context, &request, 4)
        .await?
        .expect("price histogram");
    context.release().await?;

    assert_eq!(histogram.min, 100.0);
    assert_eq!(histogram.max, 500.0);
    assert_eq!(histogram.overall_count, 5);
    let occurrences = histogram
        .buckets
        .iter()
        .map(|bucket| bucket.occurrences)
        .collect::<Vec<_>>();
    assert_eq!(occurrences, vec![1, 1, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn price_histogram_needs_a_price_query() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let products = catalog.collection("PRODUCT")?;
    let request = EntityRequest::new("PRODUCT");
    let context = products.open_context(&request).await?;
    let err = products
        .compute_price_histogram(&context, &request, 4)
        .await
        .expect_err("no price query");
    context.release().await?;
    assert!(matches!(err, VitrineError::Validation { .. }));
    Ok(())
}
