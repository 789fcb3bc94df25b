use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use vitrine_store::{
    Catalog, CatalogApi, CollectionReadApi, CollectionWriteApi, Entity, EntityRequest,
    EntitySchema, FacetGroupRef, FacetGroupRelations, FacetRelation, FacetStatisticsDepth,
    FacetSummary, FacetSummaryRequest, FilterConstraint, QueryConfig, Reference, ReferenceSchema,
    VitrineConfig, VitrineError, VitrineResult,
};
use tempfile::tempdir;

/// Products 1..=5 referencing brands: 1 {1}, 2 {1, 2}, 3 {2}, 4 {3}, 5 {}.
async fn seeded_catalog(base: &std::path::Path) -> VitrineResult<Catalog> {
    let mut config = VitrineConfig::default_sqlite(base.join("facets.sqlite").to_string_lossy());
    config.query = Some(QueryConfig {
        impact_batch_size: Some(2),
        baseline_owner: None,
    });
    let catalog = Catalog::open(&config, base).await?;
    catalog
        .store_schema(
            EntitySchema::new("PRODUCT").with_reference(ReferenceSchema::new("BRAND").faceted()),
        )
        .await?;
    let products = catalog.collection("PRODUCT")?;
    let brands: [(i64, &[i64]); 5] = [(1, &[1]), (2, &[1, 2]), (3, &[2]), (4, &[3]), (5, &[])];
    for (primary_key, referenced) in brands {
        let mut entity = Entity::new("PRODUCT", primary_key);
        for brand in referenced {
            entity = entity.with_reference(Reference::new("BRAND", *brand));
        }
        products.store_entity(entity).await?;
    }
    products.flush().await?;
    Ok(catalog)
}

async fn summary(
    catalog: &Catalog,
    selected: &[i64],
    groups: FacetGroupRelations,
    depth: FacetStatisticsDepth,
) -> VitrineResult<FacetSummary> {
    let mut request = EntityRequest::new("PRODUCT");
    if !selected.is_empty() {
        request = request.with_user_filter(FilterConstraint::facet("BRAND", selected.to_vec()));
    }
    request.require.facet_summary = Some(FacetSummaryRequest { depth, groups });
    let response = catalog
        .collection("PRODUCT")?
        .fetch_complex(&request)
        .await?;
    Ok(response.facet_summary.expect("facet summary"))
}

fn brand_group(relation: &str) -> FacetGroupRelations {
    let group = vec![FacetGroupRef::new("BRAND", None)];
    match relation {
        "and" => FacetGroupRelations {
            conjunction: group,
            ..FacetGroupRelations::default()
        },
        "not" => FacetGroupRelations {
            negation: group,
            ..FacetGroupRelations::default()
        },
        _ => FacetGroupRelations::default(),
    }
}

#[tokio::test]
async fn counts_without_selection_match_references() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let summary = summary(
        &catalog,
        &[],
        FacetGroupRelations::default(),
        FacetStatisticsDepth::Counts,
    )
    .await?;
    let brand = summary.group("BRAND", None).expect("brand group");
    assert_eq!(brand.relation, FacetRelation::Or);
    assert_eq!(brand.facets.len(), 3);
    assert_eq!(brand.facet(1).map(|stat| stat.count), Some(2));
    assert_eq!(brand.facet(2).map(|stat| stat.count), Some(2));
    assert_eq!(brand.facet(3).map(|stat| stat.count), Some(1));
    assert!(brand.facets.iter().all(|stat| !stat.requested));
    assert!(brand.facets.iter().all(|stat| stat.impact.is_none()));
    Ok(())
}

#[tokio::test]
async fn disjunctive_impact_never_shrinks_the_result() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let summary = summary(
        &catalog,
        &[1],
        brand_group("or"),
        FacetStatisticsDepth::Impact,
    )
    .await?;
    let brand = summary.group("BRAND", None).expect("brand group");
    let selected = brand.facet(1).expect("brand 1");
    assert!(selected.requested);
    assert_eq!(selected.count, 2);
    assert!(selected.impact.is_none());
    assert_eq!(brand.facet(2).map(|stat| stat.count), Some(1));
    assert_eq!(brand.facet(3).map(|stat| stat.count), Some(0));
    for facet in [2, 3] {
        let impact = brand
            .facet(facet)
            .and_then(|stat| stat.impact)
            .expect("impact");
        assert!(impact.difference >= 0);
        assert_eq!(impact.match_count, 3);
        assert_eq!(impact.difference, 1);
    }
    Ok(())
}

#[tokio::test]
async fn conjunctive_impact_narrows_the_result() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let summary = summary(
        &catalog,
        &[1],
        brand_group("and"),
        FacetStatisticsDepth::Impact,
    )
    .await?;
    let brand = summary.group("BRAND", None).expect("brand group");
    assert_eq!(brand.relation, FacetRelation::And);
    let both = brand
        .facet(2)
        .and_then(|stat| stat.impact)
        .expect("impact of brand 2");
    assert_eq!(both.match_count, 1);
    assert_eq!(both.difference, -1);
    let none = brand
        .facet(3)
        .and_then(|stat| stat.impact)
        .expect("impact of brand 3");
    assert_eq!(none.match_count, 0);
    assert_eq!(none.difference, -2);
    Ok(())
}

#[tokio::test]
async fn negated_groups_report_the_complement() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    let summary = summary(
        &catalog,
        &[1],
        brand_group("not"),
        FacetStatisticsDepth::Impact,
    )
    .await?;
    let brand = summary.group("BRAND", None).expect("brand group");
    assert_eq!(brand.relation, FacetRelation::Not);
    // Products 3, 4 and 5 remain; counts are the baseline size minus matches.
    assert_eq!(brand.facet(1).map(|stat| stat.count), Some(5));
    assert_eq!(brand.facet(2).map(|stat| stat.count), Some(4));
    assert_eq!(brand.facet(3).map(|stat| stat.count), Some(4));
    let excluded = brand
        .facet(2)
        .and_then(|stat| stat.impact)
        .expect("impact of brand 2");
    assert_eq!(excluded.match_count, 2);
    assert_eq!(excluded.difference, -1);

    let chunk = catalog
        .collection("PRODUCT")?
        .find_entities_by_request(
            &EntityRequest::new("PRODUCT").with_user_filter(FilterConstraint::Not(Box::new(
                FilterConstraint::facet("BRAND", vec![1]),
            ))),
            None,
        )
        .await?;
    assert_eq!(chunk.total_count, 3);
    Ok(())
}

#[tokio::test]
async fn dropped_references_leave_the_facet_index() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    catalog.go_live(false).await?;
    let products = catalog.collection("PRODUCT")?;
    let mut reference = Reference::new("BRAND", 3);
    reference.version = 2;
    reference.dropped = true;
    products
        .store_entity(Entity::new("PRODUCT", 4).with_version(2).with_reference(reference))
        .await?;
    let summary = summary(
        &catalog,
        &[],
        FacetGroupRelations::default(),
        FacetStatisticsDepth::Counts,
    )
    .await?;
    let brand = summary.group("BRAND", None).expect("brand group");
    assert!(brand.facet(3).is_none());
    assert_eq!(brand.facets.len(), 2);
    Ok(())
}

#[tokio::test]
async fn empty_flush_rebuilds_the_facet_index() -> VitrineResult<()> {
    let dir = tempdir().expect("tempdir");
    let catalog = seeded_catalog(dir.path()).await?;
    catalog
        .connection()
        .execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "DELETE FROM vitrine_facets",
        ))
        .await
        .map_err(VitrineError::from)?;
    let emptied = summary(
        &catalog,
        &[],
        FacetGroupRelations::default(),
        FacetStatisticsDepth::Counts,
    )
    .await?;
    assert!(emptied
        .group("BRAND", None)
        .is_none_or(|brand| brand.facets.iter().all(|stat| stat.count == 0)));

    let products = catalog.collection("PRODUCT")?;
    assert_eq!(products.count_buffer_entities().await?, 0);
    products.flush().await?;
    let rebuilt = summary(
        &catalog,
        &[],
        FacetGroupRelations::default(),
        FacetStatisticsDepth::Counts,
    )
    .await?;
    let brand = rebuilt.group("BRAND", None).expect("brand group");
    assert_eq!(brand.facet(1).map(|stat| stat.count), Some(2));
    assert_eq!(brand.facet(2).map(|stat| stat.count), Some(2));
    assert_eq!(brand.facet(3).map(|stat| stat.count), Some(1));
    Ok(())
}
