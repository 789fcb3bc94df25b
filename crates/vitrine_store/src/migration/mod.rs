use sea_orm_migration::prelude::*;

use crate::db::*;

mod m20250301_000001_init;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250301_000001_init::Migration)]
    }
}

/// Lookup indexes built when a catalog goes live; bulk loads run without them.
pub(crate) fn secondary_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("ix_vitrine_placements_bounds")
            .table(VitrineHierarchyPlacements::Table)
            .col(VitrineHierarchyPlacements::HierarchyType)
            .col(VitrineHierarchyPlacements::LeftBound)
            .col(VitrineHierarchyPlacements::RightBound)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_attributes_entity")
            .table(VitrineAttributes::Table)
            .col(VitrineAttributes::EntityId)
            .col(VitrineAttributes::ReferenceId)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_attributes_name")
            .table(VitrineAttributes::Table)
            .col(VitrineAttributes::Collection)
            .col(VitrineAttributes::Name)
            .col(VitrineAttributes::Locale)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_attribute_values_number")
            .table(VitrineAttributeValues::Table)
            .col(VitrineAttributeValues::ValueNumber)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_prices_lookup")
            .table(VitrinePrices::Table)
            .col(VitrinePrices::Collection)
            .col(VitrinePrices::Currency)
            .col(VitrinePrices::PriceList)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_references_target")
            .table(VitrineReferences::Table)
            .col(VitrineReferences::Collection)
            .col(VitrineReferences::ReferenceType)
            .col(VitrineReferences::ReferencedPk)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_facets_lookup")
            .table(VitrineFacets::Table)
            .col(VitrineFacets::Collection)
            .col(VitrineFacets::ReferenceType)
            .col(VitrineFacets::FacetPk)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("ix_vitrine_facets_entity")
            .table(VitrineFacets::Table)
            .col(VitrineFacets::EntityId)
            .if_not_exists()
            .to_owned(),
    ]
}
