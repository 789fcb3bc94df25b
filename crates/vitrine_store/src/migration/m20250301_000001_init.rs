use sea_orm_migration::prelude::*;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VitrineEntities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineEntities::EntityId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineEntities::EntityType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineEntities::PrimaryKey)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineEntities::Version).big_integer().not_null())
                    .col(
                        ColumnDef::new(VitrineEntities::Dropped)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineEntities::LeftBound).big_integer())
                    .col(ColumnDef::new(VitrineEntities::RightBound).big_integer())
                    .col(ColumnDef::new(VitrineEntities::Level).big_integer())
                    .col(ColumnDef::new(VitrineEntities::Locales).text().not_null())
                    .col(ColumnDef::new(VitrineEntities::Body).blob().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_vitrine_entities_type_pk")
                    .table(VitrineEntities::Table)
                    .col(VitrineEntities::EntityType)
                    .col(VitrineEntities::PrimaryKey)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineHierarchyPlacements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::HierarchyType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::NodeCode)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineHierarchyPlacements::ParentCode).string())
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::LeftBound)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::RightBound)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineHierarchyPlacements::Level)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vitrine_hierarchy_placements")
                            .col(VitrineHierarchyPlacements::EntityId)
                            .col(VitrineHierarchyPlacements::HierarchyType)
                            .col(VitrineHierarchyPlacements::NodeCode),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineAttributes::AttributeId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineAttributes::Collection)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineAttributes::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineAttributes::ReferenceId).big_integer())
                    .col(ColumnDef::new(VitrineAttributes::Name).string().not_null())
                    .col(ColumnDef::new(VitrineAttributes::Locale).string().not_null())
                    .col(
                        ColumnDef::new(VitrineAttributes::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineAttributes::UniqueValue).text())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_vitrine_attributes_unique_value")
                    .table(VitrineAttributes::Table)
                    .col(VitrineAttributes::Collection)
                    .col(VitrineAttributes::Name)
                    .col(VitrineAttributes::Locale)
                    .col(VitrineAttributes::UniqueValue)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineAttributeValues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineAttributeValues::AttributeId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineAttributeValues::Position)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineAttributeValues::ValueText).text())
                    .col(ColumnDef::new(VitrineAttributeValues::ValueNumber).double())
                    .col(ColumnDef::new(VitrineAttributeValues::RangeFrom).double())
                    .col(ColumnDef::new(VitrineAttributeValues::RangeTo).double())
                    .primary_key(
                        Index::create()
                            .name("pk_vitrine_attribute_values")
                            .col(VitrineAttributeValues::AttributeId)
                            .col(VitrineAttributeValues::Position),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrinePrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrinePrices::PriceRowId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VitrinePrices::Collection).string().not_null())
                    .col(
                        ColumnDef::new(VitrinePrices::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrinePrices::PriceId).big_integer().not_null())
                    .col(ColumnDef::new(VitrinePrices::PriceList).string().not_null())
                    .col(ColumnDef::new(VitrinePrices::Currency).string().not_null())
                    .col(ColumnDef::new(VitrinePrices::Version).big_integer().not_null())
                    .col(ColumnDef::new(VitrinePrices::InnerRecordId).big_integer())
                    .col(
                        ColumnDef::new(VitrinePrices::PriceWithoutTax)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrinePrices::PriceWithTax)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrinePrices::ValidFrom).big_integer())
                    .col(ColumnDef::new(VitrinePrices::ValidTo).big_integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_vitrine_prices_key")
                    .table(VitrinePrices::Table)
                    .col(VitrinePrices::EntityId)
                    .col(VitrinePrices::PriceId)
                    .col(VitrinePrices::PriceList)
                    .col(VitrinePrices::Currency)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineReferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineReferences::ReferenceId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineReferences::Collection)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineReferences::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineReferences::ReferenceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineReferences::ReferencedPk)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineReferences::GroupType).string())
                    .col(ColumnDef::new(VitrineReferences::GroupPk).big_integer())
                    .col(
                        ColumnDef::new(VitrineReferences::Version)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineReferences::Faceted)
                            .boolean()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_vitrine_references_key")
                    .table(VitrineReferences::Table)
                    .col(VitrineReferences::EntityId)
                    .col(VitrineReferences::ReferenceType)
                    .col(VitrineReferences::ReferencedPk)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineFacets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(VitrineFacets::Collection).string().not_null())
                    .col(
                        ColumnDef::new(VitrineFacets::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineFacets::ReferenceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineFacets::FacetPk)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VitrineFacets::GroupPk).big_integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineSequences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineSequences::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineSequences::NextValue)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineSchemas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineSchemas::EntityType)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VitrineSchemas::SchemaJson).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineSerializationHeaders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineSerializationHeaders::EntityType)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineSerializationHeaders::Header)
                            .blob()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineCatalogState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineCatalogState::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VitrineCatalogState::Live)
                            .boolean()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VitrineBaselineResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VitrineBaselineResults::ResultName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineBaselineResults::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VitrineBaselineResults::Owner)
                            .string()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vitrine_baseline_results")
                            .col(VitrineBaselineResults::ResultName)
                            .col(VitrineBaselineResults::EntityId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            VitrineBaselineResults::Table.into_iden(),
            VitrineCatalogState::Table.into_iden(),
            VitrineSerializationHeaders::Table.into_iden(),
            VitrineSchemas::Table.into_iden(),
            VitrineSequences::Table.into_iden(),
            VitrineFacets::Table.into_iden(),
            VitrineReferences::Table.into_iden(),
            VitrinePrices::Table.into_iden(),
            VitrineAttributeValues::Table.into_iden(),
            VitrineAttributes::Table.into_iden(),
            VitrineHierarchyPlacements::Table.into_iden(),
            VitrineEntities::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
