use sea_orm::DeriveIden;

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineEntities {
    Table,
    EntityId,
    EntityType,
    PrimaryKey,
    Version,
    Dropped,
    LeftBound,
    RightBound,
    Level,
    Locales,
    Body,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineHierarchyPlacements {
    Table,
    EntityId,
    HierarchyType,
    NodeCode,
    ParentCode,
    LeftBound,
    RightBound,
    Level,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineAttributes {
    Table,
    AttributeId,
    Collection,
    EntityId,
    ReferenceId,
    Name,
    Locale,
    Version,
    UniqueValue,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineAttributeValues {
    Table,
    AttributeId,
    Position,
    ValueText,
    ValueNumber,
    RangeFrom,
    RangeTo,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrinePrices {
    Table,
    PriceRowId,
    Collection,
    EntityId,
    PriceId,
    PriceList,
    Currency,
    Version,
    InnerRecordId,
    PriceWithoutTax,
    PriceWithTax,
    ValidFrom,
    ValidTo,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineReferences {
    Table,
    ReferenceId,
    Collection,
    EntityId,
    ReferenceType,
    ReferencedPk,
    GroupType,
    GroupPk,
    Version,
    Faceted,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineFacets {
    Table,
    Collection,
    EntityId,
    ReferenceType,
    FacetPk,
    GroupPk,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineSequences {
    Table,
    Name,
    NextValue,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineSchemas {
    Table,
    EntityType,
    SchemaJson,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineSerializationHeaders {
    Table,
    EntityType,
    Header,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineCatalogState {
    Table,
    Name,
    Live,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum VitrineBaselineResults {
    Table,
    ResultName,
    EntityId,
    Owner,
}
