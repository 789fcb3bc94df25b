//! Versioned synchronization of attribute, price and reference index rows.
//!
//! Incoming fields are compared against an [`ExistingSnapshot`] read back from
//! storage; only a strictly greater version touches an existing row. Decisions are
//! staged as [`RowWrite`]s and written by [`apply_writes`] inside one transaction.

use std::collections::HashMap;

use sea_orm::sea_query::{Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseTransaction, DbErr, QueryResult};

use crate::buffer::{
    AttributeRow, EntityRow, PlacementRow, PriceRow, ReferenceRow, RowWrite, UniqueKey, ValueRow,
    WriteBuffers,
};
use crate::db::*;
use crate::ids::SurrogateIdAllocator;
use crate::sql::{col_name, exec_db, query_all, query_one};
use vitrine_core::{
    AttributeKey, AttributeSchema, AttributeValue, EntitySchema, Price, PriceKey, Reference,
    ReferenceKey, ReferenceSchema, Value, VitrineError, VitrineResult,
};

const INSERT_CHUNK: usize = 100;

/// Id and version of a stored index row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ExistingRecord {
    pub id: i64,
    pub version: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldAction {
    Insert,
    Update(i64),
    Delete(i64),
    Skip,
}

/// Insert/update/delete decision for one incoming field.
pub(crate) fn decide(
    existing: Option<ExistingRecord>,
    version: u32,
    dropped: bool,
    indexed: bool,
) -> FieldAction {
    match existing {
        None if indexed && !dropped => FieldAction::Insert,
        None => FieldAction::Skip,
        Some(existing) if version > existing.version => {
            if dropped || !indexed {
                FieldAction::Delete(existing.id)
            } else {
                FieldAction::Update(existing.id)
            }
        }
        Some(_) => FieldAction::Skip,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ExistingEntity {
    pub entity_id: i64,
    pub version: u32,
    pub dropped: bool,
}

pub(crate) async fn existing_entity<C: ConnectionTrait>(
    conn: &C,
    entity_type: &str,
    primary_key: i64,
) -> VitrineResult<Option<ExistingEntity>> {
    let select = Query::select()
        .columns([
            VitrineEntities::EntityId,
            VitrineEntities::Version,
            VitrineEntities::Dropped,
        ])
        .from(VitrineEntities::Table)
        .and_where(Expr::col(VitrineEntities::EntityType).eq(entity_type))
        .and_where(Expr::col(VitrineEntities::PrimaryKey).eq(primary_key))
        .to_owned();
    let Some(row) = query_one(conn, &select).await? else {
        return Ok(None);
    };
    Ok(Some(ExistingEntity {
        entity_id: row.try_get("", &col_name(VitrineEntities::EntityId))?,
        version: read_version(&row, &col_name(VitrineEntities::Version))?,
        dropped: row.try_get("", &col_name(VitrineEntities::Dropped))?,
    }))
}

fn read_version(row: &QueryResult, column: &str) -> VitrineResult<u32> {
    let version: i64 = row.try_get("", column)?;
    u32::try_from(version)
        .map_err(|_| VitrineError::storage(format!("stored version {version} out of range")))
}

/// Index rows currently stored for one entity, keyed by natural key.
#[derive(Debug, Default)]
pub(crate) struct ExistingSnapshot {
    pub attributes: HashMap<AttributeKey, ExistingRecord>,
    pub prices: HashMap<PriceKey, ExistingRecord>,
    pub references: HashMap<ReferenceKey, ExistingRecord>,
    pub reference_attributes: HashMap<i64, HashMap<AttributeKey, ExistingRecord>>,
}

impl ExistingSnapshot {
    pub async fn load<C: ConnectionTrait>(conn: &C, entity_id: i64) -> VitrineResult<Self> {
        let mut snapshot = Self::default();

        let select = Query::select()
            .columns([
                VitrineAttributes::AttributeId,
                VitrineAttributes::ReferenceId,
                VitrineAttributes::Name,
                VitrineAttributes::Locale,
                VitrineAttributes::Version,
            ])
            .from(VitrineAttributes::Table)
            .and_where(Expr::col(VitrineAttributes::EntityId).eq(entity_id))
            .to_owned();
        for row in query_all(conn, &select).await? {
            let locale: String = row.try_get("", &col_name(VitrineAttributes::Locale))?;
            let key = AttributeKey {
                name: row.try_get("", &col_name(VitrineAttributes::Name))?,
                locale: (!locale.is_empty()).then_some(locale),
            };
            let record = ExistingRecord {
                id: row.try_get("", &col_name(VitrineAttributes::AttributeId))?,
                version: read_version(&row, &col_name(VitrineAttributes::Version))?,
            };
            let reference_id: Option<i64> =
                row.try_get("", &col_name(VitrineAttributes::ReferenceId))?;
            match reference_id {
                Some(reference_id) => {
                    snapshot
                        .reference_attributes
                        .entry(reference_id)
                        .or_default()
                        .insert(key, record);
                }
                None => {
                    snapshot.attributes.insert(key, record);
                }
            }
        }

        let select = Query::select()
            .columns([
                VitrinePrices::PriceRowId,
                VitrinePrices::PriceId,
                VitrinePrices::PriceList,
                VitrinePrices::Currency,
                VitrinePrices::Version,
            ])
            .from(VitrinePrices::Table)
            .and_where(Expr::col(VitrinePrices::EntityId).eq(entity_id))
            .to_owned();
        for row in query_all(conn, &select).await? {
            let key = PriceKey {
                price_id: row.try_get("", &col_name(VitrinePrices::PriceId))?,
                price_list: row.try_get("", &col_name(VitrinePrices::PriceList))?,
                currency: row.try_get("", &col_name(VitrinePrices::Currency))?,
            };
            snapshot.prices.insert(
                key,
                ExistingRecord {
                    id: row.try_get("", &col_name(VitrinePrices::PriceRowId))?,
                    version: read_version(&row, &col_name(VitrinePrices::Version))?,
                },
            );
        }

        let select = Query::select()
            .columns([
                VitrineReferences::ReferenceId,
                VitrineReferences::ReferenceType,
                VitrineReferences::ReferencedPk,
                VitrineReferences::Version,
            ])
            .from(VitrineReferences::Table)
            .and_where(Expr::col(VitrineReferences::EntityId).eq(entity_id))
            .to_owned();
        for row in query_all(conn, &select).await? {
            let key = ReferenceKey {
                reference_type: row.try_get("", &col_name(VitrineReferences::ReferenceType))?,
                referenced_primary_key: row
                    .try_get("", &col_name(VitrineReferences::ReferencedPk))?,
            };
            snapshot.references.insert(
                key,
                ExistingRecord {
                    id: row.try_get("", &col_name(VitrineReferences::ReferenceId))?,
                    version: read_version(&row, &col_name(VitrineReferences::Version))?,
                },
            );
        }
        Ok(snapshot)
    }
}

pub(crate) fn locale_column(locale: Option<&str>) -> String {
    locale.unwrap_or_default().to_string()
}

fn value_rows(value: &Value) -> Vec<ValueRow> {
    match value {
        Value::Range(range) => vec![ValueRow {
            value_text: None,
            value_number: None,
            range_from: range.from,
            range_to: range.to,
        }],
        other => other
            .scalars()
            .into_iter()
            .map(|scalar| ValueRow {
                value_text: Some(scalar.as_text()),
                value_number: scalar.as_number(),
                range_from: None,
                range_to: None,
            })
            .collect(),
    }
}

/// Stages index writes for one entity against its existing snapshot.
pub(crate) struct FieldUpsert<'a> {
    pub schema: &'a EntitySchema,
    pub ids: &'a SurrogateIdAllocator,
    pub staged: &'a mut WriteBuffers,
}

impl FieldUpsert<'_> {
    /// Attributes of the entity (`owner = None`) or of one of its references.
    pub async fn attributes(
        &mut self,
        entity_id: i64,
        owner: Option<(i64, &ReferenceSchema)>,
        incoming: &[AttributeValue],
        existing: Option<&HashMap<AttributeKey, ExistingRecord>>,
    ) -> VitrineResult<()> {
        let entity_schema = self.schema;
        for attribute in incoming {
            let schema: Option<&AttributeSchema> = match owner {
                Some((_, reference)) => reference.attributes.get(&attribute.key.name),
                None => entity_schema.attribute(&attribute.key.name),
            };
            let indexed = schema.is_some_and(AttributeSchema::is_indexed);
            let unique = owner.is_none() && schema.is_some_and(|schema| schema.unique);
            let current = existing.and_then(|existing| existing.get(&attribute.key).copied());
            let row = |attribute_id| AttributeRow {
                attribute_id,
                entity_id,
                reference_id: owner.map(|(reference_id, _)| reference_id),
                name: attribute.key.name.clone(),
                locale: locale_column(attribute.key.locale.as_deref()),
                version: attribute.version,
                unique_value: unique.then(|| attribute.value.unique_text()),
                values: value_rows(&attribute.value),
            };
            match decide(current, attribute.version, attribute.dropped, indexed) {
                FieldAction::Insert => {
                    let attribute_id = self.ids.next_attribute_id().await?;
                    self.staged.attributes.push(RowWrite::Insert(row(attribute_id)));
                }
                FieldAction::Update(id) => self.staged.attributes.push(RowWrite::Update(id, row(id))),
                FieldAction::Delete(id) => self.staged.attributes.push(RowWrite::Delete(id)),
                FieldAction::Skip => {}
            }
        }
        Ok(())
    }

    pub async fn prices(
        &mut self,
        entity_id: i64,
        incoming: &[Price],
        existing: Option<&HashMap<PriceKey, ExistingRecord>>,
    ) -> VitrineResult<()> {
        for price in incoming {
            let indexed = self.schema.with_prices && price.is_indexed();
            let current = existing.and_then(|existing| existing.get(&price.key()).copied());
            let row = |price_row_id| PriceRow {
                price_row_id,
                entity_id,
                price_id: price.price_id,
                price_list: price.price_list.clone(),
                currency: price.currency.clone(),
                version: price.version,
                inner_record_id: price.inner_record_id,
                price_without_tax: price.price_without_tax,
                price_with_tax: price.price_with_tax,
                valid_from: price.validity.and_then(|validity| validity.from),
                valid_to: price.validity.and_then(|validity| validity.to),
            };
            match decide(current, price.version, price.dropped, indexed) {
                FieldAction::Insert => {
                    let price_row_id = self.ids.next_price_row_id().await?;
                    self.staged.prices.push(RowWrite::Insert(row(price_row_id)));
                }
                FieldAction::Update(id) => self.staged.prices.push(RowWrite::Update(id, row(id))),
                FieldAction::Delete(id) => self.staged.prices.push(RowWrite::Delete(id)),
                FieldAction::Skip => {}
            }
        }
        Ok(())
    }

    /// Returns whether any reference row changed.
    pub async fn references(
        &mut self,
        entity_id: i64,
        incoming: &[Reference],
        existing: Option<&ExistingSnapshot>,
    ) -> VitrineResult<bool> {
        let entity_schema = self.schema;
        let mut changed = false;
        for reference in incoming {
            let schema = entity_schema.reference(&reference.reference_type);
            let indexed = schema.is_some_and(ReferenceSchema::is_indexed);
            let current =
                existing.and_then(|existing| existing.references.get(&reference.key()).copied());
            let row = |reference_id| ReferenceRow {
                reference_id,
                entity_id,
                reference_type: reference.reference_type.clone(),
                referenced_pk: reference.referenced_primary_key,
                group: reference.group.clone(),
                version: reference.version,
                faceted: schema.is_some_and(|schema| schema.faceted),
            };
            match (decide(current, reference.version, reference.dropped, indexed), schema) {
                (FieldAction::Insert, Some(schema)) => {
                    let reference_id = self.ids.next_reference_id().await?;
                    self.staged.references.push(RowWrite::Insert(row(reference_id)));
                    self.attributes(
                        entity_id,
                        Some((reference_id, schema)),
                        &reference.attributes,
                        None,
                    )
                    .await?;
                    changed = true;
                }
                (FieldAction::Update(id), Some(schema)) => {
                    self.staged.references.push(RowWrite::Update(id, row(id)));
                    let existing_attributes =
                        existing.and_then(|existing| existing.reference_attributes.get(&id));
                    self.attributes(
                        entity_id,
                        Some((id, schema)),
                        &reference.attributes,
                        existing_attributes,
                    )
                    .await?;
                    changed = true;
                }
                (FieldAction::Delete(id), _) => {
                    self.staged.references.push(RowWrite::Delete(id));
                    changed = true;
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    /// Removes every index row of a tombstoned entity. Returns whether references changed.
    pub fn drop_all(&mut self, existing: &ExistingSnapshot) -> bool {
        self.staged.attributes.extend(
            existing
                .attributes
                .values()
                .map(|record| RowWrite::Delete(record.id)),
        );
        self.staged.prices.extend(
            existing
                .prices
                .values()
                .map(|record| RowWrite::Delete(record.id)),
        );
        self.staged.references.extend(
            existing
                .references
                .values()
                .map(|record| RowWrite::Delete(record.id)),
        );
        !existing.references.is_empty()
    }
}

/// Primary key of the entity other than `except_entity` holding a unique value.
pub(crate) async fn unique_owner<C: ConnectionTrait>(
    conn: &C,
    collection: &str,
    key: &UniqueKey,
    except_entity: i64,
) -> VitrineResult<Option<i64>> {
    let select = Query::select()
        .column((VitrineEntities::Table, VitrineEntities::PrimaryKey))
        .from(VitrineAttributes::Table)
        .inner_join(
            VitrineEntities::Table,
            Expr::col((VitrineEntities::Table, VitrineEntities::EntityId))
                .equals((VitrineAttributes::Table, VitrineAttributes::EntityId)),
        )
        .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::Collection)).eq(collection))
        .and_where(Expr::col((VitrineAttributes::Table, VitrineAttributes::Name)).eq(key.name.as_str()))
        .and_where(
            Expr::col((VitrineAttributes::Table, VitrineAttributes::Locale)).eq(key.locale.as_str()),
        )
        .and_where(
            Expr::col((VitrineAttributes::Table, VitrineAttributes::UniqueValue))
                .eq(key.value.as_str()),
        )
        .and_where(
            Expr::col((VitrineAttributes::Table, VitrineAttributes::EntityId)).ne(except_entity),
        )
        .limit(1)
        .to_owned();
    let Some(row) = query_one(conn, &select).await? else {
        return Ok(None);
    };
    Ok(Some(row.try_get("", &col_name(VitrineEntities::PrimaryKey))?))
}

fn unique_key(row: &AttributeRow) -> Option<UniqueKey> {
    row.unique_value.as_ref().map(|value| UniqueKey {
        name: row.name.clone(),
        locale: row.locale.clone(),
        value: value.clone(),
    })
}

/// Rejects unique values of `staged` already claimed by another entity, then records them.
pub(crate) async fn claim_unique_values<C: ConnectionTrait>(
    conn: &C,
    collection: &str,
    primary_key: i64,
    entity_id: i64,
    staged: &mut WriteBuffers,
    buffered: &HashMap<UniqueKey, i64>,
) -> VitrineResult<()> {
    let keys = staged
        .attributes
        .iter()
        .filter_map(|write| match write {
            RowWrite::Insert(row) | RowWrite::Update(_, row) => unique_key(row),
            RowWrite::Delete(_) => None,
        })
        .collect::<Vec<_>>();
    for key in keys {
        let owner = match buffered.get(&key) {
            Some(owner) if *owner != primary_key => Some(*owner),
            _ => unique_owner(conn, collection, &key, entity_id).await?,
        };
        if let Some(owner) = owner {
            return Err(VitrineError::unique_violation(key.name, key.value, owner));
        }
        staged.unique_values.insert(key, primary_key);
    }
    Ok(())
}

/// Best-effort explanation of a unique constraint failure raised while flushing `writes`.
pub(crate) async fn explain_unique_failure<C: ConnectionTrait>(
    conn: &C,
    collection: &str,
    writes: &WriteBuffers,
) -> VitrineResult<VitrineError> {
    let mut claimed: HashMap<UniqueKey, i64> = HashMap::new();
    for write in &writes.attributes {
        let (RowWrite::Insert(row) | RowWrite::Update(_, row)) = write else {
            continue;
        };
        let Some(key) = unique_key(row) else {
            continue;
        };
        if let Some(owner) = unique_owner(conn, collection, &key, row.entity_id).await? {
            return Ok(VitrineError::unique_violation(key.name, key.value, owner));
        }
        match claimed.get(&key) {
            Some(earlier) if *earlier != row.entity_id => {
                let owner = writes.primary_key_of(*earlier).unwrap_or(*earlier);
                return Ok(VitrineError::unique_violation(key.name, key.value, owner));
            }
            _ => {
                claimed.insert(key, row.entity_id);
            }
        }
    }
    Ok(VitrineError::conflict(format!(
        "unique constraint violated while flushing `{collection}`"
    )))
}

/// Writes drained buffers of one collection. Errors stay raw so callers can
/// recognize constraint failures.
pub(crate) async fn apply_writes(
    tx: &DatabaseTransaction,
    entity_type: &str,
    writes: &WriteBuffers,
) -> Result<(), DbErr> {
    apply_entities(tx, entity_type, &writes.entities).await?;
    apply_references(tx, entity_type, &writes.references).await?;
    apply_attributes(tx, entity_type, &writes.attributes).await?;
    apply_prices(tx, entity_type, &writes.prices).await?;
    apply_placements(tx, entity_type, &writes.placements).await?;
    Ok(())
}

fn bounds(row: &EntityRow) -> (Option<i64>, Option<i64>, Option<i64>) {
    match row.bounds {
        Some((left, right, level)) => (Some(left), Some(right), Some(i64::from(level))),
        None => (None, None, None),
    }
}

async fn apply_entities(
    tx: &DatabaseTransaction,
    entity_type: &str,
    writes: &[RowWrite<EntityRow>],
) -> Result<(), DbErr> {
    let mut inserts = Vec::new();
    for write in writes {
        match write {
            RowWrite::Insert(row) => inserts.push(row),
            RowWrite::Update(entity_id, row) => {
                let (left, right, level) = bounds(row);
                let update = Query::update()
                    .table(VitrineEntities::Table)
                    .values([
                        (VitrineEntities::Version, i64::from(row.version).into()),
                        (VitrineEntities::Dropped, row.dropped.into()),
                        (VitrineEntities::LeftBound, left.into()),
                        (VitrineEntities::RightBound, right.into()),
                        (VitrineEntities::Level, level.into()),
                        (VitrineEntities::Locales, row.locales.clone().into()),
                        (VitrineEntities::Body, row.body.clone().into()),
                    ])
                    .and_where(Expr::col(VitrineEntities::EntityId).eq(*entity_id))
                    .to_owned();
                exec_db(tx, &update).await?;
            }
            RowWrite::Delete(entity_id) => {
                let delete = Query::delete()
                    .from_table(VitrineEntities::Table)
                    .and_where(Expr::col(VitrineEntities::EntityId).eq(*entity_id))
                    .to_owned();
                exec_db(tx, &delete).await?;
            }
        }
    }
    for chunk in inserts.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrineEntities::Table)
            .columns([
                VitrineEntities::EntityId,
                VitrineEntities::EntityType,
                VitrineEntities::PrimaryKey,
                VitrineEntities::Version,
                VitrineEntities::Dropped,
                VitrineEntities::LeftBound,
                VitrineEntities::RightBound,
                VitrineEntities::Level,
                VitrineEntities::Locales,
                VitrineEntities::Body,
            ])
            .to_owned();
        for row in chunk {
            let (left, right, level) = bounds(row);
            insert.values_panic([
                row.entity_id.into(),
                entity_type.into(),
                row.primary_key.into(),
                i64::from(row.version).into(),
                row.dropped.into(),
                left.into(),
                right.into(),
                level.into(),
                row.locales.clone().into(),
                row.body.clone().into(),
            ]);
        }
        exec_db(tx, &insert).await?;
    }
    Ok(())
}

async fn delete_attribute_values(tx: &DatabaseTransaction, attribute_id: i64) -> Result<(), DbErr> {
    let delete = Query::delete()
        .from_table(VitrineAttributeValues::Table)
        .and_where(Expr::col(VitrineAttributeValues::AttributeId).eq(attribute_id))
        .to_owned();
    exec_db(tx, &delete).await?;
    Ok(())
}

async fn insert_attribute_values(
    tx: &DatabaseTransaction,
    rows: &[&AttributeRow],
) -> Result<(), DbErr> {
    let values = rows
        .iter()
        .flat_map(|row| {
            row.values
                .iter()
                .enumerate()
                .map(move |(position, value)| (row.attribute_id, position as i64, value))
        })
        .collect::<Vec<_>>();
    for chunk in values.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrineAttributeValues::Table)
            .columns([
                VitrineAttributeValues::AttributeId,
                VitrineAttributeValues::Position,
                VitrineAttributeValues::ValueText,
                VitrineAttributeValues::ValueNumber,
                VitrineAttributeValues::RangeFrom,
                VitrineAttributeValues::RangeTo,
            ])
            .to_owned();
        for (attribute_id, position, value) in chunk {
            insert.values_panic([
                (*attribute_id).into(),
                (*position).into(),
                value.value_text.clone().into(),
                value.value_number.into(),
                value.range_from.into(),
                value.range_to.into(),
            ]);
        }
        exec_db(tx, &insert).await?;
    }
    Ok(())
}

async fn apply_attributes(
    tx: &DatabaseTransaction,
    collection: &str,
    writes: &[RowWrite<AttributeRow>],
) -> Result<(), DbErr> {
    let mut inserts = Vec::new();
    for write in writes {
        match write {
            RowWrite::Insert(row) => inserts.push(row),
            RowWrite::Update(attribute_id, row) => {
                let update = Query::update()
                    .table(VitrineAttributes::Table)
                    .values([
                        (VitrineAttributes::Version, i64::from(row.version).into()),
                        (VitrineAttributes::UniqueValue, row.unique_value.clone().into()),
                    ])
                    .and_where(Expr::col(VitrineAttributes::AttributeId).eq(*attribute_id))
                    .to_owned();
                exec_db(tx, &update).await?;
                delete_attribute_values(tx, *attribute_id).await?;
                insert_attribute_values(tx, &[row]).await?;
            }
            RowWrite::Delete(attribute_id) => {
                delete_attribute_values(tx, *attribute_id).await?;
                let delete = Query::delete()
                    .from_table(VitrineAttributes::Table)
                    .and_where(Expr::col(VitrineAttributes::AttributeId).eq(*attribute_id))
                    .to_owned();
                exec_db(tx, &delete).await?;
            }
        }
    }
    for chunk in inserts.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrineAttributes::Table)
            .columns([
                VitrineAttributes::AttributeId,
                VitrineAttributes::Collection,
                VitrineAttributes::EntityId,
                VitrineAttributes::ReferenceId,
                VitrineAttributes::Name,
                VitrineAttributes::Locale,
                VitrineAttributes::Version,
                VitrineAttributes::UniqueValue,
            ])
            .to_owned();
        for row in chunk {
            insert.values_panic([
                row.attribute_id.into(),
                collection.into(),
                row.entity_id.into(),
                row.reference_id.into(),
                row.name.clone().into(),
                row.locale.clone().into(),
                i64::from(row.version).into(),
                row.unique_value.clone().into(),
            ]);
        }
        exec_db(tx, &insert).await?;
        insert_attribute_values(tx, chunk).await?;
    }
    Ok(())
}

async fn apply_references(
    tx: &DatabaseTransaction,
    collection: &str,
    writes: &[RowWrite<ReferenceRow>],
) -> Result<(), DbErr> {
    let mut inserts = Vec::new();
    for write in writes {
        match write {
            RowWrite::Insert(row) => inserts.push(row),
            RowWrite::Update(reference_id, row) => {
                let update = Query::update()
                    .table(VitrineReferences::Table)
                    .values([
                        (
                            VitrineReferences::GroupType,
                            row.group.as_ref().map(|group| group.group_type.clone()).into(),
                        ),
                        (
                            VitrineReferences::GroupPk,
                            row.group.as_ref().map(|group| group.primary_key).into(),
                        ),
                        (VitrineReferences::Version, i64::from(row.version).into()),
                        (VitrineReferences::Faceted, row.faceted.into()),
                    ])
                    .and_where(Expr::col(VitrineReferences::ReferenceId).eq(*reference_id))
                    .to_owned();
                exec_db(tx, &update).await?;
            }
            RowWrite::Delete(reference_id) => {
                let owned = Query::select()
                    .column(VitrineAttributes::AttributeId)
                    .from(VitrineAttributes::Table)
                    .and_where(Expr::col(VitrineAttributes::ReferenceId).eq(*reference_id))
                    .to_owned();
                let delete_values = Query::delete()
                    .from_table(VitrineAttributeValues::Table)
                    .and_where(Expr::col(VitrineAttributeValues::AttributeId).in_subquery(owned))
                    .to_owned();
                exec_db(tx, &delete_values).await?;
                let delete_attributes = Query::delete()
                    .from_table(VitrineAttributes::Table)
                    .and_where(Expr::col(VitrineAttributes::ReferenceId).eq(*reference_id))
                    .to_owned();
                exec_db(tx, &delete_attributes).await?;
                let delete = Query::delete()
                    .from_table(VitrineReferences::Table)
                    .and_where(Expr::col(VitrineReferences::ReferenceId).eq(*reference_id))
                    .to_owned();
                exec_db(tx, &delete).await?;
            }
        }
    }
    for chunk in inserts.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrineReferences::Table)
            .columns([
                VitrineReferences::ReferenceId,
                VitrineReferences::Collection,
                VitrineReferences::EntityId,
                VitrineReferences::ReferenceType,
                VitrineReferences::ReferencedPk,
                VitrineReferences::GroupType,
                VitrineReferences::GroupPk,
                VitrineReferences::Version,
                VitrineReferences::Faceted,
            ])
            .to_owned();
        for row in chunk {
            insert.values_panic([
                row.reference_id.into(),
                collection.into(),
                row.entity_id.into(),
                row.reference_type.clone().into(),
                row.referenced_pk.into(),
                row.group.as_ref().map(|group| group.group_type.clone()).into(),
                row.group.as_ref().map(|group| group.primary_key).into(),
                i64::from(row.version).into(),
                row.faceted.into(),
            ]);
        }
        exec_db(tx, &insert).await?;
    }
    Ok(())
}

async fn apply_prices(
    tx: &DatabaseTransaction,
    collection: &str,
    writes: &[RowWrite<PriceRow>],
) -> Result<(), DbErr> {
    let mut inserts = Vec::new();
    for write in writes {
        match write {
            RowWrite::Insert(row) => inserts.push(row),
            RowWrite::Update(price_row_id, row) => {
                let update = Query::update()
                    .table(VitrinePrices::Table)
                    .values([
                        (VitrinePrices::Version, i64::from(row.version).into()),
                        (VitrinePrices::InnerRecordId, row.inner_record_id.into()),
                        (VitrinePrices::PriceWithoutTax, row.price_without_tax.into()),
                        (VitrinePrices::PriceWithTax, row.price_with_tax.into()),
                        (VitrinePrices::ValidFrom, row.valid_from.into()),
                        (VitrinePrices::ValidTo, row.valid_to.into()),
                    ])
                    .and_where(Expr::col(VitrinePrices::PriceRowId).eq(*price_row_id))
                    .to_owned();
                exec_db(tx, &update).await?;
            }
            RowWrite::Delete(price_row_id) => {
                let delete = Query::delete()
                    .from_table(VitrinePrices::Table)
                    .and_where(Expr::col(VitrinePrices::PriceRowId).eq(*price_row_id))
                    .to_owned();
                exec_db(tx, &delete).await?;
            }
        }
    }
    for chunk in inserts.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrinePrices::Table)
            .columns([
                VitrinePrices::PriceRowId,
                VitrinePrices::Collection,
                VitrinePrices::EntityId,
                VitrinePrices::PriceId,
                VitrinePrices::PriceList,
                VitrinePrices::Currency,
                VitrinePrices::Version,
                VitrinePrices::InnerRecordId,
                VitrinePrices::PriceWithoutTax,
                VitrinePrices::PriceWithTax,
                VitrinePrices::ValidFrom,
                VitrinePrices::ValidTo,
            ])
            .to_owned();
        for row in chunk {
            insert.values_panic([
                row.price_row_id.into(),
                collection.into(),
                row.entity_id.into(),
                row.price_id.into(),
                row.price_list.clone().into(),
                row.currency.clone().into(),
                i64::from(row.version).into(),
                row.inner_record_id.into(),
                row.price_without_tax.into(),
                row.price_with_tax.into(),
                row.valid_from.into(),
                row.valid_to.into(),
            ]);
        }
        exec_db(tx, &insert).await?;
    }
    Ok(())
}

async fn apply_placements(
    tx: &DatabaseTransaction,
    entity_type: &str,
    writes: &[RowWrite<PlacementRow>],
) -> Result<(), DbErr> {
    let mut inserts = Vec::new();
    for write in writes {
        match write {
            RowWrite::Insert(row) => inserts.push(row),
            RowWrite::Update(..) => {
                return Err(DbErr::Custom(
                    "hierarchy placements are rewritten, never updated".to_string(),
                ));
            }
            RowWrite::Delete(entity_id) => {
                let delete = Query::delete()
                    .from_table(VitrineHierarchyPlacements::Table)
                    .and_where(Expr::col(VitrineHierarchyPlacements::EntityId).eq(*entity_id))
                    .and_where(
                        Expr::col(VitrineHierarchyPlacements::HierarchyType).ne(entity_type),
                    )
                    .to_owned();
                exec_db(tx, &delete).await?;
            }
        }
    }
    for chunk in inserts.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert()
            .into_table(VitrineHierarchyPlacements::Table)
            .columns([
                VitrineHierarchyPlacements::EntityId,
                VitrineHierarchyPlacements::HierarchyType,
                VitrineHierarchyPlacements::NodeCode,
                VitrineHierarchyPlacements::ParentCode,
                VitrineHierarchyPlacements::LeftBound,
                VitrineHierarchyPlacements::RightBound,
                VitrineHierarchyPlacements::Level,
            ])
            .to_owned();
        for row in chunk {
            insert.values_panic([
                row.entity_id.into(),
                row.hierarchy_type.clone().into(),
                row.node_code.clone().into(),
                row.parent_code.clone().into(),
                row.left_bound.into(),
                row.right_bound.into(),
                i64::from(row.level).into(),
            ]);
        }
        exec_db(tx, &insert).await?;
    }
    Ok(())
}
