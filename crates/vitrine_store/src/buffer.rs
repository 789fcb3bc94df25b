use std::collections::HashMap;

use vitrine_core::GroupReference;

/// Pending change of one index row. Updates and deletes carry the row id.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RowWrite<T> {
    Insert(T),
    Update(i64, T),
    Delete(i64),
}

impl<T> RowWrite<T> {
    fn rank(&self) -> u8 {
        match self {
            RowWrite::Delete(_) => 0,
            RowWrite::Update(..) => 1,
            RowWrite::Insert(_) => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EntityRow {
    pub entity_id: i64,
    pub primary_key: i64,
    pub version: u32,
    pub dropped: bool,
    pub bounds: Option<(i64, i64, u16)>,
    pub locales: String,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PlacementRow {
    pub entity_id: i64,
    pub hierarchy_type: String,
    pub node_code: String,
    pub parent_code: Option<String>,
    pub left_bound: i64,
    pub right_bound: i64,
    pub level: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ReferenceRow {
    pub reference_id: i64,
    pub entity_id: i64,
    pub reference_type: String,
    pub referenced_pk: i64,
    pub group: Option<GroupReference>,
    pub version: u32,
    pub faceted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ValueRow {
    pub value_text: Option<String>,
    pub value_number: Option<f64>,
    pub range_from: Option<f64>,
    pub range_to: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AttributeRow {
    pub attribute_id: i64,
    pub entity_id: i64,
    pub reference_id: Option<i64>,
    pub name: String,
    /// Empty for attributes without a locale.
    pub locale: String,
    pub version: u32,
    pub unique_value: Option<String>,
    pub values: Vec<ValueRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PriceRow {
    pub price_row_id: i64,
    pub entity_id: i64,
    pub price_id: i64,
    pub price_list: String,
    pub currency: String,
    pub version: u32,
    pub inner_record_id: Option<i64>,
    pub price_without_tax: f64,
    pub price_with_tax: f64,
    pub valid_from: Option<i64>,
    pub valid_to: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct UniqueKey {
    pub name: String,
    pub locale: String,
    pub value: String,
}

/// Per-target append buffers of one collection.
///
/// `placements` deletes are keyed by entity id and clear every borrowed placement
/// of that entity; own placements are written once and never rewritten.
#[derive(Debug, Default)]
pub(crate) struct WriteBuffers {
    pub entities: Vec<RowWrite<EntityRow>>,
    pub placements: Vec<RowWrite<PlacementRow>>,
    pub references: Vec<RowWrite<ReferenceRow>>,
    pub attributes: Vec<RowWrite<AttributeRow>>,
    pub prices: Vec<RowWrite<PriceRow>>,
    /// Primary key to surrogate id of every entity written since the last flush.
    pub keys: HashMap<i64, i64>,
    /// Unique values claimed since the last flush, with the claiming primary key.
    pub unique_values: HashMap<UniqueKey, i64>,
    pub references_changed: bool,
    /// Hierarchy items placed since the last flush, in creation order.
    pub created_nodes: Vec<String>,
}

impl WriteBuffers {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.placements.is_empty()
            && self.references.is_empty()
            && self.attributes.is_empty()
            && self.prices.is_empty()
    }

    /// Whether any single target holds at least `threshold` pending rows.
    pub fn is_full(&self, threshold: usize) -> bool {
        [
            self.entities.len(),
            self.placements.len(),
            self.references.len(),
            self.attributes.len(),
            self.prices.len(),
        ]
        .into_iter()
        .any(|len| len >= threshold)
    }

    pub fn buffered_entities(&self) -> usize {
        self.entities
            .iter()
            .filter(|write| matches!(write, RowWrite::Insert(_)))
            .count()
    }

    /// Moves everything staged by one call into these buffers.
    pub fn absorb(&mut self, staged: WriteBuffers) {
        self.entities.extend(staged.entities);
        self.placements.extend(staged.placements);
        self.references.extend(staged.references);
        self.attributes.extend(staged.attributes);
        self.prices.extend(staged.prices);
        self.keys.extend(staged.keys);
        self.unique_values.extend(staged.unique_values);
        self.references_changed |= staged.references_changed;
        self.created_nodes.extend(staged.created_nodes);
    }

    /// Drains the buffers, each target ordered deletes first, then updates, then inserts.
    pub fn drain(&mut self) -> WriteBuffers {
        let mut drained = std::mem::take(self);
        drained.entities.sort_by_key(RowWrite::rank);
        drained.placements.sort_by_key(RowWrite::rank);
        drained.references.sort_by_key(RowWrite::rank);
        drained.attributes.sort_by_key(RowWrite::rank);
        drained.prices.sort_by_key(RowWrite::rank);
        drained
    }

    pub fn primary_key_of(&self, entity_id: i64) -> Option<i64> {
        self.keys
            .iter()
            .find(|(_, id)| **id == entity_id)
            .map(|(primary_key, _)| *primary_key)
    }
}
