use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub localized: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.filterable || self.sortable || self.unique
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSchema {
    /// Referenced entity type; doubles as the reference type name.
    pub entity_type: String,
    pub group_type: Option<String>,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub faceted: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
}

impl ReferenceSchema {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            group_type: None,
            indexed: false,
            faceted: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn faceted(mut self) -> Self {
        self.faceted = true;
        self
    }

    pub fn grouped_by(mut self, group_type: impl Into<String>) -> Self {
        self.group_type = Some(group_type.into());
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed || self.faceted
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub with_prices: bool,
    #[serde(default)]
    pub locales: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceSchema>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hierarchical: false,
            with_prices: false,
            locales: BTreeSet::new(),
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn with_prices(mut self) -> Self {
        self.with_prices = true;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locales.insert(locale.into());
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    pub fn with_reference(mut self, reference: ReferenceSchema) -> Self {
        self.references
            .insert(reference.entity_type.clone(), reference);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    pub fn reference(&self, reference_type: &str) -> Option<&ReferenceSchema> {
        self.references.get(reference_type)
    }
}

/// Snapshot of every collection schema known to a catalog.
#[derive(Clone, Debug, Default)]
pub struct CatalogSchemas {
    schemas: HashMap<String, Arc<EntitySchema>>,
}

impl CatalogSchemas {
    pub fn new(schemas: HashMap<String, Arc<EntitySchema>>) -> Self {
        Self { schemas }
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<EntitySchema>> {
        self.schemas.get(entity_type)
    }

    pub fn is_hierarchical(&self, entity_type: &str) -> bool {
        self.schemas
            .get(entity_type)
            .is_some_and(|schema| schema.hierarchical)
    }
}
