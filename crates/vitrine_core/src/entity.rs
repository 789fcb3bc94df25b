use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
}

impl Scalar {
    /// Numeric projection used by range filters and histograms.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Integer(value) => Some(*value as f64),
            Scalar::Decimal(value) => Some(*value),
            Scalar::Boolean(value) => Some(if *value { 1.0 } else { 0.0 }),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Scalar::Text(value) => value.clone(),
            Scalar::Integer(value) => value.to_string(),
            Scalar::Decimal(value) => value.to_string(),
            Scalar::Boolean(value) => value.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Decimal(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub from: Option<f64>,
    pub to: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(Scalar),
    Array(Vec<Scalar>),
    Range(NumberRange),
}

impl Value {
    pub fn scalars(&self) -> Vec<&Scalar> {
        match self {
            Value::Scalar(scalar) => vec![scalar],
            Value::Array(values) => values.iter().collect(),
            Value::Range(_) => Vec::new(),
        }
    }

    /// Canonical text used by unique constraints.
    pub fn unique_text(&self) -> String {
        match self {
            Value::Scalar(scalar) => scalar.as_text(),
            Value::Array(values) => values
                .iter()
                .map(Scalar::as_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Range(range) => format!(
                "[{},{}]",
                range.from.map(|v| v.to_string()).unwrap_or_default(),
                range.to.map(|v| v.to_string()).unwrap_or_default()
            ),
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

macro_rules! scalar_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_value_from!(&str, String, i64, f64, bool);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeKey {
    pub name: String,
    pub locale: Option<String>,
}

impl AttributeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: None,
        }
    }

    pub fn localized(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: Some(locale.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub key: AttributeKey,
    pub version: u32,
    pub dropped: bool,
    pub value: Value,
}

impl AttributeValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: AttributeKey::new(name),
            version: 1,
            dropped: false,
            value: value.into(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.key.locale = Some(locale.into());
        self
    }

    pub fn dropped(mut self) -> Self {
        self.dropped = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceKey {
    pub price_id: i64,
    pub price_list: String,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub price_id: i64,
    pub price_list: String,
    pub currency: String,
    pub version: u32,
    pub dropped: bool,
    pub sellable: bool,
    pub inner_record_id: Option<i64>,
    pub price_without_tax: f64,
    pub price_with_tax: f64,
    pub validity: Option<Validity>,
}

impl Price {
    pub fn new(
        price_id: i64,
        price_list: impl Into<String>,
        currency: impl Into<String>,
        price_without_tax: f64,
        price_with_tax: f64,
    ) -> Self {
        Self {
            price_id,
            price_list: price_list.into(),
            currency: currency.into(),
            version: 1,
            dropped: false,
            sellable: true,
            inner_record_id: None,
            price_without_tax,
            price_with_tax,
            validity: None,
        }
    }

    pub fn key(&self) -> PriceKey {
        PriceKey {
            price_id: self.price_id,
            price_list: self.price_list.clone(),
            currency: self.currency.clone(),
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.sellable && !self.dropped
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReference {
    pub group_type: String,
    pub primary_key: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReferenceKey {
    pub reference_type: String,
    pub referenced_primary_key: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: String,
    pub referenced_primary_key: i64,
    pub version: u32,
    pub dropped: bool,
    pub group: Option<GroupReference>,
    pub attributes: Vec<AttributeValue>,
}

impl Reference {
    pub fn new(reference_type: impl Into<String>, referenced_primary_key: i64) -> Self {
        Self {
            reference_type: reference_type.into(),
            referenced_primary_key,
            version: 1,
            dropped: false,
            group: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_group(mut self, group_type: impl Into<String>, primary_key: i64) -> Self {
        self.group = Some(GroupReference {
            group_type: group_type.into(),
            primary_key,
        });
        self
    }

    pub fn key(&self) -> ReferenceKey {
        ReferenceKey {
            reference_type: self.reference_type.clone(),
            referenced_primary_key: self.referenced_primary_key,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyPlacement {
    /// `None` places the entity among the hierarchy roots.
    pub parent: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    pub primary_key: i64,
    pub version: u32,
    pub dropped: bool,
    pub locales: BTreeSet<String>,
    pub hierarchy: Option<HierarchyPlacement>,
    pub attributes: Vec<AttributeValue>,
    pub prices: Vec<Price>,
    pub references: Vec<Reference>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, primary_key: i64) -> Self {
        Self {
            entity_type: entity_type.into(),
            primary_key,
            version: 1,
            dropped: false,
            locales: BTreeSet::new(),
            hierarchy: None,
            attributes: Vec::new(),
            prices: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_attribute(mut self, attribute: AttributeValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_price(mut self, price: Price) -> Self {
        self.prices.push(price);
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_parent(mut self, parent: Option<i64>) -> Self {
        self.hierarchy = Some(HierarchyPlacement { parent });
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locales.insert(locale.into());
        self
    }

    pub fn attribute(&self, name: &str, locale: Option<&str>) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attr| attr.key.name == name && attr.key.locale.as_deref() == locale)
    }
}
