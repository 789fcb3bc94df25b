use serde::{Deserialize, Serialize};

use crate::Scalar;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterConstraint {
    And(Vec<FilterConstraint>),
    Or(Vec<FilterConstraint>),
    Not(Box<FilterConstraint>),
    PrimaryKeyIn(Vec<i64>),
    AttributeEquals {
        name: String,
        value: Scalar,
    },
    AttributeInSet {
        name: String,
        values: Vec<Scalar>,
    },
    AttributeBetween {
        name: String,
        from: Option<f64>,
        to: Option<f64>,
    },
    AttributeIsNull {
        name: String,
    },
    PriceBetween {
        from: Option<f64>,
        to: Option<f64>,
    },
    Facet {
        reference_type: String,
        ids: Vec<i64>,
    },
    ReferenceHaving {
        reference_type: String,
        ids: Vec<i64>,
    },
    HierarchyWithin {
        hierarchy_type: String,
        parent: i64,
        excluding_parent: bool,
    },
    HierarchyWithinRoot {
        hierarchy_type: String,
    },
}

impl FilterConstraint {
    pub fn attribute_equals(name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::AttributeEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn attribute_between(name: impl Into<String>, from: Option<f64>, to: Option<f64>) -> Self {
        Self::AttributeBetween {
            name: name.into(),
            from,
            to,
        }
    }

    pub fn facet(reference_type: impl Into<String>, ids: Vec<i64>) -> Self {
        Self::Facet {
            reference_type: reference_type.into(),
            ids,
        }
    }

    /// Attribute this constraint targets directly, if any.
    pub fn target_attribute(&self) -> Option<&str> {
        match self {
            FilterConstraint::AttributeEquals { name, .. }
            | FilterConstraint::AttributeInSet { name, .. }
            | FilterConstraint::AttributeBetween { name, .. }
            | FilterConstraint::AttributeIsNull { name } => Some(name),
            _ => None,
        }
    }

    /// Copy of the tree without the nodes matching `exclude`; emptied containers vanish.
    pub fn without(&self, exclude: &dyn Fn(&FilterConstraint) -> bool) -> Option<Self> {
        if exclude(self) {
            return None;
        }
        match self {
            FilterConstraint::And(children) => {
                let kept = strip_constraints(children, exclude);
                (!kept.is_empty()).then_some(FilterConstraint::And(kept))
            }
            FilterConstraint::Or(children) => {
                let kept = strip_constraints(children, exclude);
                (!kept.is_empty()).then_some(FilterConstraint::Or(kept))
            }
            FilterConstraint::Not(inner) => inner
                .without(exclude)
                .map(|inner| FilterConstraint::Not(Box::new(inner))),
            other => Some(other.clone()),
        }
    }
}

pub fn strip_constraints(
    constraints: &[FilterConstraint],
    exclude: &dyn Fn(&FilterConstraint) -> bool,
) -> Vec<FilterConstraint> {
    constraints
        .iter()
        .filter_map(|constraint| constraint.without(exclude))
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBy {
    pub baseline: Vec<FilterConstraint>,
    pub user_filter: Vec<FilterConstraint>,
}

impl FilterBy {
    /// Top-level facet selections of the user filter, in declaration order.
    pub fn selected_facets(&self) -> Vec<(&str, &[i64])> {
        self.user_filter
            .iter()
            .filter_map(|constraint| match constraint {
                FilterConstraint::Facet {
                    reference_type,
                    ids,
                } => Some((reference_type.as_str(), ids.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// User filter constraints other than top-level facet selections.
    pub fn user_filter_without_facets(&self) -> Vec<FilterConstraint> {
        self.user_filter
            .iter()
            .filter(|constraint| !matches!(constraint, FilterConstraint::Facet { .. }))
            .cloned()
            .collect()
    }

    pub fn user_filter_without_attribute(&self, attribute: &str) -> Vec<FilterConstraint> {
        strip_constraints(&self.user_filter, &|constraint| {
            constraint.target_attribute() == Some(attribute)
        })
    }

    pub fn user_filter_without_price(&self) -> Vec<FilterConstraint> {
        strip_constraints(&self.user_filter, &|constraint| {
            matches!(constraint, FilterConstraint::PriceBetween { .. })
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceQuery {
    /// Price lists in priority order; the first one holding a price wins.
    pub price_lists: Vec<String>,
    pub currency: String,
    pub valid_at: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: 20,
        }
    }
}

impl Page {
    pub fn offset(&self) -> u64 {
        u64::from(self.number.saturating_sub(1)) * u64::from(self.size)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetStatisticsDepth {
    #[default]
    Counts,
    Impact,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacetGroupRef {
    pub reference_type: String,
    pub group: Option<i64>,
}

impl FacetGroupRef {
    pub fn new(reference_type: impl Into<String>, group: Option<i64>) -> Self {
        Self {
            reference_type: reference_type.into(),
            group,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetGroupRelations {
    /// Facets inside these groups must all be present.
    pub conjunction: Vec<FacetGroupRef>,
    /// These groups are OR-ed with the rest of the facet filter.
    pub disjunction: Vec<FacetGroupRef>,
    /// Facets inside these groups must all be absent.
    pub negation: Vec<FacetGroupRef>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetSummaryRequest {
    pub depth: FacetStatisticsDepth,
    pub groups: FacetGroupRelations,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeHistogramRequest {
    pub bucket_count: u16,
    pub attributes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParentsRequest {
    pub hierarchy_type: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyStatisticsRequest {
    pub hierarchy_type: String,
    pub root: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Require {
    pub facet_summary: Option<FacetSummaryRequest>,
    pub attribute_histograms: Option<AttributeHistogramRequest>,
    pub price_histogram: Option<u16>,
    pub parents: Option<ParentsRequest>,
    pub hierarchy_statistics: Option<HierarchyStatisticsRequest>,
}

impl Require {
    /// Whether anything beyond the entity page must be computed.
    pub fn is_complex(&self) -> bool {
        self.facet_summary.is_some()
            || self.attribute_histograms.is_some()
            || self.price_histogram.is_some()
            || self.parents.is_some()
            || self.hierarchy_statistics.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRequest {
    pub entity_type: String,
    pub filter: FilterBy,
    pub price: Option<PriceQuery>,
    pub locale: Option<String>,
    pub order: OrderDirection,
    pub page: Page,
    pub require: Require,
}

impl EntityRequest {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: FilterBy::default(),
            price: None,
            locale: None,
            order: OrderDirection::Asc,
            page: Page::default(),
            require: Require::default(),
        }
    }

    pub fn with_baseline(mut self, constraint: FilterConstraint) -> Self {
        self.filter.baseline.push(constraint);
        self
    }

    pub fn with_user_filter(mut self, constraint: FilterConstraint) -> Self {
        self.filter.user_filter.push(constraint);
        self
    }

    pub fn with_price(mut self, price: PriceQuery) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_page(mut self, number: u32, size: u32) -> Self {
        self.page = Page { number, size };
        self
    }
}
