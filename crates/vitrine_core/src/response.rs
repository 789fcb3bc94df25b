use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Entity, Page};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataChunk {
    pub entities: Vec<Entity>,
    pub page: Page,
    pub total_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetRelation {
    #[default]
    Or,
    And,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetImpact {
    /// Change of the result size when the facet is added to the selection.
    pub difference: i64,
    pub match_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetStatistics {
    pub facet: i64,
    pub requested: bool,
    pub count: u64,
    pub impact: Option<FacetImpact>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetGroupStatistics {
    pub reference_type: String,
    pub group: Option<i64>,
    pub relation: FacetRelation,
    pub facets: Vec<FacetStatistics>,
}

impl FacetGroupStatistics {
    pub fn facet(&self, facet: i64) -> Option<&FacetStatistics> {
        self.facets.iter().find(|stat| stat.facet == facet)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSummary {
    pub groups: Vec<FacetGroupStatistics>,
}

impl FacetSummary {
    pub fn group(&self, reference_type: &str, group: Option<i64>) -> Option<&FacetGroupStatistics> {
        self.groups
            .iter()
            .find(|stats| stats.reference_type == reference_type && stats.group == group)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub threshold: f64,
    pub occurrences: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub overall_count: u64,
    pub buckets: Vec<Bucket>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNodeStatistics {
    pub primary_key: i64,
    pub cardinality: u64,
    pub children: Vec<HierarchyNodeStatistics>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyStatistics {
    pub hierarchy_type: String,
    pub nodes: Vec<HierarchyNodeStatistics>,
}

impl HierarchyStatistics {
    /// Depth-first lookup of a node's statistics.
    pub fn find(&self, primary_key: i64) -> Option<&HierarchyNodeStatistics> {
        fn walk(
            nodes: &[HierarchyNodeStatistics],
            primary_key: i64,
        ) -> Option<&HierarchyNodeStatistics> {
            nodes.iter().find_map(|node| {
                if node.primary_key == primary_key {
                    Some(node)
                } else {
                    walk(&node.children, primary_key)
                }
            })
        }
        walk(&self.nodes, primary_key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceParents {
    pub referenced_primary_key: i64,
    pub parents: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityParents {
    pub primary_key: i64,
    /// Ancestors of the entity itself, oldest first.
    pub parents: Vec<i64>,
    pub references: Vec<ReferenceParents>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexResponse {
    pub chunk: DataChunk,
    pub facet_summary: Option<FacetSummary>,
    pub attribute_histograms: BTreeMap<String, Histogram>,
    pub price_histogram: Option<Histogram>,
    pub parents: Option<Vec<EntityParents>>,
    pub hierarchy_statistics: Option<HierarchyStatistics>,
}
