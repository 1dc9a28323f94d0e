use anyhow::Result;
use async_trait::async_trait;
use extract::{GraphElement, NodeId, Properties};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An ordered chain of relationship types to look for in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(Vec<String>);

impl Pattern {
    pub fn new(relationships: Vec<String>) -> Self {
        Self(relationships)
    }

    pub fn relationships(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

impl<S: Into<String>> FromIterator<S> for Pattern {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// One hop of a matched path. Endpoints are the node's `id`, else its
/// `name`, else its first label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub from: String,
    pub rel: String,
    pub to: String,
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --[{}]--> {}", self.from, self.rel, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathMatch {
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub node_labels: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
}

impl GraphStats {
    pub fn is_empty(&self) -> bool {
        self.total_nodes == 0
    }
}

/// A node as the store holds it. `properties` includes `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNode {
    pub label: String,
    pub id: NodeId,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: String,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub source: NodeRef,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: NodeRef,
    pub properties: Properties,
}

/// Whole-graph dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<StoredNode>,
    pub relationships: Vec<StoredRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEdge {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub target: StoredNode,
}

/// A node and its outgoing relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeNeighbourhood {
    pub node: StoredNode,
    pub relationships: Vec<OutgoingEdge>,
}

/// Graph database capability.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge one extraction batch. Writing the same element twice is harmless.
    async fn write(&self, element: &GraphElement) -> Result<()>;

    async fn list_relationship_types(&self) -> Result<Vec<String>>;

    /// Paths of `pattern.len()` consecutive directed edges with the given
    /// types, at most `limit` of them.
    async fn run_pattern_query(&self, pattern: &Pattern, limit: usize) -> Result<Vec<PathMatch>>;

    async fn clear_all(&self) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;

    async fn export(&self) -> Result<GraphExport>;

    /// Up to `limit` nodes, optionally restricted to one label.
    async fn sample_nodes(&self, label: Option<&str>, limit: usize) -> Result<Vec<StoredNode>>;

    /// Nodes whose `property`, rendered as text, contains `needle`
    /// ignoring case.
    async fn search_nodes(&self, property: &str, needle: &str, limit: usize) -> Result<Vec<StoredNode>>;

    /// The first node whose `id` or `name` equals `key`, with its outgoing
    /// edges.
    async fn node_relationships(&self, key: &str) -> Result<Option<NodeNeighbourhood>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_displays_as_chain() {
        let pattern: Pattern = ["responds_to", "described_in"].into_iter().collect();
        assert_eq!(pattern.to_string(), "responds_to -> described_in");
        assert_eq!(pattern.len(), 2);
    }

    #[test]
    fn path_step_displays_like_an_edge() {
        let step = PathStep {
            from: "lying_position".to_string(),
            rel: "followed_by".to_string(),
            to: "sitting_limitations".to_string(),
        };
        assert_eq!(step.to_string(), "lying_position --[followed_by]--> sitting_limitations");
    }
}
