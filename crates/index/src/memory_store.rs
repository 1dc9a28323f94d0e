use anyhow::Result;
use async_trait::async_trait;
use extract::{GraphElement, Node, NodeId, Properties, PropertyValue};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::store::{
    GraphExport, GraphStats, GraphStore, NodeNeighbourhood, NodeRef, OutgoingEdge, PathMatch, PathStep, Pattern,
    StoredNode, StoredRelationship,
};

/// Text form used for case-insensitive search, like Cypher's `toString`.
fn property_text(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Text(s) => s.clone(),
        PropertyValue::Integer(n) => n.to_string(),
        PropertyValue::Float(f) => f.to_string(),
        PropertyValue::Boolean(b) => b.to_string(),
    }
}

fn id_value(id: &NodeId) -> PropertyValue {
    match id {
        NodeId::Integer(n) => PropertyValue::Integer(*n),
        NodeId::Text(s) => PropertyValue::Text(s.clone()),
    }
}

#[derive(Debug)]
struct MemoryNode {
    label: String,
    id: NodeId,
    properties: Properties,
}

#[derive(Debug)]
struct StoredEdge {
    from: usize,
    to: usize,
    rel_type: String,
    properties: Properties,
}

/// Nodes are keyed by `(label, id)` and edges by `(from, to, type)`, the
/// same identities a Cypher `MERGE` would use.
#[derive(Debug, Default)]
struct MemoryGraph {
    nodes: Vec<MemoryNode>,
    node_index: HashMap<(String, NodeId), usize>,
    edges: Vec<StoredEdge>,
    edge_index: HashMap<(usize, usize, String), usize>,
}

impl MemoryGraph {
    fn merge_node(&mut self, node: &Node) -> usize {
        let key = (node.node_type.clone(), node.id.clone());
        let idx = match self.node_index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.nodes.push(MemoryNode {
                    label: node.node_type.clone(),
                    id: node.id.clone(),
                    properties: Properties::new(),
                });
                self.node_index.insert(key, self.nodes.len() - 1);
                self.nodes.len() - 1
            }
        };
        self.nodes[idx].properties.extend(node.properties.clone());
        idx
    }

    fn find_node(&self, node: &Node) -> Option<usize> {
        self.node_index
            .get(&(node.node_type.clone(), node.id.clone()))
            .copied()
    }

    fn merge_edge(&mut self, from: usize, to: usize, rel_type: &str, properties: Properties) {
        let key = (from, to, rel_type.to_string());
        let idx = match self.edge_index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.edges.push(StoredEdge {
                    from,
                    to,
                    rel_type: rel_type.to_string(),
                    properties: Properties::new(),
                });
                self.edge_index.insert(key, self.edges.len() - 1);
                self.edges.len() - 1
            }
        };
        self.edges[idx].properties.extend(properties);
    }

    fn stored(&self, idx: usize) -> StoredNode {
        let node = &self.nodes[idx];
        let mut properties = node.properties.clone();
        properties.insert("id".to_string(), id_value(&node.id));
        StoredNode {
            label: node.label.clone(),
            id: node.id.clone(),
            properties,
        }
    }

    fn node_ref(&self, idx: usize) -> NodeRef {
        NodeRef {
            label: self.nodes[idx].label.clone(),
            id: self.nodes[idx].id.clone(),
        }
    }

    fn display_name(&self, idx: usize) -> String {
        self.nodes[idx].id.to_string()
    }

    /// Depth-first walk from `node` along edges typed `rels[0]`, `rels[1]`, ...
    /// An edge appears at most once in a path.
    fn walk(
        &self,
        node: usize,
        rels: &[String],
        path: &mut Vec<usize>,
        limit: usize,
        out: &mut Vec<PathMatch>,
    ) {
        if out.len() >= limit {
            return;
        }
        let Some((rel, rest)) = rels.split_first() else {
            out.push(PathMatch {
                steps: path
                    .iter()
                    .map(|&e| {
                        let edge = &self.edges[e];
                        PathStep {
                            from: self.display_name(edge.from),
                            rel: edge.rel_type.clone(),
                            to: self.display_name(edge.to),
                        }
                    })
                    .collect(),
            });
            return;
        };

        for (e, edge) in self.edges.iter().enumerate() {
            if edge.from != node || edge.rel_type != *rel || path.contains(&e) {
                continue;
            }
            path.push(e);
            self.walk(edge.to, rest, path, limit, out);
            path.pop();
            if out.len() >= limit {
                return;
            }
        }
    }
}

/// In-process graph store for tests and for running without a database.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graph: RwLock<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn write(&self, element: &GraphElement) -> Result<()> {
        let mut graph = self.graph.write().await;

        for node in &element.nodes {
            graph.merge_node(node);
        }

        for relationship in &element.relationships {
            // MATCH semantics: endpoints must already exist under their label.
            let (Some(from), Some(to)) = (
                graph.find_node(&relationship.subj),
                graph.find_node(&relationship.obj),
            ) else {
                continue;
            };
            let mut properties = relationship.properties.clone();
            if let Some(ts) = &relationship.timestamp {
                properties.insert("timestamp".to_string(), PropertyValue::Text(ts.clone()));
            }
            graph.merge_edge(from, to, &relationship.rel_type, properties);
        }

        Ok(())
    }

    async fn list_relationship_types(&self) -> Result<Vec<String>> {
        let graph = self.graph.read().await;
        let mut types: Vec<String> = Vec::new();
        for edge in &graph.edges {
            if !types.contains(&edge.rel_type) {
                types.push(edge.rel_type.clone());
            }
        }
        types.sort();
        Ok(types)
    }

    async fn run_pattern_query(&self, pattern: &Pattern, limit: usize) -> Result<Vec<PathMatch>> {
        if pattern.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let graph = self.graph.read().await;
        let mut out = Vec::new();
        let mut path = Vec::with_capacity(pattern.len());
        for start in 0..graph.nodes.len() {
            graph.walk(start, pattern.relationships(), &mut path, limit, &mut out);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn clear_all(&self) -> Result<()> {
        *self.graph.write().await = MemoryGraph::default();
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.graph.read().await;
        let mut stats = GraphStats {
            total_nodes: graph.nodes.len(),
            total_relationships: graph.edges.len(),
            ..GraphStats::default()
        };
        for node in &graph.nodes {
            *stats.node_labels.entry(node.label.clone()).or_default() += 1;
        }
        for edge in &graph.edges {
            *stats.relationship_types.entry(edge.rel_type.clone()).or_default() += 1;
        }
        Ok(stats)
    }

    async fn export(&self) -> Result<GraphExport> {
        let graph = self.graph.read().await;
        Ok(GraphExport {
            nodes: (0..graph.nodes.len()).map(|idx| graph.stored(idx)).collect(),
            relationships: graph
                .edges
                .iter()
                .map(|edge| StoredRelationship {
                    source: graph.node_ref(edge.from),
                    rel_type: edge.rel_type.clone(),
                    target: graph.node_ref(edge.to),
                    properties: edge.properties.clone(),
                })
                .collect(),
        })
    }

    async fn sample_nodes(&self, label: Option<&str>, limit: usize) -> Result<Vec<StoredNode>> {
        let graph = self.graph.read().await;
        Ok((0..graph.nodes.len())
            .filter(|&idx| label.is_none_or(|l| graph.nodes[idx].label == l))
            .take(limit)
            .map(|idx| graph.stored(idx))
            .collect())
    }

    async fn search_nodes(&self, property: &str, needle: &str, limit: usize) -> Result<Vec<StoredNode>> {
        let graph = self.graph.read().await;
        let needle = needle.to_lowercase();
        Ok((0..graph.nodes.len())
            .map(|idx| graph.stored(idx))
            .filter(|node| {
                node.properties
                    .get(property)
                    .is_some_and(|v| property_text(v).to_lowercase().contains(&needle))
            })
            .take(limit)
            .collect())
    }

    async fn node_relationships(&self, key: &str) -> Result<Option<NodeNeighbourhood>> {
        let graph = self.graph.read().await;
        let name = PropertyValue::from(key);
        let Some(idx) = graph
            .nodes
            .iter()
            .position(|n| n.id.to_string() == key || n.properties.get("name") == Some(&name))
        else {
            return Ok(None);
        };

        let relationships = graph
            .edges
            .iter()
            .filter(|edge| edge.from == idx)
            .map(|edge| OutgoingEdge {
                rel_type: edge.rel_type.clone(),
                target: graph.stored(edge.to),
            })
            .collect();

        Ok(Some(NodeNeighbourhood {
            node: graph.stored(idx),
            relationships,
        }))
    }
}
