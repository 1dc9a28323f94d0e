use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Provenance tag attached to every node and relationship produced by the parser.
pub const AGENT_CREATED: &str = "agent_created";

/// Node identifier. The extraction grammar allows either a quoted string or
/// a bare integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Integer(i64),
    Text(String),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Integer(n) => write!(f, "{}", n),
            NodeId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::Text(s.to_string())
    }
}

impl From<i64> for NodeId {
    fn from(n: i64) -> Self {
        NodeId::Integer(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: Properties::new(),
        }
    }

    /// A node is storable when its type is a non-blank label and a text id is non-blank.
    pub fn is_valid(&self) -> bool {
        let id_ok = match &self.id {
            NodeId::Text(s) => !s.trim().is_empty(),
            NodeId::Integer(_) => true,
        };
        id_ok && !self.node_type.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub subj: Node,
    pub obj: Node,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn is_valid(&self) -> bool {
        self.subj.is_valid() && self.obj.is_valid() && !self.rel_type.trim().is_empty()
    }
}

/// Back-reference to the text an element was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub element_id: String,
    pub text: String,
}

/// Extraction output for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphElement {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
    pub source: SourceRef,
}

impl GraphElement {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_deserialize_from_strings_and_integers() {
        let text: NodeId = serde_json::from_str("\"Ollivier\"").unwrap();
        let int: NodeId = serde_json::from_str("42").unwrap();

        assert_eq!(text, NodeId::from("Ollivier"));
        assert_eq!(int, NodeId::Integer(42));
        assert_eq!(int.to_string(), "42");
    }

    #[test]
    fn blank_type_or_id_is_invalid() {
        assert!(Node::new("a", "ClinicalObservation").is_valid());
        assert!(!Node::new("a", "  ").is_valid());
        assert!(!Node::new("", "SourceText").is_valid());
        assert!(Node::new(7, "SourceText").is_valid());
    }
}
