use std::collections::HashMap;

use tracing::debug;

use crate::grammar::{self, Entry, ParsedNode};
use crate::schema::{AGENT_CREATED, GraphElement, Node, NodeId, Properties, PropertyValue, Relationship, SourceRef};
use crate::vocabulary::{NodeCategory, RelationshipCategory};

/// What happened to each scanned entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseSummary {
    pub nodes_accepted: usize,
    pub duplicate_nodes: usize,
    pub invalid_nodes: usize,
    pub relationships_accepted: usize,
    /// Relationships with an endpoint that did not resolve to a valid node.
    pub dangling_relationships: usize,
    pub invalid_relationships: usize,
    pub unrecognized: usize,
    pub off_vocabulary_types: usize,
}

fn provenance() -> Properties {
    let mut properties = Properties::new();
    properties.insert("source".to_string(), PropertyValue::from(AGENT_CREATED));
    properties
}

fn to_node(parsed: &ParsedNode) -> Node {
    Node {
        id: parsed.id.clone(),
        node_type: parsed.node_type.clone(),
        properties: provenance(),
    }
}

/// First-seen order is kept alongside the lookup map.
#[derive(Default)]
struct NodeSightings {
    order: Vec<NodeId>,
    map: HashMap<NodeId, Node>,
}

impl NodeSightings {
    fn sight(&mut self, parsed: &ParsedNode, declared: bool, summary: &mut ParseSummary) {
        if self.map.contains_key(&parsed.id) {
            if declared {
                summary.duplicate_nodes += 1;
            }
            return;
        }
        let node = to_node(parsed);
        if !node.is_valid() {
            summary.invalid_nodes += 1;
            return;
        }
        if NodeCategory::from_label(&node.node_type).is_none() {
            summary.off_vocabulary_types += 1;
        }
        self.order.push(node.id.clone());
        self.map.insert(node.id.clone(), node);
    }
}

/// Parse model output into a graph element. Never fails: malformed entries
/// and repeated node ids are dropped.
pub fn parse_graph_elements(raw: &str, source: SourceRef) -> GraphElement {
    parse_with_summary(raw, source).0
}

pub fn parse_with_summary(raw: &str, source: SourceRef) -> (GraphElement, ParseSummary) {
    let entries = grammar::scan(raw);
    let mut summary = ParseSummary::default();
    let mut nodes = NodeSightings::default();

    // Inline endpoints are node occurrences too; the first sighting of an id
    // in text order fixes its type.
    for entry in &entries {
        match entry {
            Entry::Node(parsed) => nodes.sight(parsed, true, &mut summary),
            Entry::Relationship(parsed) => {
                nodes.sight(&parsed.subj, false, &mut summary);
                nodes.sight(&parsed.obj, false, &mut summary);
            }
            Entry::Unrecognized(bad) => {
                debug!(offset = bad.offset, error = %bad.error, text = %bad.text, "Skipping unrecognized entry");
                summary.unrecognized += 1;
            }
        }
    }
    let NodeSightings { order, map: mut nodes } = nodes;

    let mut relationships = Vec::new();
    for entry in &entries {
        let Entry::Relationship(parsed) = entry else {
            continue;
        };

        let (Some(subj), Some(obj)) = (nodes.get(&parsed.subj.id), nodes.get(&parsed.obj.id)) else {
            summary.dangling_relationships += 1;
            continue;
        };

        let relationship = Relationship {
            subj: subj.clone(),
            obj: obj.clone(),
            rel_type: parsed.rel_type.clone(),
            timestamp: parsed.timestamp.clone(),
            properties: provenance(),
        };
        let inline_ok = to_node(&parsed.subj).is_valid() && to_node(&parsed.obj).is_valid();
        if !inline_ok || !relationship.is_valid() {
            summary.invalid_relationships += 1;
            continue;
        }
        if RelationshipCategory::from_name(&relationship.rel_type).is_none() {
            summary.off_vocabulary_types += 1;
        }
        relationships.push(relationship);
    }

    summary.nodes_accepted = order.len();
    summary.relationships_accepted = relationships.len();

    let nodes = order
        .into_iter()
        .filter_map(|id| nodes.remove(&id))
        .collect();

    (
        GraphElement {
            nodes,
            relationships,
            source,
        },
        summary,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::EXAMPLE_OUTPUT;

    fn source() -> SourceRef {
        SourceRef {
            element_id: "doc".to_string(),
            text: String::new(),
        }
    }

    fn rel_line(subj: &str, obj: &str, rel_type: &str) -> String {
        format!(
            "Relationship(subj=Node(id='{}', type='ClinicalObservation'), obj=Node(id='{}', type='ClinicalObservation'), type='{}')",
            subj, obj, rel_type
        )
    }

    #[test]
    fn well_formed_input_yields_every_node_and_relationship() {
        let mut text = String::new();
        for id in ["a", "b", "c"] {
            text.push_str(&format!("Node(id='{}', type='ClinicalObservation')\n", id));
        }
        text.push_str(&rel_line("a", "b", "co_occurs_with"));
        text.push('\n');
        text.push_str(&rel_line("b", "c", "followed_by"));

        let element = parse_graph_elements(&text, source());

        let ids: Vec<String> = element.nodes.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(element.relationships.len(), 2);
        assert_eq!(element.relationships[1].subj.id, NodeId::from("b"));
        assert_eq!(element.relationships[1].rel_type, "followed_by");
    }

    #[test]
    fn nodes_carry_provenance() {
        let element = parse_graph_elements("Node(id='a', type='SourceText')", source());
        assert_eq!(
            element.nodes[0].properties.get("source"),
            Some(&PropertyValue::from(AGENT_CREATED))
        );
    }

    #[test]
    fn inline_endpoints_are_nodes() {
        let text = "Relationship(subj=Node(id='flat_back', type='ClinicalObservation'), \
obj=Node(id='Staffel', type='SourceText'), type='described_in')";
        let (element, summary) = parse_with_summary(text, source());

        let ids: Vec<String> = element.nodes.iter().map(|n| n.id.to_string()).collect();
        assert_eq!(ids, vec!["flat_back", "Staffel"]);
        assert_eq!(element.relationships.len(), 1);
        assert_eq!(summary.dangling_relationships, 0);
        assert_eq!(
            element.nodes[1].properties.get("source"),
            Some(&PropertyValue::from(AGENT_CREATED))
        );
    }

    #[test]
    fn relationship_with_a_blank_endpoint_is_dropped() {
        let text = format!(
            "Node(id='a', type='ClinicalObservation')\n{}\n{}",
            rel_line("a", "", "co_occurs_with"),
            rel_line("a", "a", "corroborates"),
        );
        let (element, summary) = parse_with_summary(&text, source());

        assert_eq!(element.nodes.len(), 1);
        assert_eq!(element.relationships.len(), 1);
        assert_eq!(element.relationships[0].rel_type, "corroborates");
        assert_eq!(summary.dangling_relationships, 1);
        assert_eq!(summary.invalid_nodes, 1);
    }

    #[test]
    fn first_declaration_of_an_id_wins() {
        let text = "Node(id='a', type='ClinicalObservation')\nNode(id='a', type='SourceText')";
        let (element, summary) = parse_with_summary(text, source());

        assert_eq!(element.nodes.len(), 1);
        assert_eq!(element.nodes[0].node_type, "ClinicalObservation");
        assert_eq!(summary.duplicate_nodes, 1);
    }

    #[test]
    fn relationship_endpoints_use_the_first_sighting() {
        let text = "Node(id='a', type='ClinicalObservation')\nNode(id='b', type='SourceText')\n\
Relationship(subj=Node(id='a', type='Wrong'), obj=Node(id='b', type='Wrong'), type='described_in')";
        let (element, summary) = parse_with_summary(text, source());

        assert_eq!(element.relationships[0].subj.node_type, "ClinicalObservation");
        assert_eq!(element.relationships[0].obj.node_type, "SourceText");
        assert_eq!(summary.duplicate_nodes, 0);
    }

    #[test]
    fn inline_sighting_before_declaration_wins() {
        let text = "Relationship(subj=Node(id='a', type='ClinicalObservation'), obj=Node(id='b', type='SourceText'), type='described_in')\n\
Node(id='a', type='TherapeuticOutcome')";
        let (element, summary) = parse_with_summary(text, source());

        assert_eq!(element.nodes.len(), 2);
        assert_eq!(element.nodes[0].node_type, "ClinicalObservation");
        assert_eq!(element.relationships[0].subj.node_type, "ClinicalObservation");
        assert_eq!(summary.duplicate_nodes, 1);
    }

    #[test]
    fn blank_ids_are_rejected() {
        let (element, summary) = parse_with_summary("Node(id='', type='SourceText')", source());
        assert!(element.nodes.is_empty());
        assert_eq!(summary.invalid_nodes, 1);
    }

    #[test]
    fn garbage_never_fails() {
        let inputs = [
            "",
            "Node(",
            "Relationship(subj=Node(id='a'",
            "))))Node(id='x', type='Y'",
            "no entries here at all",
        ];
        for input in inputs {
            let element = parse_graph_elements(input, source());
            assert!(element.is_empty(), "unexpected output for {:?}", input);
        }
    }

    #[test]
    fn reparsing_is_idempotent() {
        let first = parse_graph_elements(EXAMPLE_OUTPUT, source());
        let second = parse_graph_elements(EXAMPLE_OUTPUT, source());
        assert_eq!(first, second);
    }

    #[test]
    fn worked_example_parses_completely() {
        let (element, summary) = parse_with_summary(EXAMPLE_OUTPUT, source());

        assert_eq!(element.nodes.len(), 6);
        assert_eq!(element.relationships.len(), 5);
        assert_eq!(summary.unrecognized, 0);
        assert_eq!(summary.off_vocabulary_types, 0);
    }
}
