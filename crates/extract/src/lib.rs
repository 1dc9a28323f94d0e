pub mod grammar;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod vocabulary;

pub use grammar::{Entry, ParsedNode, ParsedRelationship, ScanError, Unrecognized};
pub use llm::{Conversation, GenerationOptions, Message, OllamaClient, OpenAiClient, Role, TextGenerator};
pub use parser::{ParseSummary, parse_graph_elements, parse_with_summary};
pub use schema::{GraphElement, Node, NodeId, Properties, PropertyValue, Relationship, SourceRef};
pub use vocabulary::{NodeCategory, RelationshipCategory};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Extractor {
    llm_client: Arc<dyn TextGenerator>,
}

impl Extractor {
    pub fn new(llm_client: Arc<dyn TextGenerator>) -> Self {
        Self { llm_client }
    }

    /// Extract graph elements from one piece of text.
    ///
    /// Each call gets its own conversation; the client keeps no dialogue
    /// state between calls.
    pub async fn extract_from_text(&self, element_id: &str, text: &str) -> Result<GraphElement> {
        let conversation = Conversation::new(prompt::SYSTEM_MESSAGE)
            .user(prompt::build_extraction_prompt(text));

        let raw = self.llm_client
            .complete(&conversation)
            .await
            .context("Failed to extract graph elements")?;

        let source = SourceRef {
            element_id: element_id.to_string(),
            text: text.to_string(),
        };
        let (element, summary) = parse_with_summary(&raw, source);

        debug!(element_id, ?summary, "Parsed extraction output");
        info!(
            element_id,
            nodes = element.nodes.len(),
            relationships = element.relationships.len(),
            dropped = summary.unrecognized + summary.dangling_relationships + summary.invalid_nodes,
            "Extracted graph elements"
        );

        Ok(element)
    }
}
