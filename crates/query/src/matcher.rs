use anyhow::{Context, Result};
use index::{GraphStore, PathMatch, Pattern};
use std::sync::Arc;

pub const DEFAULT_MATCH_LIMIT: usize = 5;

pub struct PatternMatcher {
    store: Arc<dyn GraphStore>,
    match_limit: usize,
}

impl PatternMatcher {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            match_limit: DEFAULT_MATCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, match_limit: usize) -> Self {
        self.match_limit = match_limit;
        self
    }

    /// Up to `match_limit` concrete paths for `pattern`. An empty result means
    /// the pattern does not occur in the graph.
    pub async fn match_pattern(&self, pattern: &Pattern) -> Result<Vec<PathMatch>> {
        self.store
            .run_pattern_query(pattern, self.match_limit)
            .await
            .with_context(|| format!("Pattern query failed for {}", pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{GraphElement, Node, Properties, Relationship, SourceRef};
    use index::MemoryGraphStore;

    async fn fan_out(leaves: i64) -> Arc<MemoryGraphStore> {
        let hub = Node::new("ollivier", "Person");
        let mut nodes = vec![hub.clone()];
        let mut relationships = Vec::new();
        for i in 0..leaves {
            let leaf = Node::new(i, "Observation");
            relationships.push(Relationship {
                subj: hub.clone(),
                obj: leaf.clone(),
                rel_type: "described_in".to_string(),
                timestamp: None,
                properties: Properties::new(),
            });
            nodes.push(leaf);
        }
        let store = Arc::new(MemoryGraphStore::new());
        store
            .write(&GraphElement {
                nodes,
                relationships,
                source: SourceRef { element_id: "hub".to_string(), text: String::new() },
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn results_are_bounded_by_the_limit() {
        let matcher = PatternMatcher::new(fan_out(9).await);
        let pattern: Pattern = ["described_in"].into_iter().collect();
        assert_eq!(matcher.match_pattern(&pattern).await.unwrap().len(), DEFAULT_MATCH_LIMIT);
    }

    #[tokio::test]
    async fn custom_limit_is_honoured() {
        let matcher = PatternMatcher::new(fan_out(9).await).with_limit(2);
        let pattern: Pattern = ["described_in"].into_iter().collect();
        assert_eq!(matcher.match_pattern(&pattern).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_pattern_is_empty() {
        let matcher = PatternMatcher::new(fan_out(3).await);
        let pattern: Pattern = ["contradicts"].into_iter().collect();
        assert!(matcher.match_pattern(&pattern).await.unwrap().is_empty());
    }
}
