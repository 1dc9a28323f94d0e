pub mod matcher;
pub mod patterns;
pub mod questions;

#[cfg(test)]
mod log_capture;

pub use matcher::PatternMatcher;
pub use questions::{QUESTION_FAILURE_HINT, QuestionGenerator, relationship_phrase};

use anyhow::{Context, Result};
use extract::TextGenerator;
use index::{GraphStore, PathMatch, Pattern};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Logged with every pattern whose query failed.
pub const PATTERN_QUERY_HINT: &str = "check Neo4j connection";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub max_length: usize,
    pub max_patterns_per_length: usize,
    pub match_limit: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_length: 3,
            max_patterns_per_length: 5,
            match_limit: matcher::DEFAULT_MATCH_LIMIT,
        }
    }
}

/// A pattern present in the graph together with the question it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPattern {
    pub pattern: Pattern,
    pub example_path: PathMatch,
    pub question: String,
    pub num_paths: usize,
}

pub struct PatternDiscovery {
    store: Arc<dyn GraphStore>,
    questions: QuestionGenerator,
}

impl PatternDiscovery {
    pub fn new(store: Arc<dyn GraphStore>, llm_client: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            questions: QuestionGenerator::new(llm_client),
        }
    }

    /// Generate candidate chains from the graph's relationship types, keep
    /// those with at least one match, and phrase each as a question.
    /// A failing pattern query or question is skipped.
    pub async fn discover(&self, options: &DiscoveryOptions) -> Result<Vec<DiscoveredPattern>> {
        let relationships = self
            .store
            .list_relationship_types()
            .await
            .context("Failed to discover relationship types")?;
        info!(count = relationships.len(), ?relationships, "Found relationship types");

        let candidates = patterns::generate(&relationships, options.max_length, options.max_patterns_per_length);
        info!(count = candidates.len(), max_length = options.max_length, "Generated patterns");

        let matcher = PatternMatcher::new(self.store.clone()).with_limit(options.match_limit);
        let mut discovered = Vec::new();

        for (idx, pattern) in candidates.iter().enumerate() {
            let paths = match matcher.match_pattern(pattern).await {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(
                        %pattern,
                        error = %format!("{:#}", e),
                        hint = PATTERN_QUERY_HINT,
                        "Skipping pattern"
                    );
                    continue;
                }
            };
            let Some(example_path) = paths.first() else {
                continue;
            };

            info!(%pattern, paths = paths.len(), "Pattern {}/{} matched", idx + 1, candidates.len());

            if let Some(question) = self.questions.generate(pattern, example_path).await {
                discovered.push(DiscoveredPattern {
                    pattern: pattern.clone(),
                    example_path: example_path.clone(),
                    question,
                    num_paths: paths.len(),
                });
            }
        }

        info!(
            analyzed = candidates.len(),
            with_questions = discovered.len(),
            "Pattern discovery finished"
        );
        Ok(discovered)
    }
}
