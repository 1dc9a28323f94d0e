use extract::{Conversation, TextGenerator};
use index::{PathMatch, Pattern};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SYSTEM_MESSAGE: &str = "You are an assistant that converts graph database patterns into natural language questions. Always use the exact relationship names as verbs in the questions.";

const EXAMPLES: &str = r#"Example 1:
Path: lying_position --[FOLLOWED_BY]--> sitting_limitations
Question: "Has lying position followed by sitting limitations?"

Example 2:
Path: hip_joint_position --[RESPONDS_TO]--> normal_posture
      normal_posture --[DESCRIBED_IN]--> Parow
Question: "Has hip joint position responds to normal posture and also described in Parow?"

Example 3:
Path: entity1 --[CAUSES]--> entity2 --[LEADS_TO]--> entity3
Question: "Has entity1 causes entity2 and leads to entity3?""#;

/// `RESPONDS_TO` -> `responds to`.
pub fn relationship_phrase(rel_type: &str) -> String {
    rel_type.replace('_', " ").to_lowercase()
}

pub fn build_question_prompt(pattern: &Pattern, path: &PathMatch) -> String {
    let path_description = path
        .steps
        .iter()
        .map(|step| step.to_string())
        .collect::<Vec<_>>()
        .join("\n   ");
    let phrases = pattern
        .relationships()
        .iter()
        .map(|r| relationship_phrase(r))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Generate a natural language question based on this graph database pattern.

Pattern relationships: {pattern}

Actual path found:
   {path_description}

IMPORTANT: Use the EXACT relationship names in the question. Convert them to natural language by:
- Replacing underscores with spaces
- Making them lowercase
- Keeping the relationship verb/phrase intact

Relationship phrases to use: {phrases}

Examples of correct format:

{EXAMPLES}

Generate the question following this exact pattern. Use the relationship names as verbs/phrases in the question.
Return ONLY the question, nothing else."#
    )
}

/// Reduce a model reply to the bare question: first non-empty line, an
/// optional `Question:` label and surrounding quotes removed.
pub fn clean_question(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;

    let line = match line.get(..9) {
        Some(label) if label.eq_ignore_ascii_case("question:") => line[9..].trim(),
        _ => line,
    };

    let line = line
        .strip_prefix(['"', '\'', '“'])
        .and_then(|l| l.strip_suffix(['"', '\'', '”']))
        .unwrap_or(line)
        .trim();

    (!line.is_empty()).then(|| line.to_string())
}

/// Logged with every question that could not be produced.
pub const QUESTION_FAILURE_HINT: &str = "check the LLM backend and API key";

pub struct QuestionGenerator {
    llm_client: Arc<dyn TextGenerator>,
}

impl QuestionGenerator {
    pub fn new(llm_client: Arc<dyn TextGenerator>) -> Self {
        Self { llm_client }
    }

    /// One generator call per pattern. Failures are logged and yield `None`.
    pub async fn generate(&self, pattern: &Pattern, path: &PathMatch) -> Option<String> {
        let conversation = Conversation::new(SYSTEM_MESSAGE).user(build_question_prompt(pattern, path));

        match self.llm_client.complete(&conversation).await {
            Ok(reply) => {
                let question = clean_question(&reply);
                if question.is_none() {
                    warn!(%pattern, hint = QUESTION_FAILURE_HINT, "Question generator returned an empty reply");
                }
                debug!(%pattern, ?question, "Generated question");
                question
            }
            Err(e) => {
                warn!(
                    %pattern,
                    error = %format!("{:#}", e),
                    hint = QUESTION_FAILURE_HINT,
                    "Error generating question"
                );
                None
            }
        }
    }
}
