use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::service::JobKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisResult {
    pub question: String,
    pub answer: String,
    pub timestamp: NaiveDateTime,
    pub file_path: PathBuf,
}

/// Up to four cleaned words from the first five of `question`.
pub fn slug(question: &str) -> String {
    question
        .to_lowercase()
        .split_whitespace()
        .take(5)
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|word| !word.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join("_")
}

/// `q{n}_{slug}_{YYYYmmdd_HHMMSS}.txt`, `n` counting from 1.
pub fn file_name(number: usize, question: &str, at: &NaiveDateTime) -> String {
    format!("q{}_{}_{}.txt", number, slug(question), at.format("%Y%m%d_%H%M%S"))
}

pub fn render(kind: JobKind, question: &str, answer: &str, at: &NaiveDateTime) -> String {
    let banner = "=".repeat(80);
    let rule = "-".repeat(80);
    format!(
        "{banner}\nHYPOTHESIS VERIFICATION RESULT ({kind})\n{banner}\n\n\
         Question: {question}\n\n\
         Timestamp: {timestamp}\n\n\
         {rule}\n{kind} RESPONSE:\n{rule}\n{answer}\n\n",
        timestamp = at.format("%Y-%m-%dT%H:%M:%S%.6f"),
    )
}
