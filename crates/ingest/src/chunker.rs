use crate::chunk::{self, Chunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Characters of trailing context repeated at the start of the next chunk.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 15_000,
            overlap: 500,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_chars == 0 {
            anyhow::bail!("max_chars must be positive");
        }
        if self.overlap >= self.max_chars / 2 {
            anyhow::bail!(
                "overlap ({}) must be smaller than half of max_chars ({})",
                self.overlap,
                self.max_chars
            );
        }
        Ok(())
    }
}

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn needs_chunking(&self, text: &str) -> bool {
        text.chars().count() > self.config.max_chars
    }

    pub fn chunk_text(&self, doc_id: &str, text: &str, source: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let windows = split_windows(&chars, self.config.max_chars, self.config.overlap);
        let total = windows.len();

        let mut prev_end: usize = 0;
        windows
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let overlap = prev_end.saturating_sub(start);
                prev_end = end;
                Chunk {
                    doc_id: doc_id.to_string(),
                    chunk_id: chunk::chunk_id(doc_id, i, total),
                    text: chars[start..end].iter().collect(),
                    source: source.to_string(),
                    offset: (start, end),
                    overlap,
                }
            })
            .collect()
    }
}

/// Split `text` into chunk texts, the plain-string form of [`Chunker::chunk_text`].
pub fn chunk(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    split_windows(&chars, max_chars, overlap)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect())
        .collect()
}

/// Last index `i` in `[start, end)` where `pattern` starts and fits entirely before `end`.
fn rfind(chars: &[char], pattern: &[char], start: usize, end: usize) -> Option<usize> {
    if end < start + pattern.len() {
        return None;
    }
    (start..=end - pattern.len())
        .rev()
        .find(|&i| chars[i..i + pattern.len()] == *pattern)
}

/// Window boundaries in character offsets.
///
/// Each window is cut back to the last paragraph break, or failing that the
/// last sentence end, when one lies past the window's midpoint. The next
/// window starts `overlap` characters before the previous end.
fn split_windows(chars: &[char], max_chars: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    if len <= max_chars {
        return vec![(0, len)];
    }

    let max_chars = max_chars.max(1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + max_chars).min(len);

        if end < len {
            let midpoint = start + max_chars / 2;
            match rfind(chars, &['\n', '\n'], start, end) {
                Some(paragraph) if paragraph > midpoint => end = paragraph,
                _ => {
                    if let Some(sentence) = rfind(chars, &['.', ' '], start, end) {
                        if sentence > midpoint {
                            end = sentence + 1;
                        }
                    }
                }
            }
        }

        windows.push((start, end));
        start = if end < len {
            // Always move forward, even with an overlap that swallows the window.
            end.saturating_sub(overlap).max(start + 1)
        } else {
            end
        };
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig { max_chars, overlap })
    }

    /// Rebuild the document by dropping each chunk's declared overlap.
    fn reassemble(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.fresh_text()).collect()
    }

    fn sample_document() -> String {
        let mut text = String::new();
        for p in 0..12 {
            for s in 0..6 {
                text.push_str(&format!("Paragraph {} sentence {} describes posture. ", p, s));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn short_text_is_one_identical_chunk() {
        let chunks = chunker(100, 10).chunk_text("doc", "short text", "doc.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].chunk_id, "doc");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn text_of_exactly_max_chars_is_not_split() {
        let text = "x".repeat(50);
        assert_eq!(chunk(&text, 50, 5), vec![text.clone()]);
        assert!(!chunker(50, 5).needs_chunking(&text));
        assert!(chunker(50, 5).needs_chunking(&"x".repeat(51)));
    }

    #[test]
    fn chunking_need_counts_characters_not_bytes() {
        assert!(!chunker(4, 1).needs_chunking("üüüü"));
    }

    #[test]
    fn chunks_reassemble_to_the_original() {
        let text = sample_document();
        for (max_chars, overlap) in [(200, 20), (333, 50), (120, 0), (1000, 100)] {
            let chunks = chunker(max_chars, overlap).chunk_text("doc", &text, "doc.txt");
            assert!(chunks.len() > 1);
            assert_eq!(reassemble(&chunks), text, "max_chars={} overlap={}", max_chars, overlap);
        }
    }

    #[test]
    fn no_chunk_exceeds_max_chars() {
        let text = sample_document();
        let chunks = chunker(250, 40).chunk_text("doc", &text, "doc.txt");
        for c in &chunks {
            assert!(c.text.chars().count() <= 250);
            assert_eq!(c.text.chars().count(), c.len());
        }
    }

    #[test]
    fn prefers_paragraph_breaks_past_the_midpoint() {
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(70));
        let chunks = chunker(100, 10).chunk_text("doc", &text, "doc.txt");

        assert_eq!(chunks[0].text, "a".repeat(70));
        assert_eq!(chunks[1].offset.0, 60);
        assert_eq!(chunks[1].overlap, 10);
    }

    #[test]
    fn falls_back_to_sentence_end() {
        let text = format!("{}. {}", "a".repeat(70), "b".repeat(70));
        let chunks = chunker(100, 0).chunk_text("doc", &text, "doc.txt");

        assert_eq!(chunks[0].text, format!("{}.", "a".repeat(70)));
        assert!(chunks[1].text.starts_with(' '));
    }

    #[test]
    fn breaks_before_the_midpoint_are_ignored() {
        let text = format!("{}\n\n{}", "a".repeat(20), "b".repeat(150));
        let chunks = chunker(100, 0).chunk_text("doc", &text, "doc.txt");
        assert_eq!(chunks[0].len(), 100);
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let text = "Wirbelsäule übermäßig gekrümmt. ".repeat(20);
        let chunks = chunker(64, 8).chunk_text("doc", &text, "doc.txt");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn chunk_ids_are_numbered_when_split() {
        let text = sample_document();
        let chunks = chunker(300, 30).chunk_text("staffel", &text, "staffel.txt");
        assert_eq!(chunks[0].chunk_id, "staffel_chunk_1");
        assert_eq!(chunks[1].chunk_id, "staffel_chunk_2");
    }

    #[test]
    fn oversized_overlap_still_terminates() {
        let text = "z".repeat(40);
        let chunks = chunker(10, 50).chunk_text("doc", &text, "doc.txt");
        assert_eq!(chunks.last().unwrap().offset.1, 40);
    }

    #[test]
    fn config_rejects_overlap_at_half_window() {
        assert!(ChunkerConfig { max_chars: 100, overlap: 50 }.validate().is_err());
        assert!(ChunkerConfig { max_chars: 100, overlap: 49 }.validate().is_ok());
        assert!(ChunkerConfig::default().validate().is_ok());
    }
}
