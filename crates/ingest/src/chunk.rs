use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub offset: (usize, usize), // [start, end) character positions
    /// Leading characters shared with the previous chunk.
    pub overlap: usize,
}

impl Chunk {
    /// Character length of the chunk.
    pub fn len(&self) -> usize {
        self.offset.1 - self.offset.0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The part of the text not already covered by the previous chunk.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// Chunk ids are `{element_id}_chunk_{n}` (1-based) when a document is split,
/// and the bare element id when it is not.
pub fn chunk_id(element_id: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{}_chunk_{}", element_id, index + 1)
    } else {
        element_id.to_string()
    }
}
