pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig, chunk};
pub use reader::FileReader;

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A document's text plus the identifiers it is stored under.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub source: String,
    pub text: String,
}

/// Generate a stable document ID from file path
pub fn generate_doc_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

pub async fn read_document(file_path: &Path) -> Result<Document> {
    let text = FileReader::read_file(file_path).await?;
    let source = file_path.to_string_lossy().to_string();
    Ok(Document {
        doc_id: generate_doc_id(&source),
        source,
        text,
    })
}

/// Read every supported file in a directory as separate documents.
pub async fn read_documents(dir_path: &Path) -> Result<Vec<Document>> {
    let files = FileReader::read_directory(dir_path).await?;
    Ok(files
        .into_iter()
        .map(|(source, text)| Document {
            doc_id: generate_doc_id(&source),
            source,
            text,
        })
        .collect())
}
