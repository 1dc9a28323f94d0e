pub mod memory_store;
pub mod neo4j_store;
pub mod store;

pub use memory_store::MemoryGraphStore;
pub use neo4j_store::Neo4jStore;
pub use store::{
    GraphExport, GraphStats, GraphStore, NodeNeighbourhood, NodeRef, OutgoingEdge, PathMatch, PathStep, Pattern,
    StoredNode, StoredRelationship,
};

use anyhow::{Context, Result};
use extract::{Extractor, GraphElement};
use ingest::{Chunk, Chunker, ChunkerConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Above this many characters an unchunked document is likely to overflow
/// the model's context window.
const LARGE_DOCUMENT_CHARS: usize = 50_000;

/// Logged and reported with every skipped chunk.
pub const CHUNK_FAILURE_HINT: &str =
    "check the LLM backend and Neo4j connection, or reduce chunking.max_chars";

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub use_chunking: bool,
    pub chunker: ChunkerConfig,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            use_chunking: true,
            chunker: ChunkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub error: String,
    pub hint: &'static str,
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub element_id: String,
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub failures: Vec<ChunkFailure>,
    pub nodes_written: usize,
    pub relationships_written: usize,
    #[serde(skip)]
    pub elements: Vec<GraphElement>,
}

/// Chunks text, extracts graph elements from each chunk and writes them to the store
pub struct Indexer {
    extractor: Extractor,
    store: Arc<dyn GraphStore>,
}

impl Indexer {
    pub fn new(extractor: Extractor, store: Arc<dyn GraphStore>) -> Self {
        Self { extractor, store }
    }

    /// Extract and store a single chunk
    pub async fn index_chunk(&self, chunk: &Chunk) -> Result<GraphElement> {
        let element = self
            .extractor
            .extract_from_text(&chunk.chunk_id, &chunk.text)
            .await?;

        self.store
            .write(&element)
            .await
            .with_context(|| format!("Failed to store graph elements for {}", chunk.chunk_id))?;

        Ok(element)
    }

    /// Index a whole document. When it splits into several chunks a failing
    /// chunk is logged and skipped; a single-chunk failure is returned.
    pub async fn index_text(
        &self,
        text: &str,
        element_id: &str,
        options: &IndexOptions,
    ) -> Result<IngestReport> {
        let chunker = Chunker::new(options.chunker);
        let chunks = if options.use_chunking && chunker.needs_chunking(text) {
            chunker.chunk_text(element_id, text, element_id)
        } else {
            let len = text.chars().count();
            if len > LARGE_DOCUMENT_CHARS {
                warn!(
                    element_id,
                    chars = len,
                    hint = "enable chunking or lower chunking.max_chars",
                    "Indexing a large document without chunking"
                );
            }
            let single = Chunker::new(ChunkerConfig { max_chars: len.max(1), overlap: 0 });
            single.chunk_text(element_id, text, element_id)
        };

        let mut report = IngestReport {
            element_id: element_id.to_string(),
            chunks_total: chunks.len(),
            ..IngestReport::default()
        };

        info!(element_id, chunks = chunks.len(), "Indexing document");

        if let [chunk] = chunks.as_slice() {
            let element = self.index_chunk(chunk).await?;
            report.record(element);
            return Ok(report);
        }

        for (i, chunk) in chunks.iter().enumerate() {
            info!(chunk_id = %chunk.chunk_id, "Processing chunk {}/{}", i + 1, chunks.len());
            match self.index_chunk(chunk).await {
                Ok(element) => report.record(element),
                Err(e) => {
                    warn!(
                        chunk_id = %chunk.chunk_id,
                        error = %format!("{:#}", e),
                        hint = CHUNK_FAILURE_HINT,
                        "Skipping chunk"
                    );
                    report.failures.push(ChunkFailure {
                        chunk_id: chunk.chunk_id.clone(),
                        error: format!("{:#}", e),
                        hint: CHUNK_FAILURE_HINT,
                    });
                }
            }
        }

        info!(
            element_id,
            processed = report.chunks_processed,
            failed = report.failures.len(),
            nodes = report.nodes_written,
            relationships = report.relationships_written,
            "Document indexed"
        );
        Ok(report)
    }

}

impl IngestReport {
    fn record(&mut self, element: GraphElement) {
        self.chunks_processed += 1;
        self.nodes_written += element.nodes.len();
        self.relationships_written += element.relationships.len();
        self.elements.push(element);
    }
}
