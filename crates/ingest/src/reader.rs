use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Reads OCR'd or native text documents. Only plain text and markdown are
/// accepted; image and PDF conversion happens upstream.
pub struct FileReader;

impl FileReader {
    fn is_supported(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        )
    }

    pub async fn read_file(path: &Path) -> Result<String> {
        if !Self::is_supported(path) {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            anyhow::bail!(
                "Unsupported file format: {:?} (convert scans to .txt or .md first)",
                extension
            );
        }

        fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))
    }

    /// Read every supported file in `dir`, sorted by path.
    pub async fn read_directory(dir: &Path) -> Result<Vec<(String, String)>> {
        let mut files = Vec::new();

        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory: {:?}", dir))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.is_file() && Self::is_supported(&path) {
                let content = Self::read_file(&path).await?;
                let path_str = path.to_string_lossy().to_string();
                files.push((path_str, content));
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}
