//! Knowledge-directory ingestion: find text files, split them into chunks,
//! embed and store every chunk.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingRetriever;
use crate::error::{RagentError, Result};

/// A file eligible for ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeFile {
    /// Path relative to the scanned directory.
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Extension without the dot.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub total_files: usize,
    /// Files whose every chunk was stored.
    pub embedded_count: usize,
    pub chunks: usize,
    /// Chunks stored with a fallback vector because embedding failed.
    pub degraded_chunks: usize,
    pub processed_files: Vec<PathBuf>,
    pub failed_files: Vec<PathBuf>,
}

/// Recursively list files under `dir` whose extension is in `extensions`,
/// sorted by path.
pub fn scan_directory(dir: &Path, extensions: &[String]) -> Result<Vec<KnowledgeFile>> {
    if !dir.is_dir() {
        return Err(RagentError::InvalidInput(format!(
            "knowledge directory does not exist: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            let Some(kind) = path
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
            else {
                continue;
            };
            files.push(KnowledgeFile {
                path: path.strip_prefix(dir).unwrap_or(&path).to_path_buf(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                kind: kind.to_ascii_lowercase(),
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Split `text` into chunks of at most `chunk_size` characters, breaking on
/// blank lines where possible. Paragraphs longer than `chunk_size` are cut
/// on character boundaries. Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let len = paragraph.chars().count();
        if len > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = paragraph.chars().collect();
            chunks.extend(chars.chunks(chunk_size).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        let joined = if current.is_empty() {
            len
        } else {
            current.chars().count() + 2 + len
        };
        if joined > chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Embed every eligible file under `dir` into the retriever's store.
///
/// A file that cannot be read is recorded in `failed_files` and skipped; a
/// storage failure aborts the ingest.
pub async fn ingest(
    retriever: &EmbeddingRetriever,
    dir: &Path,
    config: &RetrievalConfig,
) -> Result<IngestReport> {
    let files = scan_directory(dir, &config.extensions)?;
    let mut report = IngestReport {
        total_files: files.len(),
        ..Default::default()
    };

    for file in files {
        let content = match tokio::fs::read_to_string(dir.join(&file.path)).await {
            Ok(content) => content,
            Err(err) => {
                tracing::error!(path = %file.path.display(), error = %err, "failed to read knowledge file");
                report.failed_files.push(file.path);
                continue;
            }
        };

        let source = file.path.to_string_lossy();
        for chunk in chunk_text(&content, config.chunk_size) {
            let embedding = retriever.embed_document_from(&chunk, Some(source.as_ref())).await?;
            report.chunks += 1;
            if embedding.is_degraded() {
                report.degraded_chunks += 1;
            }
        }

        tracing::debug!(path = %file.path.display(), "ingested knowledge file");
        report.embedded_count += 1;
        report.processed_files.push(file.path);
    }

    tracing::info!(
        embedded = report.embedded_count,
        total = report.total_files,
        chunks = report.chunks,
        degraded = report.degraded_chunks,
        "knowledge ingest complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paragraphs_are_packed_together() {
        let chunks = chunk_text("alpha\n\nbeta\n\ngamma", 12);
        assert_eq!(chunks, vec!["alpha\n\nbeta", "gamma"]);
    }

    #[test]
    fn long_paragraph_is_split_by_characters() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn blank_input_has_no_chunks() {
        assert!(chunk_text("  \n\n \n\n", 100).is_empty());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let chunks = chunk_text("ééééé", 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn scan_filters_by_extension_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        std::fs::write(dir.path().join("skip.bin"), [0u8, 1]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.TXT"), "b").unwrap();

        let extensions = vec!["md".to_string(), "txt".to_string()];
        let files = scan_directory(dir.path(), &extensions).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("a.md"), PathBuf::from("nested/b.TXT")]);
        assert_eq!(files[1].kind, "txt");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = scan_directory(Path::new("/definitely/not/here"), &[]).unwrap_err();
        assert!(matches!(err, RagentError::InvalidInput(_)));
    }
}
