use crate::model::Chunk;
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();

fn paragraph_break() -> &'static Regex {
    PARAGRAPH_BREAK.get_or_init(|| {
        Regex::new(r"\r?\n[ \t]*\r?\n").expect("paragraph break pattern is valid")
    })
}

/// Split a document into trimmed, non-empty paragraphs.
pub fn split_paragraphs(content: &str) -> Vec<String> {
    paragraph_break()
        .split(content)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn chunk_document(source: &str, content: &str) -> Vec<Chunk> {
    split_paragraphs(content)
        .into_iter()
        .enumerate()
        .map(|(position, text)| Chunk {
            text,
            source: source.to_string(),
            position,
        })
        .collect()
}

/// List `*.txt` files directly inside `dir`, sorted by file name.
pub fn list_text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read documents directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Chunk every text document in `dir`.
///
/// Output order is file-name order, then paragraph order within each file.
/// The vector index relies on this order being stable between runs.
pub fn chunk_directory(dir: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for path in list_text_files(dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_chunks = chunk_document(&name, &content);
        tracing::debug!("Chunked {} into {} paragraphs", name, file_chunks.len());
        chunks.extend(file_chunks);
    }
    Ok(chunks)
}
