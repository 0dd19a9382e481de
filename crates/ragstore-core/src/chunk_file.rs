//! Chunk files produced by the document preprocessor.
//!
//! A chunk file is a JSON array of `{"chunk": "...", "metadata": {...}}`
//! objects, one per text chunk, in document order.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Chunk, Meta};

#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    chunk: String,
    #[serde(default)]
    metadata: Meta,
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let data = fs::read_to_string(path)?;
    let records: Vec<ChunkRecord> = serde_json::from_str(&data)?;
    debug!(path = %path.display(), chunks = records.len(), "loaded chunk file");
    Ok(records.into_iter().map(|r| Chunk { text: r.chunk, meta: r.metadata }).collect())
}

/// Load every `*.json` chunk file under `root`, in sorted path order.
pub fn load_chunk_dir(root: &Path) -> Result<Vec<Chunk>> {
    let files = list_json_files(root);
    if files.is_empty() {
        return Err(Error::NotFound(format!("no .json chunk files under {}", root.display())));
    }
    let mut all_chunks = Vec::new();
    for file in &files {
        all_chunks.extend(load_chunks(file)?);
    }
    info!(files = files.len(), chunks = all_chunks.len(), root = %root.display(), "loaded chunk directory");
    Ok(all_chunks)
}

/// Load a single chunk file or a directory of them.
pub fn load_chunks_from(path: &Path) -> Result<Vec<Chunk>> {
    if path.is_dir() { load_chunk_dir(path) } else { load_chunks(path) }
}

pub fn save_chunks(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let records: Vec<ChunkRecord> =
        chunks.iter().map(|c| ChunkRecord { chunk: c.text.clone(), metadata: c.meta.clone() }).collect();
    fs::write(path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

fn list_json_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(true) {
        match entry {
            Ok(e) if e.file_type().is_file() => {
                let path = e.into_path();
                if path.extension().and_then(|s| s.to_str()) == Some("json") {
                    files.push(path);
                }
            }
            Ok(_) => {}
            Err(err) => {
                let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(path = %path, error = %err, "skipping unreadable entry");
            }
        }
    }
    files.sort();
    files
}
