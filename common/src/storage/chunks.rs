use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::AppError;

/// One normalized sentence-window chunk. Immutable once written; the JSONL
/// file is rewritten as a whole on each ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Canonical key `{doc_id}#{chunk_index}`, stable across runs.
    pub id: String,
    pub doc_id: String,
    pub source_path: String,
    pub source_type: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub heading_path: Vec<String>,
    pub text: String,
    pub created_at: String,
    /// SHA-256 of the normalized text.
    pub hash: String,
}

/// Streams the chunk JSONL, skipping malformed or text-less lines with a
/// warning. A missing file yields an empty corpus, not an error.
pub fn read_chunks(path: &Path) -> Result<Vec<ChunkRecord>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut chunks = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(trimmed) {
            Ok(chunk) if chunk.text.trim().is_empty() => {
                warn!(line = line_no.saturating_add(1), "Skipping chunk without text");
            }
            Ok(chunk) => chunks.push(chunk),
            Err(err) => {
                warn!(
                    line = line_no.saturating_add(1),
                    error = %err,
                    "Skipping malformed chunk line"
                );
            }
        }
    }

    Ok(chunks)
}

/// Rewrites the chunk JSONL atomically: the new content is written to a
/// temporary file in the same directory and renamed over the stable path, so
/// concurrent readers always observe a complete snapshot.
pub fn write_chunks_atomic(path: &Path, chunks: &[ChunkRecord]) -> Result<(), AppError> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Validation(format!("chunk path {} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    for chunk in chunks {
        serde_json::to_writer(&mut tmp, chunk)?;
        tmp.write_all(b"\n")?;
    }
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(err.error))?;

    info!(chunks = chunks.len(), path = %path.display(), "Wrote chunk store");
    Ok(())
}
