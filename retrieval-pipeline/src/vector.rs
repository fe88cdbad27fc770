use std::{
    collections::HashMap,
    fs,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use common::{
    error::AppError,
    llm::embeddings::EmbeddingsProvider,
    storage::{
        chunks::ChunkRecord,
        manifest::{IndexManifest, SplitterConfig},
    },
    utils::time::now_utc_iso,
};

use crate::ScoredChunk;

const EMBEDDINGS_FILE: &str = "embeddings.jsonl";
const INDEX_MANIFEST_FILE: &str = "index_manifest.json";
const EMBED_BATCH_SIZE: usize = 64;
const PROBE_TEXT: &str = "probe";

#[derive(Debug, Serialize, Deserialize)]
struct EmbeddingLine {
    id: String,
    vector: Vec<f32>,
}

/// Dense nearest-neighbor store over chunk embeddings.
///
/// Entries are built once (seed time) or loaded once (process start) and are
/// read-only afterwards, so request handlers share it without locks. Scores
/// are cosine similarities reported exactly as computed.
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<(ChunkRecord, Vec<f32>)>,
    manifest: IndexManifest,
}

impl VectorIndex {
    /// Embeds all chunks and persists the index alongside its manifest.
    pub async fn build(
        chunks: &[ChunkRecord],
        embeddings: &dyn EmbeddingsProvider,
        model_name: &str,
        index_dir: &Path,
    ) -> Result<Self, AppError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(embeddings.embed_documents(batch).await?);
        }
        if vectors.len() != chunks.len() {
            return Err(AppError::Processing(format!(
                "embedding count mismatch: {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        let manifest = IndexManifest {
            model: model_name.to_string(),
            dimension,
            splitter: SplitterConfig::default(),
            seeded_at: now_utc_iso(),
        };

        fs::create_dir_all(index_dir)?;
        let embeddings_path = index_dir.join(EMBEDDINGS_FILE);
        let mut tmp = NamedTempFile::new_in(index_dir)?;
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            serde_json::to_writer(
                &mut tmp,
                &EmbeddingLine {
                    id: chunk.id.clone(),
                    vector: vector.clone(),
                },
            )?;
            tmp.write_all(b"\n")?;
        }
        tmp.flush()?;
        tmp.persist(&embeddings_path)
            .map_err(|err| AppError::Io(err.error))?;
        manifest.save(&index_dir.join(INDEX_MANIFEST_FILE))?;

        info!(
            vectors = vectors.len(),
            dimension,
            path = %embeddings_path.display(),
            "Vector index built"
        );

        Ok(Self {
            entries: chunks.iter().cloned().zip(vectors).collect(),
            manifest,
        })
    }

    /// Loads the persisted index, failing fast when the embedding provider's
    /// current dimension differs from the recorded one.
    pub async fn load(
        index_dir: &Path,
        chunks: &[ChunkRecord],
        embeddings: &dyn EmbeddingsProvider,
    ) -> Result<Self, AppError> {
        let manifest = IndexManifest::load(&index_dir.join(INDEX_MANIFEST_FILE))?;

        let probe = embeddings.embed_query(PROBE_TEXT).await?;
        if probe.len() != manifest.dimension {
            return Err(AppError::Config(format!(
                "embedding dimension mismatch: index has {}, provider returns {}",
                manifest.dimension,
                probe.len()
            )));
        }

        let embeddings_path = index_dir.join(EMBEDDINGS_FILE);
        let file = fs::File::open(&embeddings_path).map_err(|_| {
            AppError::NotFound(format!(
                "vector index not found at {}; seed the index first",
                embeddings_path.display()
            ))
        })?;

        let mut vectors: HashMap<String, Vec<f32>> = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EmbeddingLine>(&line) {
                Ok(entry) => {
                    vectors.insert(entry.id, entry.vector);
                }
                Err(err) => warn!(error = %err, "Skipping malformed embedding line"),
            }
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match vectors.remove(&chunk.id) {
                Some(vector) => entries.push((chunk.clone(), vector)),
                None => warn!(chunk_id = %chunk.id, "Chunk has no stored embedding"),
            }
        }

        info!(entries = entries.len(), dimension = manifest.dimension, "Vector index loaded");
        Ok(Self { entries, manifest })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Documents held by the store; the lexical index's legacy initialization
    /// path when the canonical chunk JSONL is unavailable.
    pub fn documents(&self) -> Vec<ChunkRecord> {
        self.entries.iter().map(|(chunk, _)| chunk.clone()).collect()
    }

    /// Top-`k` chunks by cosine similarity to the query vector.
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|(chunk, vector)| ScoredChunk::new(chunk.clone(), cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::utils::hashing::sha256_hex;

    /// Deterministic embeddings: a fixed vector per known text, zeroes
    /// otherwise. Dimension is configurable to exercise the mismatch guard.
    struct StubEmbeddings {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingsProvider for StubEmbeddings {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
            Ok(self.vector_for(text))
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Ok(texts.iter().map(|text| self.vector_for(text)).collect())
        }
    }

    impl StubEmbeddings {
        fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut vector = vec![0.0f32; self.dimension];
            // A crude bag-of-topics embedding keyed on marker words.
            if let Some(slot) = vector.get_mut(0) {
                *slot = if text.contains("bulbs") { 1.0 } else { 0.1 };
            }
            if let Some(slot) = vector.get_mut(1) {
                *slot = if text.contains("attic") { 1.0 } else { 0.1 };
            }
            vector
        }
    }

    fn chunk(id: &str, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            doc_id: id.split('#').next().unwrap_or_default().to_string(),
            source_path: "seed/tips.md".to_string(),
            source_type: "md".to_string(),
            page: None,
            heading_path: Vec::new(),
            text: text.to_string(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            hash: sha256_hex(text.as_bytes()),
        }
    }

    #[tokio::test]
    async fn build_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunks = vec![
            chunk("tipsa#0", "Use LED bulbs."),
            chunk("tipsb#0", "Insulate the attic."),
        ];
        let embeddings = StubEmbeddings { dimension: 4 };

        let built = VectorIndex::build(&chunks, &embeddings, "stub-model", dir.path())
            .await
            .expect("build");
        assert_eq!(built.len(), 2);
        assert_eq!(built.manifest().dimension, 4);

        let loaded = VectorIndex::load(dir.path(), &chunks, &embeddings)
            .await
            .expect("load");
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn load_rejects_dimension_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunks = vec![chunk("tipsa#0", "Use LED bulbs.")];
        let build_time = StubEmbeddings { dimension: 4 };
        VectorIndex::build(&chunks, &build_time, "stub-model", dir.path())
            .await
            .expect("build");

        let drifted = StubEmbeddings { dimension: 8 };
        let err = VectorIndex::load(dir.path(), &chunks, &drifted)
            .await
            .expect_err("dimension mismatch should fail");
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn knn_orders_by_similarity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let chunks = vec![
            chunk("tipsa#0", "Use LED bulbs."),
            chunk("tipsb#0", "Insulate the attic."),
        ];
        let embeddings = StubEmbeddings { dimension: 4 };
        let index = VectorIndex::build(&chunks, &embeddings, "stub-model", dir.path())
            .await
            .expect("build");

        let query = embeddings.embed_query("dim the bulbs").await.expect("embed");
        let hits = index.knn(&query, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "tipsa#0");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let embeddings = StubEmbeddings { dimension: 4 };
        let err = VectorIndex::load(dir.path(), &[], &embeddings)
            .await
            .expect_err("no manifest");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
