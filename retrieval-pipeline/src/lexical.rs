use std::{collections::HashMap, path::Path};

use tracing::{info, warn};

use common::{error::AppError, storage::chunks::{read_chunks, ChunkRecord}};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// BM25 keyword index over the chunk corpus.
///
/// Built from the canonical chunk JSONL preferentially; the legacy path
/// builds from the vector store's document map when the JSONL is absent.
/// Scores stay internal: callers receive a plain ranked document list.
pub struct LexicalIndex {
    docs: Vec<ChunkRecord>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f32,
}

impl LexicalIndex {
    /// Preferred initialization from the chunk store. Returns `None` when the
    /// file is missing or holds no usable chunks, letting hybrid retrieval
    /// degrade to semantic-only.
    pub fn from_chunk_store(path: &Path) -> Result<Option<Self>, AppError> {
        if !path.exists() {
            warn!(path = %path.display(), "Chunk store missing; no lexical retriever");
            return Ok(None);
        }
        let chunks = read_chunks(path)?;
        Ok(Self::from_documents(chunks))
    }

    /// Legacy initialization from an already-loaded document map.
    pub fn from_documents(docs: Vec<ChunkRecord>) -> Option<Self> {
        if docs.is_empty() {
            return None;
        }

        let mut term_freqs = Vec::with_capacity(docs.len());
        let mut doc_lens = Vec::with_capacity(docs.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in &docs {
            let tokens = tokenize(&doc.text);
            doc_lens.push(tokens.len());
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in tokens {
                let count = freqs.entry(token).or_insert(0);
                *count = count.saturating_add(1);
            }
            for term in freqs.keys() {
                let df = doc_freq.entry(term.clone()).or_insert(0);
                *df = df.saturating_add(1);
            }
            term_freqs.push(freqs);
        }

        let total_len: usize = doc_lens.iter().sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f32 / docs.len() as f32
        };

        info!(docs = docs.len(), "Lexical index built");
        Some(Self {
            docs,
            term_freqs,
            doc_lens,
            doc_freq,
            avg_len,
        })
    }

    /// Top-`k` documents for a query by BM25 score; zero-score documents are
    /// excluded so unrelated chunks never pad the candidate list.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<ChunkRecord> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let n = self.docs.len() as f32;
        let mut scored: Vec<(usize, f32)> = Vec::new();
        for (doc_idx, freqs) in self.term_freqs.iter().enumerate() {
            let doc_len = self.doc_lens.get(doc_idx).copied().unwrap_or(0) as f32;
            let mut score = 0.0f32;
            for term in &query_terms {
                let Some(&tf) = freqs.get(term) else { continue };
                let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tf as f32;
                let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / self.avg_len.max(1.0));
                score += idf * tf * (BM25_K1 + 1.0) / denom.max(f32::EPSILON);
            }
            if score > 0.0 {
                scored.push((doc_idx, score));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .filter_map(|(doc_idx, _)| self.docs.get(doc_idx).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Lowercased alphanumeric tokens; the same normalization the splitter
/// applies keeps query and corpus token spaces aligned.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
