use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{info, warn};

use common::{llm::embeddings::EmbeddingsProvider, llm::ChatModel, utils::config::RetrievalMode};

use crate::{
    config::RetrievalConfig, fusion::fuse, lexical::LexicalIndex, rerank::rerank,
    vector::VectorIndex, ScoredChunk,
};

/// Hybrid retrieval engine: semantic k-NN, BM25 keywords, weighted rank
/// fusion, and the optional LLM-as-judge rerank.
///
/// Indexes are built before the first request and never mutated afterwards.
/// `retrieve` never fails the caller: any stage error degrades to the best
/// result available, down to an empty context list.
pub struct RetrievalEngine {
    vector: VectorIndex,
    lexical: Option<LexicalIndex>,
    embeddings: Arc<dyn EmbeddingsProvider>,
    rerank_model: Option<(Arc<dyn ChatModel>, String)>,
    config: RetrievalConfig,
    degrade_logged: AtomicBool,
}

impl RetrievalEngine {
    pub fn new(
        vector: VectorIndex,
        lexical: Option<LexicalIndex>,
        embeddings: Arc<dyn EmbeddingsProvider>,
        rerank_model: Option<(Arc<dyn ChatModel>, String)>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vector,
            lexical,
            embeddings,
            rerank_model,
            config,
            degrade_logged: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieves context for a question. Empty output is a valid outcome and
    /// is what callers get on any internal failure.
    #[tracing::instrument(skip_all, fields(top_k_hint))]
    pub async fn retrieve(&self, question: &str, top_k_hint: usize) -> Vec<ScoredChunk> {
        let final_top_k = self.config.final_k(top_k_hint);

        let query_vector = match self.embeddings.embed_query(question).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!(error = %err, "Query embedding failed; returning empty context");
                return Vec::new();
            }
        };

        let semantic = self.vector.knn(&query_vector, self.config.semantic_k);

        let fused = match self.config.mode {
            RetrievalMode::Semantic => semantic.into_iter().take(final_top_k).collect(),
            RetrievalMode::Hybrid => match self.lexical.as_ref() {
                Some(lexical) => {
                    let keyword_hits = lexical.top_k(question, self.config.keyword_k);
                    fuse(&semantic, &keyword_hits, self.config.alpha, final_top_k)
                }
                None => {
                    if !self.degrade_logged.swap(true, Ordering::Relaxed) {
                        warn!("Lexical index unavailable; hybrid retrieval degraded to semantic-only");
                    }
                    semantic.into_iter().take(final_top_k).collect()
                }
            },
        };

        let results = if self.config.rerank.enabled {
            match self.rerank_model.as_ref() {
                Some((model, model_name)) => {
                    rerank(
                        model.as_ref(),
                        model_name,
                        &self.config.rerank,
                        question,
                        fused,
                        final_top_k,
                    )
                    .await
                }
                None => fused,
            }
        } else {
            fused
        };

        info!(retrieved = results.len(), final_top_k, "Retrieval complete");
        results
    }
}
