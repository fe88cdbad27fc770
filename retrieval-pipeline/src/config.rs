use common::utils::config::{AppConfig, RerankSettings, RetrievalMode};

/// Retrieval parameters frozen at engine build time. Per-request `topK`
/// hints override only the final cut, never the candidate depths.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    pub semantic_k: usize,
    pub keyword_k: usize,
    pub final_top_k: usize,
    pub alpha: f32,
    pub allow_general_knowledge: bool,
    pub rerank: RerankSettings,
}

impl RetrievalConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            mode: config.retrieval.mode,
            semantic_k: config.retrieval.semantic_k,
            keyword_k: config.retrieval.keyword_k,
            final_top_k: config.retrieval.default_top_k,
            alpha: config.retrieval.fusion.alpha.clamp(0.0, 1.0),
            allow_general_knowledge: config.retrieval.allow_general_knowledge,
            rerank: config.rerank.clone(),
        }
    }

    /// Final list length for one request: the hint when positive, the
    /// configured default otherwise.
    pub fn final_k(&self, top_k_hint: usize) -> usize {
        if top_k_hint > 0 {
            top_k_hint
        } else {
            self.final_top_k
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_clamped_to_unit_interval() {
        let mut app = AppConfig::default();
        app.retrieval.fusion.alpha = 7.5;
        let config = RetrievalConfig::from_app(&app);
        assert!((config.alpha - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn hint_overrides_final_k() {
        let config = RetrievalConfig::default();
        assert_eq!(config.final_k(5), 5);
        assert_eq!(config.final_k(0), config.final_top_k);
    }
}
