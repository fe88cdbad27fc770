use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Nebius,
    OpenAI,
}

impl LlmProvider {
    /// Name of the environment variable carrying the provider API key.
    pub const fn key_env_var(self) -> &'static str {
        match self {
            Self::Nebius => "NEBIUS_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Clone, Deserialize, Debug)]
pub struct ModelRoles {
    #[serde(default = "default_model")]
    pub classification: String,
    #[serde(default = "default_model")]
    pub device_control: String,
    #[serde(default = "default_model")]
    pub energy_efficiency: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_s")]
    pub timeout_s: f64,
    #[serde(default)]
    pub models: ModelRoles,
}

#[derive(Clone, Deserialize, Debug)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_embedding_model")]
    pub name: String,
    /// Requested vector width; `None` lets the provider decide.
    #[serde(default)]
    pub dimensions: Option<u32>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct PathsConfig {
    #[serde(default = "default_index_dir")]
    pub faiss_index_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_seed_data_dir")]
    pub seed_data_dir: String,
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: String,
    #[serde(default = "default_prompt_dir")]
    pub prompt_dir: String,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Hybrid,
}

#[derive(Clone, Copy, Deserialize, Debug)]
pub struct FusionConfig {
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RetrievalSettings {
    #[serde(default = "default_mode")]
    pub mode: RetrievalMode,
    #[serde(default = "default_semantic_k")]
    pub semantic_k: usize,
    #[serde(default = "default_keyword_k")]
    pub keyword_k: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default)]
    pub allow_general_knowledge: bool,
    #[serde(default)]
    pub fusion: FusionConfig,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RerankSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,
    #[serde(default = "default_rerank_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_rerank_batch_size")]
    pub batch_size: usize,
}

#[derive(Clone, Deserialize, Debug)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub energy_efficiency_rag_enabled: bool,
}

#[derive(Clone, Deserialize, Debug)]
pub struct CloudRagConfig {
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
    #[serde(default = "default_cloud_timeout_s")]
    pub timeout_s: f64,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub rerank: RerankSettings,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub cloud_rag: CloudRagConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_provider() -> LlmProvider {
    LlmProvider::Nebius
}

fn default_base_url() -> String {
    "https://api.studio.nebius.ai/v1".to_string()
}

fn default_model() -> String {
    "meta-llama/Meta-Llama-3.1-8B-Instruct".to_string()
}

fn default_embedding_model() -> String {
    "BAAI/bge-en-icl".to_string()
}

fn default_llm_timeout_s() -> f64 {
    30.0
}

fn default_index_dir() -> String {
    "faiss_index".to_string()
}

fn default_db_path() -> String {
    "data/db.sqlite".to_string()
}

fn default_seed_data_dir() -> String {
    "rag/data/seed".to_string()
}

fn default_user_data_dir() -> String {
    "user_data".to_string()
}

fn default_prompt_dir() -> String {
    "prompts".to_string()
}

fn default_mode() -> RetrievalMode {
    RetrievalMode::Hybrid
}

fn default_alpha() -> f32 {
    0.6
}

fn default_semantic_k() -> usize {
    8
}

fn default_keyword_k() -> usize {
    8
}

fn default_top_k() -> usize {
    3
}

fn default_rerank_top_n() -> usize {
    8
}

fn default_rerank_timeout_ms() -> u64 {
    2000
}

fn default_preview_chars() -> usize {
    400
}

fn default_rerank_batch_size() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_cloud_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_cloud_timeout_s() -> f64 {
    1.5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ModelRoles {
    fn default() -> Self {
        Self {
            classification: default_model(),
            device_control: default_model(),
            energy_efficiency: default_model(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_s: default_llm_timeout_s(),
            models: ModelRoles::default(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_embedding_model(),
            dimensions: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            faiss_index_dir: default_index_dir(),
            db_path: default_db_path(),
            seed_data_dir: default_seed_data_dir(),
            user_data_dir: default_user_data_dir(),
            prompt_dir: default_prompt_dir(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            semantic_k: default_semantic_k(),
            keyword_k: default_keyword_k(),
            default_top_k: default_top_k(),
            allow_general_knowledge: false,
            fusion: FusionConfig::default(),
        }
    }
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: default_rerank_top_n(),
            timeout_ms: default_rerank_timeout_ms(),
            preview_chars: default_preview_chars(),
            batch_size: default_rerank_batch_size(),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            energy_efficiency_rag_enabled: true,
        }
    }
}

impl Default for CloudRagConfig {
    fn default() -> Self {
        Self {
            base_url: default_cloud_base_url(),
            timeout_s: default_cloud_timeout_s(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            paths: PathsConfig::default(),
            retrieval: RetrievalSettings::default(),
            rerank: RerankSettings::default(),
            features: FeatureFlags::default(),
            cloud_rag: CloudRagConfig::default(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

/// Resolves the provider API key from the environment.
///
/// Secrets are read once at boot and never logged. A missing key for the
/// configured provider is a fatal configuration error.
pub fn resolve_api_key(provider: LlmProvider) -> Result<String, AppError> {
    let var = provider.key_env_var();
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "missing required environment variable {var} for configured provider"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retrieval.mode, RetrievalMode::Hybrid);
        assert_eq!(config.retrieval.default_top_k, 3);
        assert!(config.features.energy_efficiency_rag_enabled);
        assert!((config.cloud_rag.timeout_s - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn provider_env_var_names() {
        assert_eq!(LlmProvider::Nebius.key_env_var(), "NEBIUS_API_KEY");
        assert_eq!(LlmProvider::OpenAI.key_env_var(), "OPENAI_API_KEY");
    }

    #[test]
    fn config_deserializes_from_json_fragment() {
        let raw = serde_json::json!({
            "server": { "port": 9001 },
            "retrieval": { "mode": "semantic", "fusion": { "alpha": 0.25 } }
        });
        let config: AppConfig = serde_json::from_value(raw).expect("config should parse");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.retrieval.mode, RetrievalMode::Semantic);
        assert!((config.retrieval.fusion.alpha - 0.25).abs() < f32::EPSILON);
        // Untouched sections keep their defaults.
        assert_eq!(config.paths.faiss_index_dir, "faiss_index");
    }
}
