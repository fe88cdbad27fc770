use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::AppError,
    utils::config::{resolve_api_key, AppConfig},
};

/// Dense embedding capability used by index build and query-time retrieval.
#[async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

/// Embeddings over the OpenAI-compatible endpoint configured for the
/// `embeddings` section (Nebius or OpenAI).
pub struct OpenAiEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: Option<u32>,
}

impl OpenAiEmbeddings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let api_key = resolve_api_key(config.embeddings.provider)?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm.base_url);
        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.embeddings.name.clone(),
            dimensions: config.embeddings.dimensions,
        })
    }

    pub fn with_client(client: Client<OpenAIConfig>, model: String, dimensions: Option<u32>) -> Self {
        Self {
            client,
            model,
            dimensions,
        }
    }

    async fn embed_batch(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut builder = CreateEmbeddingRequestArgs::default();
        builder.model(&self.model).input(inputs);
        if let Some(dimensions) = self.dimensions {
            builder.dimensions(dimensions);
        }
        let request = builder.build()?;

        let response = self.client.embeddings().create(request).await?;
        let mut data = response.data;
        // Downstream alignment with chunk ids requires index order.
        data.sort_by_key(|entry| entry.index);

        debug!(vectors = data.len(), "Embedding batch complete");
        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingsProvider for OpenAiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_batch(texts.to_vec()).await
    }
}
