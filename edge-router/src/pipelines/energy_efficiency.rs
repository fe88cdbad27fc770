use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{error, info, warn};

use common::{
    error::AppError,
    llm::{invoke_with_deadline, ChatMessage, ChatModel},
    schema::{error_response, EnergyEfficiencyResponse},
    utils::config::AppConfig,
};

use crate::{
    clients::rag::RagClient,
    pipelines::{interaction_id_suffix, Pipeline, PipelineContext},
};

const PROMPT_FILE: &str = "energy_efficiency_local_prompt.txt";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an energy-efficiency advisor. Answer the user's \
question with practical, safe advice. Respond with ONLY a JSON object of the form \
{\"message\": <string>, \"interactionId\": <string>, \"type\": \"text\", \"content\": []} and \
no extra text.";

const INVALID_JSON_MESSAGE: &str = "I apologize, but I received an invalid response format. \
Please try again.";
const INVALID_SCHEMA_MESSAGE: &str = "I apologize, but my response format was incorrect. Please \
try again.";
const PIPELINE_ERROR_MESSAGE: &str = "I apologize, but I encountered an issue providing energy \
efficiency advice. Please try again.";

/// Cloud-first energy-efficiency pipeline with a local LLM fallback.
///
/// When the RAG feature flag is on, the cloud endpoint is tried under its
/// short hard timeout; any timeout, transport error, or schema violation
/// logs one warning and falls through to the local path, so a slow cloud
/// never holds up the edge response.
pub struct EnergyEfficiencyPipeline {
    model: Arc<dyn ChatModel>,
    model_name: String,
    system_prompt: String,
    rag_client: Option<RagClient>,
    top_k: usize,
    llm_timeout: Duration,
}

impl EnergyEfficiencyPipeline {
    pub fn new(config: &AppConfig, model: Arc<dyn ChatModel>) -> Self {
        let prompt_path = Path::new(&config.paths.prompt_dir).join(PROMPT_FILE);
        let system_prompt = match std::fs::read_to_string(&prompt_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %prompt_path.display(), error = %err, "Using built-in efficiency prompt");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };

        let rag_client = config
            .features
            .energy_efficiency_rag_enabled
            .then(|| RagClient::from_config(config));

        Self {
            model,
            model_name: config.llm.models.energy_efficiency.clone(),
            system_prompt,
            rag_client,
            top_k: config.retrieval.default_top_k,
            llm_timeout: Duration::from_secs_f64(config.llm.timeout_s.max(0.0)),
        }
    }

    async fn try_cloud(&self, ctx: &PipelineContext) -> Option<String> {
        let client = self.rag_client.as_ref()?;
        match client
            .post_answer(&ctx.message, &ctx.interaction_id, self.top_k)
            .await
        {
            Ok(payload) => match EnergyEfficiencyResponse::validate(&payload) {
                Ok(validated) => match validated.to_json_string() {
                    Ok(body) => {
                        info!(interaction_id = %ctx.interaction_id, "Cloud RAG answered");
                        Some(body)
                    }
                    Err(_) => None,
                },
                Err(err) => {
                    warn!(error = %err, "Cloud RAG response failed validation; falling back to local path");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "Cloud RAG unavailable or failed; falling back to local path");
                None
            }
        }
    }

    async fn local_answer(&self, ctx: &PipelineContext) -> Result<String, AppError> {
        let system = format!(
            "{}{}",
            self.system_prompt,
            interaction_id_suffix(&ctx.interaction_id)
        );
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(ctx.message.clone()),
        ];
        let raw = invoke_with_deadline(
            self.model.as_ref(),
            &self.model_name,
            &messages,
            true,
            self.llm_timeout,
        )
        .await?;

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => match EnergyEfficiencyResponse::validate(&value) {
                Ok(validated) => validated.to_json_string(),
                Err(err) => {
                    error!(error = %err, "Local response failed schema validation");
                    Ok(error_response(INVALID_SCHEMA_MESSAGE, &ctx.interaction_id))
                }
            },
            Err(err) => {
                error!(error = %err, "Local response was not valid JSON");
                Ok(error_response(INVALID_JSON_MESSAGE, &ctx.interaction_id))
            }
        }
    }
}

#[async_trait]
impl Pipeline for EnergyEfficiencyPipeline {
    fn name(&self) -> &'static str {
        "energy_efficiency"
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<String, AppError> {
        if let Some(cloud_body) = self.try_cloud(ctx).await {
            return Ok(cloud_body);
        }

        match self.local_answer(ctx).await {
            Ok(body) => Ok(body),
            Err(err) => {
                error!(error = %err, interaction_id = %ctx.interaction_id, "Energy pipeline failed");
                Ok(error_response(PIPELINE_ERROR_MESSAGE, &ctx.interaction_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    struct ScriptedModel(String);

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            Ok(self.0.clone())
        }
    }

    fn context() -> PipelineContext {
        PipelineContext {
            message: "how do I save energy?".to_string(),
            token: "token".to_string(),
            location_id: "loc-1".to_string(),
            user_email: None,
            interaction_id: "id-1".to_string(),
        }
    }

    fn pipeline_with(config: AppConfig, reply: String) -> EnergyEfficiencyPipeline {
        EnergyEfficiencyPipeline::new(&config, Arc::new(ScriptedModel(reply)))
    }

    fn local_only_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.features.energy_efficiency_rag_enabled = false;
        config.paths.prompt_dir = "/nonexistent".to_string();
        config
    }

    #[tokio::test]
    async fn local_path_validates_and_returns() {
        let reply = json!({
            "message": "Use LED bulbs.",
            "interactionId": "id-1",
            "type": "text",
            "content": []
        })
        .to_string();
        let pipeline = pipeline_with(local_only_config(), reply);

        let body = pipeline.process(&context()).await.expect("process");
        let validated = EnergyEfficiencyResponse::from_json_str(&body).expect("schema");
        assert_eq!(validated.interaction_id, "id-1");
    }

    #[tokio::test]
    async fn local_non_json_becomes_error_response() {
        let pipeline = pipeline_with(local_only_config(), "not json at all".to_string());
        let body = pipeline.process(&context()).await.expect("process");
        let value: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], INVALID_JSON_MESSAGE);
    }

    #[tokio::test]
    async fn local_schema_violation_becomes_error_response() {
        let pipeline = pipeline_with(local_only_config(), r#"{"wrong": true}"#.to_string());
        let body = pipeline.process(&context()).await.expect("process");
        let value: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], INVALID_SCHEMA_MESSAGE);
    }

    #[tokio::test]
    async fn unreachable_cloud_falls_back_to_local() {
        let mut config = AppConfig::default();
        config.paths.prompt_dir = "/nonexistent".to_string();
        // Nothing listens here; the request fails fast and the local model answers.
        config.cloud_rag.base_url = "http://127.0.0.1:1".to_string();
        config.cloud_rag.timeout_s = 0.1;

        let reply = json!({
            "message": "Insulate the attic.",
            "interactionId": "id-1",
            "type": "text",
            "content": []
        })
        .to_string();
        let pipeline = pipeline_with(config, reply);

        let body = pipeline.process(&context()).await.expect("process");
        let validated = EnergyEfficiencyResponse::from_json_str(&body).expect("schema");
        assert_eq!(validated.message, "Insulate the attic.");
    }
}
