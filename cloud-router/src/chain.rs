//! Retrieve-then-read chain: prompt rendering, the LLM call, and strict
//! schema validation of the model's JSON output.

use std::{path::Path, sync::Arc, time::Duration};

use serde_json::{json, Value};
use tracing::{info, warn};

use common::{
    error::AppError,
    llm::{invoke_with_deadline, ChatMessage, ChatModel},
    schema::EnergyEfficiencyResponse,
    utils::{
        config::AppConfig,
        json_extract::{extract_json_value, extract_json_value_balanced},
    },
};
use retrieval_pipeline::ScoredChunk;

const SYSTEM_PROMPT_FILE: &str = "energy_efficiency_system_prompt.txt";

/// Built-in template used when the prompt file is unreadable, mirroring the
/// placeholders the on-disk prompt must provide.
const DEFAULT_SYSTEM_PROMPT: &str = "You are an energy-efficiency assistant. Ground your answer \
in the retrieved context below.\n\nContext (JSON array of {sourceId, chunk, score}):\n{{CONTEXT}}\n\n\
Question:\n{{QUESTION}}\n\nFallback policy:\n{{FALLBACK_POLICY}}\n\nReturn ONLY a JSON object of the \
form {\"message\": <string>, \"interactionId\": \"{{INTERACTION_ID}}\", \"type\": \"text\", \
\"content\": <list of up to {{TOP_K}} cited context objects>} with no extra text.";

const STRICT_GUIDANCE: &str = "Answer the question using ONLY the provided context. Respond with \
the JSON object described in the system prompt and nothing else.";

const GENERAL_GUIDANCE: &str = "No context was retrieved. Give a brief, helpful answer from \
general energy-efficiency knowledge. Respond with the JSON object described in the system prompt, \
with \"content\" set to an empty list, and nothing else.";

const RETRY_REMINDER: &str = "Your previous reply was not valid JSON. Respond again with ONLY the \
JSON object, starting with '{' and ending with '}'. No prose, no code fences.";

/// Policy text for the `{{FALLBACK_POLICY}}` placeholder.
fn fallback_policy(allow_general_knowledge: bool, context_empty: bool) -> &'static str {
    if allow_general_knowledge && context_empty {
        "If the context is empty, you may answer briefly from general knowledge; set \"content\" \
         to an empty list."
    } else {
        "If the context does not contain the answer, acknowledge that the available material is \
         insufficient and set \"content\" to an empty list. Do not invent sources."
    }
}

pub struct RagChain {
    system_prompt: String,
    chat: Arc<dyn ChatModel>,
    model_name: String,
    allow_general_knowledge: bool,
    timeout: Duration,
}

impl RagChain {
    /// Loads the system prompt once at construction; an unreadable prompt
    /// file falls back to the built-in template with a warning.
    pub fn new(config: &AppConfig, chat: Arc<dyn ChatModel>) -> Self {
        let prompt_path = Path::new(&config.paths.prompt_dir).join(SYSTEM_PROMPT_FILE);
        let system_prompt = match std::fs::read_to_string(&prompt_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    path = %prompt_path.display(),
                    error = %err,
                    "Falling back to built-in RAG system prompt"
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };

        Self {
            system_prompt,
            chat,
            model_name: config.llm.model.clone(),
            allow_general_knowledge: config.retrieval.allow_general_knowledge,
            timeout: Duration::from_secs_f64(config.llm.timeout_s.max(0.0)),
        }
    }

    /// Runs generation over the already-retrieved context and returns a
    /// schema-validated response.
    #[tracing::instrument(skip_all, fields(interaction_id, top_k))]
    pub async fn answer(
        &self,
        question: &str,
        interaction_id: &str,
        top_k: usize,
        context: &[ScoredChunk],
    ) -> Result<EnergyEfficiencyResponse, AppError> {
        let context_json = render_context(context);
        let policy = fallback_policy(self.allow_general_knowledge, context.is_empty());
        let rendered = self
            .system_prompt
            .replace("{{CONTEXT}}", &context_json)
            .replace("{{INTERACTION_ID}}", interaction_id)
            .replace("{{TOP_K}}", &top_k.to_string())
            .replace("{{QUESTION}}", question)
            .replace("{{FALLBACK_POLICY}}", policy);

        let guidance = if self.allow_general_knowledge && context.is_empty() {
            GENERAL_GUIDANCE
        } else {
            STRICT_GUIDANCE
        };

        let messages = [ChatMessage::system(rendered.clone()), ChatMessage::user(guidance)];
        let raw = invoke_with_deadline(
            self.chat.as_ref(),
            &self.model_name,
            &messages,
            true,
            self.timeout,
        )
        .await?;

        let parsed = match extract_json_value(&raw) {
            Some(value) => value,
            None => self.retry_for_json(&rendered, guidance).await?,
        };

        let response = EnergyEfficiencyResponse::validate(&parsed)?;
        info!(
            retrieved_k = context.len(),
            content_items = response.content.len(),
            "Generation validated"
        );
        Ok(response)
    }

    /// One stricter retry, then the balanced-brace scan as the last resort.
    async fn retry_for_json(&self, rendered: &str, guidance: &str) -> Result<Value, AppError> {
        warn!("Model output was not valid JSON; retrying with stricter reminder");
        let retry_system = format!("{rendered}\n\n{RETRY_REMINDER}");
        let retry_messages = [
            ChatMessage::system(retry_system),
            ChatMessage::user(format!("{guidance}\n\n{RETRY_REMINDER}")),
        ];
        let raw = invoke_with_deadline(
            self.chat.as_ref(),
            &self.model_name,
            &retry_messages,
            true,
            self.timeout,
        )
        .await?;

        extract_json_value(&raw)
            .or_else(|| extract_json_value_balanced(&raw))
            .ok_or_else(|| AppError::Validation("Model output was not valid JSON".into()))
    }
}

/// Compact JSON array of `{sourceId, chunk, score}` for the prompt, scores
/// rounded to three decimals.
fn render_context(context: &[ScoredChunk]) -> String {
    let items: Vec<Value> = context
        .iter()
        .map(|scored| {
            json!({
                "sourceId": scored.chunk.id,
                "chunk": scored.chunk.text,
                "score": round_score(scored.score),
            })
        })
        .collect();
    Value::Array(items).to_string()
}

fn round_score(value: f32) -> f64 {
    (f64::from(value) * 1000.0).round() / 1000.0
}
