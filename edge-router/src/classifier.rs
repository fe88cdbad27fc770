use std::{path::Path, sync::Arc};

use tracing::{info, warn};

use common::{
    llm::{ChatMessage, ChatModel},
    schema::text_response,
    utils::config::AppConfig,
};

const CLASSIFICATION_PROMPT_FILE: &str = "classification_system_prompt.txt";
const REJECTION_FILE: &str = "other_queries_response.txt";

const DEFAULT_CLASSIFICATION_PROMPT: &str = "You are a message router for a smart-home energy \
assistant. Classify the user message below into exactly one category and reply with ONLY the \
category name.\n\nCategories:\n- DEVICE_CONTROL: commands to control, list, or schedule smart \
devices\n- ENERGY_EFFICIENCY: questions about saving energy, bills, or efficiency practices\n- \
OTHER_QUERIES: anything else\n\nUser message:\n{message}";

const DEFAULT_REJECTION: &str = "I can help with controlling your smart home devices and with \
energy-efficiency questions. That request is outside what I support.";

/// Three-way routing category for one user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    DeviceControl,
    EnergyEfficiency,
    Other,
}

impl std::fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::DeviceControl => "device_control",
            Self::EnergyEfficiency => "energy_efficiency",
            Self::Other => "other_queries",
        };
        f.write_str(label)
    }
}

/// LLM-backed message classifier with a safe `Other` fallback.
///
/// Prompts are loaded once at construction. The model's reply is uppercased
/// and matched by substring containment, DEVICE_CONTROL first; anything
/// unrecognized, including transport errors, routes to `Other` so
/// classification never produces a user-visible failure.
pub struct MessageClassifier {
    model: Arc<dyn ChatModel>,
    model_name: String,
    classification_prompt: String,
    rejection_message: String,
}

impl MessageClassifier {
    pub fn new(config: &AppConfig, model: Arc<dyn ChatModel>) -> Self {
        let prompt_dir = Path::new(&config.paths.prompt_dir);
        let classification_prompt =
            load_prompt(prompt_dir, CLASSIFICATION_PROMPT_FILE, DEFAULT_CLASSIFICATION_PROMPT);
        let rejection_message = load_prompt(prompt_dir, REJECTION_FILE, DEFAULT_REJECTION);

        Self {
            model,
            model_name: config.llm.models.classification.clone(),
            classification_prompt,
            rejection_message,
        }
    }

    pub async fn classify(&self, message: &str) -> MessageCategory {
        let rendered = self.classification_prompt.replace("{message}", message);
        let messages = [ChatMessage::system(rendered)];

        match self.model.invoke(&self.model_name, &messages, false).await {
            Ok(raw) => {
                let normalized = raw.trim().to_uppercase();
                let category = if normalized.contains("DEVICE_CONTROL") {
                    MessageCategory::DeviceControl
                } else if normalized.contains("ENERGY_EFFICIENCY") {
                    MessageCategory::EnergyEfficiency
                } else {
                    MessageCategory::Other
                };
                info!(%category, raw = %normalized, "Message classified");
                category
            }
            Err(err) => {
                warn!(error = %err, "Classification failed; defaulting to other_queries");
                MessageCategory::Other
            }
        }
    }

    /// Static rejection payload for unsupported queries.
    pub fn rejection_response(&self, interaction_id: &str) -> String {
        text_response(&self.rejection_message, interaction_id)
    }
}

fn load_prompt(prompt_dir: &Path, filename: &str, fallback: &str) -> String {
    let path = prompt_dir.join(filename);
    match std::fs::read_to_string(&path) {
        Ok(content) => content.trim().to_string(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Using built-in prompt");
            fallback.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::error::AppError;
    use serde_json::Value;

    struct ScriptedModel(&'static str);

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl ChatModel for BrokenModel {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            Err(AppError::Timeout("llm down".into()))
        }
    }

    fn classifier(model: Arc<dyn ChatModel>) -> MessageClassifier {
        let mut config = AppConfig::default();
        config.paths.prompt_dir = "/nonexistent".to_string();
        MessageClassifier::new(&config, model)
    }

    #[tokio::test]
    async fn matches_categories_by_containment() {
        let cases: [(&'static str, MessageCategory); 4] = [
            ("DEVICE_CONTROL", MessageCategory::DeviceControl),
            ("the answer is energy_efficiency.", MessageCategory::EnergyEfficiency),
            ("OTHER_QUERIES", MessageCategory::Other),
            ("no idea", MessageCategory::Other),
        ];
        for (reply, expected) in cases {
            let classifier = classifier(Arc::new(ScriptedModel(reply)));
            assert_eq!(classifier.classify("hello").await, expected);
        }
    }

    #[tokio::test]
    async fn device_control_wins_when_both_appear() {
        let classifier = classifier(Arc::new(ScriptedModel(
            "DEVICE_CONTROL or maybe ENERGY_EFFICIENCY",
        )));
        assert_eq!(
            classifier.classify("hello").await,
            MessageCategory::DeviceControl
        );
    }

    #[tokio::test]
    async fn errors_fall_back_to_other() {
        let classifier = classifier(Arc::new(BrokenModel));
        assert_eq!(classifier.classify("hello").await, MessageCategory::Other);
    }

    #[tokio::test]
    async fn rejection_is_schema_shaped() {
        let classifier = classifier(Arc::new(ScriptedModel("OTHER_QUERIES")));
        let raw = classifier.rejection_response("id-1");
        let value: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["type"], "text");
        assert_eq!(value["interactionId"], "id-1");
        assert!(value["content"].as_array().expect("list").is_empty());
    }
}
