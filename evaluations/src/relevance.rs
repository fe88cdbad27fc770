//! LLM-as-judge relevance scoring for answered questions.
//!
//! The judge receives the question, up to three context chunks, and the
//! final answer, and must reply with `{"relevance": <float in [0,1]>}`. The
//! evaluator never fails its caller: parse or model problems yield 0.0.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use common::{
    llm::{ChatMessage, ChatModel},
    utils::json_extract::extract_json_value,
};

const PROMPT_FILE: &str = "relevance_evaluator_system_prompt.txt";
const MAX_CONTEXT: usize = 3;

const FALLBACK_PROMPT: &str = "You are a strict evaluator for energy-efficiency answers. Given a \
question, retrieved context, and a final answer, return ONLY a JSON object of the form \
{\"relevance\": <float in [0,1]>}. The relevance reflects how well the answer addresses the \
question and is grounded in the provided context.";

/// Loads the evaluator system prompt, falling back to the built-in text when
/// the file is unreadable.
pub fn load_system_prompt(prompt_dir: &Path) -> String {
    let path = prompt_dir.join(PROMPT_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Using built-in evaluator prompt");
            FALLBACK_PROMPT.to_string()
        }
    }
}

pub fn clamp_unit_interval(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Best-effort extraction of the numeric `relevance` field from judge output.
pub fn extract_relevance(text: &str) -> Option<f64> {
    let value = extract_json_value(text)?;
    match value.get("relevance")? {
        Value::Number(num) => num.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Judges one answer; any failure along the way scores 0.0.
pub async fn evaluate_relevance(
    model: &dyn ChatModel,
    model_name: &str,
    system_prompt: &str,
    question: &str,
    context_chunks: &[String],
    answer: &str,
) -> f64 {
    let selected: Vec<&str> = context_chunks
        .iter()
        .take(MAX_CONTEXT)
        .map(String::as_str)
        .collect();
    let joined_context = selected.join("\n---\n");

    let user_prompt = format!(
        "Question:\n{question}\n\n\
         Context (up to {MAX_CONTEXT} chunks, separated by ---):\n{joined_context}\n\n\
         Answer:\n{answer}\n\n\
         Return ONLY JSON: {{\"relevance\": <float in [0,1]>}}"
    );

    let messages = [
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_prompt),
    ];
    match model.invoke(model_name, &messages, true).await {
        Ok(raw) => match extract_relevance(&raw) {
            Some(score) => clamp_unit_interval(score),
            None => {
                warn!("Judge output had no parseable relevance score");
                0.0
            }
        },
        Err(err) => {
            warn!(error = %err, "Relevance evaluation failed");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::error::AppError;

    struct ScriptedJudge(&'static str);

    #[async_trait]
    impl ChatModel for ScriptedJudge {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn extracts_plain_and_fenced_scores() {
        assert_eq!(extract_relevance(r#"{"relevance": 0.7}"#), Some(0.7));
        assert_eq!(
            extract_relevance("```json\n{\"relevance\": \"0.4\"}\n```"),
            Some(0.4)
        );
        assert_eq!(extract_relevance("no json at all"), None);
        assert_eq!(extract_relevance(r#"{"other": 1}"#), None);
    }

    #[test]
    fn clamps_out_of_range_values() {
        assert!((clamp_unit_interval(1.7) - 1.0).abs() < f64::EPSILON);
        assert!(clamp_unit_interval(-0.2).abs() < f64::EPSILON);
        assert!(clamp_unit_interval(f64::NAN).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn scores_valid_judgment() {
        let judge = ScriptedJudge(r#"{"relevance": 0.85}"#);
        let score = evaluate_relevance(
            &judge,
            "judge",
            FALLBACK_PROMPT,
            "How to save energy?",
            &["Unplug idle devices.".to_string()],
            "Unplug devices you are not using.",
        )
        .await;
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn garbage_output_scores_zero() {
        let judge = ScriptedJudge("I refuse to answer in JSON.");
        let score = evaluate_relevance(&judge, "judge", FALLBACK_PROMPT, "q", &[], "a").await;
        assert!(score.abs() < f64::EPSILON);
    }

    #[test]
    fn missing_prompt_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt = load_system_prompt(dir.path());
        assert!(prompt.contains("relevance"));
    }
}
