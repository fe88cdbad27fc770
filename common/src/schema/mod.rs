pub mod feedback;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;

/// Strict contract for every response emitted on the energy-efficiency path.
///
/// `message` and `interactionId` are required; `type` defaults to `"text"`
/// and `content` to an empty list, matching what the system prompts promise
/// the frontend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyEfficiencyResponse {
    pub message: String,
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    #[serde(rename = "type", default = "default_response_type")]
    pub response_type: String,
    #[serde(default)]
    pub content: Vec<Value>,
}

fn default_response_type() -> String {
    "text".to_string()
}

impl EnergyEfficiencyResponse {
    /// Validates an arbitrary JSON value against the schema.
    pub fn validate(value: &Value) -> Result<Self, AppError> {
        serde_json::from_value(value.clone()).map_err(|err| {
            AppError::Validation(format!(
                "Output failed EnergyEfficiencyResponse validation: {err}"
            ))
        })
    }

    /// Parses and validates a raw JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self, AppError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| AppError::Validation(format!("Response was not valid JSON: {err}")))?;
        Self::validate(&value)
    }

    pub fn to_json_string(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Standardized error payload shared by all pipelines.
pub fn error_response(message: &str, interaction_id: &str) -> String {
    json!({
        "message": message,
        "interactionId": interaction_id,
        "type": "error",
        "content": []
    })
    .to_string()
}

/// Standardized plain-text payload.
pub fn text_response(message: &str, interaction_id: &str) -> String {
    json!({
        "message": message,
        "interactionId": interaction_id,
        "type": "text",
        "content": []
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_complete_payload() {
        let value = json!({
            "message": "Use LED bulbs.",
            "interactionId": "id-1",
            "type": "text",
            "content": []
        });
        let response = EnergyEfficiencyResponse::validate(&value).expect("valid payload");
        assert_eq!(response.interaction_id, "id-1");
        assert_eq!(response.response_type, "text");
        assert!(response.content.is_empty());
    }

    #[test]
    fn type_and_content_default() {
        let value = json!({ "message": "hi", "interactionId": "id-2" });
        let response = EnergyEfficiencyResponse::validate(&value).expect("defaults apply");
        assert_eq!(response.response_type, "text");
        assert!(response.content.is_empty());
    }

    #[test]
    fn missing_message_fails_validation() {
        let value = json!({ "interactionId": "id-3" });
        assert!(EnergyEfficiencyResponse::validate(&value).is_err());
    }

    #[test]
    fn error_response_shape() {
        let raw = error_response("boom", "id-4");
        let value: Value = serde_json::from_str(&raw).expect("parses");
        assert_eq!(value["type"], "error");
        assert_eq!(value["interactionId"], "id-4");
        assert!(value["content"].as_array().expect("list").is_empty());
    }

    #[test]
    fn round_trips_serialization() {
        let response = EnergyEfficiencyResponse {
            message: "m".into(),
            interaction_id: "i".into(),
            response_type: "text".into(),
            content: vec![json!({"sourceId": "tipsa#0", "chunk": "t", "score": 0.5})],
        };
        let raw = response.to_json_string().expect("serializes");
        let parsed = EnergyEfficiencyResponse::from_json_str(&raw).expect("parses back");
        assert_eq!(parsed, response);
    }
}
