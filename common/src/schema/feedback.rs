use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{hashing::derive_feedback_id, time::now_utc_iso};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    Positive,
    Negative,
}

impl FeedbackLabel {
    pub const fn score(self) -> i32 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// Unified feedback item exchanged between the edge sync job and the cloud
/// store. `feedback_id` is globally unique and lowercased; re-ingestion of an
/// existing id is a counted no-op on the cloud side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackItem {
    pub feedback_id: String,
    #[serde(rename = "interactionId")]
    pub interaction_id: String,
    pub label: FeedbackLabel,
    pub score: i32,
    #[serde(default)]
    pub comment: String,
    pub created_at: String,
}

impl FeedbackItem {
    /// Normalizes a raw edge-side feedback record into the sync schema.
    ///
    /// Tolerates missing fields: the interaction id falls back to the legacy
    /// `interaction_id` key, `created_at` defaults to now, and a deterministic
    /// 32-hex id is derived when none is present so repeated runs stay
    /// idempotent.
    pub fn normalize(raw: &Value, label: FeedbackLabel, idx: usize) -> Self {
        let interaction_id = raw
            .get("interactionId")
            .or_else(|| raw.get("interaction_id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        let created_at = raw
            .get("created_at")
            .or_else(|| raw.get("timestamp"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|ts| !ts.is_empty())
            .map(str::to_string)
            .unwrap_or_else(now_utc_iso);
        let comment = raw
            .get("comment")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let feedback_id = raw
            .get("feedback_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(
                || derive_feedback_id(&interaction_id, &created_at, idx),
                str::to_lowercase,
            );

        Self {
            feedback_id,
            interaction_id,
            label,
            score: label.score(),
            comment,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_fills_missing_fields() {
        let raw = json!({ "interaction_id": "abc" });
        let item = FeedbackItem::normalize(&raw, FeedbackLabel::Positive, 0);
        assert_eq!(item.interaction_id, "abc");
        assert_eq!(item.score, 1);
        assert_eq!(item.feedback_id.len(), 32);
        assert!(!item.created_at.is_empty());
    }

    #[test]
    fn normalize_preserves_and_lowercases_existing_id() {
        let raw = json!({
            "interactionId": "abc",
            "feedback_id": "DEADBEEF",
            "created_at": "2026-01-01T00:00:00+00:00"
        });
        let item = FeedbackItem::normalize(&raw, FeedbackLabel::Negative, 3);
        assert_eq!(item.feedback_id, "deadbeef");
        assert_eq!(item.score, -1);
        assert_eq!(item.created_at, "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn normalize_is_deterministic_for_same_input() {
        let raw = json!({
            "interactionId": "abc",
            "created_at": "2026-01-01T00:00:00+00:00"
        });
        let a = FeedbackItem::normalize(&raw, FeedbackLabel::Positive, 0);
        let b = FeedbackItem::normalize(&raw, FeedbackLabel::Positive, 9);
        assert_eq!(a.feedback_id, b.feedback_id);
    }

    #[test]
    fn wire_shape_uses_camelcase_interaction_id() {
        let item = FeedbackItem {
            feedback_id: "f".repeat(32),
            interaction_id: "abc".into(),
            label: FeedbackLabel::Positive,
            score: 1,
            comment: String::new(),
            created_at: "2026-01-01T00:00:00+00:00".into(),
        };
        let value = serde_json::to_value(&item).expect("serializes");
        assert!(value.get("interactionId").is_some());
        assert_eq!(value["label"], "positive");
    }
}
