use std::{fs, path::PathBuf, sync::Arc};

use chrono::Local;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use common::{error::AppError, utils::time::{now_utc_iso, parse_iso}};

use crate::services::history::HistoryManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }

    fn filename(self) -> &'static str {
        match self {
            Self::Positive => "positive_feedback.json",
            Self::Negative => "negative_feedback.json",
        }
    }
}

/// Edge-side feedback capture into per-kind JSON array files, with the
/// surrounding conversation context attached for later analysis.
pub struct FeedbackManager {
    feedback_dir: PathBuf,
    history: Arc<HistoryManager>,
    write_lock: Mutex<()>,
}

impl FeedbackManager {
    pub fn new(user_data_dir: &std::path::Path, history: Arc<HistoryManager>) -> Self {
        Self {
            feedback_dir: user_data_dir.join("feedback"),
            history,
            write_lock: Mutex::new(()),
        }
    }

    pub fn feedback_path(&self, kind: FeedbackKind) -> PathBuf {
        self.feedback_dir.join(kind.filename())
    }

    /// Loads one kind's records; missing or corrupt files read as empty.
    pub fn load(&self, kind: FeedbackKind) -> Vec<Value> {
        let Ok(raw) = fs::read_to_string(self.feedback_path(kind)) else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// True when the interaction id appears in the caller's history; feedback
    /// for unknown interactions is rejected at the API boundary.
    pub fn interaction_exists(&self, interaction_id: &str, user_email: Option<&str>) -> bool {
        self.history
            .load_history(user_email)
            .iter()
            .any(|message| message.interaction_id == interaction_id)
    }

    /// Records one feedback entry with its extracted conversation context.
    pub async fn save(
        &self,
        kind: FeedbackKind,
        interaction_id: &str,
        user_email: Option<&str>,
    ) -> Result<Value, AppError> {
        let _guard = self.write_lock.lock().await;

        let mut items = self.load(kind);
        let record = json!({
            "feedback_id": Uuid::new_v4().to_string(),
            "interaction_id": interaction_id,
            "feedback_type": kind.as_str(),
            "timestamp": now_utc_iso(),
            "context": self.extract_context(interaction_id, user_email),
        });
        items.push(record.clone());

        fs::create_dir_all(&self.feedback_dir)?;
        fs::write(
            self.feedback_path(kind),
            serde_json::to_string_pretty(&items)?,
        )?;
        Ok(record)
    }

    /// All messages for the interaction, plus the user request and final
    /// assistant reply picked out for quick inspection.
    fn extract_context(&self, interaction_id: &str, user_email: Option<&str>) -> Value {
        let history = self.history.load_history(user_email);
        let mut user_message = String::new();
        let mut assistant_response = String::new();
        let mut all_messages = Vec::new();

        for message in history {
            if message.interaction_id != interaction_id {
                continue;
            }
            match message.role.as_str() {
                "user" => user_message = message.content.clone(),
                "assistant" if !message.content.is_empty() => {
                    assistant_response = message.content.clone();
                }
                _ => {}
            }
            all_messages.push(json!({
                "interaction_id": message.interaction_id,
                "role": message.role,
                "content": message.content,
                "timestamp": message.timestamp,
            }));
        }

        json!({
            "user_message": user_message,
            "assistant_response": assistant_response,
            "all_messages": all_messages,
        })
    }

    /// Summary statistics for one kind: totals, today's count (local date),
    /// latest timestamp, and distinct interactions.
    pub fn statistics(&self, kind: FeedbackKind) -> Value {
        let items = self.load(kind);
        let total_key = format!("total_{}_feedback", kind.as_str());
        if items.is_empty() {
            let mut stats = json!({
                "feedback_today": 0,
                "latest_feedback_time": Value::Null,
                "unique_interactions": 0,
            });
            stats[total_key.as_str()] = json!(0);
            return stats;
        }

        let today = Local::now().date_naive();
        let feedback_today = items
            .iter()
            .filter(|item| {
                item.get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(parse_iso)
                    .is_some_and(|ts| ts.with_timezone(&Local).date_naive() == today)
            })
            .count();
        let unique_interactions = items
            .iter()
            .filter_map(|item| item.get("interaction_id").and_then(Value::as_str))
            .collect::<std::collections::HashSet<_>>()
            .len();
        let latest = items
            .iter()
            .filter_map(|item| item.get("timestamp").and_then(Value::as_str))
            .max();

        let mut stats = json!({
            "feedback_today": feedback_today,
            "latest_feedback_time": latest,
            "unique_interactions": unique_interactions,
        });
        stats[total_key.as_str()] = json!(items.len());
        stats
    }
}
