use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use common::{error::AppError, utils::hashing::user_hash, utils::time::now_utc_iso};

const LEGACY_ACTIVE_FILENAME: &str = "active_conversation.json";

/// One turn in a conversation file. Ordered append-only per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMessage {
    pub interaction_id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

/// Generates the UUIDv4 correlating all records of a single request turn.
pub fn generate_interaction_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-user conversation persistence with append-then-rewrite semantics.
///
/// Writes to the same user's file are serialized through a per-user async
/// mutex; different users proceed in parallel. Loads tolerate missing and
/// malformed files by returning an empty history.
pub struct HistoryManager {
    conversations_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HistoryManager {
    pub fn new(user_data_dir: &Path) -> Self {
        Self {
            conversations_dir: user_data_dir.join("conversations"),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn active_conversation_path(&self, user_email: Option<&str>) -> PathBuf {
        let filename = match user_email {
            Some(email) => format!("{}_{LEGACY_ACTIVE_FILENAME}", user_hash(email)),
            None => LEGACY_ACTIVE_FILENAME.to_string(),
        };
        self.conversations_dir.join(filename)
    }

    async fn user_lock(&self, user_email: Option<&str>) -> Arc<Mutex<()>> {
        let key = user_email.map_or_else(|| "legacy".to_string(), user_hash);
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }

    /// Loads and sanitizes the conversation history. Entries without `role`
    /// or `content` keys are skipped; non-string content is coerced so LLM
    /// calls never see malformed turns.
    pub fn load_history(&self, user_email: Option<&str>) -> Vec<ConversationMessage> {
        let path = self.active_conversation_path(user_email);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(&raw) else {
            return Vec::new();
        };

        entries
            .into_iter()
            .filter_map(|entry| {
                let role = entry.get("role")?.as_str()?.to_string();
                let content = match entry.get("content")? {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Some(ConversationMessage {
                    interaction_id: entry
                        .get("interaction_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    role,
                    content,
                    timestamp: entry
                        .get("timestamp")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect()
    }

    /// Appends one message and rewrites the whole list, under the user lock.
    pub async fn save_message(
        &self,
        interaction_id: &str,
        role: &str,
        content: &str,
        user_email: Option<&str>,
    ) -> Result<ConversationMessage, AppError> {
        let lock = self.user_lock(user_email).await;
        let _guard = lock.lock().await;

        let mut history = self.load_history(user_email);
        let message = ConversationMessage {
            interaction_id: interaction_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: now_utc_iso(),
        };
        history.push(message.clone());

        fs::create_dir_all(&self.conversations_dir)?;
        let path = self.active_conversation_path(user_email);
        fs::write(&path, serde_json::to_string_pretty(&history)?)?;
        Ok(message)
    }

    /// Rotates the active file into a timestamped archive. Missing or empty
    /// files make the operation a successful no-op.
    pub async fn archive_active_conversation(
        &self,
        user_email: Option<&str>,
    ) -> Result<String, AppError> {
        let lock = self.user_lock(user_email).await;
        let _guard = lock.lock().await;

        let active_path = self.active_conversation_path(user_email);
        let empty = fs::metadata(&active_path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        if empty {
            return Ok("No active conversation to archive or it's empty.".to_string());
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive_filename = match user_email {
            Some(email) => format!("{}_conversation_{stamp}.json", user_hash(email)),
            None => format!("conversation_{stamp}.json"),
        };
        let archive_path = self.conversations_dir.join(&archive_filename);
        fs::rename(&active_path, &archive_path).map_err(|err| {
            warn!(error = %err, "Failed to archive conversation");
            AppError::Io(err)
        })?;

        Ok(format!("Active conversation archived to {archive_filename}"))
    }
}
