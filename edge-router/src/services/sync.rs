use std::{fs, path::PathBuf};

use serde_json::{json, Value};
use tracing::info;

use common::{
    error::AppError,
    schema::feedback::{FeedbackItem, FeedbackLabel},
    utils::time::parse_iso,
};

use crate::clients::feedback::FeedbackSyncClient;

const SYNC_STATE_FILENAME: &str = "feedback_sync_state.json";
const POSITIVE_FILENAME: &str = "feedback/positive_feedback.json";
const NEGATIVE_FILENAME: &str = "feedback/negative_feedback.json";

/// Counters reported by one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub sent: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

/// Daily edge-to-cloud feedback mirror with a monotonic checkpoint.
///
/// The checkpoint advances only after the cloud acknowledged a batch, so a
/// failed run re-sends the same window; the cloud store's idempotent ids make
/// the retry safe.
pub struct FeedbackSyncService {
    user_data_dir: PathBuf,
    client: FeedbackSyncClient,
}

impl FeedbackSyncService {
    pub fn new(user_data_dir: &std::path::Path, client: FeedbackSyncClient) -> Self {
        Self {
            user_data_dir: user_data_dir.to_path_buf(),
            client,
        }
    }

    fn state_path(&self) -> PathBuf {
        self.user_data_dir.join(SYNC_STATE_FILENAME)
    }

    fn read_json_array(&self, relative: &str) -> Vec<Value> {
        let Ok(raw) = fs::read_to_string(self.user_data_dir.join(relative)) else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Reads the checkpoint; missing or malformed state is a fresh start.
    pub fn read_checkpoint(&self) -> Option<String> {
        let raw = fs::read_to_string(self.state_path()).ok()?;
        let value: Value = serde_json::from_str(&raw).ok()?;
        value
            .get("last_synced_at")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn write_checkpoint(&self, last_synced_at: &str) -> Result<(), AppError> {
        fs::create_dir_all(&self.user_data_dir)?;
        fs::write(
            self.state_path(),
            serde_json::to_string_pretty(&json!({ "last_synced_at": last_synced_at }))?,
        )?;
        Ok(())
    }

    fn load_normalized(&self) -> Vec<FeedbackItem> {
        let positive = self.read_json_array(POSITIVE_FILENAME);
        let negative = self.read_json_array(NEGATIVE_FILENAME);

        let mut items = Vec::with_capacity(positive.len().saturating_add(negative.len()));
        for (idx, raw) in positive.iter().enumerate() {
            items.push(FeedbackItem::normalize(raw, FeedbackLabel::Positive, idx));
        }
        for (idx, raw) in negative.iter().enumerate() {
            items.push(FeedbackItem::normalize(raw, FeedbackLabel::Negative, idx));
        }
        items
    }

    /// Items strictly newer than the checkpoint; unparseable timestamps on
    /// either side count as new so nothing is lost.
    fn filter_new(items: Vec<FeedbackItem>, checkpoint: Option<&str>) -> Vec<FeedbackItem> {
        let Some(checkpoint) = checkpoint.and_then(parse_iso) else {
            return items;
        };
        items
            .into_iter()
            .filter(|item| match parse_iso(&item.created_at) {
                Some(created_at) => created_at > checkpoint,
                None => true,
            })
            .collect()
    }

    /// One sync run. Returns zeros and leaves the checkpoint untouched when
    /// nothing new exists; network failures propagate to the scheduler.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&self) -> Result<SyncSummary, AppError> {
        let checkpoint = self.read_checkpoint();
        let all_items = self.load_normalized();
        let total = all_items.len();
        let new_items = Self::filter_new(all_items, checkpoint.as_deref());
        let skipped = total.saturating_sub(new_items.len());

        if new_items.is_empty() {
            return Ok(SyncSummary {
                skipped,
                ..SyncSummary::default()
            });
        }

        let ack = self.client.post_batch(&new_items).await?;

        // High-water mark: prefer parseable timestamps, fall back to the
        // lexicographic maximum of the raw strings.
        let newest = new_items
            .iter()
            .filter_map(|item| parse_iso(&item.created_at).map(|ts| (ts, &item.created_at)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, raw)| raw.clone())
            .or_else(|| new_items.iter().map(|item| item.created_at.clone()).max());
        if let Some(newest) = newest {
            self.write_checkpoint(&newest)?;
        }

        let summary = SyncSummary {
            sent: new_items.len(),
            accepted: ack.accepted,
            duplicates: ack.duplicates,
            skipped,
        };
        info!(
            sent = summary.sent,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "Feedback sync complete"
        );
        Ok(summary)
    }
}
