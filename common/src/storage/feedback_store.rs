use std::{fs, path::{Path, PathBuf}};

use rusqlite::{params, Connection};
use tracing::debug;

use crate::{error::AppError, schema::feedback::FeedbackItem, utils::time::now_utc_iso};

/// SQLite-backed feedback store. The PRIMARY KEY on `feedback_id` makes batch
/// ingestion idempotent: conflicting rows are counted, never raised.
pub struct FeedbackStore {
    path: PathBuf,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Connection::open(&self.path)?)
    }

    /// Creates the feedback table when absent. Called once at startup.
    pub fn init(&self) -> Result<(), AppError> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback (
                feedback_id    TEXT PRIMARY KEY,
                interaction_id TEXT,
                score          INTEGER,
                label          TEXT,
                comment        TEXT,
                created_at     TEXT,
                inserted_at    TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Inserts a batch inside one transaction and returns
    /// `(accepted, duplicates)`; the two always sum to the batch length.
    pub fn upsert_batch(&self, items: &[FeedbackItem]) -> Result<(usize, usize), AppError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let now_iso = now_utc_iso();

        let mut accepted = 0usize;
        let mut duplicates = 0usize;
        for item in items {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO feedback (
                    feedback_id, interaction_id, score, label, comment, created_at, inserted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.feedback_id,
                    item.interaction_id,
                    item.score,
                    item.label.as_str(),
                    item.comment,
                    item.created_at,
                    now_iso,
                ],
            )?;
            if changed > 0 {
                accepted = accepted.saturating_add(1);
            } else {
                duplicates = duplicates.saturating_add(1);
            }
        }
        tx.commit()?;

        debug!(accepted, duplicates, "Feedback batch ingested");
        Ok((accepted, duplicates))
    }

    /// Total stored rows, used by tests and health diagnostics.
    pub fn count(&self) -> Result<usize, AppError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
