use std::{fs, path::{Path, PathBuf}};

use rusqlite::{params, Connection};
use tracing::warn;

use crate::{error::AppError, utils::time::now_utc_iso};

/// Pending evaluation artifact pulled out of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRow {
    pub id: i64,
    pub interaction_id: String,
    pub question: String,
    pub answer: String,
    pub context_chunks: Vec<String>,
}

/// SQLite-backed queue of answer artifacts awaiting offline LLM-as-judge
/// scoring. The UNIQUE constraint on `interaction_id` makes enqueueing
/// idempotent; `processed_at` gates re-processing.
pub struct EvalQueue {
    path: PathBuf,
}

impl EvalQueue {
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

    pub fn init(&self) -> Result<(), AppError> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS eval_queue (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                interaction_id TEXT UNIQUE,
                question       TEXT,
                answer         TEXT,
                context_json   TEXT,
                created_at     TEXT,
                processed_at   TEXT
            )",
            [],
        )?;
        Ok(())
    }

    /// Enqueues one artifact; returns `true` when a new row was inserted and
    /// `false` for a duplicate `interaction_id`.
    pub fn enqueue(
        &self,
        interaction_id: &str,
        question: &str,
        answer: &str,
        context_chunks: &[String],
    ) -> Result<bool, AppError> {
        let conn = self.open()?;
        let ctx_json = serde_json::to_string(context_chunks)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO eval_queue (
                interaction_id, question, answer, context_json, created_at, processed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![interaction_id, question, answer, ctx_json, now_utc_iso()],
        )?;
        Ok(changed > 0)
    }

    /// Pending rows in ascending id order, up to `limit`. `context_json` is
    /// parsed best-effort; invalid JSON yields an empty chunk list.
    pub fn fetch_pending(&self, limit: usize) -> Result<Vec<EvalRow>, AppError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, interaction_id, question, answer, context_json
             FROM eval_queue
             WHERE processed_at IS NULL
             ORDER BY id ASC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            let id: i64 = row.get(0)?;
            let interaction_id: String = row.get(1)?;
            let question: Option<String> = row.get(2)?;
            let answer: Option<String> = row.get(3)?;
            let context_json: Option<String> = row.get(4)?;
            Ok((id, interaction_id, question, answer, context_json))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (id, interaction_id, question, answer, context_json) = row?;
            let context_chunks = context_json
                .as_deref()
                .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                .unwrap_or_else(|| {
                    if context_json.is_some() {
                        warn!(row_id = id, "Invalid context_json in eval queue row");
                    }
                    Vec::new()
                });
            pending.push(EvalRow {
                id,
                interaction_id,
                question: question.unwrap_or_default(),
                answer: answer.unwrap_or_default(),
                context_chunks,
            });
        }
        Ok(pending)
    }

    /// Stamps `processed_at` for all handled ids in a single statement.
    pub fn mark_processed(&self, row_ids: &[i64], processed_at: &str) -> Result<(), AppError> {
        if row_ids.is_empty() {
            return Ok(());
        }
        let conn = self.open()?;
        let placeholders = row_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        let sql =
            format!("UPDATE eval_queue SET processed_at = ? WHERE id IN ({placeholders})");
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(row_ids.len().saturating_add(1));
        values.push(&processed_at);
        for id in row_ids {
            values.push(id);
        }
        conn.execute(&sql, values.as_slice())?;
        Ok(())
    }
}
