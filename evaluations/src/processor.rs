use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use common::{
    error::AppError,
    llm::ChatModel,
    storage::eval_queue::EvalQueue,
    trace::TraceSink,
    utils::time::now_utc_iso,
};

use crate::relevance::evaluate_relevance;

/// Summary of one processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalSummary {
    pub fetched: usize,
    pub processed: usize,
}

/// Offline processor for the eval queue.
///
/// Runs out-of-band from the request path: pulls pending rows, judges each
/// answer's relevance, mirrors the score to the trace sink best-effort, and
/// stamps every handled row processed in one statement. A judge failure
/// scores 0.0 but still marks the row so it is never retried forever.
pub struct EvalProcessor {
    queue: Arc<EvalQueue>,
    model: Arc<dyn ChatModel>,
    model_name: String,
    system_prompt: String,
    trace: Arc<dyn TraceSink>,
}

impl EvalProcessor {
    pub fn new(
        queue: Arc<EvalQueue>,
        model: Arc<dyn ChatModel>,
        model_name: String,
        system_prompt: String,
        trace: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            queue,
            model,
            model_name,
            system_prompt,
            trace,
        }
    }

    #[tracing::instrument(skip_all, fields(limit))]
    pub async fn process_pending(&self, limit: usize) -> Result<EvalSummary, AppError> {
        let rows = self.queue.fetch_pending(limit)?;
        let fetched = rows.len();
        let mut processed_ids = Vec::with_capacity(fetched);

        for row in rows {
            let score = evaluate_relevance(
                self.model.as_ref(),
                &self.model_name,
                &self.system_prompt,
                &row.question,
                &row.context_chunks,
                &row.answer,
            )
            .await;

            self.trace
                .score(&row.interaction_id, "relevance", score, "offline-queue");
            self.trace.update(
                &row.interaction_id,
                json!({ "relevance": score, "eval_offline": true }),
            );

            processed_ids.push(row.id);
        }

        if !processed_ids.is_empty() {
            if let Err(err) = self.queue.mark_processed(&processed_ids, &now_utc_iso()) {
                // Unmarked rows are retried on the next run.
                warn!(error = %err, ids = ?processed_ids, "Failed to mark eval rows processed");
            }
        }

        let summary = EvalSummary {
            fetched,
            processed: processed_ids.len(),
        };
        info!(fetched = summary.fetched, processed = summary.processed, "Eval run complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{llm::ChatMessage, trace::LogTraceSink};

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

    fn processor(
        dir: &tempfile::TempDir,
        judge: &'static str,
    ) -> (Arc<EvalQueue>, EvalProcessor) {
        let queue = Arc::new(EvalQueue::new(dir.path().join("db.sqlite")));
        queue.init().expect("init");
        let processor = EvalProcessor::new(
            Arc::clone(&queue),
            Arc::new(ScriptedJudge(judge)),
            "judge-model".to_string(),
            "score strictly".to_string(),
            Arc::new(LogTraceSink),
        );
        (queue, processor)
    }

    #[tokio::test]
    async fn processes_and_marks_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, processor) = processor(&dir, r#"{"relevance": 0.9}"#);
        queue
            .enqueue("id-1", "q1", "a1", &["c1".to_string()])
            .expect("enqueue");
        queue.enqueue("id-2", "q2", "a2", &[]).expect("enqueue");

        let summary = processor.process_pending(50).await.expect("run");
        assert_eq!(summary, EvalSummary { fetched: 2, processed: 2 });
        assert!(queue.fetch_pending(10).expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn judge_failure_still_marks_processed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, processor) = processor(&dir, "not json");
        queue.enqueue("id-1", "q1", "a1", &[]).expect("enqueue");

        let summary = processor.process_pending(50).await.expect("run");
        assert_eq!(summary.processed, 1);
        assert!(queue.fetch_pending(10).expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn respects_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (queue, processor) = processor(&dir, r#"{"relevance": 0.5}"#);
        for i in 0..4 {
            queue
                .enqueue(&format!("id-{i}"), "q", "a", &[])
                .expect("enqueue");
        }

        let summary = processor.process_pending(2).await.expect("run");
        assert_eq!(summary.fetched, 2);
        assert_eq!(queue.fetch_pending(10).expect("fetch").len(), 2);
    }
}
