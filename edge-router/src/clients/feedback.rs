use std::time::Duration;

use serde_json::{json, Value};

use common::{error::AppError, schema::feedback::FeedbackItem};

const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Acknowledgment counts returned by the cloud sync endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncAck {
    pub accepted: usize,
    pub duplicates: usize,
}

/// Edge-to-cloud feedback batch client with a short protective timeout.
pub struct FeedbackSyncClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl FeedbackSyncClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: SYNC_TIMEOUT,
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// POSTs one batch; on HTTP 200 returns the `(accepted, duplicates)`
    /// counts from the response body.
    pub async fn post_batch(&self, items: &[FeedbackItem]) -> Result<SyncAck, AppError> {
        let url = format!("{}/api/feedback/sync", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "items": items }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::Timeout(format!(
                        "Feedback sync timed out after {:.1}s",
                        self.timeout.as_secs_f64()
                    ))
                } else {
                    AppError::Processing(format!("Network error during feedback sync: {err}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            AppError::Processing(format!("Failed to read sync response: {err}"))
        })?;
        if !status.is_success() {
            return Err(AppError::Processing(format!(
                "Feedback sync HTTP {status}: {body}"
            )));
        }

        let value: Value = serde_json::from_str(&body).map_err(|err| {
            AppError::Processing(format!("Invalid JSON from feedback sync: {err}"))
        })?;
        Ok(SyncAck {
            accepted: value
                .get("accepted")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            duplicates: value
                .get("duplicates")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
        })
    }
}
