use std::time::Duration;

use serde_json::{json, Value};

use common::{error::AppError, utils::config::AppConfig};

/// Edge-to-cloud RAG client.
///
/// The timeout here is the hard edge-side deadline (~1.5 s): the
/// energy-efficiency pipeline must fall back to the local model rather than
/// hold a device-control-capable session hostage to a slow cloud. Timeouts
/// surface as [`AppError::Timeout`] so callers can distinguish them from
/// HTTP or payload failures.
pub struct RagClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RagClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.cloud_rag.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs_f64(config.cloud_rag.timeout_s.max(0.0)),
        }
    }

    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// POSTs the question and returns the parsed JSON payload on HTTP 200.
    pub async fn post_answer(
        &self,
        question: &str,
        interaction_id: &str,
        top_k: usize,
    ) -> Result<Value, AppError> {
        let url = format!("{}/api/rag/answer", self.base_url);
        let payload = json!({
            "question": question,
            "interactionId": interaction_id,
            "topK": top_k,
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::Timeout(format!(
                        "Cloud RAG request timed out after {:.1}s",
                        self.timeout.as_secs_f64()
                    ))
                } else {
                    AppError::Processing(format!("Network error calling Cloud RAG: {err}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            AppError::Processing(format!("Failed to read Cloud RAG response: {err}"))
        })?;
        if !status.is_success() {
            return Err(AppError::Processing(format!(
                "Cloud RAG HTTP {status}: {body}"
            )));
        }

        serde_json::from_str(&body).map_err(|err| {
            let preview: String = body.chars().take(200).collect();
            AppError::Processing(format!("Invalid JSON from Cloud RAG: {err}: body={preview}"))
        })
    }
}
