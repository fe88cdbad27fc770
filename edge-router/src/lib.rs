use axum::{
    routing::{get, post},
    Router,
};

pub mod classifier;
pub mod clients;
pub mod error;
pub mod integrator;
pub mod orchestrator;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod tools;
mod routes;

use routes::{
    context::update_location_context,
    feedback::{feedback_stats, submit_feedback},
    prompt::{handle_prompt, reset_conversation},
};
use state::EdgeState;

/// Router for the edge tier: prompt/reset, context + daily digest, and
/// feedback capture endpoints.
pub fn edge_routes(state: EdgeState) -> Router {
    Router::new()
        .route("/api/prompt", post(handle_prompt))
        .route("/api/reset", post(reset_conversation))
        .route("/api/context", post(update_location_context))
        .route("/api/feedback/{kind}", post(submit_feedback))
        .route("/api/feedback/{kind}/stats", get(feedback_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use common::{
        error::AppError,
        llm::{ChatMessage, ChatModel, ToolCall, ToolChatModel, ToolOutput, ToolSpec, ToolTurn},
        schema::EnergyEfficiencyResponse,
        utils::config::AppConfig,
    };

    use crate::integrator::MockIntegratorClient;

    /// One stub serving both seams: classification prompts get a category,
    /// everything else gets a schema-valid efficiency answer carrying the
    /// interaction id found in the system prompt.
    struct EdgeStub {
        category: &'static str,
    }

    fn interaction_id_from(messages: &[ChatMessage]) -> String {
        messages
            .first()
            .and_then(|m| m.content.split("interactionId in your JSON response: ").nth(1))
            .map(|rest| rest.trim().trim_end_matches('\n').to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[async_trait]
    impl ChatModel for EdgeStub {
        async fn invoke(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
            if system.contains("Classify the user message") {
                return Ok(self.category.to_string());
            }
            Ok(json!({
                "message": "Lower your thermostat by two degrees.",
                "interactionId": interaction_id_from(messages),
                "type": "text",
                "content": []
            })
            .to_string())
        }
    }

    #[async_trait]
    impl ToolChatModel for EdgeStub {
        async fn invoke_with_tools(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ToolTurn, AppError> {
            Ok(ToolTurn::Message(
                json!({
                    "message": "Device handled.",
                    "interactionId": interaction_id_from(messages),
                    "type": "text",
                    "content": []
                })
                .to_string(),
            ))
        }

        async fn follow_up(
            &self,
            _model: &str,
            _system: &str,
            _calls: &[ToolCall],
            _outputs: &[ToolOutput],
        ) -> Result<String, AppError> {
            Ok("follow-up".to_string())
        }
    }

    fn edge_state(dir: &tempfile::TempDir, category: &'static str) -> EdgeState {
        let mut config = AppConfig::default();
        config.paths.user_data_dir = dir.path().join("user_data").display().to_string();
        config.paths.prompt_dir = "/nonexistent".to_string();
        // Keep the cloud out of unit tests: unreachable endpoint, tiny timeout.
        config.cloud_rag.base_url = "http://127.0.0.1:1".to_string();
        config.cloud_rag.timeout_s = 0.05;

        let stub = Arc::new(EdgeStub { category });
        EdgeState::new(
            config,
            Arc::clone(&stub) as Arc<dyn ChatModel>,
            stub,
            Arc::new(MockIntegratorClient::new()),
        )
        .expect("edge state")
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    #[tokio::test]
    async fn prompt_routes_through_efficiency_pipeline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = edge_state(&dir, "ENERGY_EFFICIENCY");
        let app = edge_routes(state);

        let (status, body) = send(
            app,
            "POST",
            "/api/prompt?message=how%20to%20save%20energy&token=t&location_id=loc-1&user_email=user%40example.com",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response = EnergyEfficiencyResponse::validate(&body).expect("schema body");
        assert_eq!(response.response_type, "text");
        assert!(!response.interaction_id.is_empty());
    }

    #[tokio::test]
    async fn prompt_rejects_other_queries_without_pipeline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = edge_state(&dir, "OTHER_QUERIES");
        let app = edge_routes(state);

        let (status, body) = send(
            app,
            "POST",
            "/api/prompt?message=tell%20me%20a%20joke&token=t&location_id=loc-1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "text");
        assert!(body["content"].as_array().expect("list").is_empty());
    }

    #[tokio::test]
    async fn feedback_flow_validates_then_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = edge_state(&dir, "ENERGY_EFFICIENCY");
        let app = edge_routes(state.clone());

        // Unknown interaction is a 400.
        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/feedback/positive?interaction_id=missing&user_email=user%40example.com",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["response"], "error");

        // Create a turn, then feedback on it succeeds.
        let (_, prompt_body) = send(
            app.clone(),
            "POST",
            "/api/prompt?message=hi&token=t&location_id=loc-1&user_email=user%40example.com",
        )
        .await;
        let interaction_id = prompt_body["interactionId"].as_str().expect("id").to_string();

        let (status, body) = send(
            app.clone(),
            "POST",
            &format!(
                "/api/feedback/positive?interaction_id={interaction_id}&user_email=user%40example.com"
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "ok");
        assert!(body["feedback_id"].is_string());

        let (status, body) = send(app, "GET", "/api/feedback/positive/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_positive_feedback"], 1);
    }

    #[tokio::test]
    async fn reset_is_ok_even_without_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = edge_state(&dir, "ENERGY_EFFICIENCY");
        let app = edge_routes(state);

        let (status, body) = send(app, "POST", "/api/reset?user_email=user%40example.com").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "ok");
    }

    #[tokio::test]
    async fn context_injects_digest_once_per_day() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = edge_state(&dir, "ENERGY_EFFICIENCY");
        let app = edge_routes(state.clone());

        let uri = "/api/context?token=t&location_id=loc-1&user_email=user%40example.com";
        let (status, body) = send(app.clone(), "POST", uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "dailyReport");

        // The digest landed in the conversation as an assistant message.
        let history = state.history.load_history(Some("user@example.com"));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "assistant");
        assert!(history[0].content.contains("dailyReport"));

        // Second call the same day yields no digest.
        let (status, body) = send(app, "POST", uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_digest_today");
    }
}
