pub mod device_control;
pub mod energy_efficiency;

use async_trait::async_trait;

/// Everything a pipeline needs to process one turn.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub message: String,
    pub token: String,
    pub location_id: String,
    pub user_email: Option<String>,
    pub interaction_id: String,
}

/// A routed message handler. Implementations convert their own failures into
/// standardized error JSON so the returned string is always a renderable
/// response body; only truly unexpected conditions surface as `Err` for the
/// orchestrator to standardize.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &'static str;
    async fn process(&self, ctx: &PipelineContext) -> Result<String, common::error::AppError>;
}

/// Suffix appended to every pipeline system prompt so the model echoes the
/// turn's interaction id in its JSON response.
pub fn interaction_id_suffix(interaction_id: &str) -> String {
    format!(
        "\n\nFor this conversation turn, use this interactionId in your JSON response: {interaction_id}\n"
    )
}
