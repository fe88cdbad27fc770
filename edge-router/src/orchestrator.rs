use std::{collections::HashMap, sync::Arc};

use tracing::{error, info, warn};

use common::schema::error_response;

use crate::{
    classifier::{MessageCategory, MessageClassifier},
    pipelines::{Pipeline, PipelineContext},
    services::history::{generate_interaction_id, HistoryManager},
};

const ORCHESTRATOR_ERROR_MESSAGE: &str = "I apologize, but I encountered an unexpected issue \
processing your request. Please try again.";

/// Result of one orchestrated turn.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub response_content: String,
    pub interaction_id: String,
}

/// Central router for user requests: classification, pipeline dispatch,
/// conversation persistence, and error standardization.
///
/// Holds a category-to-pipeline map instead of pipeline inheritance; adding a
/// category means registering another [`Pipeline`] implementation.
pub struct Orchestrator {
    classifier: MessageClassifier,
    pipelines: HashMap<MessageCategory, Arc<dyn Pipeline>>,
    history: Arc<HistoryManager>,
}

impl Orchestrator {
    pub fn new(
        classifier: MessageClassifier,
        pipelines: HashMap<MessageCategory, Arc<dyn Pipeline>>,
        history: Arc<HistoryManager>,
    ) -> Self {
        info!(pipelines = pipelines.len(), "Orchestrator initialized");
        Self {
            classifier,
            pipelines,
            history,
        }
    }

    /// Processes one turn end to end. Never fails the HTTP layer: every
    /// internal error becomes a standardized error JSON carrying the turn's
    /// interaction id.
    #[tracing::instrument(skip_all, fields(location_id = %location_id))]
    pub async fn process(
        &self,
        message: &str,
        token: &str,
        location_id: &str,
        user_email: Option<&str>,
    ) -> ProcessOutcome {
        let interaction_id = generate_interaction_id();

        if let Err(err) = self
            .history
            .save_message(&interaction_id, "user", message, user_email)
            .await
        {
            warn!(error = %err, "Failed to persist user message");
        }

        let category = self.classifier.classify(message).await;

        let response_content = if category == MessageCategory::Other {
            info!(interaction_id = %interaction_id, "Handled unsupported query with direct rejection");
            self.classifier.rejection_response(&interaction_id)
        } else {
            match self.pipelines.get(&category) {
                Some(pipeline) => {
                    info!(pipeline = pipeline.name(), %category, "Routing to pipeline");
                    let ctx = PipelineContext {
                        message: message.to_string(),
                        token: token.to_string(),
                        location_id: location_id.to_string(),
                        user_email: user_email.map(str::to_string),
                        interaction_id: interaction_id.clone(),
                    };
                    match pipeline.process(&ctx).await {
                        Ok(content) => content,
                        Err(err) => {
                            error!(error = %err, pipeline = pipeline.name(), "Pipeline failed");
                            error_response(ORCHESTRATOR_ERROR_MESSAGE, &interaction_id)
                        }
                    }
                }
                None => {
                    error!(%category, "No pipeline registered for category");
                    error_response(ORCHESTRATOR_ERROR_MESSAGE, &interaction_id)
                }
            }
        };

        if let Err(err) = self
            .history
            .save_message(&interaction_id, "assistant", &response_content, user_email)
            .await
        {
            warn!(error = %err, "Failed to persist assistant message");
        }

        ProcessOutcome {
            response_content,
            interaction_id,
        }
    }
}
