use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use tracing::{error, info, warn};

use common::{
    error::AppError,
    llm::{ChatMessage, ToolChatModel, ToolOutput, ToolTurn},
    schema::error_response,
    utils::config::AppConfig,
};

use crate::{
    pipelines::{interaction_id_suffix, Pipeline, PipelineContext},
    tools::ToolRegistry,
};

const PROMPT_FILE: &str = "device_control_system_prompt.txt";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a smart-home device assistant. Use the available \
tools to list and control the user's devices. After any tool use, answer with a single JSON \
object of the form {\"message\": <string>, \"interactionId\": <string>, \"type\": \"text\" or \
\"devices\" or \"schedule\", \"content\": <list>} and no extra text.";

const PIPELINE_ERROR_MESSAGE: &str = "I apologize, but I encountered an issue processing your \
device control request. Please try again.";

/// Tool-loop pipeline for device control and automation requests.
///
/// Single pass: one tool-enabled call, execution of any requested tools, and
/// one follow-up call whose content is returned verbatim. Individual tool
/// failures become tool messages the model can react to; the pipeline itself
/// never fails the orchestrator over them.
pub struct DeviceControlPipeline {
    model: Arc<dyn ToolChatModel>,
    model_name: String,
    system_prompt: String,
    tools: ToolRegistry,
}

impl DeviceControlPipeline {
    pub fn new(config: &AppConfig, model: Arc<dyn ToolChatModel>, tools: ToolRegistry) -> Self {
        let prompt_path = Path::new(&config.paths.prompt_dir).join(PROMPT_FILE);
        let system_prompt = match std::fs::read_to_string(&prompt_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %prompt_path.display(), error = %err, "Using built-in device prompt");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        };

        Self {
            model,
            model_name: config.llm.models.device_control.clone(),
            system_prompt,
            tools,
        }
    }

    async fn run_turn(&self, ctx: &PipelineContext) -> Result<String, AppError> {
        let system = format!(
            "{}{}",
            self.system_prompt,
            interaction_id_suffix(&ctx.interaction_id)
        );
        let messages = [
            ChatMessage::system(system.clone()),
            ChatMessage::user(ctx.message.clone()),
        ];

        let turn = self
            .model
            .invoke_with_tools(&self.model_name, &messages, &self.tools.tool_specs())
            .await?;

        match turn {
            ToolTurn::Message(content) => {
                info!("No tool calls in response");
                Ok(content)
            }
            ToolTurn::Calls(calls) => {
                info!(tool_call_count = calls.len(), "Processing tool calls");
                let mut outputs = Vec::with_capacity(calls.len());
                for call in &calls {
                    let content = self
                        .tools
                        .execute(&call.name, &call.arguments, &ctx.token, &ctx.location_id)
                        .await;
                    outputs.push(ToolOutput {
                        tool_call_id: call.id.clone(),
                        name: call.name.clone(),
                        content,
                    });
                }

                self.model
                    .follow_up(&self.model_name, &system, &calls, &outputs)
                    .await
            }
        }
    }
}

#[async_trait]
impl Pipeline for DeviceControlPipeline {
    fn name(&self) -> &'static str {
        "device_control"
    }

    async fn process(&self, ctx: &PipelineContext) -> Result<String, AppError> {
        match self.run_turn(ctx).await {
            Ok(content) => Ok(content),
            Err(err) => {
                error!(error = %err, interaction_id = %ctx.interaction_id, "Device pipeline failed");
                Ok(error_response(PIPELINE_ERROR_MESSAGE, &ctx.interaction_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::llm::{ChatModel, ToolCall, ToolSpec};
    use serde_json::Value;
    use std::sync::Mutex;

    use crate::integrator::MockIntegratorClient;

    /// Scripted tool-capable model: first turn requests tool calls, and the
    /// follow-up echoes the tool outputs it received.
    struct ToolScript {
        calls: Vec<ToolCall>,
        followed_up_with: Mutex<Vec<ToolOutput>>,
    }

    #[async_trait]
    impl ChatModel for ToolScript {
        async fn invoke(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _json_object: bool,
        ) -> Result<String, AppError> {
            Err(AppError::InternalError("plain invoke unused".into()))
        }
    }

    #[async_trait]
    impl ToolChatModel for ToolScript {
        async fn invoke_with_tools(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ToolTurn, AppError> {
            if self.calls.is_empty() {
                Ok(ToolTurn::Message("plain answer".to_string()))
            } else {
                Ok(ToolTurn::Calls(self.calls.clone()))
            }
        }

        async fn follow_up(
            &self,
            _model: &str,
            _system: &str,
            _calls: &[ToolCall],
            outputs: &[ToolOutput],
        ) -> Result<String, AppError> {
            *self.followed_up_with.lock().expect("lock") = outputs.to_vec();
            Ok("final answer after tools".to_string())
        }
    }

    fn context() -> PipelineContext {
        PipelineContext {
            message: "turn on the living room light".to_string(),
            token: "token".to_string(),
            location_id: "loc-1".to_string(),
            user_email: Some("user@example.com".to_string()),
            interaction_id: "id-1".to_string(),
        }
    }

    fn pipeline(calls: Vec<ToolCall>) -> (Arc<ToolScript>, DeviceControlPipeline) {
        let mut config = AppConfig::default();
        config.paths.prompt_dir = "/nonexistent".to_string();
        let script = Arc::new(ToolScript {
            calls,
            followed_up_with: Mutex::new(Vec::new()),
        });
        let tools = ToolRegistry::new(Arc::new(MockIntegratorClient::new()));
        let model: Arc<dyn ToolChatModel> = Arc::clone(&script) as Arc<dyn ToolChatModel>;
        let pipeline = DeviceControlPipeline::new(&config, model, tools);
        (script, pipeline)
    }

    #[tokio::test]
    async fn returns_plain_message_without_tools() {
        let (_script, pipeline) = pipeline(Vec::new());
        let response = pipeline.process(&context()).await.expect("process");
        assert_eq!(response, "plain answer");
    }

    #[tokio::test]
    async fn runs_tool_loop_and_returns_followup_verbatim() {
        let calls = vec![ToolCall {
            id: "call-1".to_string(),
            name: "control_device".to_string(),
            arguments: r#"{"device_id": "dev-1", "action": "on"}"#.to_string(),
        }];
        let (script, pipeline) = pipeline(calls);

        let response = pipeline.process(&context()).await.expect("process");
        assert_eq!(response, "final answer after tools");

        let outputs = script.followed_up_with.lock().expect("lock").clone();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].tool_call_id, "call-1");
        let payload: Value = serde_json::from_str(&outputs[0].content).expect("tool json");
        assert_eq!(payload["status"], "success");
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_args_become_tool_messages() {
        let calls = vec![
            ToolCall {
                id: "call-1".to_string(),
                name: "warp_drive".to_string(),
                arguments: "{}".to_string(),
            },
            ToolCall {
                id: "call-2".to_string(),
                name: "control_device".to_string(),
                arguments: "{broken".to_string(),
            },
        ];
        let (script, pipeline) = pipeline(calls);

        pipeline.process(&context()).await.expect("process");
        let outputs = script.followed_up_with.lock().expect("lock").clone();
        assert!(outputs[0].content.contains("unknown tool"));
        assert!(outputs[1].content.contains("invalid JSON arguments"));
    }

    #[tokio::test]
    async fn model_failure_becomes_error_json() {
        struct FailingModel;

        #[async_trait]
        impl ChatModel for FailingModel {
            async fn invoke(
                &self,
                _model: &str,
                _messages: &[ChatMessage],
                _json_object: bool,
            ) -> Result<String, AppError> {
                Err(AppError::Timeout("down".into()))
            }
        }

        #[async_trait]
        impl ToolChatModel for FailingModel {
            async fn invoke_with_tools(
                &self,
                _model: &str,
                _messages: &[ChatMessage],
                _tools: &[ToolSpec],
            ) -> Result<ToolTurn, AppError> {
                Err(AppError::Timeout("down".into()))
            }

            async fn follow_up(
                &self,
                _model: &str,
                _system: &str,
                _calls: &[ToolCall],
                _outputs: &[ToolOutput],
            ) -> Result<String, AppError> {
                Err(AppError::Timeout("down".into()))
            }
        }

        let mut config = AppConfig::default();
        config.paths.prompt_dir = "/nonexistent".to_string();
        let tools = ToolRegistry::new(Arc::new(MockIntegratorClient::new()));
        let pipeline = DeviceControlPipeline::new(&config, Arc::new(FailingModel), tools);

        let response = pipeline.process(&context()).await.expect("standardized");
        let value: Value = serde_json::from_str(&response).expect("json");
        assert_eq!(value["type"], "error");
        assert_eq!(value["interactionId"], "id-1");
    }
}
