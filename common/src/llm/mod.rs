pub mod embeddings;

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessage,
        ChatCompletionToolArgs, ChatCompletionToolChoiceOption, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;

use crate::{
    error::AppError,
    utils::config::{resolve_api_key, AppConfig},
};

/// Chat turn handed to a [`ChatModel`]. Only the roles the pipelines actually
/// emit are modeled; tool plumbing has its own types below.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Tool schema advertised to the model during a device-control turn.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Result of one executed tool call, echoed back on the follow-up turn.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
}

/// Outcome of a tool-enabled turn: either a final message or calls to run.
#[derive(Debug, Clone)]
pub enum ToolTurn {
    Message(String),
    Calls(Vec<ToolCall>),
}

/// Minimal chat capability: messages in, text out. `json_object` asks the
/// provider for a strict JSON object where supported; providers that ignore
/// the hint still work because callers re-validate the payload.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json_object: bool,
    ) -> Result<String, AppError>;
}

/// Chat capability with OpenAI-style tool use, kept wire-format free so the
/// device-control pipeline can be tested with scripted fakes.
#[async_trait]
pub trait ToolChatModel: ChatModel {
    /// First pass: system + user with tool schemas and `tool_choice=auto`.
    async fn invoke_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ToolTurn, AppError>;

    /// Follow-up pass: `[system, assistant-with-tool-calls, ...tool outputs]`.
    async fn follow_up(
        &self,
        model: &str,
        system: &str,
        calls: &[ToolCall],
        outputs: &[ToolOutput],
    ) -> Result<String, AppError>;
}

/// OpenAI-compatible chat client. Nebius exposes the same API surface, so a
/// single client type covers both configured providers.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
}

impl OpenAiChat {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let api_key = resolve_api_key(config.llm.provider)?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&config.llm.base_url);
        Ok(Self {
            client: Client::with_config(openai_config),
        })
    }

    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    fn request_messages(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|message| match message.role {
                ChatRole::System => {
                    ChatCompletionRequestSystemMessage::from(message.content.as_str()).into()
                }
                ChatRole::User => {
                    ChatCompletionRequestUserMessage::from(message.content.as_str()).into()
                }
            })
            .collect()
    }

    fn tool_definitions(
        tools: &[ToolSpec],
    ) -> Result<Vec<async_openai::types::ChatCompletionTool>, AppError> {
        tools
            .iter()
            .map(|tool| {
                let function = FunctionObjectArgs::default()
                    .name(&tool.name)
                    .description(&tool.description)
                    .parameters(tool.parameters.clone())
                    .build()?;
                Ok(ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()?)
            })
            .collect()
    }

    fn response_tool_calls(calls: &[ToolCall]) -> Vec<ChatCompletionMessageToolCall> {
        calls
            .iter()
            .map(|call| ChatCompletionMessageToolCall {
                id: call.id.clone(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect()
    }

    fn first_content(
        response: async_openai::types::CreateChatCompletionResponse,
    ) -> Result<String, AppError> {
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        json_object: bool,
    ) -> Result<String, AppError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(model)
            .messages(Self::request_messages(messages));
        if json_object {
            builder.response_format(ResponseFormat::JsonObject);
        }
        let request = builder.build()?;

        let response = self.client.chat().create(request).await?;
        Self::first_content(response)
    }
}

#[async_trait]
impl ToolChatModel for OpenAiChat {
    async fn invoke_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ToolTurn, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(Self::request_messages(messages))
            .tools(Self::tool_definitions(tools)?)
            .tool_choice(ChatCompletionToolChoiceOption::Auto)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let Some(choice) = response.choices.first() else {
            return Err(AppError::LLMParsing("LLM response had no choices".into()));
        };

        if let Some(tool_calls) = choice.message.tool_calls.as_ref() {
            if !tool_calls.is_empty() {
                let calls = tool_calls
                    .iter()
                    .map(|call| ToolCall {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                    })
                    .collect();
                return Ok(ToolTurn::Calls(calls));
            }
        }

        choice
            .message
            .content
            .clone()
            .map(ToolTurn::Message)
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }

    async fn follow_up(
        &self,
        model: &str,
        system: &str,
        calls: &[ToolCall],
        outputs: &[ToolOutput],
    ) -> Result<String, AppError> {
        let assistant = ChatCompletionRequestAssistantMessageArgs::default()
            .tool_calls(Self::response_tool_calls(calls))
            .build()?;

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(
            outputs.len().saturating_add(2),
        );
        messages.push(ChatCompletionRequestSystemMessage::from(system).into());
        messages.push(assistant.into());
        for output in outputs {
            messages.push(
                ChatCompletionRequestToolMessageArgs::default()
                    .content(output.content.as_str())
                    .tool_call_id(&output.tool_call_id)
                    .build()?
                    .into(),
            );
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Self::first_content(response)
    }
}

/// Runs a chat invocation under the configured hard deadline, mapping elapsed
/// deadlines to [`AppError::Timeout`] so the HTTP layer can answer with a
/// standardized 500 body.
pub async fn invoke_with_deadline(
    model: &dyn ChatModel,
    model_name: &str,
    messages: &[ChatMessage],
    json_object: bool,
    timeout: Duration,
) -> Result<String, AppError> {
    match tokio::time::timeout(timeout, model.invoke(model_name, messages, json_object)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "LLM call exceeded {}ms",
            timeout.as_millis()
        ))),
    }
}
