use std::sync::Arc;

use common::{
    llm::{ChatModel, OpenAiChat, ToolChatModel},
    utils::config::get_config,
};
use edge_router::{
    edge_routes, integrator::MockIntegratorClient, services::scheduler::start_feedback_scheduler,
    state::EdgeState,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let client = Arc::new(OpenAiChat::from_config(&config)?);
    let chat: Arc<dyn ChatModel> = Arc::clone(&client) as Arc<dyn ChatModel>;
    let tool_chat: Arc<dyn ToolChatModel> = client;

    // The mock integrator keeps local runs and demos credential-free; real
    // integrations implement the same trait and swap in here.
    let integrator = Arc::new(MockIntegratorClient::new());

    let state = EdgeState::new(config.clone(), chat, tool_chat, integrator)?;

    // Daily feedback mirror; single instance, coalesced triggers.
    let _scheduler = start_feedback_scheduler(Arc::clone(&state.sync));

    let app = edge_routes(state);
    let serve_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting edge server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
