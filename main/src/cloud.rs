use std::{path::Path, sync::Arc, time::Duration};

use cloud_router::{chain::RagChain, cloud_routes, state::CloudState};
use common::{
    llm::{embeddings::OpenAiEmbeddings, ChatModel, OpenAiChat},
    storage::chunks::read_chunks,
    trace::LogTraceSink,
    utils::config::get_config,
};
use evaluations::EvalProcessor;
use retrieval_pipeline::{
    config::RetrievalConfig, lexical::LexicalIndex, vector::VectorIndex, RetrievalEngine,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EVAL_INTERVAL_SECS: u64 = 600;
const EVAL_BATCH_LIMIT: usize = 50;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config; provider key validation happens inside the client
    // constructors and is fatal here at boot.
    let config = get_config()?;

    let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::from_config(&config)?);
    let embeddings = Arc::new(OpenAiEmbeddings::from_config(&config)?);

    // Indexes are built/loaded once and read-only at request time.
    let index_dir = Path::new(&config.paths.faiss_index_dir);
    let chunks = read_chunks(&index_dir.join("chunks.jsonl"))?;
    let vector = VectorIndex::load(index_dir, &chunks, embeddings.as_ref()).await?;
    let lexical = LexicalIndex::from_chunk_store(&index_dir.join("chunks.jsonl"))?;
    if lexical.is_none() {
        warn!("Lexical index unavailable; hybrid retrieval will degrade to semantic-only");
    }

    let rerank_model = config
        .rerank
        .enabled
        .then(|| (Arc::clone(&chat), config.llm.model.clone()));
    let engine = Arc::new(RetrievalEngine::new(
        vector,
        lexical,
        embeddings,
        rerank_model,
        RetrievalConfig::from_app(&config),
    ));

    let chain = Arc::new(RagChain::new(&config, Arc::clone(&chat)));
    let trace = Arc::new(LogTraceSink);
    let state = CloudState::new(config.clone(), engine, chain, trace.clone())?;

    // Offline relevance scoring stays off the request path.
    let processor = EvalProcessor::new(
        Arc::clone(&state.eval_queue),
        Arc::clone(&chat),
        config.llm.model.clone(),
        evaluations::relevance::load_system_prompt(Path::new(&config.paths.prompt_dir)),
        trace,
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(EVAL_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            match processor.process_pending(EVAL_BATCH_LIMIT).await {
                Ok(summary) => {
                    if summary.fetched > 0 {
                        info!(fetched = summary.fetched, processed = summary.processed, "Eval batch done");
                    }
                }
                Err(err) => warn!(error = %err, "Eval batch failed"),
            }
        }
    });

    let app = cloud_routes(state);
    let serve_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting cloud server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
