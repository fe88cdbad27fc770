use std::path::PathBuf;

use clap::Parser;
use common::{llm::embeddings::OpenAiEmbeddings, storage::chunks::read_chunks, utils::config::get_config};
use ingestion_pipeline::ingest;
use retrieval_pipeline::vector::VectorIndex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Seeds the retrieval corpus: incremental document ingestion into
/// chunks.jsonl plus a fresh vector index build.
#[derive(Debug, Parser)]
#[command(name = "seed")]
struct Args {
    /// Directory holding source documents (.pdf, .txt, .md)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Output directory for the chunk store, manifest, and vector index
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Skip the embedding step and only rebuild chunks.jsonl + manifest
    #[arg(long, default_value_t = false)]
    chunks_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config()?;

    let data_dir = args
        .data_dir
        .unwrap_or_else(|| PathBuf::from(&config.paths.seed_data_dir));
    let index_dir = args
        .index_dir
        .unwrap_or_else(|| PathBuf::from(&config.paths.faiss_index_dir));
    let workspace_root = std::env::current_dir()?;

    let outcome = {
        let data_dir = data_dir.clone();
        let index_dir = index_dir.clone();
        tokio::task::spawn_blocking(move || ingest(&data_dir, &index_dir, &workspace_root))
            .await??
    };
    info!(
        total = outcome.total_chunks,
        preserved = outcome.preserved_chunks,
        new = outcome.new_chunks,
        deleted = outcome.deleted_files,
        "Ingestion complete"
    );

    if args.chunks_only {
        return Ok(());
    }

    let embeddings = OpenAiEmbeddings::from_config(&config)?;
    let chunks = read_chunks(&index_dir.join("chunks.jsonl"))?;
    let index = VectorIndex::build(&chunks, &embeddings, &config.embeddings.name, &index_dir).await?;
    info!(
        vectors = index.len(),
        dimension = index.manifest().dimension,
        "Vector index built"
    );

    Ok(())
}
