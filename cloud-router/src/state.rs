use std::sync::Arc;

use common::{
    storage::{eval_queue::EvalQueue, feedback_store::FeedbackStore},
    trace::TraceSink,
    utils::config::AppConfig,
};
use retrieval_pipeline::RetrievalEngine;

use crate::chain::RagChain;

#[derive(Clone)]
pub struct CloudState {
    pub config: AppConfig,
    pub engine: Arc<RetrievalEngine>,
    pub chain: Arc<RagChain>,
    pub trace: Arc<dyn TraceSink>,
    pub eval_queue: Arc<EvalQueue>,
    pub feedback_store: Arc<FeedbackStore>,
}

impl CloudState {
    pub fn new(
        config: AppConfig,
        engine: Arc<RetrievalEngine>,
        chain: Arc<RagChain>,
        trace: Arc<dyn TraceSink>,
    ) -> Result<Self, common::error::AppError> {
        let eval_queue = EvalQueue::new(&config.paths.db_path);
        eval_queue.init()?;
        let feedback_store = FeedbackStore::new(&config.paths.db_path);
        feedback_store.init()?;

        Ok(Self {
            config,
            engine,
            chain,
            trace,
            eval_queue: Arc::new(eval_queue),
            feedback_store: Arc::new(feedback_store),
        })
    }
}
