use std::{collections::HashMap, path::Path, sync::Arc};

use common::{
    error::AppError,
    llm::{ChatModel, ToolChatModel},
    utils::config::AppConfig,
};

use crate::{
    classifier::{MessageCategory, MessageClassifier},
    clients::feedback::FeedbackSyncClient,
    integrator::Integrator,
    orchestrator::Orchestrator,
    pipelines::{
        device_control::DeviceControlPipeline, energy_efficiency::EnergyEfficiencyPipeline,
        Pipeline,
    },
    services::{
        digest::DigestService, feedback::FeedbackManager, history::HistoryManager,
        sync::FeedbackSyncService,
    },
    tools::ToolRegistry,
};

#[derive(Clone)]
pub struct EdgeState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<HistoryManager>,
    pub feedback: Arc<FeedbackManager>,
    pub digest: Arc<DigestService>,
    pub integrator: Arc<dyn Integrator>,
    pub sync: Arc<FeedbackSyncService>,
}

impl EdgeState {
    /// Composition root for the edge tier: wires the classifier, both
    /// pipelines, session storage, feedback capture, digest tracking, and the
    /// sync service around the injected model and integrator clients.
    pub fn new(
        config: AppConfig,
        chat: Arc<dyn ChatModel>,
        tool_chat: Arc<dyn ToolChatModel>,
        integrator: Arc<dyn Integrator>,
    ) -> Result<Self, AppError> {
        let user_data_dir = Path::new(&config.paths.user_data_dir).to_path_buf();

        let history = Arc::new(HistoryManager::new(&user_data_dir));
        let feedback = Arc::new(FeedbackManager::new(&user_data_dir, Arc::clone(&history)));
        let digest = Arc::new(DigestService::new(&user_data_dir));
        let sync = Arc::new(FeedbackSyncService::new(
            &user_data_dir,
            FeedbackSyncClient::new(&config.cloud_rag.base_url),
        ));

        let classifier = MessageClassifier::new(&config, Arc::clone(&chat));
        let tools = ToolRegistry::new(Arc::clone(&integrator));

        let mut pipelines: HashMap<MessageCategory, Arc<dyn Pipeline>> = HashMap::new();
        pipelines.insert(
            MessageCategory::DeviceControl,
            Arc::new(DeviceControlPipeline::new(&config, tool_chat, tools)),
        );
        pipelines.insert(
            MessageCategory::EnergyEfficiency,
            Arc::new(EnergyEfficiencyPipeline::new(&config, Arc::clone(&chat))),
        );

        let orchestrator = Arc::new(Orchestrator::new(
            classifier,
            pipelines,
            Arc::clone(&history),
        ));

        Ok(Self {
            config,
            orchestrator,
            history,
            feedback,
            digest,
            integrator,
            sync,
        })
    }
}
