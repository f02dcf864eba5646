use std::sync::Arc;

use crate::config::Settings;
use crate::database::Repository;
use crate::security::PermissionService;
use crate::services::embedding::EmbeddingProvider;
use crate::services::{ChatService, EventBus, IndexingService, LlmService, RetrievalService};
use crate::vector::VectorStore;

/// Application state shared across handlers. All clients are
/// process-singletons; configuration is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub repository: Arc<Repository>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub retrieval: Arc<RetrievalService>,
    pub indexing: Arc<IndexingService>,
    pub chat: Arc<ChatService>,
    pub llm: Arc<LlmService>,
    pub permissions: Arc<PermissionService>,
    pub event_bus: Arc<EventBus>,
}
