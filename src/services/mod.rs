pub mod chat;
pub mod embedding;
pub mod event_bus;
pub mod indexing;
pub mod llm;
pub mod multi_query;
pub mod ports;
pub mod prompts;
pub mod retrieval;

pub use chat::ChatService;
pub use event_bus::{EventBus, SystemEvent};
pub use indexing::IndexingService;
pub use llm::{LlmCompletion, LlmProvider, LlmService};
pub use multi_query::MultiQueryService;
pub use retrieval::RetrievalService;
