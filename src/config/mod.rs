pub mod settings;

pub use settings::{
    DatabaseConfig, EmbeddingConfig, LimitsConfig, LlmConfig, QdrantConfig, RagConfig,
    ServerConfig, Settings,
};
