use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PARSERS: &[&str] = &["mineru", "docling"];
pub const PARSE_METHODS: &[&str] = &["auto", "ocr", "txt"];
pub const CHUNKING_STRATEGIES: &[&str] = &["semantic", "hierarchical", "fixed_size", "structured"];
pub const EMBEDDING_MODELS: &[&str] = &["text-embedding-3-small", "text-embedding-ada-002"];
pub const AI_MODELS: &[&str] = &["gpt-4o-mini", "gpt-5-mini", "gemini-2.5-flash"];

/// RAG pipeline configuration value object. Immutable after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagOptions {
    pub parser: String,
    pub parse_method: String,
    pub chunking_strategy: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub ai_model: String,
    pub max_context_chunks: usize,
    pub context_window_size: usize,
    pub enable_multimodal: bool,
    pub enable_table_extraction: bool,
    pub enable_formula_parsing: bool,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            parser: "mineru".to_string(),
            parse_method: "auto".to_string(),
            chunking_strategy: "semantic".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding_model: "text-embedding-3-small".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            max_context_chunks: 5,
            context_window_size: 4000,
            enable_multimodal: true,
            enable_table_extraction: true,
            enable_formula_parsing: true,
        }
    }
}

impl RagOptions {
    /// Validate against the enumerated option sets and numeric bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !PARSERS.contains(&self.parser.as_str()) {
            anyhow::bail!("Invalid parser: {}. Must be one of {:?}", self.parser, PARSERS);
        }
        if !PARSE_METHODS.contains(&self.parse_method.as_str()) {
            anyhow::bail!(
                "Invalid parse method: {}. Must be one of {:?}",
                self.parse_method,
                PARSE_METHODS
            );
        }
        if !CHUNKING_STRATEGIES.contains(&self.chunking_strategy.as_str()) {
            anyhow::bail!(
                "Invalid chunking strategy: {}. Must be one of {:?}",
                self.chunking_strategy,
                CHUNKING_STRATEGIES
            );
        }
        if !EMBEDDING_MODELS.contains(&self.embedding_model.as_str()) {
            anyhow::bail!(
                "Invalid embedding model: {}. Must be one of {:?}",
                self.embedding_model,
                EMBEDDING_MODELS
            );
        }
        if !AI_MODELS.contains(&self.ai_model.as_str()) {
            anyhow::bail!(
                "Invalid AI model: {}. Must be one of {:?}",
                self.ai_model,
                AI_MODELS
            );
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if self.max_context_chunks == 0 {
            anyhow::bail!("max_context_chunks must be positive");
        }
        if self.context_window_size == 0 {
            anyhow::bail!("context_window_size must be positive");
        }
        Ok(())
    }

    /// All recognized option values, for diagnostics and settings UIs.
    pub fn available_options() -> HashMap<&'static str, Vec<&'static str>> {
        let mut options = HashMap::new();
        options.insert("parsers", PARSERS.to_vec());
        options.insert("parse_methods", PARSE_METHODS.to_vec());
        options.insert("chunking_strategies", CHUNKING_STRATEGIES.to_vec());
        options.insert("embedding_models", EMBEDDING_MODELS.to_vec());
        options.insert("ai_models", AI_MODELS.to_vec());
        options
    }
}
