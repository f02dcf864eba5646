//! Embedding provider abstraction and auto-selecting factory.
//!
//! Three backends: hosted OpenAI (1536-d), hosted Gemini (768-d), and a
//! local deterministic model (384-d). The factory probes them in that order
//! with a trivial call and falls back to the local provider when nothing
//! hosted is reachable.

pub mod gemini;
pub mod local;
pub mod openai;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EmbeddingConfig;

pub use gemini::GeminiEmbeddingProvider;
pub use local::LocalEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;

/// Dense embedding with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingVector {
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        let dimensions = vector.len();
        Self {
            vector,
            model: model.into(),
            dimensions,
        }
    }

    /// Invariants: declared dimensionality matches, all values finite.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vector.len() != self.dimensions {
            anyhow::bail!(
                "embedding length {} does not match declared dimensionality {}",
                self.vector.len(),
                self.dimensions
            );
        }
        if self.vector.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("embedding contains non-finite values");
        }
        Ok(())
    }

    /// True when this vector came from the hash fallback rather than a real
    /// model, detectable downstream via the model suffix.
    pub fn is_mock(&self) -> bool {
        self.model.ends_with("-mock")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub max_input_chars: usize,
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Distinguished so callers can apply backoff before retrying a batch.
    #[error("Embedding provider rate limited: {0}")]
    RateLimited(String),

    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;

    /// Batch embedding. Must preserve input order.
    async fn generate_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.generate(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize;

    fn info(&self) -> ProviderInfo;
}

/// Normalize text before it goes to a provider: collapse whitespace, pad
/// empty inputs to a single space, cut at the provider's character cap
/// (a safety bound well below real token limits).
pub fn preprocess_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return " ".to_string();
    }
    if cleaned.len() > max_chars {
        let mut cut = max_chars;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        return cleaned[..cut].to_string();
    }
    cleaned
}

/// Deterministic hash-derived vector for degraded operation. Identical input
/// always yields identical output.
pub fn mock_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let hex = hex::encode(digest);
    let bytes: Vec<f32> = hex
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let value = u8::from_str_radix(std::str::from_utf8(pair).unwrap_or("00"), 16)
                .unwrap_or(0);
            value as f32 / 255.0
        })
        .collect();

    (0..dimensions).map(|i| bytes[i % bytes.len()]).collect()
}

/// Provider selection per configuration.
///
/// `EMBEDDING_PROVIDER` env (or the settings file) picks the backend;
/// `auto` probes OpenAI, then Gemini, then falls back to the local model.
pub async fn create_embedding_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    let provider = std::env::var("EMBEDDING_PROVIDER")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.provider.clone());
    let model_override = std::env::var("EMBEDDING_MODEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| Some(config.model.clone()).filter(|m| !m.trim().is_empty()));

    match provider.as_str() {
        "openai" => match openai_from_env(config, model_override.as_deref()) {
            Some(provider) => Arc::new(provider),
            None => {
                warn!("OpenAI embedding provider requested but no API key configured, falling back to local model");
                Arc::new(LocalEmbeddingProvider::new(model_override.as_deref()))
            }
        },
        "google" | "gemini" => match gemini_from_env(config, model_override.as_deref()) {
            Some(provider) => Arc::new(provider),
            None => {
                warn!("Gemini embedding provider requested but GOOGLE_AI_API_KEY missing, falling back to local model");
                Arc::new(LocalEmbeddingProvider::new(model_override.as_deref()))
            }
        },
        "sentence-transformers" | "st" => {
            Arc::new(LocalEmbeddingProvider::new(model_override.as_deref()))
        }
        "auto" => auto_select(config, model_override.as_deref()).await,
        other => {
            warn!(provider = other, "Unknown embedding provider, using local model");
            Arc::new(LocalEmbeddingProvider::new(model_override.as_deref()))
        }
    }
}

fn openai_from_env(
    config: &EmbeddingConfig,
    model_override: Option<&str>,
) -> Option<OpenAiEmbeddingProvider> {
    // The gpt-5-mini key is consulted first; it is the one with embedding
    // access on most tenants.
    let api_key = std::env::var("OPENAI_GPT5_MINI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))?;

    let model = std::env::var("OPENAI_EMBEDDING_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| model_override.map(str::to_string))
        .unwrap_or_else(|| "text-embedding-3-small".to_string());

    Some(OpenAiEmbeddingProvider::new(
        api_key,
        model,
        config.timeout_seconds,
    ))
}

fn gemini_from_env(
    config: &EmbeddingConfig,
    model_override: Option<&str>,
) -> Option<GeminiEmbeddingProvider> {
    let api_key = std::env::var("GOOGLE_AI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())?;

    let model = std::env::var("GOOGLE_EMBEDDING_MODEL")
        .ok()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| model_override.map(str::to_string))
        .unwrap_or_else(|| "text-embedding-004".to_string());

    Some(GeminiEmbeddingProvider::new(
        api_key,
        model,
        config.timeout_seconds,
    ))
}

async fn auto_select(
    config: &EmbeddingConfig,
    model_override: Option<&str>,
) -> Arc<dyn EmbeddingProvider> {
    if let Some(provider) = openai_from_env(config, None) {
        match provider.probe().await {
            Ok(()) => {
                info!("Embedding auto-selection: OpenAI available (1536 dimensions)");
                return Arc::new(provider);
            }
            Err(error) => warn!(%error, "OpenAI embedding probe failed"),
        }
    }

    if let Some(provider) = gemini_from_env(config, None) {
        match provider.probe().await {
            Ok(()) => {
                info!("Embedding auto-selection: Gemini available (768 dimensions)");
                return Arc::new(provider);
            }
            Err(error) => warn!(%error, "Gemini embedding probe failed"),
        }
    }

    info!("Embedding auto-selection: using local model");
    Arc::new(LocalEmbeddingProvider::new(model_override))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_vector_is_deterministic() {
        let a = mock_vector("Arbeitsanweisung", 1536);
        let b = mock_vector("Arbeitsanweisung", 1536);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1536);
    }

    #[test]
    fn test_mock_vector_differs_per_input() {
        assert_ne!(mock_vector("eins", 384), mock_vector("zwei", 384));
    }

    #[test]
    fn test_mock_vector_values_normalized() {
        for value in mock_vector("test", 64) {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_preprocess_pads_empty() {
        assert_eq!(preprocess_text("", 100), " ");
        assert_eq!(preprocess_text("   ", 100), " ");
    }

    #[test]
    fn test_preprocess_collapses_whitespace() {
        assert_eq!(preprocess_text("ein\n\n zwei\t drei", 100), "ein zwei drei");
    }

    #[test]
    fn test_preprocess_truncates_at_char_boundary() {
        let long = "ä".repeat(100);
        let cut = preprocess_text(&long, 11);
        assert!(cut.len() <= 11);
        assert!(!cut.is_empty());
    }

    #[test]
    fn test_embedding_vector_validation() {
        let valid = EmbeddingVector::new(vec![0.1, 0.2], "test-model");
        assert!(valid.validate().is_ok());

        let mut broken = EmbeddingVector::new(vec![0.1, f32::NAN], "test-model");
        assert!(broken.validate().is_err());

        broken = EmbeddingVector::new(vec![0.1, 0.2], "test-model");
        broken.dimensions = 3;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_mock_suffix_detection() {
        let mock = EmbeddingVector::new(vec![0.1], "text-embedding-3-small-mock");
        assert!(mock.is_mock());
        let real = EmbeddingVector::new(vec![0.1], "text-embedding-3-small");
        assert!(!real.is_mock());
    }
}
