//! Local embedding backend.
//!
//! Needs no API key and no network: texts are projected onto a fixed-length
//! vector via a SHA-256 construction. Retrieval quality is far below the
//! hosted models, but behavior is fully deterministic, which is exactly what
//! the last-resort fallback and the test suite need.

use async_trait::async_trait;

use super::{
    mock_vector, preprocess_text, EmbeddingError, EmbeddingProvider, EmbeddingVector, ProviderInfo,
};

const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
const MAX_INPUT_CHARS: usize = 10_000;

pub struct LocalEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(model: Option<&str>) -> Self {
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();
        // The multilingual mpnet/e5 family is 768-dimensional, MiniLM is 384
        let dimensions = if model.contains("mpnet") || model.contains("e5") {
            768
        } else {
            384
        };
        Self { model, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn generate(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let cleaned = preprocess_text(text, MAX_INPUT_CHARS);
        Ok(EmbeddingVector::new(
            mock_vector(&cleaned, self.dimensions),
            self.model.clone(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "local".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_input_identical_output() {
        let provider = LocalEmbeddingProvider::new(None);
        let a = provider.generate("Prüfmittelüberwachung").await.unwrap();
        let b = provider.generate("Prüfmittelüberwachung").await.unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(a.dimensions, 384);
    }

    #[tokio::test]
    async fn test_empty_text_is_padded_not_rejected() {
        let provider = LocalEmbeddingProvider::new(None);
        let embedding = provider.generate("").await.unwrap();
        assert_eq!(embedding.vector.len(), 384);
        assert!(embedding.validate().is_ok());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = LocalEmbeddingProvider::new(None);
        let texts = vec!["eins".to_string(), "zwei".to_string(), "drei".to_string()];
        let batch = provider.generate_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 3);
        for (text, embedding) in texts.iter().zip(&batch) {
            let single = provider.generate(text).await.unwrap();
            assert_eq!(single.vector, embedding.vector);
        }
    }

    #[test]
    fn test_mpnet_model_is_768() {
        let provider =
            LocalEmbeddingProvider::new(Some("paraphrase-multilingual-mpnet-base-v2"));
        assert_eq!(provider.dimensions(), 768);
    }
}
