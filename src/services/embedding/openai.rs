//! Hosted OpenAI embedding backend (1536 dimensions).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    mock_vector, preprocess_text, EmbeddingError, EmbeddingProvider, EmbeddingVector, ProviderInfo,
};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DIMENSIONS: usize = 1536;
/// Safety bound well below the 8192-token API limit.
const MAX_INPUT_CHARS: usize = 30_000;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: String,
    model: String,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, model: String, timeout_seconds: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            model,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Trivial call used by the factory's auto-selection probe.
    pub async fn probe(&self) -> Result<(), EmbeddingError> {
        let vectors = self.call_api(&["test".to_string()]).await?;
        if vectors.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "probe returned no embedding".to_string(),
            ));
        }
        Ok(())
    }

    async fn call_api(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            input: inputs,
            model: &self.model,
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("OpenAI request failed: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RateLimited(body));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if body.data.len() != inputs.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                body.data.len()
            )));
        }

        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Degraded-operation vector, tagged so queries can detect it.
    fn fallback(&self, text: &str) -> EmbeddingVector {
        EmbeddingVector::new(
            mock_vector(text, DIMENSIONS),
            format!("{}-mock", self.model),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn generate(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let cleaned = preprocess_text(text, MAX_INPUT_CHARS);

        {
            let cache = self.cache.read().await;
            if let Some(vector) = cache.get(&cleaned) {
                debug!("Embedding cache hit, skipping API call");
                return Ok(EmbeddingVector::new(vector.clone(), self.model.clone()));
            }
        }

        match self.call_api(std::slice::from_ref(&cleaned)).await {
            Ok(mut vectors) => {
                let vector = vectors.remove(0);
                if vector.len() != DIMENSIONS {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "dimension mismatch: expected {}, got {}",
                        DIMENSIONS,
                        vector.len()
                    )));
                }

                let mut cache = self.cache.write().await;
                cache.insert(cleaned, vector.clone());

                Ok(EmbeddingVector::new(vector, self.model.clone()))
            }
            Err(EmbeddingError::RateLimited(detail)) => {
                Err(EmbeddingError::RateLimited(detail))
            }
            Err(error) => {
                warn!(%error, "OpenAI embeddings unavailable, emitting mock vector");
                Ok(self.fallback(&cleaned))
            }
        }
    }

    async fn generate_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cleaned: Vec<String> = texts
            .iter()
            .map(|t| preprocess_text(t, MAX_INPUT_CHARS))
            .collect();

        match self.call_api(&cleaned).await {
            Ok(vectors) => Ok(vectors
                .into_iter()
                .map(|v| EmbeddingVector::new(v, self.model.clone()))
                .collect()),
            Err(EmbeddingError::RateLimited(detail)) => Err(EmbeddingError::RateLimited(detail)),
            Err(error) => {
                warn!(%error, "OpenAI batch embeddings unavailable, emitting mock vectors");
                Ok(cleaned.iter().map(|t| self.fallback(t)).collect())
            }
        }
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "openai".to_string(),
            model: self.model.clone(),
            dimensions: DIMENSIONS,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }
}
