//! Hosted Google Gemini embedding backend (768 dimensions), reached through
//! the OpenAI-compatible endpoint of the Generative Language API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    mock_vector, preprocess_text, EmbeddingError, EmbeddingProvider, EmbeddingVector, ProviderInfo,
};

const GEMINI_EMBEDDINGS_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/embeddings";
const DIMENSIONS: usize = 768;
const MAX_INPUT_CHARS: usize = 20_000;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
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

pub struct GeminiEmbeddingProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiEmbeddingProvider {
    pub fn new(api_key: String, model: String, timeout_seconds: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            model,
        }
    }

    pub async fn probe(&self) -> Result<(), EmbeddingError> {
        self.call_api("test").await.map(|_| ())
    }

    async fn call_api(&self, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbeddingRequest {
            input,
            model: &self.model,
        };

        let response = self
            .client
            .post(GEMINI_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("Gemini request failed: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::RateLimited(body));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse("Gemini returned no embedding data".to_string())
            })
    }

    fn fallback(&self, text: &str) -> EmbeddingVector {
        EmbeddingVector::new(
            mock_vector(text, DIMENSIONS),
            format!("{}-mock", self.model),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn generate(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let cleaned = preprocess_text(text, MAX_INPUT_CHARS);

        match self.call_api(&cleaned).await {
            Ok(vector) => {
                if vector.len() != DIMENSIONS {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "dimension mismatch: expected {}, got {}",
                        DIMENSIONS,
                        vector.len()
                    )));
                }
                Ok(EmbeddingVector::new(vector, self.model.clone()))
            }
            Err(EmbeddingError::RateLimited(detail)) => Err(EmbeddingError::RateLimited(detail)),
            Err(error) => {
                warn!(%error, "Gemini embeddings unavailable, emitting mock vector");
                Ok(self.fallback(&cleaned))
            }
        }
    }

    /// The endpoint takes one input per call; batch members run concurrently
    /// and are collected in input order.
    async fn generate_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        let futures: Vec<_> = texts.iter().map(|text| self.generate(text)).collect();
        let results = futures::future::join_all(futures).await;

        let mut vectors = Vec::with_capacity(results.len());
        for result in results {
            vectors.push(result?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "google".to_string(),
            model: self.model.clone(),
            dimensions: DIMENSIONS,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }
}
