//! LLM provider layer: OpenAI and Gemini chat backends behind one trait.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::models::rag_options::AI_MODELS;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_CHAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: String,
    pub model_used: String,
    pub provider: String,
    pub tokens_used: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub provider: String,
    pub max_tokens: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion with the requested model. Implementations may
    /// substitute a known-available model; `model_used` reports the model
    /// that actually answered.
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<LlmCompletion>;

    fn available_models(&self) -> Vec<ModelInfo>;

    fn is_known_model(&self, model_id: &str) -> bool {
        self.available_models()
            .iter()
            .any(|m| m.model_id == model_id)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    completion_tokens: Option<usize>,
}

pub struct LlmService {
    client: Client,
    config: LlmConfig,
    openai_api_key: Option<String>,
    google_api_key: Option<String>,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        let openai_api_key = std::env::var("OPENAI_GPT5_MINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()));
        let google_api_key = std::env::var("GOOGLE_AI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
            openai_api_key,
            google_api_key,
        }
    }

    fn provider_of(model_id: &str) -> &'static str {
        if model_id.starts_with("gemini") {
            "google"
        } else {
            "openai"
        }
    }

    /// Map the requested model onto the model that is actually called.
    /// gpt-5-mini is not generally served yet; substitute and log it.
    fn resolve_model(model_id: &str) -> String {
        if model_id == "gpt-5-mini" {
            warn!("gpt-5-mini is not available yet, substituting gpt-4o-mini");
            "gpt-4o-mini".to_string()
        } else {
            model_id.to_string()
        }
    }

    async fn call_chat_api(
        &self,
        url: &str,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<LlmCompletion> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, text);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let tokens_used = parsed
            .usage
            .and_then(|u| u.completion_tokens)
            .unwrap_or(0);

        Ok(LlmCompletion {
            content,
            model_used: model.to_string(),
            provider: Self::provider_of(model).to_string(),
            tokens_used,
        })
    }

    /// Key presence per provider, for the health endpoint.
    pub fn provider_status(&self) -> Vec<(String, bool)> {
        vec![
            ("openai".to_string(), self.openai_api_key.is_some()),
            ("google".to_string(), self.google_api_key.is_some()),
        ]
    }
}

#[async_trait]
impl LlmProvider for LlmService {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<LlmCompletion> {
        if !self.is_known_model(model_id) {
            anyhow::bail!("Unbekanntes Modell: {}", model_id);
        }

        let actual_model = Self::resolve_model(model_id);
        debug!(
            requested = model_id,
            actual = %actual_model,
            prompt_chars = prompt.len(),
            "Calling LLM"
        );

        match Self::provider_of(&actual_model) {
            "google" => {
                let api_key = self
                    .google_api_key
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("GOOGLE_AI_API_KEY not configured"))?;
                self.call_chat_api(GEMINI_CHAT_URL, api_key, &actual_model, prompt)
                    .await
            }
            _ => {
                let api_key = self
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not configured"))?;
                self.call_chat_api(OPENAI_CHAT_URL, api_key, &actual_model, prompt)
                    .await
            }
        }
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        AI_MODELS
            .iter()
            .map(|model_id| ModelInfo {
                model_id: model_id.to_string(),
                provider: Self::provider_of(model_id).to_string(),
                max_tokens: match *model_id {
                    "gemini-2.5-flash" => 1_000_000,
                    "gpt-5-mini" => 128_000,
                    _ => 16_384,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> LlmService {
        LlmService::new(LlmConfig {
            timeout_seconds: 5,
            max_tokens: 100,
            temperature: 0.7,
        })
    }

    #[test]
    fn test_known_models() {
        let llm = service();
        assert!(llm.is_known_model("gpt-4o-mini"));
        assert!(llm.is_known_model("gpt-5-mini"));
        assert!(llm.is_known_model("gemini-2.5-flash"));
        assert!(!llm.is_known_model("gpt-3.5-turbo"));
    }

    #[test]
    fn test_gpt5_mini_substitution() {
        assert_eq!(LlmService::resolve_model("gpt-5-mini"), "gpt-4o-mini");
        assert_eq!(LlmService::resolve_model("gpt-4o-mini"), "gpt-4o-mini");
        assert_eq!(
            LlmService::resolve_model("gemini-2.5-flash"),
            "gemini-2.5-flash"
        );
    }

    #[test]
    fn test_provider_routing() {
        assert_eq!(LlmService::provider_of("gemini-2.5-flash"), "google");
        assert_eq!(LlmService::provider_of("gpt-4o-mini"), "openai");
    }
}
