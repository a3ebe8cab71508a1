use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters for a single model call.
///
/// Every capability fixes its own values so that generation stays
/// reproducible for the same prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// Typed failure of a model call.
///
/// The resilience wrapper branches on these variants; implementations are
/// responsible for classifying provider errors at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Quota or 429. Retried with the next API key.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Transient network or provider failure. Retried with the same key.
    #[error("model unavailable: {0}")]
    Unavailable(String),
    /// Anything else. Not retried.
    #[error("model call failed: {0}")]
    Other(String),
}

/// The generative-model collaborator: prompt in, text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, ModelError>;
}

/// An implementation of `ModelClient` for any OpenAI-compatible API.
///
/// The API key is supplied per call so that the caller can rotate through a
/// key pool; the base URL and model are fixed at construction.
pub struct OpenAICompatibleClient {
    api_base: String,
    model: String,
    system_prompt: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL, e.g. `https://api.openai.com/v1/` or Gemini's
    ///   OpenAI-compatible endpoint.
    /// * `model` - The model identifier to use for chat completions.
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            model: model.into(),
            system_prompt: "You are a patient tutor. Follow the requested output format exactly."
                .to_string(),
        }
    }

    fn client_for(&self, api_key: &str) -> Client<OpenAIConfig> {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&self.api_base);
        // Retries belong to the resilience wrapper, which rotates keys on quota errors.
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Client::with_config(config).with_backoff(no_retry)
    }
}

#[async_trait]
impl ModelClient for OpenAICompatibleClient {
    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, ModelError> {
        // top_k has no equivalent on the chat completions endpoint.
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(config.temperature)
            .top_p(config.top_p)
            .max_completion_tokens(config.max_tokens)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_prompt.clone())
                    .build()
                    .map_err(classify)?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(classify)?
                    .into(),
            ])
            .build()
            .map_err(classify)?;

        let response = self
            .client_for(api_key)
            .chat()
            .create(request)
            .await
            .map_err(classify)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ModelError::Other("No content in LLM response".to_string()))
    }
}

/// Maps a provider error onto the variants the resilience wrapper understands.
fn classify(err: OpenAIError) -> ModelError {
    match err {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            if is_quota_error(&kind, &api.message) {
                ModelError::RateLimited(api.message)
            } else if kind.contains("server_error") || kind.contains("overloaded") {
                ModelError::Unavailable(api.message)
            } else {
                ModelError::Other(api.message)
            }
        }
        OpenAIError::Reqwest(e) => ModelError::Unavailable(e.to_string()),
        OpenAIError::StreamError(msg) => ModelError::Unavailable(msg),
        other => ModelError::Other(other.to_string()),
    }
}

fn is_quota_error(kind: &str, message: &str) -> bool {
    let kind = kind.to_lowercase();
    let message = message.to_lowercase();
    kind.contains("rate_limit")
        || kind.contains("quota")
        || kind.contains("resource_exhausted")
        || message.contains("quota")
        || message.contains("rate limit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_detection() {
        assert!(is_quota_error("insufficient_quota", "You exceeded your quota"));
        assert!(is_quota_error("requests", "Rate limit reached for gpt-4o"));
        assert!(is_quota_error("RESOURCE_EXHAUSTED", ""));
        assert!(!is_quota_error("invalid_request_error", "bad prompt"));
    }

    #[test]
    fn test_default_generation_config() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_tokens, 1024);
        assert!(config.temperature < 1.0);
    }
}
