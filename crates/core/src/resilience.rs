//! Retry, key rotation and timeout handling shared by every capability agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TutorError;
use crate::llm_client::{GenerationConfig, ModelClient, ModelError};
use crate::settings::TutorSettings;

/// A fixed pool of API keys used round-robin.
///
/// The active index only moves when a key reports a quota error; it wraps
/// around at the end of the pool.
#[derive(Debug, Default)]
pub struct KeyPool {
    keys: Vec<String>,
    active: AtomicUsize,
}

impl KeyPool {
    /// Starts on the first key.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            active: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// The key currently in use, or an empty string for key-less providers.
    pub fn current(&self) -> &str {
        self.keys
            .get(self.active_index())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Moves to the next key and returns its index.
    pub fn rotate(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        let len = self.keys.len();
        let previous = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1) % len))
            .unwrap_or(0);
        (previous + 1) % len
    }
}

/// A `ModelClient` wrapped with the retry policy every agent relies on.
///
/// - `RateLimited`: rotate to the next key, retry.
/// - `Unavailable` or timeout: retry with the same key after a linear backoff.
/// - `Other`: give up immediately.
///
/// At most `max_retries` attempts are made in total.
pub struct ResilientModel {
    client: Arc<dyn ModelClient>,
    keys: KeyPool,
    max_retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl ResilientModel {
    /// Takes attempt budget, timeout and backoff from `settings`.
    pub fn new(client: Arc<dyn ModelClient>, keys: KeyPool, settings: &TutorSettings) -> Self {
        Self {
            client,
            keys,
            max_retries: settings.max_retries.max(1),
            backoff: settings.retry_backoff(),
            timeout: settings.model_timeout(),
        }
    }

    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    /// Calls the model until it answers or the attempt budget is spent.
    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<String, TutorError> {
        let mut last_error = TutorError::Unavailable("no attempt made".to_string());

        for attempt in 1..=self.max_retries {
            let key_index = self.keys.active_index();
            debug!(attempt, key_index, "Calling model");

            let call = self.client.generate(self.keys.current(), prompt, config);
            let outcome = tokio::time::timeout(self.timeout, call).await;

            match outcome {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(ModelError::RateLimited(message))) => {
                    let next = self.keys.rotate();
                    warn!(
                        attempt,
                        key_index,
                        next_key_index = next,
                        %message,
                        "Rate limited; rotating API key"
                    );
                    last_error = TutorError::RateLimited;
                }
                Ok(Err(ModelError::Unavailable(message))) => {
                    warn!(attempt, key_index, %message, "Model unavailable");
                    last_error = TutorError::Unavailable(message);
                }
                Ok(Err(ModelError::Other(message))) => {
                    warn!(attempt, key_index, %message, "Model call failed; not retrying");
                    return Err(TutorError::ModelFailure(message));
                }
                Err(_) => {
                    warn!(attempt, key_index, timeout = ?self.timeout, "Model call timed out");
                    last_error =
                        TutorError::Unavailable(format!("timed out after {:?}", self.timeout));
                }
            }

            if attempt < self.max_retries && !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff * attempt).await;
            }
        }

        Err(last_error)
    }
}
