use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tutor_core::settings::{FeedbackPolicy, TutorSettings};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported model providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Base URL of the provider's OpenAI-compatible chat endpoint.
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub provider: Provider,
    /// Rotated in order when a key runs out of quota.
    pub api_keys: Vec<String>,
    pub chat_model: String,
    pub log_level: Level,
    pub max_retries: u32,
    pub model_timeout: Duration,
    pub feedback: FeedbackPolicy,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let provider_str = std::env::var("MODEL_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MODEL_PROVIDER".to_string(),
                    format!("'{other}' is not one of 'openai' or 'gemini'"),
                ));
            }
        };

        let api_keys: Vec<String> = std::env::var("MODEL_API_KEYS")
            .or_else(|_| std::env::var(provider.key_var()))
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if api_keys.is_empty() {
            return Err(ConfigError::MissingVar(format!(
                "MODEL_API_KEYS or {} must be set for '{}' provider",
                provider.key_var(),
                provider_str.to_lowercase()
            )));
        }

        let default_model = match provider {
            Provider::OpenAI => "gpt-4o",
            Provider::Gemini => "gemini-2.0-flash",
        };
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| default_model.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let defaults = TutorSettings::default();
        let max_retries = parse_var("MAX_RETRIES", defaults.max_retries)?;
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let model_timeout =
            Duration::from_secs(parse_var("MODEL_TIMEOUT_SECS", defaults.model_timeout_secs)?);
        let feedback = FeedbackPolicy {
            every: parse_var("FEEDBACK_EVERY", defaults.feedback.every)?,
            offset: parse_var("FEEDBACK_OFFSET", defaults.feedback.offset)?,
        };

        Ok(Self {
            provider,
            api_keys,
            chat_model,
            log_level,
            max_retries,
            model_timeout,
            feedback,
        })
    }

    /// Orchestrator settings with the environment overrides applied.
    pub fn tutor_settings(&self) -> TutorSettings {
        TutorSettings {
            max_retries: self.max_retries,
            model_timeout_secs: self.model_timeout.as_secs(),
            feedback: self.feedback,
            ..TutorSettings::default()
        }
    }
}
