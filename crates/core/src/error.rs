//! Failure taxonomy for the tutoring core.
//!
//! None of these are fatal: capability agents fold them into fallback
//! artifacts and the navigator folds them into recoverable responses. The
//! type exists so that the degradation reason travels with the result.

use serde::{Deserialize, Serialize};

use crate::extract::ExtractionError;

/// Failures inside the tutor. None of them reach the learner as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TutorError {
    /// Content was too short to be worth a model call.
    #[error("insufficient content: need at least {required} characters, got {actual}")]
    InsufficientInput { required: usize, actual: usize },
    /// The model answered, but not with something we could use.
    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),
    /// Every key in the pool hit its quota.
    #[error("quota exceeded")]
    RateLimited,
    /// The provider was unreachable or kept timing out.
    #[error("model unavailable: {0}")]
    Unavailable(String),
    /// A non-retryable provider failure.
    #[error("model call failed: {0}")]
    ModelFailure(String),
    #[error("navigation error: {0}")]
    Navigation(String),
}

impl From<ExtractionError> for TutorError {
    fn from(err: ExtractionError) -> Self {
        TutorError::InvalidModelOutput(err.to_string())
    }
}
