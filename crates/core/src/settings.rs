use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the tutor should append a "how is it going?" check-in.
///
/// A check-in is due on every interaction whose counter satisfies
/// `counter % every == offset`. The defaults reproduce a check-in on the
/// third, sixth, ninth ... interaction when counting from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPolicy {
    pub every: u32,
    pub offset: u32,
}

impl FeedbackPolicy {
    /// A policy that never asks for feedback.
    pub const DISABLED: FeedbackPolicy = FeedbackPolicy {
        every: 0,
        offset: 0,
    };

    pub fn is_due(&self, interaction_counter: u32) -> bool {
        self.every != 0 && interaction_counter % self.every == self.offset % self.every
    }
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self {
            every: 3,
            offset: 2,
        }
    }
}

/// Tunables for the orchestrator and its capability agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorSettings {
    /// Total attempts per model call, including the first one.
    pub max_retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Upper bound on a single model call.
    pub model_timeout_secs: u64,
    /// Subtopics with at most this many characters get no practice item.
    pub min_practice_content: usize,
    /// Deepest topic level kept from extracted outlines.
    pub max_topic_depth: usize,
    pub quiz_questions: usize,
    pub flashcard_count: usize,
    pub feedback: FeedbackPolicy,
}

impl Default for TutorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 1_000,
            model_timeout_secs: 30,
            min_practice_content: 100,
            max_topic_depth: 3,
            quiz_questions: 3,
            flashcard_count: 5,
            feedback: FeedbackPolicy::default(),
        }
    }
}

impl TutorSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}
