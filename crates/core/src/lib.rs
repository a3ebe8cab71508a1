//! Conversational tutoring core.
//!
//! Turns a document's topic hierarchy and a stream of learner utterances into
//! explanations, quizzes, flashcards, diagrams and lesson plans, walks learners
//! through a generated curriculum and tracks their mastery per topic.
//! [`orchestrator::Orchestrator`] is the entry point.

pub mod capability;
pub mod curriculum;
pub mod error;
pub mod extract;
pub mod intent;
pub mod knowledge;
pub mod llm_client;
pub mod navigator;
pub mod orchestrator;
pub mod resilience;
pub mod response;
pub mod session;
pub mod settings;
pub mod tools;
pub mod topic;

pub use error::TutorError;
pub use orchestrator::Orchestrator;
pub use response::Response;
pub use settings::TutorSettings;
pub use topic::Topic;
