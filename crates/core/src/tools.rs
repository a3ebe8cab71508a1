//! Progress Tool Service
//!
//! Exposes learner mastery and lesson position as Model Context Protocol tools,
//! so an external LLM agent can read a learner's progress and report study
//! activity that happened outside the tutor.

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::knowledge::{Interaction, Outcome};
use crate::orchestrator::Orchestrator;

/// Arguments for tools that only need to know which learner.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct UserArgs {
    #[schemars(description = "The learner's user id")]
    pub user_id: String,
}

/// Arguments for recording a study interaction.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct RecordInteractionArgs {
    pub user_id: String,
    /// Topic title the interaction belongs to.
    pub topic: String,
    #[schemars(description = "Optional subtopic title within the topic")]
    pub subtopic: Option<String>,
    #[schemars(
        description = "What happened, e.g. {\"kind\": \"quiz_result\", \"score\": 85} or {\"kind\": \"study_session\", \"minutes\": 30}"
    )]
    pub outcome: Outcome,
}

/// MCP server exposing learner progress to an external agent.
pub struct TutorToolService {
    orchestrator: Arc<Orchestrator>,
    tool_router: ToolRouter<Self>,
}

#[tool_handler]
impl ServerHandler for TutorToolService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Read and update a learner's topic mastery and lesson position.".to_string(),
            ),
            ..Default::default()
        }
    }
}

#[tool_router]
impl TutorToolService {
    /// Wraps a shared orchestrator; sessions are the ones the chat front end uses.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Get a learner's topics bucketed into strong, getting there and needs work.")]
    pub async fn get_progress(&self, args: Parameters<UserArgs>) -> Result<String, String> {
        info!(user_id = %args.0.user_id, "Executing tool 'get_progress'");
        let summary = self.orchestrator.summary(&args.0.user_id).await;
        serde_json::to_string(&summary).map_err(|e| format!("Failed to serialize progress: {e}"))
    }

    #[tool(description = "Get how often and how regularly a learner studies.")]
    pub async fn get_learning_patterns(
        &self,
        args: Parameters<UserArgs>,
    ) -> Result<String, String> {
        info!(user_id = %args.0.user_id, "Executing tool 'get_learning_patterns'");
        let patterns = self.orchestrator.patterns(&args.0.user_id).await;
        serde_json::to_string(&patterns).map_err(|e| format!("Failed to serialize patterns: {e}"))
    }

    /// Applies the interaction to the learner's mastery and reports the new level.
    #[tool(description = "Record a quiz result, study session, flashcard review or topic view for a learner.")]
    pub async fn record_interaction(
        &self,
        args: Parameters<RecordInteractionArgs>,
    ) -> Result<String, String> {
        let args = args.0;
        info!(
            user_id = %args.user_id,
            topic = %args.topic,
            outcome = ?args.outcome,
            "Executing tool 'record_interaction'"
        );
        if args.topic.trim().is_empty() {
            return Err("Topic must not be empty.".to_string());
        }
        validate_outcome(&args.outcome)?;

        let mut interaction = Interaction::new(args.topic.trim(), args.outcome);
        interaction.subtopic = args
            .subtopic
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let level = self.orchestrator.record(&args.user_id, &interaction).await;
        Ok(format!(
            "OK. Mastery of '{}' is now {level:.0}/100.",
            interaction.topic
        ))
    }

    #[tool(description = "Get the learner's teaching mode and position in the current lesson.")]
    pub async fn get_curriculum_position(
        &self,
        args: Parameters<UserArgs>,
    ) -> Result<String, String> {
        info!(user_id = %args.0.user_id, "Executing tool 'get_curriculum_position'");
        let status = self.orchestrator.lesson_status(&args.0.user_id).await;
        serde_json::to_string(&status).map_err(|e| format!("Failed to serialize position: {e}"))
    }
}

fn validate_outcome(outcome: &Outcome) -> Result<(), String> {
    let valid = match *outcome {
        Outcome::QuizResult { score } => (0.0..=100.0).contains(&score),
        Outcome::StudySession { minutes } => minutes.is_finite() && minutes >= 0.0,
        Outcome::FlashcardReview { reviewed, correct } => correct <= reviewed,
        Outcome::TopicView { seconds } => seconds.is_finite() && seconds >= 0.0,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("Invalid outcome: {outcome:?}"))
    }
}
