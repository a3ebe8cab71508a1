//! Capability agents.
//!
//! Each agent turns raw study material into one structured learning artifact
//! through a single model call. The agents differ only in their prompt,
//! sampling parameters, output schema and canned fallback; the surrounding
//! contract (length gate, resilient call, extraction, degradation) lives in
//! the provided [`Capability::process`] method and is identical for all six.

pub mod diagram;
pub mod explainer;
pub mod flashcard;
pub mod lesson_plan;
pub mod quiz;
pub mod topic_extract;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub use diagram::{Diagram, DiagramAgent, DiagramType};
pub use explainer::{Explanation, ExplainerAgent, ExplanationStyle};
pub use flashcard::{Flashcard, FlashcardAgent, FlashcardSet};
pub use lesson_plan::{LessonPlan, LessonPlanAgent, LessonSection};
pub use quiz::{Quiz, QuizAgent, QuizQuestion};
pub use topic_extract::{TopicExtractAgent, TopicOutline};

use crate::error::TutorError;
use crate::extract::ExtractionError;
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;
use crate::settings::TutorSettings;

/// The closed set of things the tutor knows how to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Explainer,
    Quiz,
    Flashcard,
    Diagram,
    LessonPlan,
    TopicExtract,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Explainer => "explainer",
            CapabilityKind::Quiz => "quiz",
            CapabilityKind::Flashcard => "flashcard",
            CapabilityKind::Diagram => "diagram",
            CapabilityKind::LessonPlan => "lesson_plan",
            CapabilityKind::TopicExtract => "topic_extract",
        };
        write!(f, "{name}")
    }
}

/// Per-call knobs. Agents read the fields relevant to them and ignore the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityParams {
    /// Human-readable name of what the content is about.
    pub topic: String,
    /// The learner's own question, when there is one.
    pub focus: Option<String>,
    pub style: ExplanationStyle,
    pub question_count: usize,
    pub card_count: usize,
    pub diagram_type: Option<DiagramType>,
    pub duration_minutes: u32,
    pub max_depth: usize,
}

impl Default for CapabilityParams {
    fn default() -> Self {
        Self {
            topic: String::new(),
            focus: None,
            style: ExplanationStyle::Standard,
            question_count: 3,
            card_count: 5,
            diagram_type: None,
            duration_minutes: 45,
            max_depth: 3,
        }
    }
}

impl CapabilityParams {
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Display name used in prompts and canned text.
    pub fn topic_label(&self) -> &str {
        if self.topic.trim().is_empty() {
            "this material"
        } else {
            &self.topic
        }
    }
}

/// Capability-specific payload of an [`Artifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactBody {
    Explanation(Explanation),
    Quiz(Quiz),
    Flashcards(FlashcardSet),
    Diagram(Diagram),
    LessonPlan(LessonPlan),
    Outline(TopicOutline),
}

/// The result of running a capability.
///
/// Always renderable. When `degraded` is set, `body` is the agent's canned
/// fallback and `degraded` records why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: CapabilityKind,
    pub body: ArtifactBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<TutorError>,
}

impl Artifact {
    pub fn generated(kind: CapabilityKind, body: ArtifactBody) -> Self {
        Self {
            kind,
            body,
            degraded: None,
        }
    }

    pub fn fallback(kind: CapabilityKind, body: ArtifactBody, reason: TutorError) -> Self {
        Self {
            kind,
            body,
            degraded: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Uniform interface implemented by every capability agent.
#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> CapabilityKind;

    /// Content shorter than this (in characters, trimmed) is rejected without a model call.
    fn min_content_len(&self) -> usize;

    fn generation_config(&self) -> GenerationConfig;

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String;

    /// Recovers and validates the artifact from raw model text.
    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError>;

    /// Canned artifact used whenever generation fails.
    fn fallback(&self, content: &str, params: &CapabilityParams, reason: &TutorError)
    -> ArtifactBody;

    fn model(&self) -> &ResilientModel;

    /// Runs the capability. Never fails: every error degrades to [`Capability::fallback`].
    async fn process(&self, content: &str, params: &CapabilityParams) -> Artifact {
        let kind = self.kind();
        let actual = content.trim().chars().count();
        let required = self.min_content_len();
        if actual < required {
            let reason = TutorError::InsufficientInput { required, actual };
            info!(capability = %kind, actual, required, "Content too short; skipping model call");
            return Artifact::fallback(kind, self.fallback(content, params, &reason), reason);
        }

        let prompt = self.build_prompt(content, params);
        let raw = match self.model().generate(&prompt, &self.generation_config()).await {
            Ok(raw) => raw,
            Err(reason) => {
                warn!(capability = %kind, error = %reason, "Model call failed; using fallback");
                return Artifact::fallback(kind, self.fallback(content, params, &reason), reason);
            }
        };

        match self.parse(&raw, params) {
            Ok(body) => Artifact::generated(kind, body),
            Err(err) => {
                let reason = TutorError::from(err);
                warn!(capability = %kind, error = %reason, "Unusable model output; using fallback");
                Artifact::fallback(kind, self.fallback(content, params, &reason), reason)
            }
        }
    }
}

/// One instance of every capability, addressable by [`CapabilityKind`].
pub struct CapabilitySet {
    explainer: ExplainerAgent,
    quiz: QuizAgent,
    flashcard: FlashcardAgent,
    diagram: DiagramAgent,
    lesson_plan: LessonPlanAgent,
    topic_extract: TopicExtractAgent,
}

impl CapabilitySet {
    /// Registers one agent per capability, all sharing `model`.
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self {
            explainer: ExplainerAgent::new(model.clone()),
            quiz: QuizAgent::new(model.clone()),
            flashcard: FlashcardAgent::new(model.clone()),
            diagram: DiagramAgent::new(model.clone()),
            lesson_plan: LessonPlanAgent::new(model.clone()),
            topic_extract: TopicExtractAgent::new(model),
        }
    }

    pub fn get(&self, kind: CapabilityKind) -> &dyn Capability {
        match kind {
            CapabilityKind::Explainer => &self.explainer,
            CapabilityKind::Quiz => &self.quiz,
            CapabilityKind::Flashcard => &self.flashcard,
            CapabilityKind::Diagram => &self.diagram,
            CapabilityKind::LessonPlan => &self.lesson_plan,
            CapabilityKind::TopicExtract => &self.topic_extract,
        }
    }

    /// Runs the agent for `kind`. Never fails; see [`Capability::process`].
    pub async fn dispatch(
        &self,
        kind: CapabilityKind,
        content: &str,
        params: &CapabilityParams,
    ) -> Artifact {
        self.get(kind).process(content, params).await
    }
}

/// Builds capability parameters from the shared settings.
pub fn default_params(settings: &TutorSettings, topic: impl Into<String>) -> CapabilityParams {
    CapabilityParams {
        topic: topic.into(),
        question_count: settings.quiz_questions,
        card_count: settings.flashcard_count,
        max_depth: settings.max_topic_depth,
        ..CapabilityParams::default()
    }
}

/// Shortens `text` to at most `max_chars` characters on a char boundary.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
