use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams, excerpt};
use crate::error::TutorError;
use crate::extract::{ExtractionError, parse_json_object, require_text};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;

/// How the explanation should be pitched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationStyle {
    Standard,
    /// A short recap, used for curriculum summary items.
    Summary,
    /// Lean on concrete worked examples.
    Examples,
}

/// A structured explanation with key points and examples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(default)]
    pub title: String,
    pub explanation: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl Explanation {
    /// Markdown rendering for chat output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str(&format!("**{}**\n\n", self.title));
        }
        out.push_str(self.explanation.trim());
        if !self.key_points.is_empty() {
            out.push_str("\n\nKey points:");
            for point in &self.key_points {
                out.push_str(&format!("\n- {point}"));
            }
        }
        if !self.examples.is_empty() {
            out.push_str("\n\nExamples:");
            for example in &self.examples {
                out.push_str(&format!("\n- {example}"));
            }
        }
        out
    }
}

/// Explains a topic in plain language.
pub struct ExplainerAgent {
    model: Arc<ResilientModel>,
}

impl ExplainerAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Capability for ExplainerAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Explainer
    }

    fn min_content_len(&self) -> usize {
        20
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.4,
            max_tokens: 1200,
            top_p: 0.9,
            top_k: 40,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        let pitch = match params.style {
            ExplanationStyle::Standard => "Explain the topic clearly for a beginner.",
            ExplanationStyle::Summary => "Summarize the topic in a short recap of the essentials.",
            ExplanationStyle::Examples => "Explain the topic mainly through concrete examples.",
        };
        let focus = params
            .focus
            .as_deref()
            .map(|q| format!("\nThe learner asked: \"{q}\"\n"))
            .unwrap_or_default();
        format!(
            "{pitch}\nTopic: {topic}\n{focus}\nSource material:\n{content}\n\n\
             Respond with a single JSON object: \
             {{\"title\": string, \"explanation\": string, \"key_points\": [string], \"examples\": [string]}}",
            topic = params.topic_label(),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let mut explanation: Explanation = parse_json_object(raw)?;
        require_text(&explanation.explanation, "explanation")?;
        if explanation.title.trim().is_empty() {
            explanation.title = params.topic.clone();
        }
        explanation.key_points.retain(|p| !p.trim().is_empty());
        explanation.examples.retain(|e| !e.trim().is_empty());
        Ok(ArtifactBody::Explanation(explanation))
    }

    fn fallback(
        &self,
        content: &str,
        params: &CapabilityParams,
        reason: &TutorError,
    ) -> ArtifactBody {
        let topic = params.topic_label();
        let explanation = match reason {
            TutorError::InsufficientInput { .. } => format!(
                "There isn't enough material about {topic} for me to explain yet. \
                 Try uploading a fuller document or asking about another topic."
            ),
            other => format!(
                "I couldn't prepare a full explanation of {topic} right now ({other}). \
                 Here is what the material says:\n\n{}",
                excerpt(content, 600)
            ),
        };
        ArtifactBody::Explanation(Explanation {
            title: params.topic.clone(),
            explanation,
            key_points: Vec::new(),
            examples: Vec::new(),
        })
    }

    fn model(&self) -> &ResilientModel {
        &self.model
    }
}
