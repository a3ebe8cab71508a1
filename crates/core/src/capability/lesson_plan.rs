use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams};
use crate::error::TutorError;
use crate::extract::{ExtractionError, parse_json_object, require_text};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonSection {
    pub title: String,
    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub activities: Vec<String>,
}

/// A timed lesson outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub title: String,
    #[serde(default)]
    pub duration_minutes: u32,
    pub objectives: Vec<String>,
    pub sections: Vec<LessonSection>,
    #[serde(default)]
    pub assessment: String,
}

impl LessonPlan {
    pub fn render(&self) -> String {
        let mut out = format!("**{}** ({} min)\n\nObjectives:", self.title, self.duration_minutes);
        for objective in &self.objectives {
            out.push_str(&format!("\n- {objective}"));
        }
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!("\n\n{}. {} ({} min)", i + 1, section.title, section.minutes));
            for activity in &section.activities {
                out.push_str(&format!("\n   - {activity}"));
            }
        }
        if !self.assessment.is_empty() {
            out.push_str(&format!("\n\nAssessment: {}", self.assessment));
        }
        out
    }
}

/// Designs a lesson plan for a topic.
pub struct LessonPlanAgent {
    model: Arc<ResilientModel>,
}

impl LessonPlanAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Capability for LessonPlanAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::LessonPlan
    }

    fn min_content_len(&self) -> usize {
        100
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.3,
            max_tokens: 1500,
            top_p: 0.9,
            top_k: 40,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        format!(
            "Design a {minutes}-minute lesson plan on {topic} from the material below.\n\n\
             Material:\n{content}\n\n\
             Respond with a single JSON object: {{\"title\": string, \"duration_minutes\": number, \
             \"objectives\": [string], \"sections\": [{{\"title\": string, \"minutes\": number, \
             \"activities\": [string]}}], \"assessment\": string}}",
            minutes = params.duration_minutes,
            topic = params.topic_label(),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let mut plan: LessonPlan = parse_json_object(raw)?;
        require_text(&plan.title, "title")?;
        plan.objectives.retain(|o| !o.trim().is_empty());
        if plan.objectives.is_empty() {
            return Err(ExtractionError::MissingField("objectives"));
        }
        if plan.sections.is_empty() {
            return Err(ExtractionError::MissingField("sections"));
        }
        for section in &plan.sections {
            require_text(&section.title, "sections.title")?;
        }
        if plan.duration_minutes == 0 {
            plan.duration_minutes = plan
                .sections
                .iter()
                .try_fold(0u32, |total, s| total.checked_add(s.minutes))
                .ok_or_else(|| ExtractionError::InvalidField {
                    field: "sections.minutes",
                    reason: "section minutes overflow".to_string(),
                })?;
        }
        if plan.duration_minutes == 0 {
            plan.duration_minutes = params.duration_minutes;
        }
        Ok(ArtifactBody::LessonPlan(plan))
    }

    fn fallback(
        &self,
        _content: &str,
        params: &CapabilityParams,
        _reason: &TutorError,
    ) -> ArtifactBody {
        let topic = params.topic_label();
        let third = params.duration_minutes / 3;
        ArtifactBody::LessonPlan(LessonPlan {
            title: format!("Lesson: {topic}"),
            duration_minutes: params.duration_minutes,
            objectives: vec![format!("Understand the main ideas of {topic}")],
            sections: vec![
                LessonSection {
                    title: "Introduction".to_string(),
                    minutes: third,
                    activities: vec!["Read through the material".to_string()],
                },
                LessonSection {
                    title: "Practice".to_string(),
                    minutes: third,
                    activities: vec!["Answer review questions".to_string()],
                },
                LessonSection {
                    title: "Review".to_string(),
                    minutes: params.duration_minutes - 2 * third,
                    activities: vec!["Summarize what you learned".to_string()],
                },
            ],
            assessment: String::new(),
        })
    }

    fn model(&self) -> &ResilientModel {
        &self.model
    }
}
