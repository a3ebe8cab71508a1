use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams};
use crate::error::TutorError;
use crate::extract::{ExtractionError, parse_json_object, require_text};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;
use crate::response::{Question, QuestionKind, QuestionOption};

/// One multiple-choice question with its answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub correct_answer: usize,
    #[serde(default)]
    pub explanation: String,
}

impl QuizQuestion {
    /// Converts to a pending question with one-based option ids.
    pub fn to_question(&self, topic: Option<&str>) -> Question {
        let options = self
            .options
            .iter()
            .enumerate()
            .map(|(i, text)| QuestionOption {
                id: (i + 1).to_string(),
                text: text.clone(),
                is_correct: Some(i == self.correct_answer),
            })
            .collect();
        Question {
            kind: QuestionKind::MultipleChoice,
            text: self.question.clone(),
            options,
            requires_response: true,
            explanation: (!self.explanation.is_empty()).then(|| self.explanation.clone()),
            topic: topic.map(str::to_string),
            subtopic: None,
        }
    }

    pub fn correct_text(&self) -> &str {
        self.options
            .get(self.correct_answer)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Multiple-choice questions on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub topic: String,
    pub questions: Vec<QuizQuestion>,
}

/// Writes multiple-choice quizzes.
pub struct QuizAgent {
    model: Arc<ResilientModel>,
}

impl QuizAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

fn validate(question: &QuizQuestion) -> Result<(), ExtractionError> {
    require_text(&question.question, "question")?;
    if question.options.len() < 2 {
        return Err(ExtractionError::InvalidField {
            field: "options",
            reason: format!("expected at least 2 options, got {}", question.options.len()),
        });
    }
    if question.options.iter().any(|o| o.trim().is_empty()) {
        return Err(ExtractionError::MissingField("options"));
    }
    if question.correct_answer >= question.options.len() {
        return Err(ExtractionError::InvalidField {
            field: "correct_answer",
            reason: format!(
                "index {} out of range for {} options",
                question.correct_answer,
                question.options.len()
            ),
        });
    }
    Ok(())
}

#[async_trait]
impl Capability for QuizAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Quiz
    }

    fn min_content_len(&self) -> usize {
        80
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.2,
            max_tokens: 1500,
            top_p: 0.8,
            top_k: 20,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        format!(
            "Write {count} multiple-choice questions about {topic} using only the material below.\n\
             Each question needs 4 options, exactly one correct.\n\n\
             Material:\n{content}\n\n\
             Respond with a single JSON object: {{\"questions\": [{{\"question\": string, \
             \"options\": [string], \"correct_answer\": zero-based index, \"explanation\": string}}]}}",
            count = params.question_count.max(1),
            topic = params.topic_label(),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let mut quiz: Quiz = parse_json_object(raw)?;
        if quiz.questions.is_empty() {
            return Err(ExtractionError::MissingField("questions"));
        }
        for question in &quiz.questions {
            validate(question)?;
        }
        quiz.questions.truncate(params.question_count.max(1));
        quiz.topic = params.topic.clone();
        Ok(ArtifactBody::Quiz(quiz))
    }

    fn fallback(
        &self,
        _content: &str,
        params: &CapabilityParams,
        _reason: &TutorError,
    ) -> ArtifactBody {
        ArtifactBody::Quiz(Quiz {
            topic: params.topic.clone(),
            questions: Vec::new(),
        })
    }

    fn model(&self) -> &ResilientModel {
        &self.model
    }
}
