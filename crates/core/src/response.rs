//! Shapes returned to the caller of [`crate::orchestrator::Orchestrator::process`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::TeachingMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    TopicSelection,
    MultipleChoice,
    Confirmation,
    General,
}

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

impl QuestionOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_correct: None,
        }
    }
}

/// A question awaiting the learner's next utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Question {
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub requires_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Topic the answer should be credited to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtopic: Option<String>,
}

impl Question {
    /// A yes/no question with ids `1` (yes) and `2` (no).
    pub fn confirmation(text: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::Confirmation,
            text: text.into(),
            options: vec![QuestionOption::new("1", "Yes"), QuestionOption::new("2", "No")],
            requires_response: true,
            explanation: None,
            topic: None,
            subtopic: None,
        }
    }

    /// A free-text question the learner may ignore.
    pub fn general(text: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::General,
            text: text.into(),
            options: Vec::new(),
            requires_response: false,
            explanation: None,
            topic: None,
            subtopic: None,
        }
    }

    /// Options are numbered from 1 in the given order.
    pub fn topic_selection(text: impl Into<String>, titles: &[String]) -> Self {
        Self {
            kind: QuestionKind::TopicSelection,
            text: text.into(),
            options: titles
                .iter()
                .enumerate()
                .map(|(i, title)| QuestionOption::new((i + 1).to_string(), title.clone()))
                .collect(),
            requires_response: true,
            explanation: None,
            topic: None,
            subtopic: None,
        }
    }

    /// Question text followed by numbered options.
    pub fn render(&self) -> String {
        let mut out = self.text.clone();
        for option in &self.options {
            out.push_str(&format!("\n{}. {}", option.id, option.text));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CurriculumPosition {
    pub current_position: usize,
    pub total_items: usize,
}

/// Everything the front end needs to render one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub response: String,
    pub teaching_mode: TeachingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_question: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_diagram: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mermaid_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_flashcards: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flashcards: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<CurriculumPosition>,
}

impl Response {
    pub fn text(response: impl Into<String>, teaching_mode: TeachingMode) -> Self {
        Self {
            response: response.into(),
            teaching_mode,
            has_question: None,
            question: None,
            has_diagram: None,
            mermaid_code: None,
            has_flashcards: None,
            flashcards: None,
            curriculum: None,
        }
    }

    pub fn with_question(mut self, question: Question) -> Self {
        self.has_question = Some(true);
        self.question = Some(question);
        self
    }

    pub fn with_diagram(mut self, code: impl Into<String>) -> Self {
        self.has_diagram = Some(true);
        self.mermaid_code = Some(code.into());
        self
    }

    pub fn with_flashcards(mut self, flashcards: serde_json::Value) -> Self {
        self.has_flashcards = Some(true);
        self.flashcards = Some(flashcards);
        self
    }

    pub fn with_position(mut self, current_position: usize, total_items: usize) -> Self {
        self.curriculum = Some(CurriculumPosition {
            current_position,
            total_items,
        });
        self
    }

    /// Appends a paragraph to the response text.
    pub fn append(&mut self, text: &str) {
        if !self.response.is_empty() {
            self.response.push_str("\n\n");
        }
        self.response.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_value(Response::text("hi", TeachingMode::Conversation)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"response": "hi", "teaching_mode": "conversation"})
        );
    }

    #[test]
    fn test_builders_set_flags() {
        let response = Response::text("diagram", TeachingMode::Flow)
            .with_diagram("graph TD")
            .with_position(2, 5);
        assert_eq!(response.has_diagram, Some(true));
        assert_eq!(response.mermaid_code.as_deref(), Some("graph TD"));
        assert_eq!(
            response.curriculum,
            Some(CurriculumPosition {
                current_position: 2,
                total_items: 5
            })
        );
    }

    #[test]
    fn test_question_render_numbers_options() {
        let question =
            Question::topic_selection("Pick one:", &["Cells".to_string(), "Genes".to_string()]);
        assert_eq!(question.render(), "Pick one:\n1. Cells\n2. Genes");
        assert!(question.requires_response);
    }

    #[test]
    fn test_options_compare_by_value() {
        let mut options = vec![
            QuestionOption::new("1", "Paris"),
            QuestionOption::new("1", "Paris"),
        ];
        options.dedup();
        assert_eq!(options, vec![QuestionOption::new("1", "Paris")]);
        let graded = QuestionOption {
            is_correct: Some(true),
            ..QuestionOption::new("1", "Paris")
        };
        assert_ne!(graded, options[0]);
    }
}
