//! Intent classification for free-text utterances.
//!
//! A fixed, ordered pattern table; the first category that matches wins and
//! anything unmatched is a general question. Classification is pure and
//! always produces a label.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityKind;

/// What the learner is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Question,
    RequestExplanation,
    RequestSummary,
    RequestExample,
    RequestQuiz,
    RequestFlashcards,
    RequestDiagram,
    RequestLessonPlan,
    Feedback,
    TopicChange,
    GeneralQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub capabilities: Vec<CapabilityKind>,
}

enum Rule {
    /// Short utterance whose first words are one of these.
    Opening(&'static [&'static str]),
    /// First word is one of these.
    FirstWord(&'static [&'static str]),
    /// Any phrase appears at a word boundary.
    Contains(&'static [&'static str]),
}

const PATTERNS: &[(Intent, Rule)] = &[
    (
        Intent::Greeting,
        Rule::Opening(&[
            "hi", "hello", "hey", "hiya", "greetings", "good morning", "good afternoon",
            "good evening",
        ]),
    ),
    (
        Intent::Question,
        Rule::FirstWord(&["what", "why", "how", "when", "where", "who", "which", "whose"]),
    ),
    (
        Intent::RequestExplanation,
        Rule::Contains(&[
            "explain", "tell me about", "describe", "teach me", "help me understand", "clarify",
            "elaborate",
        ]),
    ),
    (
        Intent::RequestSummary,
        Rule::Contains(&["summar", "recap", "overview", "tl;dr", "key points", "in short"]),
    ),
    (
        Intent::RequestExample,
        Rule::Contains(&["example", "for instance", "show me how", "demonstrate", "illustrate"]),
    ),
    (
        Intent::RequestQuiz,
        Rule::Contains(&["quiz", "test me", "practice question", "question me", "exam"]),
    ),
    (
        Intent::RequestFlashcards,
        Rule::Contains(&["flashcard", "flash card", "memorize", "memorise", "cards"]),
    ),
    (
        Intent::RequestDiagram,
        Rule::Contains(&["diagram", "chart", "visuali", "draw", "mind map", "mindmap", "graph"]),
    ),
    (
        Intent::RequestLessonPlan,
        Rule::Contains(&["lesson plan", "study plan", "plan a lesson", "syllabus", "schedule"]),
    ),
    (
        Intent::Feedback,
        Rule::Contains(&[
            "thanks", "thank you", "helpful", "great", "awesome", "makes sense", "got it",
            "too hard", "too easy", "confusing",
        ]),
    ),
    (
        Intent::TopicChange,
        Rule::Contains(&[
            "switch to", "change topic", "change the topic", "move on to", "let's talk about",
            "lets talk about", "another topic", "different topic", "go to topic",
        ]),
    ),
];

/// Vocabulary that suggests a picture would help.
const STRUCTURE_WORDS: &[&str] = &[
    "process", "step", "stage", "structure", "architecture", "hierarchy", "cycle", "workflow",
    "pipeline", "relationship", "component", "sequence", "flow",
];

fn normalize(utterance: &str) -> String {
    utterance
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `phrase` occurs in `text` starting at a word boundary.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(i, _)| {
        text[..i]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

fn first_word(text: &str) -> &str {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .find(|w| !w.is_empty())
        .unwrap_or("")
}

impl Rule {
    fn matches(&self, text: &str) -> bool {
        match self {
            Rule::Opening(openers) => {
                text.split_whitespace().count() <= 4
                    && openers.iter().any(|o| {
                        text.strip_prefix(*o).is_some_and(|rest| {
                            rest.chars().next().is_none_or(|c| !c.is_alphanumeric())
                        })
                    })
            }
            Rule::FirstWord(words) => words.contains(&first_word(text)),
            Rule::Contains(phrases) => phrases.iter().any(|p| contains_phrase(text, p)),
        }
    }
}

/// Keyword classifier; first matching rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `utterance` and names the capabilities that serve it.
    pub fn classify(&self, utterance: &str) -> Classification {
        let text = normalize(utterance);
        let intent = PATTERNS
            .iter()
            .find(|(_, rule)| rule.matches(&text))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::GeneralQuestion);

        let mut capabilities = match intent {
            Intent::Greeting | Intent::Feedback => Vec::new(),
            Intent::Question
            | Intent::RequestExplanation
            | Intent::RequestSummary
            | Intent::RequestExample
            | Intent::TopicChange
            | Intent::GeneralQuestion => vec![CapabilityKind::Explainer],
            Intent::RequestQuiz => vec![CapabilityKind::Quiz],
            Intent::RequestFlashcards => vec![CapabilityKind::Flashcard],
            Intent::RequestDiagram => vec![CapabilityKind::Diagram],
            Intent::RequestLessonPlan => vec![CapabilityKind::LessonPlan],
        };
        let explains = matches!(
            intent,
            Intent::Question | Intent::RequestExplanation | Intent::GeneralQuestion
        );
        if explains && STRUCTURE_WORDS.iter().any(|w| contains_phrase(&text, w)) {
            capabilities.push(CapabilityKind::Diagram);
        }

        Classification {
            intent,
            capabilities,
        }
    }
}

const GREETINGS: &[&str] = &[
    "Hello! Ready to learn something new? Ask me anything about your material, or say \"start flow\" for a guided lesson.",
    "Hi there! I can explain topics, quiz you, make flashcards or draw diagrams. Where would you like to start?",
    "Hey! Good to see you. Say \"start flow\" to begin a lesson or just ask a question.",
];

const FEEDBACK_REPLIES: &[&str] = &[
    "Thanks for letting me know! Shall we keep going?",
    "Glad to hear it. Tell me what you'd like to explore next.",
    "Noted, thank you. I'll keep that in mind as we continue.",
];

/// Picks a canned reply for intents that need no capability.
///
/// Rotates through the variations using the interaction counter so that
/// consecutive turns don't repeat.
pub fn canned_reply(intent: Intent, interaction_counter: u32) -> Option<&'static str> {
    let variations = match intent {
        Intent::Greeting => GREETINGS,
        Intent::Feedback => FEEDBACK_REPLIES,
        _ => return None,
    };
    Some(variations[interaction_counter as usize % variations.len()])
}
