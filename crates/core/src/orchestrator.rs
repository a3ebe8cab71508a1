//! Orchestrator
//!
//! The entry point for every learner utterance. `process` looks up the
//! learner's session, lets the navigator handle reserved commands and pending
//! answers, and otherwise classifies the utterance and runs the matching
//! capability agents against the current topic. Each turn holds the session
//! lock from start to finish, so one learner's utterances are handled in
//! arrival order while other learners proceed independently.

use chrono::Utc;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::capability::{
    ArtifactBody, CapabilityKind, CapabilitySet, ExplanationStyle, default_params,
};
use crate::curriculum::CurriculumItem;
use crate::error::TutorError;
use crate::intent::{Classification, Intent, IntentClassifier, canned_reply};
use crate::knowledge::{
    Interaction, KnowledgeSummary, KnowledgeTracker, LearnerKnowledge, LearningPatterns, Outcome,
};
use crate::navigator::{Command, Navigator, params_for};
use crate::resilience::ResilientModel;
use crate::response::{CurriculumPosition, Question, QuestionKind, Response};
use crate::session::{SessionState, SessionStore, TeachingMode};
use crate::settings::TutorSettings;
use crate::topic::Topic;

const NEEDS_TOPICS: &str = "Please upload a document first so I have some material to teach from.";

const CHECK_IN: &str =
    "Quick check-in: how is this going for you? Tell me if it's too fast, too slow or just right.";

const PROGRESS_COMMANDS: &[&str] =
    &["progress", "my progress", "show progress", "show my progress"];

/// Phrases after which a topic-change request names its target.
const TOPIC_CHANGE_LEADS: &[&str] = &[
    "switch to",
    "move on to",
    "talk about",
    "go to topic",
    "change topic to",
    "change the topic to",
];

/// Where a learner stands in their current lesson.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonStatus {
    pub teaching_mode: TeachingMode,
    pub position: Option<CurriculumPosition>,
    pub current_item: Option<CurriculumItem>,
    pub current_topic: Option<String>,
}

/// Outcome of [`Orchestrator::ingest_document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub titles: Vec<String>,
    /// Set when the outline is the single-topic fallback.
    pub degraded: Option<TutorError>,
}

/// Routes every utterance to the navigator or the capability agents.
///
/// Safe to share across tasks; each learner's state sits behind its own lock.
pub struct Orchestrator {
    sessions: SessionStore,
    capabilities: CapabilitySet,
    classifier: IntentClassifier,
    tracker: KnowledgeTracker,
    navigator: Navigator,
    settings: TutorSettings,
}

impl Orchestrator {
    /// Builds the agents, classifier and navigator around one shared model.
    pub fn new(model: Arc<ResilientModel>, settings: TutorSettings) -> Self {
        let tracker = KnowledgeTracker::default();
        Self {
            sessions: SessionStore::new(),
            capabilities: CapabilitySet::new(model),
            classifier: IntentClassifier::new(),
            tracker,
            navigator: Navigator::new(settings.clone(), tracker),
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn settings(&self) -> &TutorSettings {
        &self.settings
    }

    /// Handles one utterance and returns what to show the learner.
    #[instrument(skip(self, utterance))]
    pub async fn process(&self, utterance: &str, user_id: &str) -> Response {
        let session = self.sessions.get_or_create(user_id).await;
        let mut state = session.lock().await;

        let mut response = self.respond_to(&mut state, utterance).await;
        self.check_in(&mut state, &mut response);

        state.interaction_counter = state.interaction_counter.wrapping_add(1);
        response.teaching_mode = state.teaching_mode;
        response
    }

    async fn respond_to(&self, state: &mut SessionState, utterance: &str) -> Response {
        if let Some(command) = Command::parse(utterance) {
            debug!(?command, "Reserved command");
            if !matches!(command, Command::Answer { .. }) {
                state.pending_question = None;
                state.question_queue.clear();
            }
            return self
                .navigator
                .handle_command(state, &self.capabilities, command)
                .await;
        }

        if let Some(pending) = &state.pending_question {
            let ignorable = pending.kind == QuestionKind::General && !pending.requires_response;
            let moved_on = ignorable
                && !matches!(
                    self.classifier.classify(utterance).intent,
                    Intent::Feedback | Intent::GeneralQuestion
                );
            if moved_on {
                state.pending_question = None;
            } else if let Some(response) = self
                .navigator
                .answer(state, &self.capabilities, utterance)
                .await
            {
                return response;
            }
        }

        let normalized = utterance.trim().trim_end_matches(['?', '!', '.']).to_lowercase();
        if PROGRESS_COMMANDS.contains(&normalized.as_str()) {
            return self.progress_report(state);
        }

        let classification = self.classifier.classify(utterance);
        info!(
            intent = ?classification.intent,
            capabilities = ?classification.capabilities,
            "Classified utterance"
        );

        if let Some(reply) = canned_reply(classification.intent, state.interaction_counter) {
            return Response::text(reply, state.teaching_mode);
        }
        if state.topics.is_empty() {
            return Response::text(NEEDS_TOPICS, state.teaching_mode);
        }
        if classification.intent == Intent::TopicChange {
            return self.change_topic(state, utterance).await;
        }
        self.run_capabilities(state, utterance, classification).await
    }

    fn progress_report(&self, state: &SessionState) -> Response {
        let summary = self.tracker.summary(&state.progress);
        let text = if summary.is_empty() {
            "You haven't completed any activities yet. Ask me to explain something or say \
             \"start flow\" to begin."
                .to_string()
        } else {
            format!("Here's how you're doing:\n{}", summary.render())
        };
        Response::text(text, state.teaching_mode)
    }

    async fn change_topic(&self, state: &mut SessionState, utterance: &str) -> Response {
        if let Some(title) = topic_target(utterance).and_then(|t| best_match(&state.topics, &t)) {
            info!(%title, "Switching topic");
            return self
                .navigator
                .select_topic(state, &self.capabilities, &title)
                .await;
        }

        let question = Question::topic_selection(
            "Which topic would you like to explore?",
            &state.topic_titles(),
        );
        state.pending_question = Some(question.clone());
        Response::text(question.render(), state.teaching_mode).with_question(question)
    }

    async fn run_capabilities(
        &self,
        state: &mut SessionState,
        utterance: &str,
        classification: Classification,
    ) -> Response {
        let Some(topic) = state
            .current_topic
            .clone()
            .or_else(|| state.topics.first().cloned())
        else {
            return Response::text(NEEDS_TOPICS, state.teaching_mode);
        };
        let content = topic.full_content();
        let mut params = params_for(&self.settings, Some(&topic));
        params.focus = Some(utterance.trim().to_string());
        params.style = match classification.intent {
            Intent::RequestSummary => ExplanationStyle::Summary,
            Intent::RequestExample => ExplanationStyle::Examples,
            _ => ExplanationStyle::Standard,
        };

        let mut response = Response::text("", state.teaching_mode);
        for kind in classification.capabilities {
            let artifact = self.capabilities.dispatch(kind, &content, &params).await;
            if let Some(reason) = &artifact.degraded {
                debug!(capability = %kind, %reason, "Serving fallback artifact");
            }
            match artifact.body {
                ArtifactBody::Explanation(explanation) => {
                    response.append(&explanation.render());
                    self.tracker.record(
                        &mut state.progress,
                        &Interaction::new(&topic.title, Outcome::TopicView { seconds: 0.0 }),
                        Utc::now(),
                    );
                }
                ArtifactBody::Diagram(diagram) => {
                    if response.response.is_empty() {
                        response.append(&format!("Here's a diagram of {}.", topic.title));
                    }
                    response = response.with_diagram(diagram.code);
                }
                ArtifactBody::Quiz(quiz) => {
                    let mut questions = quiz
                        .questions
                        .iter()
                        .map(|q| q.to_question(Some(&topic.title)));
                    match questions.next() {
                        Some(first) => {
                            state.question_queue = questions.collect();
                            response.append(&format!(
                                "Let's test your knowledge of {} ({} questions).",
                                topic.title,
                                state.question_queue.len() + 1
                            ));
                            response.append(&first.render());
                            state.pending_question = Some(first.clone());
                            response = response.with_question(first);
                        }
                        None => response.append(&format!(
                            "I couldn't put together a quiz on {} right now. Try again in a moment.",
                            topic.title
                        )),
                    }
                }
                ArtifactBody::Flashcards(set) => {
                    if set.cards.is_empty() {
                        response
                            .append("I couldn't make flashcards right now. Try again in a moment.");
                    } else {
                        response.append(&format!(
                            "Here are {} flashcards on {}.",
                            set.cards.len(),
                            topic.title
                        ));
                        let cards = serde_json::to_value(&set).unwrap_or_default();
                        response = response.with_flashcards(cards);
                    }
                }
                ArtifactBody::LessonPlan(plan) => response.append(&plan.render()),
                ArtifactBody::Outline(outline) => {
                    let titles: Vec<String> = outline.topics.into_iter().map(|t| t.title).collect();
                    response.append(&format!("Topics found: {}", titles.join(", ")));
                }
            }
        }

        if state.in_lesson() && !state.flow_items.is_empty() {
            response = response.with_position(state.current_position, state.flow_items.len());
        }
        response
    }

    /// Appends the periodic feedback question when it is due and nothing else is pending.
    fn check_in(&self, state: &mut SessionState, response: &mut Response) {
        if !self.settings.feedback.is_due(state.interaction_counter)
            || state.pending_question.is_some()
            || response.question.is_some()
        {
            return;
        }
        let question = Question::general(CHECK_IN);
        response.append(CHECK_IN);
        response.has_question = Some(true);
        response.question = Some(question.clone());
        state.pending_question = Some(question);
    }

    /// Replaces the learner's topics, limited to the configured depth.
    pub async fn load_topics(&self, user_id: &str, mut topics: Vec<Topic>) {
        for topic in &mut topics {
            topic.truncate_depth(self.settings.max_topic_depth);
        }
        let session = self.sessions.get_or_create(user_id).await;
        let mut state = session.lock().await;
        info!(user_id, count = topics.len(), "Loading topics");
        state.load_topics(topics);
    }

    /// Extracts a topic outline from raw document text and loads it.
    pub async fn ingest_document(&self, user_id: &str, text: &str) -> IngestReport {
        let params = default_params(&self.settings, "");
        let artifact = self
            .capabilities
            .dispatch(CapabilityKind::TopicExtract, text, &params)
            .await;
        let topics = match artifact.body {
            ArtifactBody::Outline(outline) => outline.topics,
            _ => Vec::new(),
        };
        let titles = topics.iter().map(|t| t.title.clone()).collect();
        self.load_topics(user_id, topics).await;
        IngestReport {
            titles,
            degraded: artifact.degraded,
        }
    }

    /// Records an externally observed interaction and returns the topic's new level.
    pub async fn record(&self, user_id: &str, interaction: &Interaction) -> f64 {
        let session = self.sessions.get_or_create(user_id).await;
        let mut state = session.lock().await;
        self.tracker.record(&mut state.progress, interaction, Utc::now())
    }

    /// Strength buckets for `user_id`, empty for unknown learners.
    pub async fn summary(&self, user_id: &str) -> KnowledgeSummary {
        match self.sessions.get(user_id).await {
            Some(session) => self.tracker.summary(&session.lock().await.progress),
            None => KnowledgeSummary::default(),
        }
    }

    /// Study-habit statistics for `user_id`.
    pub async fn patterns(&self, user_id: &str) -> LearningPatterns {
        match self.sessions.get(user_id).await {
            Some(session) => self.tracker.patterns(&session.lock().await.progress),
            None => self.tracker.patterns(&LearnerKnowledge::default()),
        }
    }

    /// Lesson state for `user_id`; unknown learners get the conversation default.
    pub async fn lesson_status(&self, user_id: &str) -> LessonStatus {
        let Some(session) = self.sessions.get(user_id).await else {
            return LessonStatus::default();
        };
        let state = session.lock().await;
        let position = (!state.flow_items.is_empty()).then(|| CurriculumPosition {
            current_position: state.current_position,
            total_items: state.flow_items.len(),
        });
        LessonStatus {
            teaching_mode: state.teaching_mode,
            position,
            current_item: state.current_item().cloned(),
            current_topic: state.current_topic.as_ref().map(|t| t.title.clone()),
        }
    }
}

/// Text naming the requested topic, if the utterance names one.
fn topic_target(utterance: &str) -> Option<String> {
    let lowered = utterance.to_lowercase();
    let (index, lead) = TOPIC_CHANGE_LEADS
        .iter()
        .filter_map(|lead| lowered.rfind(lead).map(|i| (i, *lead)))
        .max_by_key(|(i, _)| *i)?;
    let target = lowered[index + lead.len()..]
        .trim()
        .trim_end_matches(['?', '!', '.'])
        .trim();
    let target = target.strip_prefix("the ").unwrap_or(target).trim();
    (!target.is_empty()).then(|| target.to_string())
}

/// The topic title that best fuzzy-matches `target`.
fn best_match(topics: &[Topic], target: &str) -> Option<String> {
    let matcher = SkimMatcherV2::default().ignore_case();
    topics
        .iter()
        .filter_map(|t| matcher.fuzzy_match(&t.title, target).map(|score| (score, t)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, t)| t.title.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::{LONG_CONTENT, model_never_called, wrap};
    use crate::llm_client::MockModelClient;
    use crate::settings::FeedbackPolicy;

    const EXPLANATION: &str =
        r#"{"title": "Photosynthesis", "explanation": "Plants turn light into sugar.", "key_points": ["Needs light"]}"#;
    const QUIZ: &str = r#"{"questions": [
        {"question": "Where does photosynthesis happen?", "options": ["Chloroplasts", "Mitochondria"], "correct_answer": 0, "explanation": "Chloroplasts hold chlorophyll."},
        {"question": "What gas is released?", "options": ["Nitrogen", "Oxygen"], "correct_answer": 1}
    ]}"#;
    const DIAGRAM: &str = "```mermaid\nflowchart TD\n    A[Light] --> B[Sugar]\n```";
    const OUTLINE: &str = r#"{"topics": [
        {"title": "Photosynthesis", "content": "Light to sugar.", "subtopics": [{"title": "Calvin cycle", "content": "Carbon fixation."}]},
        {"title": "Respiration", "content": "Sugar to energy."}
    ]}"#;

    /// A model that answers each capability with a well-formed artifact.
    fn scripted_model() -> Arc<ResilientModel> {
        let mut mock = MockModelClient::new();
        mock.expect_generate().returning(|_, prompt, _| {
            let reply = if prompt.starts_with("Write") {
                QUIZ
            } else if prompt.starts_with("Draw a mermaid") {
                DIAGRAM
            } else if prompt.starts_with("Split the document") {
                OUTLINE
            } else {
                EXPLANATION
            };
            Ok(reply.to_string())
        });
        wrap(mock)
    }

    fn quiet_settings() -> TutorSettings {
        TutorSettings {
            feedback: FeedbackPolicy::DISABLED,
            ..TutorSettings::default()
        }
    }

    fn topics() -> Vec<Topic> {
        vec![
            Topic::new("Photosynthesis", LONG_CONTENT),
            Topic::new("Genetics", LONG_CONTENT),
        ]
    }

    #[tokio::test]
    async fn test_requests_without_topics_ask_for_upload() {
        let orchestrator = Orchestrator::new(model_never_called(), quiet_settings());
        let response = orchestrator.process("explain gravity", "u1").await;
        assert_eq!(response.response, NEEDS_TOPICS);

        let response = orchestrator.process("start flow", "u1").await;
        assert!(response.response.contains("don't have any topics"));
        assert_eq!(response.teaching_mode, TeachingMode::Conversation);
    }

    #[tokio::test]
    async fn test_greeting_needs_no_model() {
        let orchestrator = Orchestrator::new(model_never_called(), quiet_settings());
        let first = orchestrator.process("hello", "u1").await;
        let second = orchestrator.process("hi", "u1").await;
        assert_eq!(Some(first.response.as_str()), canned_reply(Intent::Greeting, 0));
        assert_eq!(Some(second.response.as_str()), canned_reply(Intent::Greeting, 1));
    }

    #[tokio::test]
    async fn test_explanation_records_topic_view() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("u1", topics()).await;

        let response = orchestrator.process("explain photosynthesis", "u1").await;
        assert!(response.response.contains("Plants turn light into sugar."));
        assert!(response.has_diagram.is_none());

        let patterns = orchestrator.patterns("u1").await;
        assert_eq!(patterns.total_interactions, 1);
    }

    #[tokio::test]
    async fn test_process_vocabulary_adds_diagram() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("u1", topics()).await;

        let response = orchestrator.process("explain the process", "u1").await;
        assert_eq!(response.has_diagram, Some(true));
        assert!(response.mermaid_code.unwrap().starts_with("flowchart TD"));
    }

    #[tokio::test]
    async fn test_quiz_questions_are_posed_one_at_a_time() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("u1", topics()).await;

        let response = orchestrator.process("quiz me", "u1").await;
        let question = response.question.unwrap();
        assert_eq!(question.kind, QuestionKind::MultipleChoice);
        assert!(question.text.contains("Where does photosynthesis"));

        let response = orchestrator.process("chloroplasts", "u1").await;
        assert!(response.response.starts_with("Correct!"));
        assert!(response.question.unwrap().text.contains("What gas"));

        let response = orchestrator.process("1", "u1").await;
        assert!(response.response.contains("The correct answer is: Oxygen"));
        assert!(response.question.is_none());

        let summary = orchestrator.summary("u1").await;
        // +15 for the right answer, -5 for the wrong one.
        let level = summary
            .weak
            .iter()
            .find(|m| m.topic == "Photosynthesis")
            .map(|m| m.level);
        assert_eq!(level, Some(10.0));
    }

    #[tokio::test]
    async fn test_command_clears_pending_question() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("u1", topics()).await;
        orchestrator.process("quiz me", "u1").await;

        let response = orchestrator.process("next", "u1").await;
        assert!(response.response.contains("start flow"));
        let session = orchestrator.sessions().get("u1").await.unwrap();
        assert!(session.lock().await.pending_question.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("alice", topics()).await;
        orchestrator.load_topics("bob", topics()).await;

        let response = orchestrator.process("start flow", "alice").await;
        assert_eq!(response.teaching_mode, TeachingMode::DynamicFlow);
        assert_eq!(response.curriculum.map(|c| c.current_position), Some(0));

        let bob = orchestrator.lesson_status("bob").await;
        assert_eq!(bob.teaching_mode, TeachingMode::Conversation);
        assert!(bob.position.is_none());

        orchestrator.process("next", "alice").await;
        let alice = orchestrator.lesson_status("alice").await;
        assert_eq!(alice.position.map(|p| p.current_position), Some(1));
    }

    #[tokio::test]
    async fn test_reads_for_unknown_learner_create_no_session() {
        let orchestrator = Orchestrator::new(model_never_called(), quiet_settings());

        let patterns = orchestrator.patterns("ghost").await;
        let status = orchestrator.lesson_status("ghost").await;
        let summary = orchestrator.summary("ghost").await;

        assert_eq!(patterns.total_interactions, 0);
        assert_eq!(status, LessonStatus::default());
        assert!(summary.weak.is_empty());
        assert_eq!(orchestrator.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn test_topic_change_by_name_and_by_selection() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        orchestrator.load_topics("u1", topics()).await;

        let response = orchestrator.process("let's talk about genetics", "u1").await;
        assert!(response.response.starts_with("Let's look at Genetics."));
        let status = orchestrator.lesson_status("u1").await;
        assert_eq!(status.current_topic.as_deref(), Some("Genetics"));

        let response = orchestrator.process("can we try a different topic", "u1").await;
        let question = response.question.unwrap();
        assert_eq!(question.kind, QuestionKind::TopicSelection);

        let response = orchestrator.process("1", "u1").await;
        assert!(response.response.starts_with("Let's look at Photosynthesis."));
    }

    #[tokio::test]
    async fn test_feedback_check_in_cadence() {
        let orchestrator = Orchestrator::new(model_never_called(), TutorSettings::default());
        let first = orchestrator.process("hello", "u1").await;
        let second = orchestrator.process("hello", "u1").await;
        let third = orchestrator.process("hello", "u1").await;
        assert!(first.question.is_none());
        assert!(second.question.is_none());
        assert_eq!(third.question.map(|q| q.kind), Some(QuestionKind::General));

        let reply = orchestrator.process("a bit too fast", "u1").await;
        assert!(reply.response.contains("Thanks for the feedback"));
    }

    #[tokio::test]
    async fn test_ignored_check_in_does_not_swallow_requests() {
        let orchestrator = Orchestrator::new(model_never_called(), TutorSettings::default());
        for _ in 0..3 {
            orchestrator.process("hey", "u1").await;
        }
        let response = orchestrator.process("explain gravity", "u1").await;
        assert_eq!(response.response, NEEDS_TOPICS);
    }

    #[tokio::test]
    async fn test_ingest_document_loads_outline() {
        let orchestrator = Orchestrator::new(scripted_model(), quiet_settings());
        let report = orchestrator
            .ingest_document("u1", &LONG_CONTENT.repeat(2))
            .await;
        assert_eq!(report.titles, vec!["Photosynthesis", "Respiration"]);
        assert!(report.degraded.is_none());

        let response = orchestrator.process("start flow", "u1").await;
        assert_eq!(response.teaching_mode, TeachingMode::DynamicFlow);
    }

    #[tokio::test]
    async fn test_short_document_falls_back_to_single_topic() {
        let orchestrator = Orchestrator::new(model_never_called(), quiet_settings());
        let report = orchestrator.ingest_document("u1", "Tiny note\nabout cells").await;
        assert_eq!(report.titles, vec!["Tiny note"]);
        assert!(matches!(
            report.degraded,
            Some(TutorError::InsufficientInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_progress_command() {
        let orchestrator = Orchestrator::new(model_never_called(), quiet_settings());
        let empty = orchestrator.process("my progress", "u1").await;
        assert!(empty.response.contains("haven't completed"));

        orchestrator
            .record("u1", &Interaction::new("Cells", Outcome::QuizResult { score: 95.0 }))
            .await;
        let report = orchestrator.process("Progress?", "u1").await;
        assert!(report.response.contains("Needs work: Cells"));
    }

    #[test]
    fn test_topic_target_extraction() {
        assert_eq!(
            topic_target("Let's talk about the Calvin cycle?").as_deref(),
            Some("calvin cycle")
        );
        assert_eq!(topic_target("switch to genetics").as_deref(), Some("genetics"));
        assert_eq!(topic_target("another topic please"), None);
        assert_eq!(
            best_match(&topics(), "genetic").as_deref(),
            Some("Genetics")
        );
        assert_eq!(best_match(&topics(), "zzz"), None);
    }
}
