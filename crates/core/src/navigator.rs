//! Lesson navigation state machine.
//!
//! The navigator owns the teaching mode, the position within the current
//! curriculum and the correlation of the learner's replies with the single
//! outstanding question. Rendering a curriculum item dispatches to the
//! matching capability agent.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::capability::{
    ArtifactBody, CapabilityKind, CapabilityParams, CapabilitySet, ExplanationStyle,
    default_params,
};
use crate::curriculum::{CurriculumBuilder, CurriculumItem, ItemKind};
use crate::error::TutorError;
use crate::knowledge::{Interaction, KnowledgeTracker, Outcome};
use crate::response::{Question, QuestionKind, QuestionOption, Response};
use crate::session::{SessionState, TeachingMode};
use crate::settings::TutorSettings;
use crate::topic::Topic;

/// Reserved command strings, matched case-insensitively as a whole
/// utterance or as its leading words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartFlow,
    Next,
    Previous,
    Repeat,
    Stop,
    /// `!answer:<id>:<text>` sent by front ends with clickable options.
    Answer { id: String, text: String },
}

const COMMAND_WORDS: &[(&str, Command)] = &[
    ("start flow", Command::StartFlow),
    ("next", Command::Next),
    ("continue", Command::Next),
    ("proceed", Command::Next),
    ("previous", Command::Previous),
    ("go back", Command::Previous),
    ("back", Command::Previous),
    ("repeat", Command::Repeat),
    ("again", Command::Repeat),
    ("end lesson", Command::Stop),
    ("stop", Command::Stop),
    ("exit", Command::Stop),
    ("quit", Command::Stop),
];

const ANSWER_SENTINEL: &str = "!answer:";

impl Command {
    /// Recognizes a reserved command at the start of `utterance`, ignoring case.
    pub fn parse(utterance: &str) -> Option<Command> {
        let trimmed = utterance.trim();
        let sentinel = trimmed
            .get(..ANSWER_SENTINEL.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(ANSWER_SENTINEL));
        if let Some(rest) = sentinel.map(|prefix| &trimmed[prefix.len()..]) {
            let (id, text) = rest.split_once(':').unwrap_or((rest, ""));
            return Some(Command::Answer {
                id: id.trim().to_string(),
                text: text.trim().to_string(),
            });
        }

        let lowered = trimmed.to_lowercase();
        COMMAND_WORDS.iter().find_map(|(word, command)| {
            let rest = lowered.strip_prefix(word)?;
            rest.chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric())
                .then(|| command.clone())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// How a reply was matched against the pending question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Option(QuestionOption),
    Confirmed,
    Declined,
    FreeText(String),
    Unmatched,
}

/// Resolves `reply` against `options`: exact id, then integer id, then
/// case-insensitive substring of the option text.
pub fn resolve_option<'a>(
    options: &'a [QuestionOption],
    reply: &str,
) -> Option<&'a QuestionOption> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }
    if let Some(option) = options.iter().find(|o| o.id == reply) {
        return Some(option);
    }
    let numeric = reply
        .trim_end_matches(['.', ')', ':'])
        .trim()
        .parse::<i64>()
        .ok();
    if let Some(n) = numeric {
        if let Some(option) = options
            .iter()
            .find(|o| o.id.trim().parse::<i64>().ok() == Some(n))
        {
            return Some(option);
        }
    }
    let lowered = reply.to_lowercase();
    options.iter().find(|o| {
        let text = o.text.to_lowercase();
        !text.is_empty() && (text.contains(&lowered) || lowered.contains(&text))
    })
}

pub fn resolve_confirmation(reply: &str) -> Resolution {
    let normalized = reply
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    match normalized.as_str() {
        "yes" | "y" | "yeah" | "1" => Resolution::Confirmed,
        "no" | "n" | "nope" | "2" => Resolution::Declined,
        _ => Resolution::Unmatched,
    }
}

/// Matches a reply against a question of any kind.
pub fn resolve(question: &Question, reply: &str) -> Resolution {
    match question.kind {
        QuestionKind::Confirmation => resolve_confirmation(reply),
        QuestionKind::General => {
            let text = reply.trim();
            if text.is_empty() {
                Resolution::Unmatched
            } else {
                Resolution::FreeText(text.to_string())
            }
        }
        QuestionKind::MultipleChoice | QuestionKind::TopicSelection => {
            resolve_option(&question.options, reply)
                .cloned()
                .map(Resolution::Option)
                .unwrap_or(Resolution::Unmatched)
        }
    }
}

/// Picks what to resolve for an `!answer:<id>:<text>` command: the id when
/// it matches the pending question, otherwise the text.
fn answer_reply(question: Option<&Question>, id: String, text: String) -> String {
    if id.is_empty() {
        return text;
    }
    if text.is_empty() {
        return id;
    }
    match question.map(|q| resolve(q, &id)) {
        Some(Resolution::Option(_) | Resolution::Confirmed | Resolution::Declined) => id,
        _ => text,
    }
}

const NO_TOPICS: &str =
    "I don't have any topics yet. Upload a document first and I'll build a lesson from it.";
const CURRICULUM_EMPTY: &str =
    "There's no lesson to navigate yet. Say \"start flow\" to begin one.";
const LESSON_FINISHED: &str = "You've reached the end of this lesson! Say \"stop\" to return to \
     free conversation, or \"back\" to revisit a step.";

/// Drives a learner through their curriculum.
pub struct Navigator {
    builder: CurriculumBuilder,
    tracker: KnowledgeTracker,
    settings: TutorSettings,
}

impl Navigator {
    /// Creates a navigator whose curriculum builder honours `settings`.
    pub fn new(settings: TutorSettings, tracker: KnowledgeTracker) -> Self {
        Self {
            builder: CurriculumBuilder::new(settings.min_practice_content),
            tracker,
            settings,
        }
    }

    fn respond(&self, state: &SessionState, text: impl Into<String>) -> Response {
        Response::text(text, state.teaching_mode)
    }

    /// Applies a reserved command to the learner's session.
    pub async fn handle_command(
        &self,
        state: &mut SessionState,
        caps: &CapabilitySet,
        command: Command,
    ) -> Response {
        match command {
            Command::StartFlow => self.start_flow(state, caps).await,
            Command::Next => self.advance(state, caps, Direction::Next).await,
            Command::Previous => self.advance(state, caps, Direction::Previous).await,
            Command::Repeat => self.repeat(state, caps).await,
            Command::Stop => self.stop(state),
            Command::Answer { id, text } => {
                let reply = answer_reply(state.pending_question.as_ref(), id, text);
                match self.answer(state, caps, &reply).await {
                    Some(response) => response,
                    None => self.respond(state, "There's no open question to answer right now."),
                }
            }
        }
    }

    /// Builds a curriculum from the loaded topics and renders its first item.
    pub async fn start_flow(&self, state: &mut SessionState, caps: &CapabilitySet) -> Response {
        let (curriculum, mode, intro) = match state.topics.as_slice() {
            [] => return self.respond(state, NO_TOPICS),
            [only] => (
                self.builder.single_topic_flow(only),
                TeachingMode::Flow,
                format!("Let's begin a guided lesson on {}.", only.title),
            ),
            topics => {
                let curriculum = self.builder.build(topics);
                let intro = format!(
                    "I've put together a lesson covering {} topics in {} steps.",
                    topics.len(),
                    curriculum.len()
                );
                (curriculum, TeachingMode::DynamicFlow, intro)
            }
        };

        info!(user_id = %state.user_id, %mode, items = curriculum.len(), "Starting lesson");
        state.current_topic = state.topics.first().cloned();
        state.start_curriculum(curriculum, mode);

        let mut response = self.render_current(state, caps).await;
        response.response = format!("{intro}\n\n{}", response.response);
        response
    }

    /// Ends the lesson and returns to conversation; mastery is kept.
    pub fn stop(&self, state: &mut SessionState) -> Response {
        if !state.in_lesson() {
            return self.respond(state, "There's no lesson running. Ask me anything!");
        }
        let total = state.flow_items.len();
        let reached = (state.current_position + 1).min(total);
        state.teaching_mode = TeachingMode::Conversation;
        state.pending_question = None;
        state.question_queue.clear();
        info!(user_id = %state.user_id, reached, total, "Lesson stopped");
        self.respond(
            state,
            format!(
                "Lesson ended after step {reached} of {total}. We're back to free conversation; \
                 say \"start flow\" any time to begin again."
            ),
        )
    }

    /// Moves one step in `direction` and renders the resulting item.
    ///
    /// At the last item `Next` reports completion without moving; at the
    /// first item `Previous` is a no-op. Leaving a transition item jumps to
    /// the first item of the next topic.
    pub async fn advance(
        &self,
        state: &mut SessionState,
        caps: &CapabilitySet,
        direction: Direction,
    ) -> Response {
        if !state.in_lesson() || state.flow_items.is_empty() {
            return self.respond(state, CURRICULUM_EMPTY);
        }
        let total = state.flow_items.len();
        if state.current_position >= total {
            return self.start_over(state, caps).await;
        }

        let last = total - 1;
        let target = match direction {
            Direction::Next if state.current_position >= last => {
                return self
                    .respond(state, LESSON_FINISHED)
                    .with_position(state.current_position, total);
            }
            Direction::Next => jump_target(&state.flow_items, state.current_position),
            Direction::Previous if state.current_position == 0 => {
                return self
                    .respond(state, "We're already at the first step.")
                    .with_position(0, total);
            }
            Direction::Previous => state.current_position - 1,
        };

        debug!(
            user_id = %state.user_id,
            from = state.current_position,
            to = target,
            ?direction,
            "Advancing"
        );
        state.current_position = target.min(last);
        self.render_current(state, caps).await
    }

    /// Renders the current item again without moving.
    pub async fn repeat(&self, state: &mut SessionState, caps: &CapabilitySet) -> Response {
        if !state.in_lesson() || state.flow_items.is_empty() {
            return self.respond(state, CURRICULUM_EMPTY);
        }
        self.render_current(state, caps).await
    }

    /// Consumes the pending question with `reply`.
    ///
    /// Returns `None` when no question is pending. The question is cleared
    /// whether or not the reply could be matched.
    pub async fn answer(
        &self,
        state: &mut SessionState,
        caps: &CapabilitySet,
        reply: &str,
    ) -> Option<Response> {
        let question = state.pending_question.take()?;
        let resolution = resolve(&question, reply);
        debug!(user_id = %state.user_id, kind = ?question.kind, ?resolution, "Resolving answer");

        let response = match (question.kind, resolution) {
            (QuestionKind::MultipleChoice, Resolution::Option(option)) => {
                self.grade(state, &question, &option)
            }
            (QuestionKind::MultipleChoice, _) => {
                let correct = question
                    .options
                    .iter()
                    .find(|o| o.is_correct == Some(true))
                    .map(|o| format!(" The correct answer was: {}.", o.text))
                    .unwrap_or_default();
                self.respond(
                    state,
                    format!("I couldn't match that to any of the options.{correct}"),
                )
            }
            (QuestionKind::Confirmation, Resolution::Confirmed) => {
                if state.current_item().map(|i| i.kind) == Some(ItemKind::Transition) {
                    return Some(self.advance(state, caps, Direction::Next).await);
                }
                self.respond(state, "Great, let's keep going!")
            }
            (QuestionKind::Confirmation, Resolution::Declined) => self.respond(
                state,
                "No problem, take your time. Say \"next\" whenever you're ready, or \"repeat\" to review.",
            ),
            (QuestionKind::Confirmation, _) => self.respond(
                state,
                "I wasn't sure whether that was a yes or a no. Say \"next\" when you're ready to move on.",
            ),
            (QuestionKind::TopicSelection, Resolution::Option(option)) => {
                return Some(self.select_topic(state, caps, &option.text).await);
            }
            (QuestionKind::TopicSelection, _) => {
                let titles = state.topic_titles().join(", ");
                self.respond(
                    state,
                    format!("I couldn't find that topic. The topics I know about are: {titles}."),
                )
            }
            (QuestionKind::General, Resolution::FreeText(_)) => {
                self.respond(state, "Thanks for the feedback! Let's continue.")
            }
            (QuestionKind::General, _) => self.respond(state, "No worries. Let's continue."),
        };

        Some(self.follow_up(state, response))
    }

    /// Poses the next queued quiz question, or reminds the learner how to move on.
    fn follow_up(&self, state: &mut SessionState, mut response: Response) -> Response {
        if let Some(next) = state.question_queue.pop_front() {
            response.append(&next.render());
            state.pending_question = Some(next.clone());
            response = response.with_question(next);
        } else if state.in_lesson() {
            response.append("Say \"next\" to continue.");
        }
        if state.in_lesson() && !state.flow_items.is_empty() {
            response = response.with_position(state.current_position, state.flow_items.len());
        }
        response.teaching_mode = state.teaching_mode;
        response
    }

    fn grade(
        &self,
        state: &mut SessionState,
        question: &Question,
        option: &QuestionOption,
    ) -> Response {
        let correct = option.is_correct == Some(true);
        let mut text = if correct {
            "Correct! Well done.".to_string()
        } else {
            let right = question
                .options
                .iter()
                .find(|o| o.is_correct == Some(true))
                .map(|o| o.text.as_str())
                .unwrap_or("not available");
            format!("Not quite. The correct answer is: {right}.")
        };
        if let Some(explanation) = &question.explanation {
            text.push_str(&format!("\n\n{explanation}"));
        }

        if let Some(topic) = &question.topic {
            let mut interaction = Interaction::new(
                topic.clone(),
                Outcome::QuizResult {
                    score: if correct { 100.0 } else { 0.0 },
                },
            );
            interaction.subtopic = question.subtopic.clone();
            let level = self.tracker.record(&mut state.progress, &interaction, Utc::now());
            info!(user_id = %state.user_id, %topic, correct, level, "Recorded quiz answer");
        }
        self.respond(state, text)
    }

    /// Makes `title` the current topic and explains it.
    pub async fn select_topic(
        &self,
        state: &mut SessionState,
        caps: &CapabilitySet,
        title: &str,
    ) -> Response {
        let Some(topic) = state.topics.iter().find(|t| t.title == title).cloned() else {
            return self.respond(state, format!("I don't know a topic called {title}."));
        };
        state.current_topic = Some(topic.clone());
        let params = default_params(&self.settings, &topic.title);
        let artifact = caps
            .dispatch(CapabilityKind::Explainer, &topic.full_content(), &params)
            .await;
        self.record_view(state, &topic.title, None);
        let body = explanation_text(artifact.body);
        self.respond(state, format!("Let's look at {}.\n\n{body}", topic.title))
    }

    async fn start_over(&self, state: &mut SessionState, caps: &CapabilitySet) -> Response {
        let err = TutorError::Navigation(format!(
            "position {} outside curriculum of {} items",
            state.current_position,
            state.flow_items.len()
        ));
        warn!(user_id = %state.user_id, error = %err, "Resetting lesson position");
        state.current_position = 0;
        state.pending_question = None;
        let mut response = self.render_current(state, caps).await;
        response.response = format!(
            "Let's start over from the beginning.\n\n{}",
            response.response
        );
        response
    }

    fn record_view(&self, state: &mut SessionState, topic: &str, subtopic: Option<&str>) {
        let mut interaction = Interaction::new(topic, Outcome::TopicView { seconds: 0.0 });
        interaction.subtopic = subtopic.map(str::to_string);
        self.tracker.record(&mut state.progress, &interaction, Utc::now());
    }

    /// Renders the item at the current position.
    pub async fn render_current(&self, state: &mut SessionState, caps: &CapabilitySet) -> Response {
        let total = state.flow_items.len();
        let position = state.current_position;
        let Some(item) = state.current_item().cloned() else {
            return self.respond(state, CURRICULUM_EMPTY);
        };

        let mut response = self.render_item(state, caps, &item).await;
        let header = format!("Step {} of {}: {}", position + 1, total, item.description);
        response.response = format!("{header}\n\n{}", response.response);
        response.teaching_mode = state.teaching_mode;
        response.with_position(position, total)
    }

    async fn render_item(
        &self,
        state: &mut SessionState,
        caps: &CapabilitySet,
        item: &CurriculumItem,
    ) -> Response {
        let found = material(state, item);
        let label = found
            .as_ref()
            .map(|(topic, sub)| sub.as_ref().unwrap_or(topic).title.clone())
            .unwrap_or_default();
        let mut params = default_params(&self.settings, &label);

        match (item.kind, found) {
            (ItemKind::Transition, _) => self.render_transition(state, item),
            (ItemKind::Completion, _) => {
                let summary = self.tracker.summary(&state.progress).render();
                self.respond(
                    state,
                    format!(
                        "Congratulations, you've completed the whole course!\n\n\
                         Your progress:\n{summary}"
                    ),
                )
            }
            (_, None) => {
                warn!(user_id = %state.user_id, ?item, "Curriculum item refers to a missing topic");
                self.respond(state, "I lost track of that topic. Say \"next\" to move on.")
            }
            (ItemKind::Explainer, Some((topic, subtopic))) => {
                let content = match &subtopic {
                    Some(sub) => sub.full_content(),
                    None if !topic.content.trim().is_empty() => topic.content.clone(),
                    None => topic.full_content(),
                };
                let artifact = caps.dispatch(CapabilityKind::Explainer, &content, &params).await;
                self.record_view(
                    state,
                    &topic.title,
                    subtopic.as_ref().map(|s| s.title.as_str()),
                );
                self.respond(state, explanation_text(artifact.body))
            }
            (ItemKind::Summary, Some((topic, _))) => {
                params.style = ExplanationStyle::Summary;
                let artifact = caps
                    .dispatch(CapabilityKind::Explainer, &topic.full_content(), &params)
                    .await;
                self.respond(state, explanation_text(artifact.body))
            }
            (ItemKind::Diagram, Some((topic, _))) => {
                let artifact = caps
                    .dispatch(CapabilityKind::Diagram, &topic.full_content(), &params)
                    .await;
                let response = self.respond(state, format!("Here's a visual overview of {label}."));
                match artifact.body {
                    ArtifactBody::Diagram(diagram) => response.with_diagram(diagram.code),
                    _ => response,
                }
            }
            (ItemKind::Practice, Some((topic, subtopic))) => {
                params.question_count = 1;
                let content = subtopic
                    .as_ref()
                    .map(Topic::full_content)
                    .unwrap_or_else(|| topic.full_content());
                let artifact = caps.dispatch(CapabilityKind::Quiz, &content, &params).await;
                let first = match artifact.body {
                    ArtifactBody::Quiz(quiz) => quiz.questions.into_iter().next(),
                    _ => None,
                };
                match first {
                    Some(quiz_question) => {
                        let mut question = quiz_question.to_question(Some(&topic.title));
                        question.subtopic = subtopic.as_ref().map(|s| s.title.clone());
                        state.pending_question = Some(question.clone());
                        self.respond(state, question.render()).with_question(question)
                    }
                    None => self.respond(
                        state,
                        format!(
                            "I couldn't prepare a practice question on {label} this time. \
                             Say \"next\" to continue."
                        ),
                    ),
                }
            }
            (ItemKind::Flashcards, Some((topic, _))) => {
                let artifact = caps
                    .dispatch(CapabilityKind::Flashcard, &topic.full_content(), &params)
                    .await;
                match artifact.body {
                    ArtifactBody::Flashcards(set) if !set.cards.is_empty() => {
                        let text = format!("Here are {} flashcards on {label}.", set.cards.len());
                        let cards = serde_json::to_value(&set).unwrap_or_default();
                        self.respond(state, text).with_flashcards(cards)
                    }
                    _ => self.respond(
                        state,
                        format!(
                            "I couldn't make flashcards for {label} right now. \
                             Say \"next\" to continue."
                        ),
                    ),
                }
            }
        }
    }

    fn render_transition(&self, state: &mut SessionState, item: &CurriculumItem) -> Response {
        let next_title = item
            .next_topic_index
            .and_then(|i| state.topics.get(i))
            .map(|t| t.title.clone())
            .unwrap_or_else(|| "the next topic".to_string());
        let question = Question::confirmation(format!(
            "You've finished {}. Ready to move on to {next_title}?",
            item.title
        ));
        state.pending_question = Some(question.clone());
        self.respond(state, question.render()).with_question(question)
    }
}

/// Markdown text of an explainer artifact.
pub(crate) fn explanation_text(body: ArtifactBody) -> String {
    match body {
        ArtifactBody::Explanation(explanation) => explanation.render(),
        _ => String::new(),
    }
}

/// Finds the topic (and subtopic) a curriculum item teaches.
fn material(state: &SessionState, item: &CurriculumItem) -> Option<(Topic, Option<Topic>)> {
    let topic = state.topics.get(item.topic_index?)?;
    let subtopic = match item.subtopic_index {
        Some(i) => Some(topic.subtopics.get(i)?.clone()),
        None => None,
    };
    Some((topic.clone(), subtopic))
}

/// Index reached by a `Next` from `position`.
///
/// From a transition item, this is the first item of the announced topic;
/// everywhere else it is simply the following item.
fn jump_target(items: &[CurriculumItem], position: usize) -> usize {
    let current = &items[position];
    if current.kind == ItemKind::Transition {
        if let Some(next_topic) = current.next_topic_index {
            if let Some(index) = items
                .iter()
                .position(|i| i.topic_index == Some(next_topic) && i.kind != ItemKind::Transition)
            {
                return index;
            }
        }
    }
    position + 1
}

/// Capability parameters for the learner's current focus.
pub fn params_for(settings: &TutorSettings, topic: Option<&Topic>) -> CapabilityParams {
    default_params(settings, topic.map(|t| t.title.clone()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::{model_never_called, wrap};
    use crate::llm_client::MockModelClient;

    fn options() -> Vec<QuestionOption> {
        vec![QuestionOption::new("1", "Paris"), QuestionOption::new("2", "Rome")]
    }

    #[test]
    fn test_resolution_order() {
        let options = options();
        assert_eq!(resolve_option(&options, "2").map(|o| o.id.as_str()), Some("2"));
        assert_eq!(resolve_option(&options, "rome").map(|o| o.id.as_str()), Some("2"));
        assert_eq!(resolve_option(&options, "Berlin"), None);
        assert_eq!(resolve_option(&options, "02").map(|o| o.id.as_str()), Some("2"));
        assert_eq!(resolve_option(&options, "1.").map(|o| o.id.as_str()), Some("1"));
        assert_eq!(
            resolve_option(&options, "I think it's Paris").map(|o| o.id.as_str()),
            Some("1")
        );
        assert_eq!(resolve_option(&options, "   "), None);
    }

    #[test]
    fn test_confirmation_vocabulary() {
        for yes in ["yes", "Y", "yeah", "1", "Yes!"] {
            assert_eq!(resolve_confirmation(yes), Resolution::Confirmed, "{yes}");
        }
        for no in ["no", "N", "nope", "2"] {
            assert_eq!(resolve_confirmation(no), Resolution::Declined, "{no}");
        }
        assert_eq!(resolve_confirmation("maybe later"), Resolution::Unmatched);
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("Start Flow"), Some(Command::StartFlow));
        assert_eq!(Command::parse("next please"), Some(Command::Next));
        assert_eq!(Command::parse("Continue"), Some(Command::Next));
        assert_eq!(Command::parse("back"), Some(Command::Previous));
        assert_eq!(Command::parse("again"), Some(Command::Repeat));
        assert_eq!(Command::parse("END LESSON"), Some(Command::Stop));
        assert_eq!(Command::parse("quit!"), Some(Command::Stop));
        assert_eq!(Command::parse("nextflix"), None);
        assert_eq!(Command::parse("what comes next?"), None);
        assert_eq!(
            Command::parse("!answer:2:Rome"),
            Some(Command::Answer {
                id: "2".into(),
                text: "Rome".into()
            })
        );
        assert_eq!(
            Command::parse("!answer:3"),
            Some(Command::Answer {
                id: "3".into(),
                text: String::new()
            })
        );
    }

    #[test]
    fn test_answer_sentinel_ignores_case() {
        assert_eq!(
            Command::parse("!ANSWER:1:Paris"),
            Some(Command::Answer {
                id: "1".into(),
                text: "Paris".into()
            })
        );
        assert_eq!(Command::parse("!answ"), None);
    }

    #[test]
    fn test_answer_reply_falls_back_to_text() {
        let mut question = Question::topic_selection("Capital?", &["Paris".into(), "Rome".into()]);
        question.kind = QuestionKind::MultipleChoice;
        let reply = |id: &str, text: &str| answer_reply(Some(&question), id.into(), text.into());
        assert_eq!(reply("2", "Paris"), "2");
        assert_eq!(reply("q7-b", "Rome"), "Rome");
        assert_eq!(reply("", "Rome"), "Rome");
        assert_eq!(reply("q7-b", ""), "q7-b");
        assert_eq!(answer_reply(None, "2".into(), "Rome".into()), "Rome");
    }

    fn transition_items() -> Vec<CurriculumItem> {
        CurriculumBuilder::default()
            .build(&[Topic::new("A", "a"), Topic::new("B", "b")])
            .items
    }

    #[test]
    fn test_jump_target_from_transition() {
        let items = transition_items();
        let transition = items
            .iter()
            .position(|i| i.kind == ItemKind::Transition)
            .unwrap();
        let target = jump_target(&items, transition);
        assert_eq!(items[target].topic_index, Some(1));
        assert_eq!(items[target].kind, ItemKind::Explainer);
        assert_eq!(jump_target(&items, 0), 1);
    }

    /// A navigator whose lesson never needs the model: only transition and
    /// completion items.
    fn lesson_state(items: Vec<CurriculumItem>) -> SessionState {
        let mut state = SessionState::new("tester");
        state.topics = vec![Topic::new("A", "a"), Topic::new("B", "b")];
        state.flow_items = items;
        state.teaching_mode = TeachingMode::DynamicFlow;
        state
    }

    fn offline_items() -> Vec<CurriculumItem> {
        transition_items()
            .into_iter()
            .filter(|i| matches!(i.kind, ItemKind::Transition | ItemKind::Completion))
            .collect()
    }

    fn navigator() -> Navigator {
        Navigator::new(TutorSettings::default(), KnowledgeTracker::default())
    }

    #[tokio::test]
    async fn test_next_is_idempotent_at_upper_bound() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());
        state.current_position = state.flow_items.len() - 1;

        let first = nav.advance(&mut state, &caps, Direction::Next).await;
        for _ in 0..3 {
            let again = nav.advance(&mut state, &caps, Direction::Next).await;
            assert_eq!(again, first);
            assert_eq!(state.current_position, state.flow_items.len() - 1);
        }
        assert_eq!(first.response, LESSON_FINISHED);
    }

    #[tokio::test]
    async fn test_previous_at_zero_is_noop() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());

        let response = nav.advance(&mut state, &caps, Direction::Previous).await;
        assert_eq!(state.current_position, 0);
        assert!(state.pending_question.is_none());
        assert_eq!(response.curriculum.map(|c| c.current_position), Some(0));
    }

    #[tokio::test]
    async fn test_empty_curriculum_is_recoverable() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(Vec::new());
        state.current_position = 0;

        let response = nav.advance(&mut state, &caps, Direction::Next).await;
        assert_eq!(response.response, CURRICULUM_EMPTY);
        assert_eq!(state.current_position, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_position_starts_over() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());
        state.current_position = 42;

        let response = nav.advance(&mut state, &caps, Direction::Next).await;
        assert_eq!(state.current_position, 0);
        assert!(response.response.starts_with("Let's start over"));
    }

    #[tokio::test]
    async fn test_transition_poses_confirmation_and_yes_jumps() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());

        let response = nav.render_current(&mut state, &caps).await;
        assert_eq!(response.has_question, Some(true));
        let question = state.pending_question.clone().unwrap();
        assert_eq!(question.kind, QuestionKind::Confirmation);
        assert!(question.text.contains("Ready to move on to B"));

        let response = nav.answer(&mut state, &caps, "yeah").await.unwrap();
        // Only the completion item follows in the offline lesson.
        assert_eq!(state.current_position, 1);
        assert!(response.response.contains("Congratulations"));
        assert!(state.pending_question.is_none());
    }

    #[tokio::test]
    async fn test_repeat_reposes_transition_without_moving() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());
        let first = nav.render_current(&mut state, &caps).await;
        state.pending_question = None;

        let again = nav.handle_command(&mut state, &caps, Command::Repeat).await;
        assert_eq!(state.current_position, 0);
        assert_eq!(again.curriculum, first.curriculum);
        assert_eq!(again.has_question, Some(true));
        let question = state.pending_question.as_ref().unwrap();
        assert_eq!(question.kind, QuestionKind::Confirmation);
        assert!(question.text.contains("Ready to move on to B"));
    }

    #[tokio::test]
    async fn test_stale_answer_id_resolves_by_text() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = SessionState::new("tester");
        let mut question = Question::topic_selection("Capital?", &["Paris".into(), "Rome".into()]);
        question.kind = QuestionKind::MultipleChoice;
        question.options[1].is_correct = Some(true);
        state.pending_question = Some(question);

        let command = Command::parse("!answer:q9:Rome").unwrap();
        let response = nav.handle_command(&mut state, &caps, command).await;
        assert!(response.response.starts_with("Correct!"));
    }

    #[tokio::test]
    async fn test_declined_transition_keeps_position() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = lesson_state(offline_items());
        nav.render_current(&mut state, &caps).await;

        let response = nav.answer(&mut state, &caps, "nope").await.unwrap();
        assert_eq!(state.current_position, 0);
        assert!(response.response.contains("take your time"));
        assert!(state.pending_question.is_none());
    }

    #[tokio::test]
    async fn test_unmatched_answer_still_clears_question() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = SessionState::new("tester");
        let mut question = Question::topic_selection("Pick", &["Paris".into(), "Rome".into()]);
        question.kind = QuestionKind::MultipleChoice;
        question.options[1].is_correct = Some(true);
        question.topic = Some("Geography".into());
        state.pending_question = Some(question);

        let response = nav.answer(&mut state, &caps, "Berlin").await.unwrap();
        assert!(response.response.contains("couldn't match"));
        assert!(response.response.contains("Rome"));
        assert!(state.pending_question.is_none());
        assert!(state.progress.topics.is_empty());
        assert!(nav.answer(&mut state, &caps, "Rome").await.is_none());
    }

    #[tokio::test]
    async fn test_correct_answer_records_mastery_and_poses_queued_question() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = SessionState::new("tester");
        let mut question = Question::topic_selection("Capital?", &["Paris".into(), "Rome".into()]);
        question.kind = QuestionKind::MultipleChoice;
        question.options[1].is_correct = Some(true);
        question.topic = Some("Geography".into());
        question.explanation = Some("Rome is the capital of Italy.".into());
        state.pending_question = Some(question.clone());
        state.question_queue.push_back(Question::general("Queued"));

        let response = nav.answer(&mut state, &caps, "2").await.unwrap();
        assert!(response.response.starts_with("Correct!"));
        assert!(response.response.contains("capital of Italy"));
        assert_eq!(state.progress.level("Geography"), Some(15.0));
        assert_eq!(state.pending_question.as_ref().map(|q| q.text.as_str()), Some("Queued"));
        assert!(state.question_queue.is_empty());
    }

    #[tokio::test]
    async fn test_single_topic_flow_renders_first_item() {
        let mut mock = MockModelClient::new();
        mock.expect_generate().times(1).returning(|_, _, _| {
            Ok(r#"{"title": "Cells", "explanation": "Cells are the unit of life."}"#.to_string())
        });
        let caps = CapabilitySet::new(wrap(mock));
        let nav = navigator();
        let mut state = SessionState::new("tester");
        state.load_topics(vec![Topic::new(
            "Cells",
            "Cells are the basic structural unit of life.",
        )]);

        let response = nav.start_flow(&mut state, &caps).await;
        assert_eq!(state.teaching_mode, TeachingMode::Flow);
        assert_eq!(response.teaching_mode, TeachingMode::Flow);
        assert_eq!(state.flow_items.len(), 5);
        assert!(response.response.starts_with("Let's begin a guided lesson on Cells."));
        assert!(response.response.contains("Step 1 of 5"));
        assert!(response.response.contains("unit of life"));
        assert_eq!(state.progress.topics["Cells"].interaction_counts.len(), 1);
    }

    #[tokio::test]
    async fn test_start_flow_without_topics() {
        let nav = navigator();
        let caps = CapabilitySet::new(model_never_called());
        let mut state = SessionState::new("tester");
        let response = nav.start_flow(&mut state, &caps).await;
        assert_eq!(response.response, NO_TOPICS);
        assert_eq!(state.teaching_mode, TeachingMode::Conversation);
    }

    #[test]
    fn test_stop_returns_to_conversation() {
        let nav = navigator();
        let mut state = lesson_state(offline_items());
        state.pending_question = Some(Question::confirmation("Ready?"));
        let response = nav.stop(&mut state);
        assert_eq!(response.teaching_mode, TeachingMode::Conversation);
        assert!(state.pending_question.is_none());
        assert!(nav.stop(&mut state).response.contains("no lesson running"));
    }
}
