//! Per-learner session state and the store that owns it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::curriculum::{Curriculum, CurriculumItem};
use crate::knowledge::LearnerKnowledge;
use crate::response::Question;
use crate::topic::Topic;

/// Which commands the navigator currently accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeachingMode {
    #[default]
    Conversation,
    /// Single topic, fixed five-stage path.
    Flow,
    /// Multi-topic curriculum.
    DynamicFlow,
}

impl fmt::Display for TeachingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeachingMode::Conversation => write!(f, "conversation"),
            TeachingMode::Flow => write!(f, "flow"),
            TeachingMode::DynamicFlow => write!(f, "dynamic_flow"),
        }
    }
}

/// Everything the tutor remembers about one learner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub user_id: String,
    pub topics: Vec<Topic>,
    pub current_topic: Option<Topic>,
    pub flow_items: Vec<CurriculumItem>,
    pub current_position: usize,
    pub teaching_mode: TeachingMode,
    pub pending_question: Option<Question>,
    /// Quiz questions not yet asked, posed one at a time.
    pub question_queue: VecDeque<Question>,
    pub interaction_counter: u32,
    pub progress: LearnerKnowledge,
}

impl SessionState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Replaces the topic list. Any curriculum in progress is discarded;
    /// mastery progress is kept.
    pub fn load_topics(&mut self, topics: Vec<Topic>) {
        self.current_topic = topics.first().cloned();
        self.topics = topics;
        self.clear_curriculum();
        self.teaching_mode = TeachingMode::Conversation;
        self.pending_question = None;
        self.question_queue.clear();
    }

    /// Installs a freshly built curriculum at position zero.
    pub fn start_curriculum(&mut self, curriculum: Curriculum, mode: TeachingMode) {
        self.flow_items = curriculum.items;
        self.current_position = 0;
        self.teaching_mode = mode;
        self.pending_question = None;
        self.question_queue.clear();
    }

    pub fn clear_curriculum(&mut self) {
        self.flow_items.clear();
        self.current_position = 0;
    }

    pub fn current_item(&self) -> Option<&CurriculumItem> {
        self.flow_items.get(self.current_position)
    }

    pub fn in_lesson(&self) -> bool {
        self.teaching_mode != TeachingMode::Conversation
    }

    pub fn topic_titles(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.title.clone()).collect()
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Maps `user_id` to that user's session.
///
/// Each session sits behind its own async mutex. Holding it for a whole turn
/// serializes utterances from the same user while leaving other users
/// unaffected.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's session, creating it on first contact.
    pub async fn get_or_create(&self, user_id: &str) -> SharedSession {
        if let Some(session) = self.sessions.read().await.get(user_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id, "Creating new session");
                Arc::new(Mutex::new(SessionState::new(user_id)))
            })
            .clone()
    }

    pub async fn get(&self, user_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(user_id).cloned()
    }

    pub async fn remove(&self, user_id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::CurriculumBuilder;
    use crate::knowledge::{Interaction, KnowledgeTracker, Outcome};

    #[tokio::test]
    async fn test_store_returns_same_session_per_user() {
        let store = SessionStore::new();
        let a1 = store.get_or_create("alice").await;
        let a2 = store.get_or_create("alice").await;
        let b = store.get_or_create("bob").await;

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(store.len().await, 2);

        a1.lock().await.current_position = 7;
        assert_eq!(b.lock().await.current_position, 0);
        assert_eq!(a2.lock().await.user_id, "alice");
    }

    #[tokio::test]
    async fn test_remove_session() {
        let store = SessionStore::new();
        store.get_or_create("carol").await;
        assert!(store.remove("carol").await.is_some());
        assert!(store.get("carol").await.is_none());
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_load_topics_resets_curriculum_but_keeps_progress() {
        let mut state = SessionState::new("dave");
        state.load_topics(vec![Topic::new("A", "a"), Topic::new("B", "b")]);
        let curriculum = CurriculumBuilder::default().build(&state.topics);
        state.start_curriculum(curriculum, TeachingMode::DynamicFlow);
        state.current_position = 3;
        KnowledgeTracker::default().record(
            &mut state.progress,
            &Interaction::new("A", Outcome::QuizResult { score: 90.0 }),
            chrono::Utc::now(),
        );

        state.load_topics(vec![Topic::new("C", "c")]);

        assert!(state.flow_items.is_empty());
        assert_eq!(state.current_position, 0);
        assert_eq!(state.teaching_mode, TeachingMode::Conversation);
        assert_eq!(state.current_topic.as_ref().map(|t| t.title.as_str()), Some("C"));
        assert!(state.progress.topics.contains_key("A"));
    }
}
