//! Knowledge Tracker
//!
//! Maintains bounded mastery levels per topic and subtopic from graded
//! interaction events, and derives strength buckets and study-habit patterns
//! from them. The tracker itself is stateless; each learner's records live in
//! a [`LearnerKnowledge`] owned by that learner's session.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const MAX_LEVEL: f64 = 100.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    QuizResult,
    StudySession,
    FlashcardReview,
    TopicView,
}

/// Measured result of one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Percentage score, 0 to 100.
    QuizResult { score: f64 },
    StudySession { minutes: f64 },
    FlashcardReview { reviewed: u32, correct: u32 },
    TopicView { seconds: f64 },
}

impl Outcome {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Outcome::QuizResult { .. } => InteractionKind::QuizResult,
            Outcome::StudySession { .. } => InteractionKind::StudySession,
            Outcome::FlashcardReview { .. } => InteractionKind::FlashcardReview,
            Outcome::TopicView { .. } => InteractionKind::TopicView,
        }
    }
}

/// An interaction reported against a topic and optionally one of its subtopics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Interaction {
    pub topic: String,
    #[serde(default)]
    pub subtopic: Option<String>,
    pub outcome: Outcome,
}

impl Interaction {
    pub fn new(topic: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            topic: topic.into(),
            subtopic: None,
            outcome,
        }
    }

    pub fn in_subtopic(mut self, subtopic: impl Into<String>) -> Self {
        self.subtopic = Some(subtopic.into());
        self
    }
}

/// Mastery of one topic or subtopic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub level: f64,
    /// `level` on a 0 to 10 scale.
    pub score: u8,
    pub last_updated: DateTime<Utc>,
    pub interaction_counts: BTreeMap<InteractionKind, u32>,
}

impl MasteryRecord {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            level: 0.0,
            score: 0,
            last_updated: at,
            interaction_counts: BTreeMap::new(),
        }
    }

    fn apply(&mut self, kind: InteractionKind, delta: f64, at: DateTime<Utc>) {
        self.level = (self.level + delta).clamp(0.0, MAX_LEVEL);
        self.score = (self.level / 10.0).round() as u8;
        self.last_updated = at;
        *self.interaction_counts.entry(kind).or_insert(0) += 1;
    }
}

/// Running totals over every recorded interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityTotals {
    pub count: usize,
    pub by_kind: BTreeMap<InteractionKind, u32>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl ActivityTotals {
    fn add(&mut self, kind: InteractionKind, at: DateTime<Utc>) {
        self.count += 1;
        *self.by_kind.entry(kind).or_insert(0) += 1;
        self.earliest = Some(self.earliest.map_or(at, |t| t.min(at)));
        self.latest = Some(self.latest.map_or(at, |t| t.max(at)));
    }

    /// Mean hours between consecutive interactions, once there are two.
    fn mean_gap_hours(&self) -> Option<f64> {
        let (earliest, latest) = (self.earliest?, self.latest?);
        (self.count > 1).then(|| {
            (latest - earliest).num_seconds() as f64 / 3600.0 / (self.count - 1) as f64
        })
    }
}

/// All mastery data for one learner. Survives curriculum rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerKnowledge {
    pub topics: HashMap<String, MasteryRecord>,
    /// Keyed by parent topic, then subtopic.
    pub subtopics: HashMap<String, HashMap<String, MasteryRecord>>,
    pub activity: ActivityTotals,
}

impl LearnerKnowledge {
    pub fn level(&self, topic: &str) -> Option<f64> {
        self.topics.get(topic).map(|r| r.level)
    }

    pub fn subtopic_level(&self, topic: &str, subtopic: &str) -> Option<f64> {
        self.subtopics
            .get(topic)
            .and_then(|subs| subs.get(subtopic))
            .map(|r| r.level)
    }
}

/// Signed level changes for each outcome band, best band first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaTable {
    /// Score > 80, > 60, > 40, otherwise.
    pub quiz: [f64; 4],
    /// Minutes > 60, > 30, > 15, otherwise.
    pub study: [f64; 4],
    /// Recall rate > 0.8, > 0.6, > 0.4, otherwise.
    pub flashcards: [f64; 4],
    /// Seconds > 30, otherwise.
    pub view: [f64; 2],
}

impl DeltaTable {
    pub const TOPIC: DeltaTable = DeltaTable {
        quiz: [15.0, 10.0, 5.0, -5.0],
        study: [10.0, 6.0, 3.0, 1.0],
        flashcards: [8.0, 5.0, 2.0, 0.0],
        view: [1.0, 0.0],
    };

    pub const SUBTOPIC: DeltaTable = DeltaTable {
        quiz: [20.0, 12.0, 6.0, -8.0],
        study: [12.0, 8.0, 4.0, 1.0],
        flashcards: [10.0, 6.0, 3.0, 0.0],
        view: [2.0, 0.0],
    };

    pub fn delta(&self, outcome: &Outcome) -> f64 {
        let band = |value: f64, thresholds: [f64; 3], deltas: &[f64; 4]| {
            thresholds
                .iter()
                .position(|t| value > *t)
                .map(|i| deltas[i])
                .unwrap_or(deltas[3])
        };
        match *outcome {
            Outcome::QuizResult { score } => band(score, [80.0, 60.0, 40.0], &self.quiz),
            Outcome::StudySession { minutes } => band(minutes, [60.0, 30.0, 15.0], &self.study),
            Outcome::FlashcardReview { reviewed, correct } => {
                let recall = if reviewed == 0 {
                    0.0
                } else {
                    f64::from(correct.min(reviewed)) / f64::from(reviewed)
                };
                band(recall, [0.8, 0.6, 0.4], &self.flashcards)
            }
            Outcome::TopicView { seconds } => {
                if seconds > 30.0 {
                    self.view[0]
                } else {
                    self.view[1]
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicMastery {
    pub topic: String,
    pub level: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeSummary {
    pub weak: Vec<TopicMastery>,
    pub medium: Vec<TopicMastery>,
    pub strong: Vec<TopicMastery>,
}

impl KnowledgeSummary {
    pub fn is_empty(&self) -> bool {
        self.weak.is_empty() && self.medium.is_empty() && self.strong.is_empty()
    }

    pub fn render(&self) -> String {
        if self.is_empty() {
            return "No progress recorded yet. Try a lesson or a quiz first!".to_string();
        }
        let line = |label: &str, bucket: &[TopicMastery]| {
            let items: Vec<String> = bucket
                .iter()
                .map(|m| format!("{} ({:.0}%)", m.topic, m.level))
                .collect();
            format!(
                "{label}: {}",
                if items.is_empty() {
                    "none".to_string()
                } else {
                    items.join(", ")
                }
            )
        };
        [
            line("Strong", &self.strong),
            line("Getting there", &self.medium),
            line("Needs work", &self.weak),
        ]
        .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Regularity {
    New,
    Frequent,
    Regular,
    Infrequent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LearningPatterns {
    pub total_interactions: usize,
    pub interaction_frequency: BTreeMap<InteractionKind, u32>,
    pub regularity: Regularity,
    pub mean_gap_hours: Option<f64>,
}

/// Applies interaction outcomes to mastery records.
#[derive(Debug, Clone, Copy)]
pub struct KnowledgeTracker {
    topic_deltas: DeltaTable,
    subtopic_deltas: DeltaTable,
}

impl Default for KnowledgeTracker {
    fn default() -> Self {
        Self {
            topic_deltas: DeltaTable::TOPIC,
            subtopic_deltas: DeltaTable::SUBTOPIC,
        }
    }
}

impl KnowledgeTracker {
    pub fn new(topic_deltas: DeltaTable, subtopic_deltas: DeltaTable) -> Self {
        Self {
            topic_deltas,
            subtopic_deltas,
        }
    }

    /// Records `interaction` at `at` and returns the topic's new level.
    ///
    /// A subtopic interaction updates both the subtopic record and the
    /// parent topic record, each with its own delta table.
    pub fn record(
        &self,
        knowledge: &mut LearnerKnowledge,
        interaction: &Interaction,
        at: DateTime<Utc>,
    ) -> f64 {
        let kind = interaction.outcome.kind();
        let topic_delta = self.topic_deltas.delta(&interaction.outcome);

        let record = knowledge
            .topics
            .entry(interaction.topic.clone())
            .or_insert_with(|| MasteryRecord::new(at));
        record.apply(kind, topic_delta, at);
        let level = record.level;

        if let Some(subtopic) = &interaction.subtopic {
            let sub_delta = self.subtopic_deltas.delta(&interaction.outcome);
            knowledge
                .subtopics
                .entry(interaction.topic.clone())
                .or_default()
                .entry(subtopic.clone())
                .or_insert_with(|| MasteryRecord::new(at))
                .apply(kind, sub_delta, at);
        }

        knowledge.activity.add(kind, at);

        debug!(topic = %interaction.topic, ?kind, delta = topic_delta, level, "Mastery updated");
        level
    }

    /// Buckets topics into weak (< 40), medium (< 70) and strong, strongest first.
    pub fn summary(&self, knowledge: &LearnerKnowledge) -> KnowledgeSummary {
        let mut all: Vec<TopicMastery> = knowledge
            .topics
            .iter()
            .map(|(topic, record)| TopicMastery {
                topic: topic.clone(),
                level: record.level,
            })
            .collect();
        all.sort_by(|a, b| b.level.total_cmp(&a.level).then_with(|| a.topic.cmp(&b.topic)));

        let mut summary = KnowledgeSummary::default();
        for mastery in all {
            if mastery.level < 40.0 {
                summary.weak.push(mastery);
            } else if mastery.level < 70.0 {
                summary.medium.push(mastery);
            } else {
                summary.strong.push(mastery);
            }
        }
        summary
    }

    pub fn patterns(&self, knowledge: &LearnerKnowledge) -> LearningPatterns {
        let activity = &knowledge.activity;
        let mean_gap_hours = activity.mean_gap_hours();
        let regularity = match mean_gap_hours {
            None => Regularity::New,
            Some(h) if h < 24.0 => Regularity::Frequent,
            Some(h) if h < 72.0 => Regularity::Regular,
            Some(_) => Regularity::Infrequent,
        };

        LearningPatterns {
            total_interactions: activity.count,
            interaction_frequency: activity.by_kind.clone(),
            regularity,
            mean_gap_hours,
        }
    }
}
