//! Curriculum Construction
//!
//! This module turns an extracted topic hierarchy into the ordered sequence of
//! lesson items the navigator walks through. Every topic is taught as
//! explain → diagram → practice, each subtopic as explain (→ practice when it
//! has enough material), followed by flashcards and a summary for the parent.
//! Topics are separated by transition items and the whole sequence ends with
//! a single completion item.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::topic::Topic;

/// Kind of step in a curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Explainer,
    Diagram,
    Practice,
    Flashcards,
    Summary,
    Transition,
    Completion,
}

/// One scheduled step of a curriculum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumItem {
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub topic_index: Option<usize>,
    pub subtopic_index: Option<usize>,
    pub is_subtopic: bool,
    /// Only set on transition items.
    pub next_topic_index: Option<usize>,
}

impl CurriculumItem {
    fn for_topic(kind: ItemKind, topic_index: usize, title: &str, description: String) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description,
            topic_index: Some(topic_index),
            subtopic_index: None,
            is_subtopic: false,
            next_topic_index: None,
        }
    }

    fn for_subtopic(
        kind: ItemKind,
        topic_index: usize,
        subtopic_index: usize,
        title: &str,
        description: String,
    ) -> Self {
        Self {
            kind,
            title: title.to_string(),
            description,
            topic_index: Some(topic_index),
            subtopic_index: Some(subtopic_index),
            is_subtopic: true,
            next_topic_index: None,
        }
    }
}

/// The output of [`CurriculumBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    pub items: Vec<CurriculumItem>,
    pub topic_titles: BTreeMap<usize, String>,
}

impl Curriculum {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Deterministic curriculum construction from a topic list.
#[derive(Debug, Clone, Copy)]
pub struct CurriculumBuilder {
    /// Subtopics whose content is not longer than this get no practice item.
    min_practice_content: usize,
}

impl CurriculumBuilder {
    pub fn new(min_practice_content: usize) -> Self {
        Self {
            min_practice_content,
        }
    }

    fn has_practice_material(&self, subtopic: &Topic) -> bool {
        subtopic.content.trim().chars().count() > self.min_practice_content
    }

    /// Builds the multi-topic curriculum. Zero topics yields an empty curriculum.
    pub fn build(&self, topics: &[Topic]) -> Curriculum {
        let mut items = Vec::new();
        let mut topic_titles = BTreeMap::new();
        let last = topics.len().saturating_sub(1);

        for (ti, topic) in topics.iter().enumerate() {
            topic_titles.insert(ti, topic.title.clone());
            let title = topic.title.as_str();

            items.push(CurriculumItem::for_topic(
                ItemKind::Explainer,
                ti,
                title,
                format!("Introduction to {title}"),
            ));
            items.push(CurriculumItem::for_topic(
                ItemKind::Diagram,
                ti,
                title,
                format!("Visual overview of {title}"),
            ));
            items.push(CurriculumItem::for_topic(
                ItemKind::Practice,
                ti,
                title,
                format!("Check your understanding of {title}"),
            ));

            for (si, subtopic) in topic.subtopics.iter().enumerate() {
                let sub = subtopic.title.as_str();
                items.push(CurriculumItem::for_subtopic(
                    ItemKind::Explainer,
                    ti,
                    si,
                    sub,
                    format!("{sub} (part of {title})"),
                ));
                if self.has_practice_material(subtopic) {
                    items.push(CurriculumItem::for_subtopic(
                        ItemKind::Practice,
                        ti,
                        si,
                        sub,
                        format!("Practice on {sub}"),
                    ));
                }
            }

            items.push(CurriculumItem::for_topic(
                ItemKind::Flashcards,
                ti,
                title,
                format!("Flashcards for {title}"),
            ));
            items.push(CurriculumItem::for_topic(
                ItemKind::Summary,
                ti,
                title,
                format!("Summary of {title}"),
            ));

            if ti < last {
                let next = &topics[ti + 1].title;
                let mut transition = CurriculumItem::for_topic(
                    ItemKind::Transition,
                    ti,
                    title,
                    format!("Moving from {title} to {next}"),
                );
                transition.next_topic_index = Some(ti + 1);
                items.push(transition);
            }
        }

        if !topics.is_empty() {
            items.push(CurriculumItem {
                kind: ItemKind::Completion,
                title: "Course complete".to_string(),
                description: format!("You have worked through all {} topics", topics.len()),
                topic_index: None,
                subtopic_index: None,
                is_subtopic: false,
                next_topic_index: None,
            });
        }

        Curriculum {
            items,
            topic_titles,
        }
    }

    /// The fixed five-stage path used when only one topic is available.
    pub fn single_topic_flow(&self, topic: &Topic) -> Curriculum {
        let title = topic.title.as_str();
        let stages = [
            (ItemKind::Explainer, format!("Introduction to {title}")),
            (ItemKind::Diagram, format!("Visual overview of {title}")),
            (ItemKind::Practice, format!("Check your understanding of {title}")),
            (ItemKind::Flashcards, format!("Flashcards for {title}")),
            (ItemKind::Summary, format!("Summary of {title}")),
        ];
        Curriculum {
            items: stages
                .into_iter()
                .map(|(kind, description)| CurriculumItem::for_topic(kind, 0, title, description))
                .collect(),
            topic_titles: BTreeMap::from([(0, topic.title.clone())]),
        }
    }
}

impl Default for CurriculumBuilder {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text() -> String {
        "Detailed material. ".repeat(10)
    }

    fn kinds(curriculum: &Curriculum) -> Vec<(ItemKind, String)> {
        curriculum
            .items
            .iter()
            .map(|item| (item.kind, item.title.clone()))
            .collect()
    }

    #[test]
    fn test_empty_topics_build_empty_curriculum() {
        let curriculum = CurriculumBuilder::default().build(&[]);
        assert!(curriculum.is_empty());
        assert!(curriculum.topic_titles.is_empty());
    }

    #[test]
    fn test_two_topics_with_short_subtopic() {
        let topics = vec![
            Topic::new("A", long_text()),
            Topic::new("B", long_text()).with_subtopics(vec![Topic::new("B1", "short")]),
        ];
        let curriculum = CurriculumBuilder::default().build(&topics);

        use ItemKind::*;
        let expected = vec![
            (Explainer, "A"),
            (Diagram, "A"),
            (Practice, "A"),
            (Flashcards, "A"),
            (Summary, "A"),
            (Transition, "A"),
            (Explainer, "B"),
            (Diagram, "B"),
            (Practice, "B"),
            (Explainer, "B1"),
            (Flashcards, "B"),
            (Summary, "B"),
            (Completion, "Course complete"),
        ];
        let expected: Vec<(ItemKind, String)> = expected
            .into_iter()
            .map(|(k, t)| (k, t.to_string()))
            .collect();
        assert_eq!(kinds(&curriculum), expected);

        let transition = &curriculum.items[5];
        assert_eq!(transition.next_topic_index, Some(1));
        let b1 = &curriculum.items[9];
        assert!(b1.is_subtopic);
        assert_eq!((b1.topic_index, b1.subtopic_index), (Some(1), Some(0)));
        assert_eq!(curriculum.topic_titles.get(&1).map(String::as_str), Some("B"));
    }

    #[test]
    fn test_length_formula_and_first_item() {
        let builder = CurriculumBuilder::new(20);
        let cases: Vec<Vec<Topic>> = vec![
            vec![Topic::new("solo", "")],
            vec![
                Topic::new("one", "x").with_subtopics(vec![
                    Topic::new("1a", "tiny"),
                    Topic::new("1b", long_text()),
                ]),
                Topic::new("two", "y"),
                Topic::new("three", "z").with_subtopics(vec![Topic::new("3a", long_text())]),
            ],
        ];

        for topics in cases {
            let curriculum = builder.build(&topics);
            let n = topics.len();
            let subtopic_items: usize = topics
                .iter()
                .flat_map(|t| &t.subtopics)
                .map(|s| 1 + usize::from(s.content.chars().count() > 20))
                .sum();
            assert_eq!(curriculum.len(), 3 * n + subtopic_items + 2 * n + (n - 1) + 1);

            let first = &curriculum.items[0];
            assert_eq!(first.kind, ItemKind::Explainer);
            assert_eq!(first.topic_index, Some(0));
            assert_eq!(curriculum.items.last().map(|i| i.kind), Some(ItemKind::Completion));
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let topics = vec![
            Topic::new("A", "a").with_subtopics(vec![Topic::new("A1", long_text())]),
            Topic::new("B", "b"),
        ];
        let builder = CurriculumBuilder::default();
        assert_eq!(builder.build(&topics), builder.build(&topics));
    }

    #[test]
    fn test_single_topic_flow_has_five_fixed_stages() {
        let curriculum = CurriculumBuilder::default().single_topic_flow(&Topic::new("Cells", "c"));
        let stages: Vec<ItemKind> = curriculum.items.iter().map(|i| i.kind).collect();
        assert_eq!(
            stages,
            vec![
                ItemKind::Explainer,
                ItemKind::Diagram,
                ItemKind::Practice,
                ItemKind::Flashcards,
                ItemKind::Summary
            ]
        );
        assert!(curriculum.items.iter().all(|i| i.topic_index == Some(0)));
    }
}
