use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A node in the hierarchical outline extracted from a source document.
///
/// Topics arrive from the document pipeline (or the topic extraction
/// capability) and are read-only from the tutor's point of view. Ownership
/// makes the structure a tree by construction; depth is bounded separately
/// through [`Topic::truncate_depth`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subtopics: Vec<Topic>,
}

impl Topic {
    /// Creates a leaf topic with no subtopics.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            subtopics: Vec::new(),
        }
    }

    /// Builder-style helper to attach subtopics.
    pub fn with_subtopics(mut self, subtopics: Vec<Topic>) -> Self {
        self.subtopics = subtopics;
        self
    }

    /// Number of levels in this tree, counting the node itself as level 1.
    pub fn depth(&self) -> usize {
        1 + self.subtopics.iter().map(Topic::depth).max().unwrap_or(0)
    }

    /// Drops every node deeper than `max_level` (the root is level 1).
    pub fn truncate_depth(&mut self, max_level: usize) {
        if max_level <= 1 {
            self.subtopics.clear();
            return;
        }
        for sub in &mut self.subtopics {
            sub.truncate_depth(max_level - 1);
        }
    }

    /// Content of this topic followed by the content of every subtopic.
    ///
    /// Used when a capability should see the whole branch rather than only
    /// the parent's own text.
    pub fn full_content(&self) -> String {
        let mut out = self.content.clone();
        for sub in &self.subtopics {
            let nested = sub.full_content();
            if nested.trim().is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&sub.title);
            out.push_str(":\n");
            out.push_str(&nested);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Topic {
        Topic::new("Biology", "Life sciences.").with_subtopics(vec![
            Topic::new("Cells", "Basic unit of life.").with_subtopics(vec![Topic::new(
                "Organelles",
                "Mitochondria and friends.",
            )]),
            Topic::new("Genetics", ""),
        ])
    }

    #[test]
    fn test_depth_counts_levels() {
        assert_eq!(Topic::new("leaf", "x").depth(), 1);
        assert_eq!(sample().depth(), 3);
    }

    #[test]
    fn test_truncate_depth_drops_deep_nodes() {
        let mut topic = sample();
        topic.truncate_depth(2);
        assert_eq!(topic.depth(), 2);
        assert_eq!(topic.subtopics.len(), 2);
        assert!(topic.subtopics[0].subtopics.is_empty());

        topic.truncate_depth(1);
        assert!(topic.subtopics.is_empty());
    }

    #[test]
    fn test_full_content_skips_empty_subtopics() {
        let text = sample().full_content();
        assert!(text.starts_with("Life sciences."));
        assert!(text.contains("Cells:\nBasic unit of life."));
        assert!(text.contains("Organelles:\nMitochondria"));
        assert!(!text.contains("Genetics"));
    }

    #[test]
    fn test_deserialize_defaults_missing_fields() {
        let topic: Topic = serde_json::from_str(r#"{"title": "Only a title"}"#).unwrap();
        assert_eq!(topic.title, "Only a title");
        assert!(topic.content.is_empty());
        assert!(topic.subtopics.is_empty());
    }
}
