use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams, excerpt};
use crate::error::TutorError;
use crate::extract::{ExtractionError, parse_json_object, require_text};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;
use crate::topic::Topic;

/// Topic hierarchy recovered from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicOutline {
    pub topics: Vec<Topic>,
}

/// Splits an uploaded document into a topic hierarchy.
pub struct TopicExtractAgent {
    model: Arc<ResilientModel>,
}

impl TopicExtractAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

fn validate(topic: &Topic) -> Result<(), ExtractionError> {
    require_text(&topic.title, "title")?;
    topic.subtopics.iter().try_for_each(validate)
}

#[async_trait]
impl Capability for TopicExtractAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::TopicExtract
    }

    fn min_content_len(&self) -> usize {
        150
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.1,
            max_tokens: 2500,
            top_p: 0.8,
            top_k: 20,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        format!(
            "Split the document below into its main topics and subtopics, at most {depth} levels deep. \
             Copy the relevant passage into each node's content.\n\n\
             Document:\n{content}\n\n\
             Respond with a single JSON object: {{\"topics\": [{{\"title\": string, \"content\": string, \
             \"subtopics\": [same shape]}}]}}",
            depth = params.max_depth.max(1),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let mut outline: TopicOutline = parse_json_object(raw)?;
        if outline.topics.is_empty() {
            return Err(ExtractionError::MissingField("topics"));
        }
        for topic in &mut outline.topics {
            validate(topic)?;
            topic.truncate_depth(params.max_depth.max(1));
        }
        Ok(ArtifactBody::Outline(outline))
    }

    /// The whole document becomes a single topic so the tutor can still teach from it.
    fn fallback(
        &self,
        content: &str,
        params: &CapabilityParams,
        _reason: &TutorError,
    ) -> ArtifactBody {
        let title = if params.topic.trim().is_empty() {
            content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(|line| excerpt(line, 60))
                .unwrap_or_else(|| "Document".to_string())
        } else {
            params.topic.clone()
        };
        let topics = if content.trim().is_empty() {
            Vec::new()
        } else {
            vec![Topic::new(title, content.trim())]
        };
        ArtifactBody::Outline(TopicOutline { topics })
    }

    fn model(&self) -> &ResilientModel {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::*;

    #[tokio::test]
    async fn test_outline_is_depth_limited() {
        let agent = TopicExtractAgent::new(model_replying(
            r#"{"topics": [{"title": "Plants", "content": "About plants",
                "subtopics": [{"title": "Leaves", "content": "Green",
                    "subtopics": [{"title": "Stomata", "content": "Pores"}]}]}]}"#,
        ));
        let params = CapabilityParams {
            max_depth: 2,
            ..CapabilityParams::default()
        };
        let artifact = agent.process(LONG_CONTENT, &params).await;
        match artifact.body {
            ArtifactBody::Outline(outline) => {
                assert_eq!(outline.topics.len(), 1);
                assert_eq!(outline.topics[0].depth(), 2);
                assert_eq!(outline.topics[0].subtopics[0].title, "Leaves");
            }
            other => panic!("Expected outline, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_untitled_node_falls_back_to_single_topic() {
        let agent = TopicExtractAgent::new(model_replying(
            r#"{"topics": [{"title": "Plants", "subtopics": [{"title": ""}]}]}"#,
        ));
        let artifact = agent
            .process(LONG_CONTENT, &CapabilityParams::default())
            .await;
        assert!(artifact.is_fallback());
        match artifact.body {
            ArtifactBody::Outline(outline) => {
                assert_eq!(outline.topics.len(), 1);
                assert!(outline.topics[0].title.starts_with("Photosynthesis is"));
                assert!(outline.topics[0].title.ends_with("..."));
            }
            other => panic!("Expected outline, got {other:?}"),
        }
    }
}
