use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams};
use crate::error::TutorError;
use crate::extract::{ExtractionError, parse_json_object};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

/// Question and answer cards for spaced review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSet {
    #[serde(default)]
    pub topic: String,
    pub cards: Vec<Flashcard>,
}

/// Turns material into flashcards.
pub struct FlashcardAgent {
    model: Arc<ResilientModel>,
}

impl FlashcardAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Capability for FlashcardAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Flashcard
    }

    fn min_content_len(&self) -> usize {
        50
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.3,
            max_tokens: 1000,
            top_p: 0.9,
            top_k: 40,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        format!(
            "Create {count} study flashcards about {topic}. The front is a short prompt, \
             the back a concise answer.\n\nMaterial:\n{content}\n\n\
             Respond with a single JSON object: {{\"cards\": [{{\"front\": string, \"back\": string}}]}}",
            count = params.card_count.max(1),
            topic = params.topic_label(),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let mut set: FlashcardSet = parse_json_object(raw)?;
        set.cards
            .retain(|c| !c.front.trim().is_empty() && !c.back.trim().is_empty());
        if set.cards.is_empty() {
            return Err(ExtractionError::MissingField("cards"));
        }
        set.cards.truncate(params.card_count.max(1));
        set.topic = params.topic.clone();
        Ok(ArtifactBody::Flashcards(set))
    }

    fn fallback(
        &self,
        _content: &str,
        params: &CapabilityParams,
        _reason: &TutorError,
    ) -> ArtifactBody {
        ArtifactBody::Flashcards(FlashcardSet {
            topic: params.topic.clone(),
            cards: Vec::new(),
        })
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
    async fn test_drops_blank_cards() {
        let agent = FlashcardAgent::new(model_replying(
            r#"{"cards": [{"front": "Light stage product?", "back": "ATP and NADPH"}, {"front": "", "back": "orphan"}]}"#,
        ));
        let artifact = agent
            .process(LONG_CONTENT, &CapabilityParams::for_topic("Photosynthesis"))
            .await;
        match artifact.body {
            ArtifactBody::Flashcards(set) => {
                assert_eq!(set.cards.len(), 1);
                assert_eq!(set.cards[0].back, "ATP and NADPH");
            }
            other => panic!("Expected flashcards, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_blank_cards_is_invalid() {
        let agent = FlashcardAgent::new(model_replying(r#"{"cards": [{"front": " ", "back": "x"}]}"#));
        let artifact = agent
            .process(LONG_CONTENT, &CapabilityParams::default())
            .await;
        assert!(matches!(
            artifact.degraded,
            Some(TutorError::InvalidModelOutput(_))
        ));
    }
}
