use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ArtifactBody, Capability, CapabilityKind, CapabilityParams};
use crate::error::TutorError;
use crate::extract::{ExtractionError, find_fenced_block};
use crate::llm_client::GenerationConfig;
use crate::resilience::ResilientModel;

/// Mermaid diagram family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramType {
    Flowchart,
    Sequence,
    Class,
    State,
    Mindmap,
}

impl DiagramType {
    /// Recognizes the mermaid header keyword on the first line of a diagram.
    pub fn from_mermaid_header(code: &str) -> Option<Self> {
        let header = code.split_whitespace().next()?.to_ascii_lowercase();
        match header.as_str() {
            "graph" | "flowchart" => Some(DiagramType::Flowchart),
            "sequencediagram" => Some(DiagramType::Sequence),
            "classdiagram" => Some(DiagramType::Class),
            "statediagram" | "statediagram-v2" => Some(DiagramType::State),
            "mindmap" => Some(DiagramType::Mindmap),
            _ => None,
        }
    }

    /// Picks a diagram type from the vocabulary of the material.
    pub fn infer(content: &str) -> Self {
        let text = content.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
        if has(&["request", "response", "message", "sends", "handshake"]) {
            DiagramType::Sequence
        } else if has(&["inherit", "subclass", "attribute", "object-oriented"]) {
            DiagramType::Class
        } else if has(&["state", "transition", "phase change"]) {
            DiagramType::State
        } else if has(&["process", "step", "stage", "cycle", "then", "workflow"]) {
            DiagramType::Flowchart
        } else {
            DiagramType::Mindmap
        }
    }

    fn mermaid_keyword(&self) -> &'static str {
        match self {
            DiagramType::Flowchart => "flowchart TD",
            DiagramType::Sequence => "sequenceDiagram",
            DiagramType::Class => "classDiagram",
            DiagramType::State => "stateDiagram-v2",
            DiagramType::Mindmap => "mindmap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub title: String,
    pub diagram_type: DiagramType,
    /// Mermaid source, renderable as-is.
    pub code: String,
}

/// Draws a Mermaid diagram for a topic.
pub struct DiagramAgent {
    model: Arc<ResilientModel>,
}

impl DiagramAgent {
    pub fn new(model: Arc<ResilientModel>) -> Self {
        Self { model }
    }
}

/// Mermaid labels break on quotes and brackets.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '"' | '[' | ']' | '(' | ')' | '{' | '}'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[async_trait]
impl Capability for DiagramAgent {
    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Diagram
    }

    fn min_content_len(&self) -> usize {
        40
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: 0.1,
            max_tokens: 800,
            top_p: 0.8,
            top_k: 20,
        }
    }

    fn build_prompt(&self, content: &str, params: &CapabilityParams) -> String {
        let diagram_type = params
            .diagram_type
            .unwrap_or_else(|| DiagramType::infer(content));
        format!(
            "Draw a mermaid diagram of {topic}. Start the diagram with `{keyword}`.\n\n\
             Material:\n{content}\n\n\
             Respond with only a ```mermaid fenced code block.",
            topic = params.topic_label(),
            keyword = diagram_type.mermaid_keyword(),
        )
    }

    fn parse(&self, raw: &str, params: &CapabilityParams) -> Result<ArtifactBody, ExtractionError> {
        let code = find_fenced_block(raw, Some("mermaid"))?;
        let diagram_type =
            DiagramType::from_mermaid_header(code).ok_or_else(|| ExtractionError::InvalidField {
                field: "code",
                reason: "unrecognized mermaid diagram header".to_string(),
            })?;
        Ok(ArtifactBody::Diagram(Diagram {
            title: params.topic.clone(),
            diagram_type,
            code: code.to_string(),
        }))
    }

    fn fallback(
        &self,
        _content: &str,
        params: &CapabilityParams,
        _reason: &TutorError,
    ) -> ArtifactBody {
        let label = sanitize_label(params.topic_label());
        ArtifactBody::Diagram(Diagram {
            title: params.topic.clone(),
            diagram_type: DiagramType::Flowchart,
            code: format!("flowchart TD\n    A[\"{label}\"] --> B[\"Key ideas\"]\n    A --> C[\"Examples\"]"),
        })
    }

    fn model(&self) -> &ResilientModel {
        &self.model
    }
}
