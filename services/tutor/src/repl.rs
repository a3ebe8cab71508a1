//! Line-oriented front end: one utterance per line in, one JSON response out.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use tutor_core::{Orchestrator, Topic};

/// Topic files may hold a bare array or an object with a `topics` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum TopicFile {
    List(Vec<Topic>),
    Outline { topics: Vec<Topic> },
}

/// Reads a topic hierarchy from a JSON file.
pub fn load_topics_file(path: &Path) -> Result<Vec<Topic>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topics file {}", path.display()))?;
    let parsed: TopicFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse topics file {}", path.display()))?;
    let topics = match parsed {
        TopicFile::List(topics) | TopicFile::Outline { topics } => topics,
    };
    anyhow::ensure!(!topics.is_empty(), "{} contains no topics", path.display());
    Ok(topics)
}

/// Reads a plain-text document for topic extraction.
pub fn read_document(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    anyhow::ensure!(!text.trim().is_empty(), "{} is empty", path.display());
    Ok(text)
}

/// Feeds every non-empty input line to the orchestrator until end of input.
pub async fn run<R, W>(
    orchestrator: Arc<Orchestrator>,
    user_id: &str,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        let response = orchestrator.process(utterance, user_id).await;
        let json = match serde_json::to_string_pretty(&response) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize response");
                continue;
            }
        };
        output.write_all(json.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        handled += 1;
    }
    info!(user_id, handled, "Input closed");
    Ok(())
}
