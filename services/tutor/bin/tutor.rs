//! Main Entrypoint for the Tutor Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Building the model client, key pool and orchestrator.
//! 3. Loading topics from a JSON file or extracting them from a document.
//! 4. Either chatting over stdin/stdout or serving the progress tools over MCP stdio.

use anyhow::Context;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use std::{path::PathBuf, sync::Arc};
use tokio::io::BufReader;
use tracing::{info, warn};
use tutor_core::{
    Orchestrator,
    llm_client::OpenAICompatibleClient,
    resilience::{KeyPool, ResilientModel},
    tools::TutorToolService,
};
use tutor_service::{config::Config, repl};

/// Conversational tutor over a document's topics.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with the topic hierarchy.
    #[arg(long, conflicts_with = "document")]
    topics: Option<PathBuf>,
    /// Plain-text document to extract topics from.
    #[arg(long)]
    document: Option<PathBuf>,
    /// Learner id for the session.
    #[arg(long, default_value = "local")]
    user: String,
    /// Serve the progress tools over MCP stdio instead of chatting.
    #[arg(long)]
    mcp: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    // Stdout carries responses or MCP frames, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!("Configuration loaded. Initializing tutor...");

    // --- 3. Build the Orchestrator ---
    let settings = config.tutor_settings();
    let client = OpenAICompatibleClient::new(config.provider.api_base(), &config.chat_model);
    let model = ResilientModel::new(
        Arc::new(client),
        KeyPool::new(config.api_keys.clone()),
        &settings,
    );
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(model), settings));
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        keys = config.api_keys.len(),
        "Model client configured."
    );

    // --- 4. Load Topics ---
    if let Some(path) = &args.topics {
        let topics = repl::load_topics_file(path)?;
        info!(count = topics.len(), path = %path.display(), "Loaded topics");
        orchestrator.load_topics(&args.user, topics).await;
    } else if let Some(path) = &args.document {
        let text = repl::read_document(path)?;
        let report = orchestrator.ingest_document(&args.user, &text).await;
        if let Some(reason) = &report.degraded {
            warn!(%reason, "Topic extraction degraded; teaching the document as one topic");
        }
        info!(topics = ?report.titles, "Extracted topics from document");
    } else {
        info!("No topics loaded; pass --topics or --document to start teaching.");
    }

    // --- 5. Serve ---
    if args.mcp {
        info!("Serving progress tools over MCP stdio.");
        let service = TutorToolService::new(orchestrator)
            .serve(stdio())
            .await
            .context("Failed to start MCP server")?;
        service.waiting().await?;
    } else {
        info!(user = %args.user, "Ready. Type a message per line; end input to quit.");
        repl::run(
            orchestrator,
            &args.user,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await?;
    }

    info!("Tutor has shut down.");
    Ok(())
}
