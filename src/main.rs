//! deckpilot command line.
//!
//! ```text
//! deckpilot run "Intro to Rust ownership for Python developers"
//! deckpilot run "..." --session demo --template
//! deckpilot resume demo
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::{self, error::RecvError};

use deckpilot::artifact::PptHtmlDocument;
use deckpilot::events::{BroadcastEventSink, EventSink, NoopEventSink, ProgressEvent};
use deckpilot::llm::OpenRouterClient;
use deckpilot::oracle::LlmOracle;
use deckpilot::search::{DisabledSearch, DuckDuckGoSearch, SearchProvider};
use deckpilot::store::JsonFileStore;
use deckpilot::{Config, Orchestrator, PlanningMode, RunReport, RunRequest, Services};

/// Plan, generate and render a slide deck from a goal
#[derive(Parser, Debug)]
#[command(name = "deckpilot")]
#[command(version)]
struct Cli {
    /// Do not log per-task progress events
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan and run a new goal
    Run {
        /// What the deck should be about
        goal: String,

        /// Session id; a fresh one is generated when omitted
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Skip oracle planning and use the fixed six-task template
        #[arg(long)]
        template: bool,
    },
    /// Continue a session from its last checkpoint
    Resume {
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("deckpilot=info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    let api_key = config.require_api_key()?.to_string();

    let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
    let mut llm = OpenRouterClient::new(api_key);
    if let Some(endpoint) = &config.endpoint {
        tracing::info!("Using chat endpoint {}", endpoint);
        llm = llm.with_endpoint(endpoint.clone());
    }
    let oracle = LlmOracle::new(Arc::new(llm), config.model.clone());
    tracing::info!("Using model {}", oracle.model());

    let search: Arc<dyn SearchProvider> = match DuckDuckGoSearch::new() {
        Ok(search) => Arc::new(search),
        Err(e) => {
            tracing::warn!("Web search unavailable, search tasks will fail: {}", e);
            Arc::new(DisabledSearch)
        }
    };

    let events: Arc<dyn EventSink> = if cli.quiet {
        Arc::new(NoopEventSink)
    } else {
        let sink = BroadcastEventSink::default();
        tokio::spawn(log_progress(sink.subscribe()));
        Arc::new(sink)
    };

    let services = Services {
        oracle: Arc::new(oracle),
        search,
        artifacts: store.clone(),
        checkpoints: store.clone(),
        events,
    };
    let orchestrator = Orchestrator::new(services, config.orchestrator.clone());

    let report = match cli.command {
        Command::Run {
            goal,
            session,
            template,
        } => {
            let mut request = RunRequest::new(goal);
            if let Some(session) = session {
                request = request.with_session(session);
            }
            if template {
                request = request.with_planning(PlanningMode::Template);
            }
            orchestrator.run(request).await?
        }
        Command::Resume { session } => orchestrator.resume(&session).await?,
    };

    print_report(&report, store.root()).await
}

async fn log_progress(mut rx: broadcast::Receiver<ProgressEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Progress log fell behind, {} events dropped", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            ProgressEvent::TaskStarted {
                task_id,
                task_type,
                attempt,
                ..
            } => tracing::info!("[{}] {} started (attempt {})", task_type, task_id, attempt),
            ProgressEvent::TaskUpdated {
                task_id,
                status,
                error: Some(error),
                ..
            } => tracing::info!("{} is {}: {}", task_id, status, error),
            ProgressEvent::TaskUpdated {
                task_id, status, ..
            } => tracing::info!("{} is {}", task_id, status),
            ProgressEvent::ArtifactProduced { kind, version, .. } => {
                tracing::info!("Produced {} v{}", kind, version)
            }
            ProgressEvent::PageProgress {
                completed, total, ..
            } => tracing::info!("Rendered page {}/{}", completed, total),
            ProgressEvent::RunCompleted { .. } => break,
        }
    }
}

async fn print_report(report: &RunReport, data_dir: &Path) -> Result<()> {
    let stats = &report.statistics;
    println!("Session:   {}", report.session_id);
    println!("Outcome:   {} ({})", report.outcome, report.reason);
    println!(
        "Tasks:     {} total, {} completed, {} skipped, {} failed, {} unfinished",
        stats.total,
        stats.completed,
        stats.skipped,
        stats.failed,
        stats.pending + stats.ready + stats.in_progress
    );
    println!("Artifacts: {}", report.artifacts.len());

    match report.final_document() {
        Some(document) => {
            let path = write_document(data_dir, &report.session_id, document).await?;
            println!("Deck:      \"{}\", {} pages", document.title, document.pages.len());
            println!("Written:   {}", path.display());
        }
        None => println!("Deck:      not rendered"),
    }
    Ok(())
}

/// Write the rendered pages into one HTML file next to the checkpoint.
async fn write_document(data_dir: &Path, session_id: &str, document: &PptHtmlDocument) -> Result<PathBuf> {
    let dir = data_dir.join(session_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n",
        escape_html(&document.title)
    );
    for page in &document.pages {
        html.push_str(&format!(
            "<div class=\"slide\" data-index=\"{}\">\n{}\n</div>\n",
            page.slide_index, page.html
        ));
    }
    html.push_str("</body>\n</html>\n");

    let path = dir.join("deck.html");
    tokio::fs::write(&path, html)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Escape text for use inside an HTML element.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
