mod error;
mod routes;
mod state;
mod templates;

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use medichat_core::config::{init_logging, AppConfig};
use medichat_core::embedding::embedder_from_config;
use medichat_core::llm::generator_from_config;
use medichat_core::pdf::UploadedDocument;
use medichat_core::{CoreError, MediChat};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "medichat", about = "Chat with your medical PDF documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the web UI (default when no subcommand given)
    Serve {
        /// Address to listen on, overriding `server.bind_addr`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Answer one question about the given PDFs and exit
    Ask {
        /// PDF file to index (repeatable)
        #[arg(long = "pdf", required = true)]
        pdfs: Vec<PathBuf>,
        /// The question to ask
        question: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging();

    let config = AppConfig::load()?;
    config.validate()?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => run_server(config, bind).await,
        Command::Ask { pdfs, question } => run_ask(config, pdfs, question).await,
    }
}

fn build_medichat(config: AppConfig) -> anyhow::Result<MediChat> {
    let embedder = embedder_from_config(&config)?;
    let generator = generator_from_config(&config)?;
    Ok(MediChat::new(config, embedder, generator))
}

async fn run_server(config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    info!(
        llm = %config.llm.model,
        embedding = %config.embedding.model,
        "medichat starting"
    );

    let medichat = build_medichat(config)?;
    if !medichat.generator().health_check().await {
        warn!("LLM provider is not reachable; answers will fail until it is");
    }

    let state = AppState::new(medichat)?;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("medichat stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn run_ask(config: AppConfig, pdfs: Vec<PathBuf>, question: String) -> anyhow::Result<()> {
    let medichat = build_medichat(config)?;

    let mut docs = Vec::with_capacity(pdfs.len());
    for path in &pdfs {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        docs.push(UploadedDocument::new(name, bytes));
    }

    let processed = match medichat.process_documents(docs).await {
        Ok(processed) => processed,
        Err(CoreError::NoDocumentText(warnings)) => {
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
            anyhow::bail!("No valid text found in uploaded documents.");
        }
        Err(e) => return Err(e.into()),
    };
    for warning in &processed.warnings {
        eprintln!("warning: {warning}");
    }

    let (mut stream, sources) = medichat.answer_stream(&processed.index, &question).await?;
    let mut stdout = std::io::stdout();
    while let Some(token) = stream.next().await {
        write!(stdout, "{}", token?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    if !sources.is_empty() {
        eprintln!("sources: {}", sources.join(", "));
    }
    Ok(())
}
