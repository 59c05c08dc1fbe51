//! Mindnote CLI: capture-session coordinator host bridge.
//!
//! Usage:
//!   mindnote serve [--db path] [--config file] [--provider name]
//!   mindnote status|clear|roadmap [--db path]
//!   mindnote export [--out dir] [--db path]

use clap::{Parser, Subcommand};
use mindnote::coordinator::ObserverLink;
use mindnote::coordinator::{DeliveryError, InboundMessage, Reply};
use mindnote::roadmap::{self, RoadmapNode};
use mindnote::session::SessionState;
use mindnote::{
    Ack, CoordinatorConfig, HttpNoteGenerator, HttpTranscriptFetcher, OpenStore, OriginContext,
    Provider, SessionController, SessionEvent, SqliteStore, TranscriptFetcher,
    UnavailableCapturer, UnavailableTranscripts,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};

#[derive(Parser)]
#[command(name = "mindnote", version, about = "Capture-session coordinator for study notes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator, exchanging JSON lines over stdin/stdout
    Serve {
        /// Preferred summarization provider (openai or anthropic)
        #[arg(long)]
        provider: Option<Provider>,
        /// Transcript service URL
        #[arg(long)]
        transcript_endpoint: Option<String>,
    },
    /// Show the persisted session
    Status,
    /// Clear records and summary
    Clear,
    /// Write the last summary to mindnote-YYYY-MM-DD.md
    Export {
        /// Directory to write into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the exploration roadmap as a Mermaid flowchart
    Roadmap,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mindnote=debug" } else { "mindnote=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<CoordinatorConfig, String> {
    let mut config = CoordinatorConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    Ok(config)
}

fn open_store(config: &CoordinatorConfig) -> Result<SqliteStore, String> {
    let path = config.resolved_db_path();
    SqliteStore::open(&path)
        .map_err(|e| format!("Failed to open database at {}: {}", path.display(), e))
}

fn load_session(config: &CoordinatorConfig) -> Result<SessionState, String> {
    let store = open_store(config)?;
    SessionState::load(&store).map_err(|e| format!("Failed to load session: {}", e))
}

fn open_controller(config: &CoordinatorConfig) -> Result<SessionController, String> {
    let store = open_store(config)?;
    let generator = HttpNoteGenerator::from_config(config)
        .map_err(|e| format!("Failed to build generator: {}", e))?;
    let transcripts: Arc<dyn TranscriptFetcher> = match &config.transcript_endpoint {
        Some(endpoint) => Arc::new(
            HttpTranscriptFetcher::new(endpoint.clone(), config.request_timeout())
                .map_err(|e| format!("Failed to build transcript client: {}", e))?
                .with_retry(config.retry_policy()),
        ),
        None => Arc::new(UnavailableTranscripts),
    };

    SessionController::open(
        Arc::new(store),
        Arc::new(UnavailableCapturer),
        transcripts,
        Arc::new(generator),
    )
    .map_err(|e| format!("Failed to open session: {}", e))
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))
}

// === serve ===

type Output = Arc<Mutex<tokio::io::Stdout>>;

async fn write_line(out: &Output, value: &Value) {
    let mut line = value.to_string();
    line.push('\n');
    let mut out = out.lock().await;
    if out.write_all(line.as_bytes()).await.is_ok() {
        let _ = out.flush().await;
    }
}

/// Forwards events for one observer context to the host as
/// `{"observer": id, "event": ...}` lines.
struct HostObserver {
    id: String,
    out: Output,
}

#[async_trait::async_trait]
impl ObserverLink for HostObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &SessionEvent) -> Result<(), DeliveryError> {
        write_line(&self.out, &json!({"observer": self.id, "event": event})).await;
        Ok(())
    }
}

/// Origin used for lines that do not name one. It is never attached as an
/// observer; its events already reach the host through the surface printer.
const HOST_ORIGIN: &str = "host";

/// One inbound line split into routing data and the message itself.
struct Envelope {
    origin: OriginContext,
    /// Whether the line named its origin, as opposed to `HOST_ORIGIN`.
    named_origin: bool,
    id: Option<Value>,
    body: Value,
}

/// Split `{"origin": ..., "id": ..., ...message}` into its parts.
fn unwrap_envelope(mut value: Value) -> Envelope {
    let (origin, id) = match value.as_object_mut() {
        Some(object) => (object.remove("origin"), object.remove("id")),
        None => (None, None),
    };
    let origin = match origin {
        Some(Value::String(id)) => Some(OriginContext::new(id)),
        Some(other) => serde_json::from_value(other).ok(),
        None => None,
    };
    Envelope {
        named_origin: origin.is_some(),
        origin: origin.unwrap_or_else(|| OriginContext::new(HOST_ORIGIN)),
        id,
        body: value,
    }
}

fn reply_value(reply: &Reply, id: Option<Value>) -> Value {
    let mut value = serde_json::to_value(reply)
        .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}));
    if let (Some(id), Some(object)) = (id, value.as_object_mut()) {
        object.insert("id".to_string(), id);
    }
    value
}

async fn serve(controller: SessionController) -> i32 {
    let out: Output = Arc::new(Mutex::new(tokio::io::stdout()));

    if let Err(e) = controller.initialize().await {
        eprintln!("Error: {}", e);
        return 1;
    }

    let mut events = controller.subscribe();
    let surface_out = Arc::clone(&out);
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => write_line(&surface_out, &json!({"event": event})).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut attached: HashSet<String> = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("mindnote serving on stdio");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error: failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                let reply = Reply::from(Ack::failed(format!("invalid JSON: {}", e)));
                write_line(&out, &reply_value(&reply, None)).await;
                continue;
            }
        };
        let Envelope {
            origin,
            named_origin,
            id,
            body,
        } = unwrap_envelope(value);

        if named_origin && attached.insert(origin.id.clone()) {
            controller.attach_observer(Arc::new(HostObserver {
                id: origin.id.clone(),
                out: Arc::clone(&out),
            }));
        }

        let message = match InboundMessage::from_value(body) {
            Ok(message) => message,
            Err(e) => {
                write_line(&out, &reply_value(&Reply::from(e), id)).await;
                continue;
            }
        };

        // Quizzes wait on a remote call; everything else is handled in order
        if matches!(message, InboundMessage::Typed(_)) {
            let controller = controller.clone();
            let out = Arc::clone(&out);
            tokio::spawn(async move {
                let reply = controller.dispatch(message, &origin).await;
                write_line(&out, &reply_value(&reply, id)).await;
            });
        } else {
            let reply = controller.dispatch(message, &origin).await;
            write_line(&out, &reply_value(&reply, id)).await;
        }
    }

    controller.settle().await;
    drop(controller);
    let _ = printer.await;
    0
}

// === one-shot commands ===

fn cmd_status(config: &CoordinatorConfig) -> i32 {
    let session = match load_session(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("Recording: {}", if session.is_recording() { "yes" } else { "no" });
    println!("Summary:   {}", if session.summary().is_some() { "yes" } else { "no" });
    if session.records().is_empty() {
        println!("No captured pages.");
        return 0;
    }
    println!();
    println!("{:<4}  {:<40}  {}", "#", "TITLE", "URL");
    println!("{}", "-".repeat(80));
    for (index, page) in session.records().iter().enumerate() {
        let title: String = page.title.chars().take(40).collect();
        println!("{:<4}  {:<40}  {}", index + 1, title, page.url);
    }
    0
}

fn cmd_clear(config: &CoordinatorConfig) -> i32 {
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    rt.block_on(async {
        let controller = match open_controller(config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let report = controller.clear().await;
        match report.persist_error {
            None => {
                println!("Cleared {} page(s)", report.cleared);
                0
            }
            Some(e) => {
                eprintln!("Error: cleared in memory but not persisted: {}", e);
                1
            }
        }
    })
}

fn cmd_export(config: &CoordinatorConfig, out: &Path) -> i32 {
    let session = match load_session(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let summary = match session.summary() {
        Some(summary) => summary,
        None => {
            eprintln!("Error: no notes generated yet");
            return 1;
        }
    };

    let path = out.join(roadmap::export_file_name(chrono::Local::now().date_naive()));
    match std::fs::write(&path, summary) {
        Ok(()) => {
            println!("Wrote {}", path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: failed to write {}: {}", path.display(), e);
            1
        }
    }
}

fn cmd_roadmap(config: &CoordinatorConfig) -> i32 {
    let session = match load_session(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let nodes: Vec<RoadmapNode> = match session.summary_sources() {
        Some(sources) => roadmap::summary_nodes(sources, session.records()),
        None => session.records().iter().map(RoadmapNode::from).collect(),
    };
    match roadmap::mermaid(&nodes) {
        Some(chart) => print!("{}", chart),
        None => println!("No sources."),
    }
    0
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match &cli.command {
        Commands::Serve {
            provider,
            transcript_endpoint,
        } => {
            if provider.is_some() {
                config.preferred_provider = *provider;
            }
            if let Some(endpoint) = transcript_endpoint {
                config.transcript_endpoint = Some(endpoint.clone());
            }
            match runtime() {
                Ok(rt) => rt.block_on(async {
                    match open_controller(&config) {
                        Ok(controller) => serve(controller).await,
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            1
                        }
                    }
                }),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Status => cmd_status(&config),
        Commands::Clear => cmd_clear(&config),
        Commands::Export { out } => cmd_export(&config, out),
        Commands::Roadmap => cmd_roadmap(&config),
    };
    std::process::exit(code);
}
