//! Mindnote: Capture-Session Coordinator
//!
//! Reconciles page captures reported by many independent observers into one
//! deduplicated, persisted session, enriches captured pages asynchronously,
//! and turns the session into study notes and quizzes.
//!
//! # Core Concepts
//!
//! - **Session**: recording flag, ordered records (one per URL), last summary
//! - **Ingest**: content fields take the newest observation; enrichment
//!   fields (screenshot, transcript) keep the best value ever seen
//! - **Broadcast**: best-effort, order-preserving fan-out after every commit
//!
//! # Example
//!
//! ```
//! use mindnote::{MemoryStore, PageRecord, SessionController};
//! use mindnote::{MockGenerator, OriginContext, UnavailableCapturer, UnavailableTranscripts};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = SessionController::open(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(UnavailableCapturer),
//!     Arc::new(UnavailableTranscripts),
//!     Arc::new(MockGenerator::new()),
//! )?;
//! controller.start_recording().await?;
//! controller
//!     .ingest(PageRecord::new("https://doc.rust-lang.org/book/", "The Book"), &OriginContext::new("tab-1"))
//!     .await?;
//! assert_eq!(controller.snapshot().await.records.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod llm;
pub mod retry;
pub mod roadmap;
pub mod session;
pub mod storage;
pub mod transcript;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{
    Ack, BroadcastBus, CaptureError, ClearReport, IngestOutcome, InboundMessage, ObserverLink,
    QuizReply, Reply, ScreenshotCapturer, SessionController, SessionEvent, UnavailableCapturer,
};
pub use llm::{HttpNoteGenerator, LlmError, MockGenerator, NoteGenerator, Provider, QuizItem};
pub use retry::RetryPolicy;
pub use session::{
    CapturedPage, Heading, OriginContext, PageRecord, ScreenshotRef, SessionError, SessionPhase,
    SessionResult, SessionSnapshot,
};
pub use storage::{MemoryStore, OpenStore, SessionStore, SqliteStore, StorageError, StorageResult, StoreKey};
pub use transcript::{
    HttpTranscriptFetcher, Transcript, TranscriptError, TranscriptFetcher, UnavailableTranscripts,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
