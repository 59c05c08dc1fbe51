//! The capture-session coordinator
//!
//! `SessionController` is the entry point. Page records flow through
//! `IngestPipeline`, enrichment runs on `EnrichmentWorkers`, and every
//! committed change is fanned out by `BroadcastBus`.

mod bus;
mod controller;
mod enrichment;
mod events;
mod ingest;
mod protocol;

pub use bus::{BroadcastBus, DeliveryError, ObserverLink, DEFAULT_DELIVERY_TIMEOUT};
pub use controller::{ClearReport, SessionController, MAX_QUIZ_QUESTIONS};
pub use enrichment::{
    CaptureError, EnrichmentKind, EnrichmentTask, EnrichmentWorkers, ScreenshotCapturer,
    TaskState, UnavailableCapturer,
};
pub use events::SessionEvent;
pub use ingest::{CommitReport, EnrichmentPlan, IngestOutcome, IngestPipeline, MergeOutcome};
pub use protocol::{
    Ack, ActionMessage, InboundMessage, ProtocolError, QuizReply, Reply, TypedMessage,
    DEFAULT_QUIZ_COUNT,
};
