//! Session data model
//!
//! `SessionState` is the coordinator's in-memory mirror of the persisted
//! session. Every other context only ever sees clones of it.

mod error;
mod page;
mod state;

#[cfg(test)]
mod tests;

pub use error::{SessionError, SessionResult};
pub use page::{
    CapturedPage, EnrichmentUpdate, Heading, OriginContext, PageRecord, ScreenshotRef,
};
pub use state::{SessionPhase, SessionSnapshot, SessionState, UpsertOutcome};
