//! Note generation: summarization and quiz capabilities backed by a remote
//! text-generation service.
//!
//! Defines the capability trait and its error type. Implementations:
//! - `HttpNoteGenerator`: OpenAI / Anthropic over HTTP (production)
//! - `MockGenerator`: returns preconfigured responses (testing)
//!
//! The coordinator never lets an `LlmError` escape to a UI surface: it is
//! rendered into an `ERROR: ...` string or a quiz error reply instead.

mod http;
mod mock;
mod prompt;
mod quiz;

pub use http::{HttpNoteGenerator, Provider};
pub use mock::MockGenerator;
pub use prompt::{quiz_prompt, summary_prompt, DEFAULT_PARAGRAPH_LIMIT};
pub use quiz::{parse_quiz, QuizItem};

use crate::session::CapturedPage;
use async_trait::async_trait;

/// Prefix that marks a stored summary as a failure description.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Errors from note-generation calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not set. Please set your API key in the extension options.")]
    MissingCredential,
    #[error("{0}")]
    Http(String),
    #[error("provider returned status {0}")]
    Status(u16),
    #[error("{0}")]
    Api(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Worth another attempt: transport failures, rate limits, server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// The string stored in place of notes when generation fails.
    pub fn to_notes(&self) -> String {
        format!("{}{}", ERROR_PREFIX, self)
    }
}

/// Capability for turning captured pages into notes and notes into a quiz.
#[async_trait]
pub trait NoteGenerator: Send + Sync {
    /// Produce markdown notes from the pages, in order.
    async fn summarize(&self, pages: &[CapturedPage]) -> Result<String, LlmError>;

    /// Produce `count` question/answer pairs about `content`.
    async fn quiz(&self, content: &str, count: usize) -> Result<Vec<QuizItem>, LlmError>;
}
