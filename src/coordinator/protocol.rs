//! Wire messages exchanged with observers and UI surfaces
//!
//! Inbound messages carry either an `action` tag (session control and page
//! data) or a `type` tag (`GENERATE_QUIZ`). A message missing a required
//! field is rejected whole with `ProtocolError`; nothing is processed.

use crate::llm::QuizItem;
use crate::session::PageRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Questions asked for when a quiz request names no count.
pub const DEFAULT_QUIZ_COUNT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message has neither an action nor a type")]
    MissingDiscriminator,
    #[error("unknown message: {0}")]
    Unknown(String),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionMessage {
    StartRecording,
    StopRecording,
    ContentExtracted {
        #[serde(rename = "pageData")]
        page_data: PageRecord,
    },
    WebsiteRemoved {
        url: String,
    },
    GenerateNotes {
        #[serde(default, alias = "capturedWebsites")]
        records: Option<Vec<PageRecord>>,
    },
    ClearSession,
    /// An observer's page finished loading.
    PageLoaded,
}

const ACTIONS: &[&str] = &[
    "startRecording",
    "stopRecording",
    "contentExtracted",
    "websiteRemoved",
    "generateNotes",
    "clearSession",
    "pageLoaded",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TypedMessage {
    #[serde(rename = "GENERATE_QUIZ")]
    GenerateQuiz {
        content: String,
        #[serde(default = "default_quiz_count")]
        count: usize,
    },
}

fn default_quiz_count() -> usize {
    DEFAULT_QUIZ_COUNT
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Action(ActionMessage),
    Typed(TypedMessage),
}

impl InboundMessage {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(|source| ProtocolError::Malformed {
            kind: "json".to_string(),
            source,
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        if let Some(action) = object.get("action") {
            let name = action.as_str().unwrap_or_default().to_string();
            if !ACTIONS.contains(&name.as_str()) {
                return Err(ProtocolError::Unknown(name));
            }
            return serde_json::from_value(value)
                .map(InboundMessage::Action)
                .map_err(|source| ProtocolError::Malformed { kind: name, source });
        }

        if let Some(kind) = object.get("type") {
            let name = kind.as_str().unwrap_or_default().to_string();
            if name != "GENERATE_QUIZ" {
                return Err(ProtocolError::Unknown(name));
            }
            return serde_json::from_value(value)
                .map(InboundMessage::Typed)
                .map_err(|source| ProtocolError::Malformed { kind: name, source });
        }

        Err(ProtocolError::MissingDiscriminator)
    }
}

/// `{success, error?}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `{quiz: [...]}` or `{error: "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuizReply {
    Quiz(Vec<QuizItem>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ack(Ack),
    Quiz(QuizReply),
}

impl From<Ack> for Reply {
    fn from(ack: Ack) -> Self {
        Reply::Ack(ack)
    }
}

impl From<QuizReply> for Reply {
    fn from(reply: QuizReply) -> Self {
        Reply::Quiz(reply)
    }
}

impl From<ProtocolError> for Reply {
    fn from(err: ProtocolError) -> Self {
        Reply::Ack(Ack::failed(err.to_string()))
    }
}
