//! Envelope message type.
//!
//! Every frame exchanged over the socket, in either direction, is one
//! serialized [`Envelope`].
//!
//! # Format
//!
//! ```json
//! {
//!   "id": "uuid",
//!   "type": "request",
//!   "payload": { ... },
//!   "timestamp": 1700000000000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::MessageId;

// ============================================================================
// MessageType
// ============================================================================

/// Type tag of an envelope.
///
/// Unknown tags are preserved in [`MessageType::Custom`] and serialized back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Application message.
    Message,
    /// Correlated request expecting a `response` or `error`.
    Request,
    /// Successful answer to a request.
    Response,
    /// Failed answer to a request.
    Error,
    /// Liveness probe.
    Ping,
    /// Answer to a liveness probe.
    Pong,
    /// Credential sent as the first message after the socket opens.
    Auth,
    /// Any other tag.
    Custom(String),
}

impl MessageType {
    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Request => "request",
            Self::Response => "response",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Auth => "auth",
            Self::Custom(tag) => tag,
        }
    }

    /// Returns `true` for tags that settle a pending request.
    #[inline]
    #[must_use]
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Response | Self::Error)
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "message" => Self::Message,
            "request" => Self::Request,
            "response" => Self::Response,
            "error" => Self::Error,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "auth" => Self::Auth,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for MessageType {
    #[inline]
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The unit of exchange over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation identifier, echoed verbatim in the matching reply.
    ///
    /// Generated on input when absent, so id-less broadcasts still decode.
    #[serde(default = "MessageId::generate")]
    pub id: MessageId,

    /// Type tag.
    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Arbitrary structured payload.
    #[serde(default)]
    pub payload: Value,

    /// Milliseconds since the Unix epoch when the envelope was built.
    #[serde(default)]
    pub timestamp: u64,
}

// ============================================================================
// Envelope - Constructors
// ============================================================================

impl Envelope {
    /// Creates an envelope with a fresh id and the current timestamp.
    #[inline]
    #[must_use]
    pub fn new(message_type: impl Into<MessageType>, payload: Value) -> Self {
        Self {
            id: MessageId::generate(),
            message_type: message_type.into(),
            payload,
            timestamp: now_millis(),
        }
    }

    /// Creates a plain application message.
    #[inline]
    #[must_use]
    pub fn message(payload: Value) -> Self {
        Self::new(MessageType::Message, payload)
    }

    /// Creates a correlated request.
    #[inline]
    #[must_use]
    pub fn request(payload: Value) -> Self {
        Self::new(MessageType::Request, payload)
    }

    /// Creates a successful reply to request `id`.
    #[inline]
    #[must_use]
    pub fn response(id: MessageId, payload: Value) -> Self {
        Self::new(MessageType::Response, payload).with_id(id)
    }

    /// Creates a failed reply to request `id`.
    #[inline]
    #[must_use]
    pub fn error(id: MessageId, payload: Value) -> Self {
        Self::new(MessageType::Error, payload).with_id(id)
    }

    /// Creates a heartbeat ping.
    #[inline]
    #[must_use]
    pub fn ping() -> Self {
        Self::new(MessageType::Ping, Value::Null)
    }

    /// Creates a pong answering a ping.
    #[inline]
    #[must_use]
    pub fn pong() -> Self {
        Self::new(MessageType::Pong, Value::Null)
    }

    /// Creates the handshake envelope carrying a credential.
    #[inline]
    #[must_use]
    pub fn auth(token: &str) -> Self {
        Self::new(MessageType::Auth, json!({ "token": token }))
    }

    /// Replaces the generated id.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }
}

// ============================================================================
// Envelope - Codec
// ============================================================================

impl Envelope {
    /// Parses an envelope from a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the text is not a valid envelope.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses an envelope from a binary frame holding JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the bytes are not a valid envelope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the envelope to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[inline]
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
