//! Realtime Socket - Resilient WebSocket messaging client.
//!
//! This library keeps a WebSocket session alive on behalf of an application
//! and layers a small envelope protocol on top of it.
//!
//! # Architecture
//!
//! Every frame on the wire is a JSON [`Envelope`]:
//!
//! ```text
//! { "id": "…", "type": "request", "payload": { … }, "timestamp": 1700000000000 }
//! ```
//!
//! Key design principles:
//!
//! - Each [`Connection`] owns one socket task, a pending-request table and
//!   an outbound queue
//! - Requests are correlated with replies by envelope id
//! - Sends made while offline are buffered and flushed on reconnect
//! - Unexpected closes trigger exponential backoff up to a fixed ceiling
//!
//! # Quick Start
//!
//! ```no_run
//! use realtime_socket::{Connection, ConnectionConfig, Envelope, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::new(
//!         ConnectionConfig::new("ws://127.0.0.1:9000/socket").with_auth_token("secret"),
//!     )?;
//!
//!     let _messages = connection.on_message(|envelope| {
//!         println!("{}: {}", envelope.message_type, envelope.payload);
//!     });
//!
//!     connection.connect().await?;
//!
//!     let reply = connection
//!         .request(Envelope::request(json!({ "op": "echo", "value": 42 })))
//!         .await?;
//!     println!("reply: {reply}");
//!
//!     connection.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Envelope wire format |
//! | [`transport`] | Connections, reconnection and the registry |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Envelope wire format.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection state machine, request correlation and the registry.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MessageId, SubscriptionId};

// Protocol types
pub use protocol::{Envelope, MessageType};

// Transport types
pub use transport::{
    Connection, ConnectionConfig, ConnectionRegistry, ConnectionStatus, ReconnectPolicy,
    Subscription,
};
