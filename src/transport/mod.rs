//! WebSocket transport layer.
//!
//! Everything between an application and the socket: connection lifecycle,
//! request correlation, buffering while offline and reconnection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │  Connection          │                          │                 │
//! │                      │        WebSocket         │  Server         │
//! │  OutboundQueue   ───►│◄────────────────────────►│                 │
//! │  PendingRequests ◄───│     ws:// or wss://      │                 │
//! │  Heartbeat           │                          │                 │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::new` - Validate configuration, start disconnected
//! 2. `Connection::connect` - Open socket, send `auth`, flush the queue
//! 3. `Connection::send` / `Connection::request` - Exchange envelopes
//! 4. Unexpected close - Back off and reconnect until the ceiling
//! 5. `Connection::disconnect` - Close normally, fail pending requests
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay and attempt ceiling |
//! | `config` | Connection configuration |
//! | `connection` | WebSocket connection and socket task |
//! | `handlers` | Callback sets and subscription guards |
//! | `heartbeat` | Periodic ping timer |
//! | `pending` | Request/reply correlation table |
//! | `queue` | Bounded outbound queue |
//! | `registry` | Named connection registry |
//! | `status` | Connection status |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff policy.
pub mod backoff;

/// Connection configuration.
pub mod config;

/// WebSocket connection and socket task.
pub mod connection;

/// Callback sets and subscription guards.
pub mod handlers;

/// Heartbeat timer.
pub mod heartbeat;

/// Pending-request table.
pub mod pending;

/// Bounded outbound queue.
pub mod queue;

/// Named connection registry.
pub mod registry;

/// Connection status.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{MAX_RECONNECT_DELAY, ReconnectPolicy};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use handlers::Subscription;
pub use heartbeat::Heartbeat;
pub use pending::PendingRequests;
pub use queue::OutboundQueue;
pub use registry::ConnectionRegistry;
pub use status::ConnectionStatus;
