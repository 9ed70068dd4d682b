//! WebSocket protocol message types.
//!
//! This module defines the message format exchanged with the remote end.
//!
//! # Protocol Overview
//!
//! Both directions use the same [`Envelope`] shape. The type tag decides
//! how an incoming envelope is routed:
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `request` | Local → Remote | Correlated call |
//! | `response` / `error` | Remote → Local | Settles the request with the same `id` |
//! | `ping` / `pong` | Both | Liveness |
//! | `auth` | Local → Remote | Credential, first message after open |
//! | anything else | Both | Application message |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and type tag.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, MessageType, now_millis};
