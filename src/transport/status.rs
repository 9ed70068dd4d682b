//! Connection status.
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected
//!      ▲              ▲  │           │ unexpected close
//!      │              │  ▼           ▼
//!      │              └─ Reconnecting ──► Failed
//!      └──────────── disconnect() / normal close
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Lifecycle state of a [`Connection`](super::Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No socket. Initial state and clean-shutdown terminal state.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open; heartbeat running.
    Connected,
    /// Waiting for the next scheduled reconnect attempt.
    Reconnecting,
    /// Reconnect attempts exhausted. Only an explicit `connect()` leaves it.
    Failed,
}

impl ConnectionStatus {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for states with no further automatic transition.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Returns `true` if `connect()` would be a no-op.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
