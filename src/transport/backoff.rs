//! Reconnect policy.
//!
//! Exponential backoff with a fixed cap:
//!
//! ```text
//! delay(n) = min(base * 2^(n-1), 30s)    for n >= 1
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use super::config::ConnectionConfig;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the delay between reconnect attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Computes reconnect delays and enforces the attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    base_delay: Duration,
    /// Attempts allowed before giving up.
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Creates a policy from a connection configuration.
    #[inline]
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.reconnect_base_delay, config.max_reconnect_attempts)
    }

    /// Returns the attempt ceiling.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before attempt number `attempt` (1-based).
    ///
    /// Attempt 0 has no delay.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(MAX_RECONNECT_DELAY)
    }

    /// Returns `true` if another attempt may be scheduled after
    /// `attempts_made` consecutive attempts.
    #[inline]
    #[must_use]
    pub const fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
