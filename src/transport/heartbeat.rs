//! Heartbeat timer.
//!
//! Lives inside the socket task, so it exists only while the connection is
//! open. The first tick fires one full interval after creation.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::protocol::Envelope;

// ============================================================================
// Heartbeat
// ============================================================================

/// Periodic ping source.
#[derive(Debug)]
pub struct Heartbeat {
    /// Underlying interval.
    interval: Interval,
    /// Pings produced so far.
    sent: u64,
}

impl Heartbeat {
    /// Starts a heartbeat ticking every `period`.
    #[must_use]
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, sent: 0 }
    }

    /// Waits for the next tick and returns the ping to send.
    ///
    /// Cancel-safe; intended for use as a `tokio::select!` branch.
    pub async fn tick(&mut self) -> Envelope {
        self.interval.tick().await;
        self.sent += 1;
        Envelope::ping()
    }

    /// Returns the number of pings produced.
    #[inline]
    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Returns the tick period.
    #[inline]
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

// ============================================================================
// Tests
// ============================================================================
