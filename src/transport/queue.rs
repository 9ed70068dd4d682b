//! Bounded outbound queue.
//!
//! Holds envelopes sent while the socket is not open. When full, the oldest
//! entry is evicted to admit the newest.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;

use tracing::warn;

use crate::protocol::Envelope;

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO of envelopes awaiting transmission, bounded at `capacity`.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    /// Queued envelopes, oldest first.
    items: VecDeque<Envelope>,
    /// Maximum number of entries.
    capacity: usize,
}

impl OutboundQueue {
    /// Creates an empty queue holding at most `capacity` envelopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends an envelope.
    ///
    /// Returns the evicted envelope when the queue was already full.
    pub fn push(&mut self, envelope: Envelope) -> Option<Envelope> {
        if self.capacity == 0 {
            warn!(id = %envelope.id, "Outbound queue has zero capacity, dropping envelope");
            return Some(envelope);
        }

        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };

        if let Some(ref old) = evicted {
            warn!(
                evicted = %old.id,
                capacity = self.capacity,
                "Outbound queue full, evicted oldest envelope"
            );
        }

        self.items.push_back(envelope);
        evicted
    }

    /// Removes and yields every queued envelope in FIFO order.
    pub fn drain(&mut self) -> Drain<'_, Envelope> {
        self.items.drain(..)
    }

    /// Returns the number of queued envelopes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the maximum number of entries.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates queued envelopes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.items.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
