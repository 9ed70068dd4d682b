//! Pending-request table.
//!
//! Maps an outstanding correlation id to a one-shot completion channel and
//! the timer task that expires it. An entry leaves the table exactly once:
//! when its reply arrives, when its timer fires, or when the connection is
//! torn down.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{Envelope, MessageType};

// ============================================================================
// Types
// ============================================================================

/// Receiving half handed to the caller of `register`.
pub type PendingReceiver = oneshot::Receiver<Result<Value>>;

/// One outstanding request.
struct PendingEntry {
    /// Completion channel.
    tx: oneshot::Sender<Result<Value>>,
    /// Timeout task; aborted when the entry settles another way.
    timer: JoinHandle<()>,
}

// ============================================================================
// PendingRequests
// ============================================================================

/// Table of requests awaiting a `response` or `error` envelope.
///
/// Timer tasks hold only a weak reference to the table, so dropping the
/// table ends all background work.
pub struct PendingRequests {
    /// Entries by correlation id.
    entries: Mutex<FxHashMap<MessageId, PendingEntry>>,
    /// Maximum number of concurrent entries.
    capacity: usize,
}

impl PendingRequests {
    /// Creates an empty table holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(FxHashMap::default()),
            capacity,
        })
    }

    /// Registers a request and starts its timer.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the table is full
    /// - [`Error::Protocol`] if `id` is already outstanding
    pub fn register(self: &Arc<Self>, id: MessageId, timeout: Duration) -> Result<PendingReceiver> {
        let mut entries = self.entries.lock();

        if entries.len() >= self.capacity {
            warn!(
                pending = entries.len(),
                max = self.capacity,
                "Too many pending requests"
            );
            return Err(Error::protocol(format!(
                "Too many pending requests: {}/{}",
                entries.len(),
                self.capacity
            )));
        }

        if entries.contains_key(&id) {
            return Err(Error::protocol(format!(
                "Request id {id} is already outstanding"
            )));
        }

        let (tx, rx) = oneshot::channel();
        let timer = tokio::spawn(Self::run_timer(Arc::downgrade(self), id.clone(), timeout));

        entries.insert(id, PendingEntry { tx, timer });
        Ok(rx)
    }

    /// Settles the request answered by a `response` or `error` envelope.
    ///
    /// A `response` completes the request with its payload; an `error`
    /// fails it with [`Error::Remote`]. Returns the envelope unchanged when
    /// it is not a reply or no request with its id is outstanding.
    pub fn settle(&self, envelope: Envelope) -> StdResult<(), Envelope> {
        if !envelope.message_type.is_reply() {
            return Err(envelope);
        }

        let Some(entry) = self.entries.lock().remove(&envelope.id) else {
            return Err(envelope);
        };

        entry.timer.abort();
        trace!(id = %envelope.id, kind = %envelope.message_type, "Pending request settled");

        let result = match envelope.message_type {
            MessageType::Error => Err(Error::remote(envelope.id, envelope.payload)),
            _ => Ok(envelope.payload),
        };
        let _ = entry.tx.send(result);
        Ok(())
    }

    /// Fails every entry with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of entries failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            entry.timer.abort();
            let _ = entry.tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on close");
        }
        count
    }

    /// Returns the number of outstanding requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Timer body: expires the entry once `timeout` elapses.
    async fn run_timer(table: Weak<Self>, id: MessageId, timeout: Duration) {
        tokio::time::sleep(timeout).await;

        let Some(table) = table.upgrade() else {
            return;
        };

        let expired = table.entries.lock().remove(&id);
        if let Some(entry) = expired {
            let timeout_ms = timeout.as_millis() as u64;
            debug!(%id, timeout_ms, "Request timed out");
            let _ = entry.tx.send(Err(Error::request_timeout(id, timeout_ms)));
        }
    }
}

impl Drop for PendingRequests {
    fn drop(&mut self) {
        for (_, entry) in self.entries.get_mut().drain() {
            entry.timer.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
