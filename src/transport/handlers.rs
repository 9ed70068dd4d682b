//! Handler sets and subscription guards.
//!
//! Handlers are registered through typed methods on
//! [`Connection`](super::Connection) and removed by dropping the returned
//! [`Subscription`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::identifiers::SubscriptionId;
use crate::protocol::Envelope;

use super::status::ConnectionStatus;

// ============================================================================
// Types
// ============================================================================

/// Handlers for application-level envelopes.
pub(crate) type MessageHandlers = HandlerSet<dyn Fn(&Envelope) + Send + Sync>;

/// Handlers for status transitions.
pub(crate) type StatusHandlers = HandlerSet<dyn Fn(ConnectionStatus) + Send + Sync>;

// ============================================================================
// HandlerSet
// ============================================================================

/// Ordered set of callbacks of one kind.
pub(crate) struct HandlerSet<T: ?Sized> {
    handlers: Mutex<Vec<(SubscriptionId, Arc<T>)>>,
}

impl<T: ?Sized + Send + Sync + 'static> HandlerSet<T> {
    /// Creates an empty set.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Adds a handler and returns the guard that removes it.
    pub(crate) fn insert(self: &Arc<Self>, handler: Arc<T>) -> Subscription {
        let id = SubscriptionId::next();
        self.handlers.lock().push((id, handler));

        let set: Weak<Self> = Arc::downgrade(self);
        Subscription {
            id,
            cancel: Some(Box::new(move || {
                if let Some(set) = set.upgrade() {
                    set.remove(id);
                }
            })),
        }
    }

    /// Removes a handler by id.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Clones the current handlers so they can be invoked without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Returns the number of registered handlers.
    pub(crate) fn len(&self) -> usize {
        self.handlers.lock().len()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Guard for a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    /// Registration id.
    id: SubscriptionId,
    /// Removes the handler; `None` once detached.
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Returns the registration id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the handler now.
    #[inline]
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keeps the handler registered for the lifetime of the connection.
    #[inline]
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
