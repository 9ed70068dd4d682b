//! Named connection registry.
//!
//! Owns connections by name so independent parts of an application can share
//! them and shut them all down together.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           ConnectionRegistry            │
//! │  ┌─────────────────────────────────┐   │
//! │  │ "market"  → Connection 1        │   │
//! │  │ "orders"  → Connection 2        │   │
//! │  │ "chat"    → Connection 3        │   │
//! │  └─────────────────────────────────┘   │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::Result;

use super::config::ConnectionConfig;
use super::connection::Connection;
use super::status::ConnectionStatus;

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Connections keyed by name.
///
/// Thread-safe; share it behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// let registry = ConnectionRegistry::new();
/// let market = registry.create_connection("market", ConnectionConfig::new(url))?;
/// market.connect().await?;
///
/// for (name, status) in registry.status_snapshot() {
///     println!("{name}: {status}");
/// }
///
/// registry.disconnect_all();
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connections by name.
    connections: RwLock<FxHashMap<String, Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connection and stores it under `name`.
    ///
    /// The connection starts disconnected. An existing connection with the
    /// same name is disconnected and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) or
    /// [`Error::Url`](crate::Error::Url) if `config` is invalid. The registry
    /// is unchanged in that case.
    pub fn create_connection(
        &self,
        name: impl Into<String>,
        config: ConnectionConfig,
    ) -> Result<Connection> {
        let name = name.into();
        let connection = Connection::new(config)?;

        let replaced = self
            .connections
            .write()
            .insert(name.clone(), connection.clone());

        if let Some(old) = replaced {
            debug!(name = %name, "Replacing existing connection");
            old.disconnect();
        }

        info!(name = %name, url = %connection.config().url, "Connection registered");
        Ok(connection)
    }

    /// Returns the connection stored under `name`.
    #[inline]
    #[must_use]
    pub fn get_connection(&self, name: &str) -> Option<Connection> {
        self.connections.read().get(name).cloned()
    }

    /// Removes the connection stored under `name` and disconnects it.
    pub fn remove(&self, name: &str) -> Option<Connection> {
        let removed = self.connections.write().remove(name);
        if let Some(connection) = &removed {
            connection.disconnect();
            debug!(name, "Connection removed");
        }
        removed
    }

    /// Disconnects every connection and empties the registry.
    pub fn disconnect_all(&self) {
        let drained: Vec<_> = self.connections.write().drain().collect();
        let count = drained.len();

        for (_, connection) in drained {
            connection.disconnect();
        }

        info!(count, "All connections disconnected");
    }

    /// Returns the current status of every connection.
    #[must_use]
    pub fn status_snapshot(&self) -> FxHashMap<String, ConnectionStatus> {
        self.connections
            .read()
            .iter()
            .map(|(name, connection)| (name.clone(), connection.status()))
            .collect()
    }

    /// Returns the registered names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Returns the number of registered connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns `true` if no connections are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
