//! Connection configuration.
//!
//! A [`ConnectionConfig`] is fixed for the lifetime of a
//! [`Connection`](super::Connection); changing it means creating a new one.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use realtime_socket::ConnectionConfig;
//!
//! let config = ConnectionConfig::new("wss://chat.example.com/socket")
//!     .with_protocols(["chat.v1"])
//!     .with_max_reconnect_attempts(3)
//!     .with_heartbeat_interval(Duration::from_secs(15))
//!     .with_auth_token("session-token");
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default reconnect attempt ceiling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for correlated requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_MAX_SIZE: usize = 100;

/// Default timeout for opening the socket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on outstanding requests.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Configuration for a single [`Connection`](super::Connection).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Target address (`ws://` or `wss://`).
    pub url: String,

    /// Sub-protocols offered during the handshake.
    pub protocols: Vec<String>,

    /// Reconnect attempts allowed after an unexpected closure.
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect attempt; doubles per attempt.
    pub reconnect_base_delay: Duration,

    /// Interval between heartbeat pings while connected.
    pub heartbeat_interval: Duration,

    /// Default timeout for [`Connection::request`](super::Connection::request).
    pub request_timeout: Duration,

    /// Capacity of the outbound queue.
    pub queue_max_size: usize,

    /// Timeout for opening the socket.
    pub connect_timeout: Duration,

    /// Maximum number of outstanding requests.
    pub max_pending_requests: usize,

    /// Credential sent in an `auth` envelope once the socket opens.
    ///
    /// Never placed in the URL and never printed by `Debug`.
    pub auth_token: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            protocols: Vec::new(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_max_size: DEFAULT_QUEUE_MAX_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            auth_token: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_base_delay", &self.reconnect_base_delay)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("request_timeout", &self.request_timeout)
            .field("queue_max_size", &self.queue_max_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_pending_requests", &self.max_pending_requests)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a configuration for `url` with default settings.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Sets the sub-protocols offered during the handshake.
    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the reconnect attempt ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base reconnect delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Sets the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_queue_max_size(mut self, size: usize) -> Self {
        self.queue_max_size = size;
        self
    }

    /// Sets the socket open timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the cap on outstanding requests.
    #[inline]
    #[must_use]
    pub fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Sets the credential for the `auth` handshake envelope.
    #[inline]
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is empty or not `ws`/`wss`
    /// - [`Error::Url`] if the URL cannot be parsed
    /// - [`Error::Config`] if any interval, timeout or capacity is zero
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::config(
                "url is required. Example: ConnectionConfig::new(\"wss://host/socket\")",
            ));
        }

        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "url scheme must be ws or wss, got {}",
                url.scheme()
            )));
        }

        if self.reconnect_base_delay.is_zero() {
            return Err(Error::config("reconnect_base_delay must be > 0"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be > 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be > 0"));
        }
        if self.queue_max_size == 0 {
            return Err(Error::config("queue_max_size must be > 0"));
        }
        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be > 0"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
