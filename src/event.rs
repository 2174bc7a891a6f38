//! Adapter from driver pool events to [`Monitor`] calls.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::monitor::{ConnOperation, Monitor, PoolOperation};

/// Environment variable that turns on pool event diagnostics when set to any
/// non-empty value.
pub const DEBUG_ENV: &str = "DEBUG_MONITOR";

/// The pool event kinds the adapter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEventKind {
    PoolCreated,
    PoolCleared,
    ConnectionCreated,
    ConnectionClosed,
    ConnectionReturned,
    /// A connection was successfully checked out.
    GetSucceeded,
}

impl PoolEventKind {
    /// The driver's name for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEventKind::PoolCreated => "ConnectionPoolCreated",
            PoolEventKind::PoolCleared => "ConnectionPoolCleared",
            PoolEventKind::ConnectionCreated => "ConnectionCreated",
            PoolEventKind::ConnectionClosed => "ConnectionClosed",
            PoolEventKind::ConnectionReturned => "ConnectionReturned",
            PoolEventKind::GetSucceeded => "ConnectionCheckedOut",
        }
    }
}

impl fmt::Display for PoolEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when an event type is not one the adapter handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl FromStr for PoolEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ConnectionPoolCreated" => Ok(PoolEventKind::PoolCreated),
            "ConnectionPoolCleared" => Ok(PoolEventKind::PoolCleared),
            "ConnectionCreated" => Ok(PoolEventKind::ConnectionCreated),
            "ConnectionClosed" => Ok(PoolEventKind::ConnectionClosed),
            "ConnectionReturned" => Ok(PoolEventKind::ConnectionReturned),
            "ConnectionCheckedOut" => Ok(PoolEventKind::GetSucceeded),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// A pool lifecycle event as delivered by the driver.
///
/// Only `event_type` is inspected; the remaining fields are carried for
/// diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolEvent {
    pub event_type: String,
    pub address: Option<String>,
    pub connection_id: Option<u64>,
    pub reason: Option<String>,
}

impl PoolEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_connection_id(mut self, connection_id: u64) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The recognized kind of this event, if any.
    pub fn kind(&self) -> Option<PoolEventKind> {
        self.event_type.parse().ok()
    }
}

impl From<PoolEventKind> for PoolEvent {
    fn from(kind: PoolEventKind) -> Self {
        Self::new(kind.as_str())
    }
}

/// Feeds driver pool events to a [`Monitor`].
///
/// The driver's event callback has no error channel, so monitor errors stop
/// here. With diagnostics on, each event is logged at DEBUG and each monitor
/// error at WARN; otherwise errors are dropped silently.
#[derive(Debug, Clone)]
pub struct PoolEventHandler {
    monitor: Arc<dyn Monitor>,
    debug: bool,
}

impl PoolEventHandler {
    pub fn new(monitor: Arc<dyn Monitor>, debug: bool) -> Self {
        Self { monitor, debug }
    }

    /// Diagnostics are on when [`DEBUG_ENV`] is set.
    pub fn from_env(monitor: Arc<dyn Monitor>) -> Self {
        let debug = std::env::var(DEBUG_ENV).is_ok_and(|v| !v.is_empty());
        Self::new(monitor, debug)
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// Whether events and monitor errors are logged.
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Handle one event. Unrecognized kinds are ignored.
    pub fn handle(&self, event: &PoolEvent) {
        if self.debug {
            tracing::debug!(monitor = self.monitor.name(), ?event, "pool event");
        }
        let Some(kind) = event.kind() else {
            return;
        };
        let result = match kind {
            PoolEventKind::PoolCreated => self.monitor.pool(PoolOperation::Create),
            PoolEventKind::PoolCleared => self.monitor.pool(PoolOperation::Clear),
            PoolEventKind::ConnectionCreated => self.monitor.conn(ConnOperation::Create),
            PoolEventKind::ConnectionClosed => self.monitor.conn(ConnOperation::Close),
            PoolEventKind::ConnectionReturned => self.monitor.conn(ConnOperation::Release),
            PoolEventKind::GetSucceeded => self.monitor.conn(ConnOperation::Occupy),
        };
        if let Err(e) = result {
            if self.debug {
                tracing::warn!(
                    monitor = self.monitor.name(),
                    event = %kind,
                    error = %e,
                    "pool monitor update failed"
                );
            }
        }
    }

    /// A callback suitable for a driver's pool event hook.
    pub fn into_callback(self) -> impl Fn(&PoolEvent) + Send + Sync + 'static {
        move |event| self.handle(event)
    }
}
