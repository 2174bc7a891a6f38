//! Error types for pool monitors.

use thiserror::Error;

/// Errors raised while publishing pool metrics.
///
/// These never reach the database caller: the event adapter logs and drops them.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to register pool gauges: {0}")]
    Register(#[source] prometheus::Error),

    #[error("Failed to push pool metrics to {gateway}: {source}")]
    Push {
        gateway: String,
        #[source]
        source: prometheus::Error,
    },
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
