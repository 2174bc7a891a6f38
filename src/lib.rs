//! # db-trace-monitor
//!
//! Tracing spans for database driver calls and metrics for connection-pool
//! occupancy.
//!
//! The crate sits between application code and a SQL or NoSQL driver. It has
//! two halves:
//!
//! - **Call tracing**: [`TracerWrapper::wrap_query`] and
//!   [`TracerWrapper::wrap_exec`] decorate the driver's query and exec
//!   functions. Each call opens a span tagged with the statement, after the
//!   statement has passed through a pipeline of query builders that make it
//!   readable (and redacted) for traces. The driver always receives the
//!   original query and arguments.
//! - **Pool monitoring**: a [`PoolEventHandler`] receives the driver's pool
//!   events and turns them into gauge updates on a [`Monitor`], which keeps
//!   them locally, pushes them to a Prometheus push gateway, or emits them
//!   through the `metrics` facade.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use db_trace_monitor::TracerWrapper;
//!
//! let wrapper = TracerWrapper::mysql();
//! let query = wrapper.wrap_query(|sql: String, args: Vec<String>| async move {
//!     driver.query(&sql, &args).await
//! });
//!
//! // Span statement: "SELECT ... FROM users WHERE id = ?"
//! let rows = query.call("SELECT id, email FROM users WHERE id = ?", vec![id]).await?;
//! ```
//!
//! ## Query Builders
//!
//! | Option | Effect on `SELECT a FROM b WHERE c = ?` with `["d"]` |
//! |--------|--------------------------------------------------------|
//! | [`QueryBuilderOption::IgnoreSelectColumns`] | `SELECT ... FROM b WHERE c = ?` |
//! | [`QueryBuilderOption::RawQuery`] | `SELECT a FROM b WHERE c = d` |
//! | both, in that order | `SELECT ... FROM b WHERE c = d` |
//!
//! Builders run in registration order. The per-database defaults enable
//! `IgnoreSelectColumns` only.
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `db.instance` | Target identifier from the tracer configuration |
//! | `db.statement` | Statement after the query builders ran |
//! | `db.type` | "mysql", "mssql", "mongo", "postgresql" or "sqlite" |
//! | `db.user` | Database user from the tracer configuration |
//! | `otel.status_code` | "OK" or "ERROR" |
//! | `error.message` | Error details (on failure) |
//!
//! ## Pool Monitoring
//!
//! ```rust,ignore
//! use db_trace_monitor::{new_pool_monitor, DbKind, MonitorConfig, PoolEventHandler};
//!
//! let monitor = new_pool_monitor(
//!     &MonitorConfig::new(DbKind::Mongo).with_prometheus("http://pushgateway:9091"),
//! )?;
//! let callback = PoolEventHandler::from_env(monitor).into_callback();
//! ```

mod builder;
mod config;
mod connection;
mod error;
mod event;
mod monitor;
pub mod net;
mod tracer;
mod wrapper;

#[cfg(test)]
mod test_util;

pub use builder::{ignore_select_columns, raw_query, QueryBuilderFn, QueryBuilderOption};
pub use config::{DbKind, MonitorBackend, MonitorConfig, TracerConfig};
pub use connection::{TracedConnection, TracingExt};
pub use error::MonitorError;
pub use event::{PoolEvent, PoolEventHandler, PoolEventKind, UnknownEventKind, DEBUG_ENV};
pub use monitor::{
    new_pool_monitor, ConnOperation, LocalPoolMonitor, MetricsPoolMonitor, Monitor,
    PoolOperation, PoolSnapshot, PrometheusPoolMonitor,
};
pub use tracer::{ActiveSpan, CallKind, Tracer};
pub use wrapper::{TracedFn, TracerWrapper};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Monitor, PoolEventHandler, QueryBuilderOption, TracedConnection, TracerConfig,
        TracerWrapper, TracingExt,
    };
}
