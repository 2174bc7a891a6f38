//! Configuration for tracers and pool monitors.

use std::fmt;

use sea_orm::DbBackend;

use crate::builder::QueryBuilderOption;

/// The kind of database behind a tracer or monitor.
///
/// Recorded as `db.type` on spans and used to label pool metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    MySql,
    MsSql,
    Mongo,
    Postgres,
    Sqlite,
}

impl DbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbKind::MySql => "mysql",
            DbKind::MsSql => "mssql",
            DbKind::Mongo => "mongo",
            DbKind::Postgres => "postgresql",
            DbKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<DbBackend> for DbKind {
    fn from(backend: DbBackend) -> Self {
        match backend {
            DbBackend::Postgres => DbKind::Postgres,
            DbBackend::MySql => DbKind::MySql,
            DbBackend::Sqlite => DbKind::Sqlite,
        }
    }
}

/// Configuration for a [`Tracer`](crate::Tracer).
///
/// # Example
///
/// ```rust
/// use db_trace_monitor::{DbKind, QueryBuilderOption, TracerConfig};
///
/// let config = TracerConfig::new(DbKind::MySql)
///     .with_instance("orders-primary")
///     .with_user("app")
///     .with_option(QueryBuilderOption::RawQuery)
///     .with_option(QueryBuilderOption::IgnoreSelectColumns);
/// ```
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Target identifier recorded as `db.instance`.
    /// Default: empty
    pub instance: String,

    /// Database user recorded as `db.user`.
    /// Default: empty
    pub user: String,

    /// Database kind recorded as `db.type`.
    pub db_kind: DbKind,

    /// Query builders, applied in this order.
    /// Default: none for [`TracerConfig::new`], `IgnoreSelectColumns` for the per-kind constructors.
    pub options: Vec<QueryBuilderOption>,

    /// Whether to start a root span when the caller has no span in scope.
    /// When `false` such calls are not traced.
    /// Default: `true`
    pub root_spans: bool,
}

impl TracerConfig {
    /// Create a configuration with no query builders enabled.
    pub fn new(db_kind: DbKind) -> Self {
        Self {
            instance: String::new(),
            user: String::new(),
            db_kind,
            options: Vec::new(),
            root_spans: true,
        }
    }

    /// The default configuration for a database kind: only select columns are hidden,
    /// argument values are never inlined.
    pub fn for_kind(db_kind: DbKind) -> Self {
        Self::new(db_kind).with_option(QueryBuilderOption::IgnoreSelectColumns)
    }

    pub fn mysql() -> Self {
        Self::for_kind(DbKind::MySql)
    }

    pub fn mssql() -> Self {
        Self::for_kind(DbKind::MsSql)
    }

    pub fn mongo() -> Self {
        Self::for_kind(DbKind::Mongo)
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Append a query builder to the pipeline.
    ///
    /// **Security Warning**: [`QueryBuilderOption::RawQuery`] writes argument values
    /// into your traces. Only enable it where that data may be exported.
    pub fn with_option(mut self, option: QueryBuilderOption) -> Self {
        self.options.push(option);
        self
    }

    /// Replace the query builder pipeline.
    pub fn with_options(mut self, options: impl IntoIterator<Item = QueryBuilderOption>) -> Self {
        self.options = options.into_iter().collect();
        self
    }

    /// Enable or disable root spans for calls made outside of any span.
    pub fn with_root_spans(mut self, enabled: bool) -> Self {
        self.root_spans = enabled;
        self
    }
}

/// Where a pool monitor publishes its counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorBackend {
    /// In-process counters, readable through [`LocalPoolMonitor::snapshot`](crate::LocalPoolMonitor::snapshot).
    Local,
    /// Prometheus gauges pushed to a push gateway after every update.
    Prometheus { gateway: String },
    /// Gauges emitted through the `metrics` facade to whatever recorder is installed.
    Metrics,
}

/// Configuration for a pool monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Metric name prefix.
    /// Default: `database.{kind}`
    pub app_name: String,

    /// Database kind, used as the `kind` label.
    pub db_kind: DbKind,

    /// Publishing backend.
    /// Default: [`MonitorBackend::Local`]
    pub backend: MonitorBackend,
}

impl MonitorConfig {
    pub fn new(db_kind: DbKind) -> Self {
        Self {
            app_name: format!("database.{db_kind}"),
            db_kind,
            backend: MonitorBackend::Local,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_backend(mut self, backend: MonitorBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Push gauges to the Prometheus push gateway at `gateway`.
    pub fn with_prometheus(self, gateway: impl Into<String>) -> Self {
        self.with_backend(MonitorBackend::Prometheus {
            gateway: gateway.into(),
        })
    }
}
