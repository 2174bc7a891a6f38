//! Connection-pool monitors.
//!
//! A monitor turns pool lifecycle operations into signed unit deltas on three
//! gauges: open pools, open connections and occupied connections. Variants
//! differ only in where the values end up:
//!
//! | Variant | Backend |
//! |---------|---------|
//! | [`LocalPoolMonitor`] | In-process atomics, read with [`LocalPoolMonitor::snapshot`] |
//! | [`PrometheusPoolMonitor`] | `prometheus` gauges pushed to a push gateway on every update |
//! | [`MetricsPoolMonitor`] | `metrics` facade gauges, for StatsD or any other installed recorder |
//!
//! Monitors never check that operations arrive in a legal order. A release
//! without an occupy simply drives the occupancy gauge below zero.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use metrics::Recorder;
use prometheus::{IntGauge, Opts, Registry};

use crate::config::{DbKind, MonitorBackend, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::net;

/// Pool lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOperation {
    Create,
    Clear,
}

impl PoolOperation {
    fn delta(self) -> i64 {
        match self {
            PoolOperation::Create => 1,
            PoolOperation::Clear => -1,
        }
    }
}

/// Connection lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnOperation {
    Create,
    Close,
    /// A connection was checked out of the pool.
    Occupy,
    /// A connection was returned to the pool.
    Release,
}

impl ConnOperation {
    fn gauge(self) -> ConnGauge {
        match self {
            ConnOperation::Create | ConnOperation::Close => ConnGauge::Conn,
            ConnOperation::Occupy | ConnOperation::Release => ConnGauge::Occupy,
        }
    }

    fn delta(self) -> i64 {
        match self {
            ConnOperation::Create | ConnOperation::Occupy => 1,
            ConnOperation::Close | ConnOperation::Release => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnGauge {
    Conn,
    Occupy,
}

/// Receives pool and connection operations and publishes the resulting counts.
pub trait Monitor: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics, e.g. `"prometheus"`.
    fn name(&self) -> &'static str;

    fn pool(&self, op: PoolOperation) -> Result<()>;

    fn conn(&self, op: ConnOperation) -> Result<()>;
}

/// Build the monitor selected by `config.backend`.
pub fn new_pool_monitor(config: &MonitorConfig) -> Result<Arc<dyn Monitor>> {
    let monitor: Arc<dyn Monitor> = match &config.backend {
        MonitorBackend::Local => Arc::new(LocalPoolMonitor::new()),
        MonitorBackend::Prometheus { gateway } => Arc::new(PrometheusPoolMonitor::new(
            &config.app_name,
            config.db_kind,
            gateway.clone(),
        )?),
        MonitorBackend::Metrics => {
            Arc::new(MetricsPoolMonitor::new(&config.app_name, config.db_kind))
        }
    };
    Ok(monitor)
}

/// Point-in-time values of the three pool gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool_size: i64,
    pub conn_num: i64,
    pub occupy_num: i64,
}

/// Keeps the counts in process.
///
/// Each counter is a single atomic, so [`LocalPoolMonitor::snapshot`] never
/// sees a value that was not produced by some update.
#[derive(Debug, Default)]
pub struct LocalPoolMonitor {
    pool_size: AtomicI64,
    conn_num: AtomicI64,
    occupy_num: AtomicI64,
}

impl LocalPoolMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool_size: self.pool_size.load(Ordering::SeqCst),
            conn_num: self.conn_num.load(Ordering::SeqCst),
            occupy_num: self.occupy_num.load(Ordering::SeqCst),
        }
    }
}

impl Monitor for LocalPoolMonitor {
    fn name(&self) -> &'static str {
        "local"
    }

    fn pool(&self, op: PoolOperation) -> Result<()> {
        let size = self.pool_size.fetch_add(op.delta(), Ordering::SeqCst) + op.delta();
        tracing::debug!(pool_size = size, "current pool size");
        Ok(())
    }

    fn conn(&self, op: ConnOperation) -> Result<()> {
        let counter = match op.gauge() {
            ConnGauge::Conn => &self.conn_num,
            ConnGauge::Occupy => &self.occupy_num,
        };
        counter.fetch_add(op.delta(), Ordering::SeqCst);
        tracing::debug!(
            conn_num = self.conn_num.load(Ordering::SeqCst),
            occupy_num = self.occupy_num.load(Ordering::SeqCst),
            "current connection count"
        );
        Ok(())
    }
}

/// Metric names may only contain `[a-zA-Z0-9_]`.
fn sanitize(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn int_gauge(subsystem: &str, name: String, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help).subsystem(subsystem)).map_err(MonitorError::Register)
}

/// Prometheus gauges pushed to a push gateway after every update.
///
/// Gauges live in a registry owned by the monitor, named
/// `monitor_{kind}_{prefix}_pool_current`, `..._conn_current` and
/// `..._conn_occupy_current`. Each push is grouped by `kind` and by the
/// host's outbound address as `instance`.
///
/// Pushing is synchronous: a slow gateway stalls the caller, and a failed
/// push is returned as an error after the gauge has been updated.
pub struct PrometheusPoolMonitor {
    registry: Registry,
    pool: IntGauge,
    conn: IntGauge,
    conn_occupy: IntGauge,
    gateway: String,
    job: String,
    grouping: HashMap<String, String>,
    push_lock: Mutex<()>,
}

impl PrometheusPoolMonitor {
    pub fn new(app_name: &str, db_kind: DbKind, gateway: impl Into<String>) -> Result<Self> {
        Self::with_instance(app_name, db_kind, gateway, net::outbound_instance())
    }

    /// Like [`PrometheusPoolMonitor::new`] with an explicit `instance` grouping label.
    pub fn with_instance(
        app_name: &str,
        db_kind: DbKind,
        gateway: impl Into<String>,
        instance: impl Into<String>,
    ) -> Result<Self> {
        let prefix = sanitize(app_name);
        let subsystem = format!("monitor_{}", db_kind.as_str());
        let pool = int_gauge(&subsystem, format!("{prefix}_pool_current"), "open connection pools")?;
        let conn = int_gauge(&subsystem, format!("{prefix}_conn_current"), "open connections")?;
        let conn_occupy = int_gauge(
            &subsystem,
            format!("{prefix}_conn_occupy_current"),
            "connections checked out of the pool",
        )?;

        let registry = Registry::new();
        for gauge in [&pool, &conn, &conn_occupy] {
            registry
                .register(Box::new(gauge.clone()))
                .map_err(MonitorError::Register)?;
        }

        let grouping = HashMap::from([
            ("kind".to_string(), db_kind.as_str().to_string()),
            ("instance".to_string(), instance.into()),
        ]);

        Ok(Self {
            registry,
            pool,
            conn,
            conn_occupy,
            gateway: gateway.into(),
            job: format!("{}-pool-monitor", db_kind.as_str()),
            grouping,
            push_lock: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            pool_size: self.pool.get(),
            conn_num: self.conn.get(),
            occupy_num: self.conn_occupy.get(),
        }
    }

    /// Push every gauge to the gateway.
    ///
    /// The push client blocks and must not run on an async runtime thread, so
    /// the request is made from a scoped thread and joined before returning.
    fn push(&self) -> Result<()> {
        let _guard = self.push_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let metrics = self.registry.gather();
        let pushed = thread::scope(|s| {
            s.spawn(|| {
                prometheus::push_metrics(
                    &self.job,
                    self.grouping.clone(),
                    &self.gateway,
                    metrics,
                    None,
                )
            })
            .join()
        });
        let source = match pushed {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => prometheus::Error::Msg("push thread panicked".to_string()),
        };
        Err(MonitorError::Push {
            gateway: self.gateway.clone(),
            source,
        })
    }
}

impl fmt::Debug for PrometheusPoolMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusPoolMonitor")
            .field("gateway", &self.gateway)
            .field("job", &self.job)
            .field("grouping", &self.grouping)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Monitor for PrometheusPoolMonitor {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn pool(&self, op: PoolOperation) -> Result<()> {
        self.pool.add(op.delta());
        self.push()
    }

    fn conn(&self, op: ConnOperation) -> Result<()> {
        match op.gauge() {
            ConnGauge::Conn => self.conn.add(op.delta()),
            ConnGauge::Occupy => self.conn_occupy.add(op.delta()),
        }
        self.push()
    }
}

/// Gauges emitted through the `metrics` facade.
///
/// Names are `{prefix}.db.pool`, `{prefix}.db.conn` and
/// `{prefix}.db.conn.occupy`, labelled with `kind`. Updates go to the
/// recorder given to [`MetricsPoolMonitor::with_recorder`], or to the
/// globally installed recorder.
pub struct MetricsPoolMonitor {
    prefix: String,
    db_kind: DbKind,
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl MetricsPoolMonitor {
    pub fn new(app_name: impl Into<String>, db_kind: DbKind) -> Self {
        Self {
            prefix: app_name.into(),
            db_kind,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    fn adjust(&self, metric: &str, delta: i64) {
        let name = format!("{}.{metric}", self.prefix);
        let update = || {
            let gauge = metrics::gauge!(name, "kind" => self.db_kind.as_str());
            if delta >= 0 {
                gauge.increment(delta as f64);
            } else {
                gauge.decrement(-delta as f64);
            }
        };
        match &self.recorder {
            Some(recorder) => metrics::with_local_recorder(recorder.as_ref(), update),
            None => update(),
        }
    }
}

impl fmt::Debug for MetricsPoolMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsPoolMonitor")
            .field("prefix", &self.prefix)
            .field("db_kind", &self.db_kind)
            .field("local_recorder", &self.recorder.is_some())
            .finish()
    }
}

impl Monitor for MetricsPoolMonitor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn pool(&self, op: PoolOperation) -> Result<()> {
        self.adjust("db.pool", op.delta());
        Ok(())
    }

    fn conn(&self, op: ConnOperation) -> Result<()> {
        let metric = match op.gauge() {
            ConnGauge::Conn => "db.conn",
            ConnGauge::Occupy => "db.conn.occupy",
        };
        self.adjust(metric, op.delta());
        Ok(())
    }
}
