//! Interception of driver query and exec functions.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::TracerConfig;
use crate::tracer::{ActiveSpan, CallKind, Tracer};

/// Decorates driver functions with a span per call.
///
/// The statement recorded on the span is the output of the tracer's query
/// builder pipeline. The driver function itself always receives the
/// original query and arguments, and its result is returned untouched.
///
/// # Example
///
/// ```rust,ignore
/// use db_trace_monitor::TracerWrapper;
///
/// let wrapper = TracerWrapper::mysql();
/// let query = wrapper.wrap_query(|sql: String, args: Vec<String>| async move {
///     pool.query(&sql, &args).await
/// });
///
/// // Recorded as "SELECT ... FROM users WHERE id = ?"
/// let rows = query.call("SELECT id, name FROM users WHERE id = ?", vec!["42".into()]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TracerWrapper {
    tracer: Arc<Tracer>,
}

impl TracerWrapper {
    pub fn new(config: TracerConfig) -> Self {
        Self::with_tracer(Tracer::new(config))
    }

    pub fn with_tracer(tracer: Tracer) -> Self {
        Self {
            tracer: Arc::new(tracer),
        }
    }

    /// A wrapper with the default MySQL configuration.
    pub fn mysql() -> Self {
        Self::new(TracerConfig::mysql())
    }

    /// A wrapper with the default MsSQL configuration.
    pub fn mssql() -> Self {
        Self::new(TracerConfig::mssql())
    }

    /// A wrapper with the default MongoDB configuration.
    pub fn mongo() -> Self {
        Self::new(TracerConfig::mongo())
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Build the display statement and open the span for one call.
    pub fn begin<A: fmt::Display>(&self, kind: CallKind, query: &str, args: &[A]) -> ActiveSpan {
        let display_args: Vec<&dyn fmt::Display> =
            args.iter().map(|a| a as &dyn fmt::Display).collect();
        let statement = self.tracer.build_statement(query, &display_args);
        self.tracer.start(kind, statement)
    }

    /// Decorate a function that returns rows.
    pub fn wrap_query<A, R, F>(&self, query_fn: F) -> TracedFn<F, A, R>
    where
        F: Fn(String, Vec<A>) -> R,
    {
        TracedFn::new(self.clone(), CallKind::Query, query_fn)
    }

    /// Decorate a function that executes a statement.
    pub fn wrap_exec<A, R, F>(&self, exec_fn: F) -> TracedFn<F, A, R>
    where
        F: Fn(String, Vec<A>) -> R,
    {
        TracedFn::new(self.clone(), CallKind::Exec, exec_fn)
    }
}

/// A driver function decorated by [`TracerWrapper::wrap_query`] or
/// [`TracerWrapper::wrap_exec`].
///
/// Use [`TracedFn::call`] when the function returns a future and
/// [`TracedFn::call_blocking`] when it returns a `Result` directly.
pub struct TracedFn<F, A, R> {
    wrapper: TracerWrapper,
    kind: CallKind,
    inner: F,
    _marker: PhantomData<fn(String, Vec<A>) -> R>,
}

impl<F, A, R> TracedFn<F, A, R> {
    fn new(wrapper: TracerWrapper, kind: CallKind, inner: F) -> Self {
        Self {
            wrapper,
            kind,
            inner,
            _marker: PhantomData,
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Unwrap the driver function.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F, A, Fut> TracedFn<F, A, Fut>
where
    F: Fn(String, Vec<A>) -> Fut,
    A: fmt::Display,
    Fut: Future,
{
    /// Invoke the driver function inside a span.
    pub async fn call<T, E>(&self, query: impl Into<String>, args: Vec<A>) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let query = query.into();
        let active = self.wrapper.begin(self.kind, &query, &args);
        active.run((self.inner)(query, args)).await
    }
}

impl<F, A, T, E> TracedFn<F, A, Result<T, E>>
where
    F: Fn(String, Vec<A>) -> Result<T, E>,
    A: fmt::Display,
    E: fmt::Display,
{
    /// Invoke a blocking driver function inside a span.
    pub fn call_blocking(&self, query: impl Into<String>, args: Vec<A>) -> Result<T, E> {
        let query = query.into();
        let active = self.wrapper.begin(self.kind, &query, &args);
        active.run_blocking(|| (self.inner)(query, args))
    }
}

impl<F, A, R> fmt::Debug for TracedFn<F, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedFn")
            .field("wrapper", &self.wrapper)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
