//! Span creation for individual database calls.

use std::fmt;
use std::future::Future;

use tracing::{field, Instrument, Span};

use crate::builder::{self, QueryBuilderFn};
use crate::config::{DbKind, TracerConfig};

/// Which interception point a call came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A call returning rows. Spans are named `db.query`.
    Query,
    /// A call returning an execution result. Spans are named `db.exec`.
    Exec,
}

/// Per-connection tracing settings and the query builder pipeline.
///
/// A tracer holds no per-call state: every call gets its own [`ActiveSpan`]
/// from [`Tracer::start`], so a single tracer can serve concurrent calls.
#[derive(Clone)]
pub struct Tracer {
    instance: String,
    user: String,
    db_kind: DbKind,
    root_spans: bool,
    builders: Vec<QueryBuilderFn>,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        Self {
            instance: config.instance,
            user: config.user,
            db_kind: config.db_kind,
            root_spans: config.root_spans,
            builders: config.options.into_iter().map(|o| o.builder()).collect(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn db_kind(&self) -> DbKind {
        self.db_kind
    }

    /// Append a custom builder; it runs after every builder already registered.
    pub fn add_query_builder(&mut self, builder: QueryBuilderFn) {
        self.builders.push(builder);
    }

    /// Run the query builder pipeline over `query`.
    pub fn build_statement(&self, query: &str, args: &[&dyn fmt::Display]) -> String {
        builder::apply(&self.builders, query, args)
    }

    /// Open a span for one call, tagged with `statement`.
    ///
    /// The span is a child of the current span. Without a current span a root
    /// span is started, unless root spans are disabled, in which case the
    /// returned handle records nothing.
    pub fn start(&self, kind: CallKind, statement: String) -> ActiveSpan {
        let current = Span::current();
        let parent = if current.is_none() {
            if !self.root_spans {
                return ActiveSpan::idle(statement);
            }
            None
        } else {
            current.id()
        };

        let db_kind = self.db_kind.as_str();
        let span = match kind {
            CallKind::Query => tracing::info_span!(
                parent: parent,
                "db.query",
                otel.name = %db_kind,
                db.instance = %self.instance,
                db.statement = %statement,
                "db.type" = %db_kind,
                db.user = %self.user,
                otel.status_code = field::Empty,
                error.message = field::Empty,
            ),
            CallKind::Exec => tracing::info_span!(
                parent: parent,
                "db.exec",
                otel.name = %db_kind,
                db.instance = %self.instance,
                db.statement = %statement,
                "db.type" = %db_kind,
                db.user = %self.user,
                otel.status_code = field::Empty,
                error.message = field::Empty,
            ),
        };

        ActiveSpan {
            statement,
            span: (!span.is_disabled()).then_some(span),
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("instance", &self.instance)
            .field("user", &self.user)
            .field("db_kind", &self.db_kind)
            .field("root_spans", &self.root_spans)
            .field("builders", &self.builders.len())
            .finish()
    }
}

/// The span of a single in-flight call.
///
/// The span is closed by [`ActiveSpan::close`] or, failing that, when the
/// handle is dropped. Closing more than once, or closing a handle that never
/// opened a span, does nothing.
#[derive(Debug)]
pub struct ActiveSpan {
    statement: String,
    span: Option<Span>,
}

impl ActiveSpan {
    /// A handle with no span behind it.
    pub fn idle(statement: String) -> Self {
        Self {
            statement,
            span: None,
        }
    }

    /// The statement text recorded on the span.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Whether a span is open.
    pub fn is_open(&self) -> bool {
        self.span.is_some()
    }

    /// A handle to the open span, or [`Span::none`].
    pub fn span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::none)
    }

    /// Record the outcome of the call on the span.
    pub fn record_result<T, E: fmt::Display>(&self, result: &Result<T, E>) {
        let Some(span) = &self.span else {
            return;
        };
        match result {
            Ok(_) => {
                span.record("otel.status_code", "OK");
            }
            Err(e) => {
                span.record("otel.status_code", "ERROR");
                span.record("error.message", e.to_string().as_str());
                tracing::error!(
                    parent: span,
                    error = %e,
                    "Database call failed"
                );
            }
        }
    }

    /// Finish the span.
    pub fn close(&mut self) {
        // Dropping the last handle closes the span.
        self.span.take();
    }

    /// Await `fut` inside the span, record its outcome and close the span.
    pub async fn run<F, T, E>(mut self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let result = match &self.span {
            Some(span) => fut.instrument(span.clone()).await,
            None => fut.await,
        };
        self.record_result(&result);
        self.close();
        result
    }

    /// Call `f` inside the span, record its outcome and close the span.
    pub fn run_blocking<F, T, E>(mut self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: fmt::Display,
    {
        let result = match &self.span {
            Some(span) => span.in_scope(f),
            None => f(),
        };
        self.record_result(&result);
        self.close();
        result
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QueryBuilderOption;
    use crate::test_util::capture;

    fn all_options() -> Tracer {
        Tracer::new(
            TracerConfig::new(DbKind::MySql)
                .with_instance("orders")
                .with_user("app")
                .with_options([QueryBuilderOption::IgnoreSelectColumns, QueryBuilderOption::RawQuery]),
        )
    }

    #[test]
    fn test_start_records_tags() {
        let (captured, _guard) = capture();
        let tracer = all_options();
        assert_eq!(tracer.instance(), "orders");
        assert_eq!(tracer.user(), "app");
        assert_eq!(tracer.db_kind(), DbKind::MySql);

        let mut active = tracer.start(CallKind::Query, "SELECT ... FROM b WHERE c = d".to_string());
        assert!(active.is_open());
        active.close();

        let spans = captured.named("db.query");
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.field("db.instance"), Some("orders"));
        assert_eq!(span.field("db.statement"), Some("SELECT ... FROM b WHERE c = d"));
        assert_eq!(span.field("db.type"), Some("mysql"));
        assert_eq!(span.field("db.user"), Some("app"));
        assert_eq!(span.field("otel.name"), Some("mysql"));
        assert!(span.closed);
    }

    #[test]
    fn test_start_without_ambient_span_is_root() {
        let (captured, _guard) = capture();
        let tracer = all_options();

        drop(tracer.start(CallKind::Exec, "UPDATE t SET a = 1".to_string()));

        let spans = captured.named("db.exec");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent, None);
        assert!(spans[0].closed);
    }

    #[test]
    fn test_start_with_ambient_span_is_child() {
        let (captured, _guard) = capture();
        let tracer = all_options();

        let request = tracing::info_span!("request");
        request.in_scope(|| {
            let mut active = tracer.start(CallKind::Query, "SELECT 1".to_string());
            active.close();
        });

        let parent = captured.named("request")[0].id;
        assert_eq!(captured.named("db.query")[0].parent, Some(parent));
    }

    #[test]
    fn test_root_spans_disabled() {
        let (captured, _guard) = capture();
        let tracer = Tracer::new(TracerConfig::mysql().with_root_spans(false));

        let mut active = tracer.start(CallKind::Query, "SELECT 1".to_string());
        assert!(!active.is_open());
        active.close();
        active.close();
        assert!(captured.named("db.query").is_empty());

        tracing::info_span!("request").in_scope(|| {
            let active = tracer.start(CallKind::Query, "SELECT 1".to_string());
            assert!(active.is_open());
        });
        assert_eq!(captured.named("db.query").len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (captured, _guard) = capture();
        let tracer = all_options();

        let mut idle = ActiveSpan::idle(String::new());
        idle.close();
        idle.close();

        let mut active = tracer.start(CallKind::Exec, "DELETE FROM t".to_string());
        active.close();
        active.close();
        assert!(!active.is_open());
        assert!(captured.named("db.exec")[0].closed);
    }

    #[test]
    fn test_no_subscriber_opens_nothing() {
        let tracer = all_options();
        let active = tracer.start(CallKind::Query, "SELECT 1".to_string());
        assert!(!active.is_open());
        assert!(active.span().is_none());
    }

    #[test]
    fn test_record_result() {
        let (captured, _guard) = capture();
        let tracer = all_options();

        let ok: Result<u64, String> = tracer
            .start(CallKind::Exec, "UPDATE t SET a = 1".to_string())
            .run_blocking(|| Ok(3));
        assert_eq!(ok, Ok(3));

        let err: Result<u64, String> = tracer
            .start(CallKind::Exec, "UPDATE t SET a = 2".to_string())
            .run_blocking(|| Err("deadlock".to_string()));
        assert_eq!(err, Err("deadlock".to_string()));

        let spans = captured.named("db.exec");
        assert_eq!(spans[0].field("otel.status_code"), Some("OK"));
        assert_eq!(spans[1].field("otel.status_code"), Some("ERROR"));
        assert_eq!(spans[1].field("error.message"), Some("deadlock"));
        assert!(spans.iter().all(|s| s.closed));
    }

    #[test]
    fn test_custom_builder_runs_last() {
        fn tag(query: &str, _args: &[&dyn fmt::Display]) -> String {
            format!("/* traced */ {query}")
        }
        let mut tracer = all_options();
        tracer.add_query_builder(tag);

        assert_eq!(
            tracer.build_statement("select a from b where c = ?", &[&"d"]),
            "/* traced */ SELECT ... FROM b where c = d"
        );
    }
}
