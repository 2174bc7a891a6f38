//! Traced sea-orm connection.

use std::fmt;

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement,
    Value,
};

use crate::config::TracerConfig;
use crate::tracer::CallKind;
use crate::wrapper::TracerWrapper;

/// A traced wrapper around SeaORM's `DatabaseConnection`.
///
/// Every statement is routed through a [`TracerWrapper`]: `execute` and
/// `execute_unprepared` through the exec interception point, `query_one` and
/// `query_all` through the query one. The underlying connection always
/// receives the statement exactly as it was built.
///
/// # Example
///
/// ```rust,ignore
/// use sea_orm::Database;
/// use db_trace_monitor::TracedConnection;
///
/// let db = Database::connect("mysql://localhost/shop").await?;
/// let traced = TracedConnection::from(db);
///
/// let orders = Orders::find().all(&traced).await?;
/// ```
#[derive(Debug)]
pub struct TracedConnection {
    inner: DatabaseConnection,
    wrapper: TracerWrapper,
}

impl TracedConnection {
    /// Create a traced connection with the given wrapper.
    pub fn new(connection: DatabaseConnection, wrapper: TracerWrapper) -> Self {
        Self {
            inner: connection,
            wrapper,
        }
    }

    /// Create a traced connection with the default configuration for its backend.
    pub fn wrap(connection: DatabaseConnection) -> Self {
        let config = TracerConfig::for_kind(connection.get_database_backend().into());
        Self::new(connection, TracerWrapper::new(config))
    }

    /// Get a reference to the underlying `DatabaseConnection`.
    pub fn inner(&self) -> &DatabaseConnection {
        &self.inner
    }

    pub fn wrapper(&self) -> &TracerWrapper {
        &self.wrapper
    }

    /// Consume the wrapper and return the inner `DatabaseConnection`.
    pub fn into_inner(self) -> DatabaseConnection {
        self.inner
    }
}

impl From<DatabaseConnection> for TracedConnection {
    fn from(connection: DatabaseConnection) -> Self {
        Self::wrap(connection)
    }
}

impl AsRef<DatabaseConnection> for TracedConnection {
    fn as_ref(&self) -> &DatabaseConnection {
        &self.inner
    }
}

/// Renders a bound value the way it reads in a statement: strings unquoted,
/// NULL as `<nil>`.
struct DisplayValue<'a>(&'a Value);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &Option<T>) -> fmt::Result {
            match v {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("<nil>"),
            }
        }

        match self.0 {
            Value::Bool(v) => show(f, v),
            Value::TinyInt(v) => show(f, v),
            Value::SmallInt(v) => show(f, v),
            Value::Int(v) => show(f, v),
            Value::BigInt(v) => show(f, v),
            Value::TinyUnsigned(v) => show(f, v),
            Value::SmallUnsigned(v) => show(f, v),
            Value::Unsigned(v) => show(f, v),
            Value::BigUnsigned(v) => show(f, v),
            Value::Float(v) => show(f, v),
            Value::Double(v) => show(f, v),
            Value::String(v) => show(f, v),
            Value::Char(v) => show(f, v),
            Value::Bytes(Some(v)) => write!(f, "{v:?}"),
            Value::Bytes(None) => f.write_str("<nil>"),
            #[allow(unreachable_patterns)]
            other => write!(f, "{other:?}"),
        }
    }
}

fn statement_args(stmt: &Statement) -> Vec<DisplayValue<'_>> {
    stmt.values
        .iter()
        .flat_map(|values| values.0.iter())
        .map(DisplayValue)
        .collect()
}

#[async_trait]
impl ConnectionTrait for TracedConnection {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        let active = self
            .wrapper
            .begin(CallKind::Exec, &stmt.sql, &statement_args(&stmt));
        active.run(self.inner.execute(stmt)).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        let active = self.wrapper.begin::<&str>(CallKind::Exec, sql, &[]);
        active.run(self.inner.execute_unprepared(sql)).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        let active = self
            .wrapper
            .begin(CallKind::Query, &stmt.sql, &statement_args(&stmt));
        active.run(self.inner.query_one(stmt)).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        let active = self
            .wrapper
            .begin(CallKind::Query, &stmt.sql, &statement_args(&stmt));
        active.run(self.inner.query_all(stmt)).await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }

    fn is_mock_connection(&self) -> bool {
        self.inner.is_mock_connection()
    }
}

/// Extension trait for easy wrapping of database connections.
pub trait TracingExt {
    /// Wrap this connection with the default tracer for its backend.
    fn with_tracing(self) -> TracedConnection;

    /// Wrap this connection with a custom tracer configuration.
    fn with_tracing_config(self, config: TracerConfig) -> TracedConnection;
}

impl TracingExt for DatabaseConnection {
    fn with_tracing(self) -> TracedConnection {
        TracedConnection::wrap(self)
    }

    fn with_tracing_config(self, config: TracerConfig) -> TracedConnection {
        TracedConnection::new(self, TracerWrapper::new(config))
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{MockDatabase, MockExecResult, Transaction};

    use super::*;
    use crate::builder::QueryBuilderOption;
    use crate::config::DbKind;
    use crate::test_util::capture;

    fn mock_connection() -> DatabaseConnection {
        MockDatabase::new(DbBackend::MySql)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection()
    }

    #[tokio::test]
    async fn test_execute_passes_original_statement() {
        let (captured, _guard) = capture();
        let traced = mock_connection().with_tracing_config(
            TracerConfig::new(DbKind::MySql).with_option(QueryBuilderOption::RawQuery),
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::MySql,
            "UPDATE b SET a = ? WHERE c = ?",
            [1i32.into(), "d".into()],
        );
        let result = traced.execute(stmt).await.unwrap();
        assert_eq!(result.rows_affected(), 2);

        let spans = captured.named("db.exec");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].field("db.statement"), Some("UPDATE b SET a = 1 WHERE c = d"));
        assert_eq!(spans[0].field("db.type"), Some("mysql"));
        assert_eq!(spans[0].field("otel.status_code"), Some("OK"));

        assert_eq!(
            traced.into_inner().into_transaction_log(),
            [Transaction::from_sql_and_values(
                DbBackend::MySql,
                "UPDATE b SET a = ? WHERE c = ?",
                [1i32.into(), "d".into()],
            )]
        );
    }

    #[tokio::test]
    async fn test_execute_error_is_returned() {
        let (captured, _guard) = capture();
        // No exec results queued, so the mock connection fails the call.
        let traced = MockDatabase::new(DbBackend::MySql)
            .into_connection()
            .with_tracing();

        let result = traced.execute_unprepared("delete from t").await;
        assert!(result.is_err());

        let spans = captured.named("db.exec");
        assert_eq!(spans[0].field("db.statement"), Some("delete FROM t"));
        assert_eq!(spans[0].field("otel.status_code"), Some("ERROR"));
        assert!(spans[0].closed);
    }

    #[test]
    fn test_wrap_uses_backend_kind() {
        let traced = TracedConnection::from(mock_connection());
        assert_eq!(traced.wrapper().tracer().db_kind(), DbKind::MySql);
        assert!(traced.is_mock_connection());
    }

    #[test]
    fn test_display_value() {
        let values: [Value; 4] = [
            "d".into(),
            42i64.into(),
            Value::Int(None),
            true.into(),
        ];
        let shown: Vec<String> = values.iter().map(|v| DisplayValue(v).to_string()).collect();
        assert_eq!(shown, ["d", "42", "<nil>", "true"]);
    }
}
