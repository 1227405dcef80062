//! The contract between the query layer and a relational store.
//! Backends (see `qdsl_libsql`) implement [`StoreAdapter`].

use crate::error::QueryResult;
use crate::value::{Row, Value};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Count => "count",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }
}

/// Parameter marker dialect a store expects in rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placeholder {
    /// `$1`, `$2`, ...; inserts end in `RETURNING <id>`.
    Dollar,
    /// `?`; an offset without a limit renders `LIMIT -1`.
    #[default]
    Question,
}

/// Rendered SQL plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind, sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            kind,
        }
    }
}

/// Per-call execution settings carried by the query factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// Upper bound for one round-trip. `None` leaves it to the store.
    pub timeout: Option<Duration>,
    /// Free-form tag attached to log events.
    pub label: Option<String>,
}

impl ExecContext {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Executes rendered statements. Implementations must be shareable across
/// tasks; the query layer holds them behind an `Arc`.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Run a select and return every row, cells in select-list order.
    async fn execute_query(&self, stmt: &Statement, ctx: &ExecContext) -> QueryResult<Vec<Row>>;

    /// Run an update or delete and return the affected row count.
    async fn execute_mutation(&self, stmt: &Statement, ctx: &ExecContext) -> QueryResult<u64>;

    /// Run an insert and return the generated key.
    async fn execute_insert(&self, stmt: &Statement, ctx: &ExecContext) -> QueryResult<i64>;

    /// SQL dialect statements for this store are rendered in.
    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use std::sync::Mutex;

    /// Records statements and replays canned rows.
    struct Recording {
        seen: Mutex<Vec<Statement>>,
        rows: Vec<Row>,
    }

    #[async_trait]
    impl StoreAdapter for Recording {
        async fn execute_query(&self, stmt: &Statement, _ctx: &ExecContext) -> QueryResult<Vec<Row>> {
            self.seen.lock().unwrap().push(stmt.clone());
            Ok(self.rows.clone())
        }
        async fn execute_mutation(&self, stmt: &Statement, _ctx: &ExecContext) -> QueryResult<u64> {
            self.seen.lock().unwrap().push(stmt.clone());
            Ok(self.rows.len() as u64)
        }
        async fn execute_insert(&self, _stmt: &Statement, _ctx: &ExecContext) -> QueryResult<i64> {
            Err(QueryError::store_msg("read-only"))
        }
    }

    #[test]
    fn adapter_is_object_safe_and_records() {
        let store: Box<dyn StoreAdapter> = Box::new(Recording {
            seen: Mutex::new(Vec::new()),
            rows: vec![Row::new(vec![Value::I64(1)])],
        });
        let stmt = Statement::new(StatementKind::Select, "SELECT 1", vec![]);
        let ctx = ExecContext::default().with_label("lookup");
        let rows = futures::executor::block_on(store.execute_query(&stmt, &ctx)).unwrap();
        assert_eq!(rows.len(), 1);
        let err = futures::executor::block_on(store.execute_insert(&stmt, &ctx)).unwrap_err();
        assert!(!err.is_build_error());
    }

    #[test]
    fn context_builders() {
        let ctx = ExecContext::default().with_timeout(Duration::from_millis(5));
        assert_eq!(ctx.timeout, Some(Duration::from_millis(5)));
        assert_eq!(StatementKind::Count.as_str(), "count");
    }

    #[test]
    fn stores_default_to_question_marks() {
        let store = Recording {
            seen: Mutex::new(Vec::new()),
            rows: Vec::new(),
        };
        assert_eq!(store.placeholder(), Placeholder::Question);
        assert_eq!(Placeholder::default(), Placeholder::Question);
    }
}
