#![forbid(unsafe_code)]
#![cfg_attr(
    not(feature = "libsql-backend"),
    doc = "Enable feature `libsql-backend` to use this adapter."
)]

mod config;

pub use config::StoreConfig;

#[cfg(feature = "libsql-backend")]
mod backend {
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Instant;

    use tracing::debug;

    #[inline]
    #[allow(unused_variables)]
    fn obs_record(kind: &str, label: &str, sql: &str, start: Instant, rows: usize, success: bool) {
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            sql_kind = kind,
            label = label,
            sql = sql,
            rows = rows,
            elapsed_ms = elapsed,
            success = success,
            "libsql statement"
        );
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("qdsl_statements_total", 1, "kind" => kind.to_string(), "label" => label.to_string(), "success" => success.to_string());
            metrics::histogram!("qdsl_statement_duration_ms", elapsed as f64, "kind" => kind.to_string(), "label" => label.to_string());
            if !success {
                metrics::counter!("qdsl_statement_errors_total", 1, "kind" => kind.to_string(), "label" => label.to_string());
            }
        }
    }

    use crate::StoreConfig;
    use async_trait::async_trait;
    use libsql::{Builder, Connection, Database};
    use qdsl_core::{
        ExecContext, Placeholder, QueryError, QueryResult, Row, Statement, StoreAdapter, Value,
    };

    fn to_libsql_value(v: &Value) -> libsql::Value {
        match v {
            Value::Null => libsql::Value::Null,
            Value::Bool(b) => libsql::Value::Integer(*b as i64), // SQLite bools are 0/1
            Value::I32(i) => libsql::Value::Integer(*i as i64),
            Value::I64(i) => libsql::Value::Integer(*i),
            Value::F64(f) => libsql::Value::Real(*f),
            Value::String(s) => libsql::Value::Text(s.clone()),
        }
    }

    fn from_libsql_value(v: libsql::Value) -> QueryResult<Value> {
        match v {
            libsql::Value::Null => Ok(Value::Null),
            libsql::Value::Integer(i) => Ok(Value::I64(i)),
            libsql::Value::Real(f) => Ok(Value::F64(f)),
            libsql::Value::Text(s) => Ok(Value::String(s)),
            libsql::Value::Blob(_) => Err(QueryError::mapping_msg(
                "blob columns are not supported by qdsl values",
            )),
        }
    }

    fn read_row(row: &libsql::Row) -> QueryResult<Row> {
        let width = row.column_count();
        let mut values = Vec::with_capacity(width.max(0) as usize);
        for idx in 0..width {
            let cell = row.get_value(idx).map_err(QueryError::mapping)?;
            values.push(from_libsql_value(cell)?);
        }
        Ok(Row::new(values))
    }

    fn params_of(stmt: &Statement) -> Vec<libsql::Value> {
        stmt.params.iter().map(to_libsql_value).collect()
    }

    /// A [`StoreAdapter`] over a local libsql/SQLite database.
    ///
    /// All statements run on one shared connection, so an in-memory database
    /// keeps its contents for the lifetime of the store and its clones.
    #[derive(Clone)]
    pub struct LibsqlStore {
        db: Arc<Database>,
        conn: Connection,
        config: StoreConfig,
    }

    impl LibsqlStore {
        pub async fn open(config: &StoreConfig) -> QueryResult<Self> {
            let db = Builder::new_local(config.url.as_str())
                .build()
                .await
                .map_err(QueryError::store)?;
            let conn = db.connect().map_err(QueryError::store)?;
            // PRAGMA busy_timeout answers with a row; only the side effect matters.
            conn.execute(
                &format!("PRAGMA busy_timeout = {}", config.busy_timeout_ms),
                (),
            )
            .await
            .ok();
            if config.foreign_keys {
                conn.execute("PRAGMA foreign_keys = ON", ())
                    .await
                    .map_err(QueryError::store)?;
            }
            debug!(url = %config.url, "opened libsql store");
            Ok(Self {
                db: Arc::new(db),
                conn,
                config: config.clone(),
            })
        }

        pub async fn in_memory() -> QueryResult<Self> {
            Self::open(&StoreConfig::default()).await
        }

        /// Apply a batch of DDL/DML statements, e.g. a migration file.
        pub async fn migrate(&self, sql: &str) -> QueryResult<()> {
            let start = Instant::now();
            let res = self.conn.execute_batch(sql).await;
            obs_record("migrate", "", "<batch>", start, 0, res.is_ok());
            res.map(|_| ()).map_err(QueryError::store)
        }

        pub fn database(&self) -> &Arc<Database> {
            &self.db
        }

        pub fn connection(&self) -> &Connection {
            &self.conn
        }

        pub fn config(&self) -> &StoreConfig {
            &self.config
        }

        async fn bounded<T, F>(&self, ctx: &ExecContext, fut: F) -> QueryResult<T>
        where
            F: Future<Output = QueryResult<T>> + Send,
        {
            match ctx.timeout.or_else(|| self.config.query_timeout()) {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(QueryError::store)?,
                None => fut.await,
            }
        }

        async fn query_rows(&self, stmt: &Statement) -> QueryResult<Vec<Row>> {
            let mut rows = self
                .conn
                .query(&stmt.sql, params_of(stmt))
                .await
                .map_err(QueryError::store)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().await.map_err(QueryError::store)? {
                out.push(read_row(&row)?);
            }
            Ok(out)
        }

        async fn insert_row(&self, stmt: &Statement) -> QueryResult<i64> {
            if stmt.sql.contains(" RETURNING ") {
                let rows = self.query_rows(stmt).await?;
                let first = rows
                    .into_iter()
                    .next()
                    .and_then(|r| r.values().first().cloned())
                    .ok_or_else(|| {
                        QueryError::store_msg("no row returned from INSERT ... RETURNING")
                    })?;
                match first {
                    Value::I64(id) => Ok(id),
                    other => Err(QueryError::mapping_msg(format!(
                        "generated key is not an integer: {:?}",
                        other
                    ))),
                }
            } else {
                self.conn
                    .execute(&stmt.sql, params_of(stmt))
                    .await
                    .map_err(QueryError::store)?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    fn label_of(ctx: &ExecContext) -> &str {
        ctx.label.as_deref().unwrap_or("")
    }

    #[async_trait]
    impl StoreAdapter for LibsqlStore {
        fn placeholder(&self) -> Placeholder {
            Placeholder::Question
        }

        async fn execute_query(
            &self,
            stmt: &Statement,
            ctx: &ExecContext,
        ) -> QueryResult<Vec<Row>> {
            let start = Instant::now();
            let res = self.bounded(ctx, self.query_rows(stmt)).await;
            let rows = res.as_ref().map(Vec::len).unwrap_or(0);
            obs_record(stmt.kind.as_str(), label_of(ctx), &stmt.sql, start, rows, res.is_ok());
            res
        }

        async fn execute_mutation(&self, stmt: &Statement, ctx: &ExecContext) -> QueryResult<u64> {
            let start = Instant::now();
            let fut = async {
                self.conn
                    .execute(&stmt.sql, params_of(stmt))
                    .await
                    .map_err(QueryError::store)
            };
            let res = self.bounded(ctx, fut).await;
            let rows = res.as_ref().map(|n| *n as usize).unwrap_or(0);
            obs_record(stmt.kind.as_str(), label_of(ctx), &stmt.sql, start, rows, res.is_ok());
            res
        }

        async fn execute_insert(&self, stmt: &Statement, ctx: &ExecContext) -> QueryResult<i64> {
            let start = Instant::now();
            let res = self.bounded(ctx, self.insert_row(stmt)).await;
            let ok = res.is_ok();
            obs_record(stmt.kind.as_str(), label_of(ctx), &stmt.sql, start, ok as usize, ok);
            res
        }
    }
}

#[cfg(feature = "libsql-backend")]
pub use backend::LibsqlStore;
