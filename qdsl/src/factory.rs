use crate::mutation::{DeleteClause, UpdateClause};
use crate::select::SelectQuery;
use qdsl_core::{
    Entity, EntityPath, ExecContext, InsertSpec, Projection, QueryResult, Row, Statement,
    StoreAdapter,
};
use qdsl_sql_builder::render_insert_with;
use std::sync::Arc;
use tracing::debug;

/// Entry point for building queries against one store.
///
/// Cloning is cheap; every clone shares the store.
pub struct QueryFactory<S: ?Sized> {
    store: Arc<S>,
    ctx: ExecContext,
}

impl<S: ?Sized> Clone for QueryFactory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: StoreAdapter> QueryFactory<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }
}

impl<S: StoreAdapter + ?Sized> QueryFactory<S> {
    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            ctx: ExecContext::default(),
        }
    }

    /// Timeout and label applied to every statement issued through this factory.
    pub fn with_context(mut self, ctx: ExecContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start a select producing `P::Output` per row. A `from` is still required.
    pub fn select<P: Projection>(&self, projection: P) -> SelectQuery<S, P> {
        SelectQuery::new(self.store.clone(), self.ctx.clone(), projection)
    }

    /// `select(path).from(path)`.
    pub fn select_from<Q>(&self, path: &Q) -> SelectQuery<S, Q>
    where
        Q: EntityPath + Projection,
    {
        self.select(path.clone()).from(path)
    }

    /// Bulk update of the rows of `path`'s entity.
    pub fn update<Q: EntityPath>(&self, path: &Q) -> UpdateClause<S> {
        UpdateClause::new(self.store.clone(), self.ctx.clone(), path.source())
    }

    /// Bulk delete of the rows of `path`'s entity.
    pub fn delete<Q: EntityPath>(&self, path: &Q) -> DeleteClause<S> {
        DeleteClause::new(self.store.clone(), self.ctx.clone(), path.source())
    }

    /// Insert `entity` as a new row and write the generated id back.
    pub async fn persist<E: Entity>(&self, entity: &mut E) -> QueryResult<i64> {
        let spec = InsertSpec {
            schema: E::SCHEMA,
            values: entity.insert_values()?,
        };
        let stmt = render_insert_with(&spec, self.store.placeholder())?;
        log_statement(&stmt, &self.ctx);
        let id = self.store.execute_insert(&stmt, &self.ctx).await?;
        entity.set_id(id);
        Ok(id)
    }
}

fn log_statement(stmt: &Statement, ctx: &ExecContext) {
    debug!(
        kind = stmt.kind.as_str(),
        sql = %stmt.sql,
        params = stmt.params.len(),
        label = ctx.label.as_deref().unwrap_or(""),
        "executing statement"
    );
}

pub(crate) async fn run_query<S: StoreAdapter + ?Sized>(
    store: &S,
    stmt: &Statement,
    ctx: &ExecContext,
) -> QueryResult<Vec<Row>> {
    log_statement(stmt, ctx);
    let rows = store.execute_query(stmt, ctx).await?;
    debug!(rows = rows.len(), "statement returned");
    Ok(rows)
}

pub(crate) async fn run_mutation<S: StoreAdapter + ?Sized>(
    store: &S,
    stmt: &Statement,
    ctx: &ExecContext,
) -> QueryResult<u64> {
    log_statement(stmt, ctx);
    let affected = store.execute_mutation(stmt, ctx).await?;
    debug!(affected, "statement applied");
    Ok(affected)
}
