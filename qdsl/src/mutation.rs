//! Bulk update and delete clauses.
//!
//! Both run as a single statement against the store. Entities already loaded
//! in memory are not refreshed; reload them after a bulk mutation.

use crate::factory::run_mutation;
use qdsl_core::validate::{check_delete, check_update};
use qdsl_core::{
    Assignment, DeleteSpec, ExecContext, Expr, Expression, IntoFilter, Operand, Predicate,
    QueryError, QueryResult, Source, SqlType, Statement, StoreAdapter, UpdateSpec, Value,
    ValueExpr,
};
use qdsl_sql_builder::{render_delete_with, render_update_with};
use std::sync::Arc;

pub struct UpdateClause<S: ?Sized> {
    store: Arc<S>,
    ctx: ExecContext,
    spec: UpdateSpec,
    misuse: Option<String>,
}

impl<S: StoreAdapter + ?Sized> UpdateClause<S> {
    pub(crate) fn new(store: Arc<S>, ctx: ExecContext, target: Source) -> Self {
        Self {
            store,
            ctx,
            spec: UpdateSpec {
                target,
                assignments: Vec::new(),
                filter: Predicate::True,
            },
            misuse: None,
        }
    }

    fn assign(mut self, field: &Expr, value: Expr) -> Self {
        match field {
            Expr::Column(c) => {
                self.spec.assignments.push(Assignment {
                    column: c.column,
                    entity: c.entity.clone(),
                    value,
                });
            }
            other => {
                if self.misuse.is_none() {
                    self.misuse = Some(format!("only columns can be assigned, got {:?}", other));
                }
            }
        }
        self
    }

    /// `field = value`, where `value` is a literal or an expression such as
    /// `member.age.add(1)`.
    pub fn set<T: SqlType>(self, field: &Expression<T>, value: impl Operand<T::Kind>) -> Self {
        self.assign(field.expr(), value.into_expr())
    }

    pub fn set_null<T: SqlType>(self, field: &Expression<Option<T>>) -> Self {
        self.assign(field.expr(), Expr::Literal(Value::Null))
    }

    pub fn filter(mut self, filter: impl IntoFilter) -> Self {
        let current = std::mem::take(&mut self.spec.filter);
        self.spec.filter = current.and(filter.into_filter());
        self
    }

    pub fn build(&self) -> QueryResult<Statement> {
        if let Some(msg) = &self.misuse {
            return Err(QueryError::InvalidSource(msg.clone()));
        }
        check_update(&self.spec)?;
        render_update_with(&self.spec, self.store.placeholder())
    }

    /// Number of rows updated.
    pub async fn execute(&self) -> QueryResult<u64> {
        let stmt = self.build()?;
        run_mutation(&*self.store, &stmt, &self.ctx).await
    }
}

pub struct DeleteClause<S: ?Sized> {
    store: Arc<S>,
    ctx: ExecContext,
    spec: DeleteSpec,
}

impl<S: StoreAdapter + ?Sized> DeleteClause<S> {
    pub(crate) fn new(store: Arc<S>, ctx: ExecContext, target: Source) -> Self {
        Self {
            store,
            ctx,
            spec: DeleteSpec {
                target,
                filter: Predicate::True,
            },
        }
    }

    pub fn filter(mut self, filter: impl IntoFilter) -> Self {
        let current = std::mem::take(&mut self.spec.filter);
        self.spec.filter = current.and(filter.into_filter());
        self
    }

    pub fn build(&self) -> QueryResult<Statement> {
        check_delete(&self.spec)?;
        render_delete_with(&self.spec, self.store.placeholder())
    }

    /// Number of rows deleted. Without a filter every row goes.
    pub async fn execute(&self) -> QueryResult<u64> {
        let stmt = self.build()?;
        run_mutation(&*self.store, &stmt, &self.ctx).await
    }
}
