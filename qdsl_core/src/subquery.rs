//! Typed subqueries usable as operands, `IN` sources and projection items.

use crate::expr::{Expr, IntoFilter, Predicate};
use crate::path::{Expression, OrderSpecifier, RelationPath, SqlType, ValueExpr};
use crate::query::{Join, JoinKind, SelectSpec};
use crate::schema::{Entity, EntityPath};
use std::fmt;
use std::marker::PhantomData;

/// A nested select yielding values of `T`.
///
/// ```ignore
/// let member_sub = QMember::aliased("member_sub");
/// let oldest = SubQuery::select(member_sub.age.max()).from(&member_sub);
/// qf.select_from(&member).filter(member.age.eq(oldest));
/// ```
pub struct SubQuery<T> {
    spec: SelectSpec,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for SubQuery<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            _ty: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SubQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubQuery").field(&self.spec).finish()
    }
}

impl<T: SqlType> SubQuery<T> {
    pub fn select<V: ValueExpr<Sql = T>>(item: V) -> Self {
        Self {
            spec: SelectSpec {
                items: vec![item.into_expr()],
                ..SelectSpec::default()
            },
            _ty: PhantomData,
        }
    }

    /// Declare the root source. Further entities go through `join` or
    /// `cross_join`; a second `from` fails validation.
    #[must_use]
    pub fn from<P: EntityPath>(mut self, path: &P) -> Self {
        match &self.spec.from {
            Some(existing) => {
                if self.spec.misuse.is_none() {
                    self.spec.misuse = Some(format!(
                        "`{}` is already the root of this subquery; join `{}` explicitly",
                        existing.alias,
                        path.alias()
                    ));
                }
            }
            None => self.spec.from = Some(path.source()),
        }
        self
    }

    /// Theta join. The condition goes into `filter`.
    #[must_use]
    pub fn cross_join<P: EntityPath>(mut self, target: &P) -> Self {
        self.spec.joins.push(Join {
            kind: JoinKind::Cross,
            target: target.source(),
            relation: None,
            on: Predicate::True,
            fetch: false,
        });
        self
    }

    #[must_use]
    pub fn join<E: Entity>(mut self, relation: &RelationPath<E>, target: &E::Path) -> Self {
        self.spec.joins.push(Join {
            kind: JoinKind::Inner,
            target: target.source(),
            relation: Some(relation.relation()),
            on: Predicate::True,
            fetch: false,
        });
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl IntoFilter) -> Self {
        let f = std::mem::take(&mut self.spec.filter);
        self.spec.filter = f.and(filter.into_filter());
        self
    }

    #[must_use]
    pub fn group_by(mut self, expr: impl ValueExpr) -> Self {
        self.spec.group_by.push(expr.into_expr());
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.spec.order_by.push(order.into_spec());
        self
    }

    #[must_use]
    pub fn limit(mut self, n: i64) -> Self {
        self.spec.limit = Some(n);
        self
    }

    /// Name the subquery result in a projection.
    pub fn alias(&self, name: &str) -> Expression<T> {
        Expression::from_expr(Expr::Alias {
            expr: Box::new(Expr::Subquery(Box::new(self.spec.clone()))),
            alias: name.to_string(),
        })
    }

    pub fn spec(&self) -> &SelectSpec {
        &self.spec
    }

    pub fn into_spec(self) -> SelectSpec {
        self.spec
    }
}

impl<T: SqlType> ValueExpr for SubQuery<T> {
    type Sql = T;
    fn into_expr(self) -> Expr {
        Expr::Subquery(Box::new(self.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;
    use std::sync::Arc;

    #[test]
    fn aggregate_subquery_is_scalar() {
        let age: Expression<i32> = Expression::column(&Arc::from("member_sub"), "age", "age");
        let q = SubQuery::select(age.max());
        assert!(q.spec().is_scalar());
        assert_eq!(q.clone().into_expr().kind(), Some(ValueKind::Integer));

        let plain = SubQuery::select(&age);
        assert!(!plain.spec().is_scalar());
        assert!(plain.limit(1).spec().is_scalar());
    }

    #[test]
    fn filters_accumulate() {
        let age: Expression<i32> = Expression::column(&Arc::from("m"), "age", "age");
        let q = SubQuery::select(&age)
            .filter(age.gt(10))
            .filter([Some(age.lt(20)), None]);
        assert!(matches!(q.spec().filter, Predicate::And(ref c) if c.len() == 2));
    }

}
