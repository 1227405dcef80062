//! Building predicates from optional search inputs.

use qdsl_core::{
    CompareOp, Expr, Expression, IntoFilter, Predicate, QueryError, QueryResult, SqlType, Value,
};

/// Incrementally assembled predicate. Absent parts are ignored and an empty
/// builder yields [`Predicate::True`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredicateBuilder {
    current: Option<Predicate>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(&mut self, predicate: impl Into<Option<Predicate>>) -> &mut Self {
        if let Some(p) = predicate.into() {
            self.current = Some(match self.current.take() {
                Some(current) => current.and(p),
                None => p,
            });
        }
        self
    }

    pub fn or(&mut self, predicate: impl Into<Option<Predicate>>) -> &mut Self {
        if let Some(p) = predicate.into() {
            self.current = Some(match self.current.take() {
                Some(current) => current.or(p),
                None => p,
            });
        }
        self
    }

    pub fn has_value(&self) -> bool {
        self.current.is_some()
    }

    pub fn build(&self) -> Predicate {
        self.current.clone().unwrap_or(Predicate::True)
    }
}

impl IntoFilter for PredicateBuilder {
    fn into_filter(self) -> Predicate {
        self.current.unwrap_or(Predicate::True)
    }
}

#[derive(Debug, Clone)]
struct Condition {
    name: String,
    field: Expr,
    op: CompareOp,
}

/// Named conditions fed by raw, nullable values.
///
/// ```ignore
/// let composer = PredicateComposer::new()
///     .condition("username", &member.username, CompareOp::Eq)
///     .condition("age", &member.age, CompareOp::Eq);
/// let filter = composer.compose([("username", "member1".into()), ("age", Value::Null)])?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PredicateComposer {
    conditions: Vec<Condition>,
}

impl PredicateComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `field <op> value` under `name`. A later registration with the
    /// same name replaces the earlier one.
    pub fn condition<T: SqlType>(
        mut self,
        name: &str,
        field: &Expression<T>,
        op: CompareOp,
    ) -> Self {
        self.conditions.retain(|c| c.name != name);
        self.conditions.push(Condition {
            name: name.to_string(),
            field: field.expr().clone(),
            op,
        });
        self
    }

    /// AND of the registered conditions whose input is non-null, in input
    /// order. All-null input gives [`Predicate::True`].
    pub fn compose<I, K>(&self, inputs: I) -> QueryResult<Predicate>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut out = Predicate::True;
        for (name, value) in inputs {
            let name = name.as_ref();
            let cond = self
                .conditions
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| {
                    QueryError::InvalidPredicate(format!("unknown condition `{}`", name))
                })?;
            if value.is_null() {
                continue;
            }
            let leaf = Predicate::compare(cond.op, cond.field.clone(), Expr::Literal(value))?;
            out = out.and(leaf);
        }
        Ok(out)
    }
}
