//! Untyped expression and predicate trees.
//!
//! The typed API in [`crate::path`] produces these nodes; the validator and the
//! SQL renderer consume them. Trees are plain values: cloning a tree never
//! shares mutable state.

use crate::error::{QueryError, QueryResult};
use crate::query::SelectSpec;
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// Reference to one column of an aliased entity source.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Alias of the entity source, e.g. `member`.
    pub entity: Arc<str>,
    /// Rust field name, used to match projection targets.
    pub field: &'static str,
    pub column: &'static str,
    pub kind: ValueKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Subtract => "-",
            ArithOp::Multiply => "*",
        }
    }
}

/// A `CASE` expression. `operand` is set for the simple form
/// (`CASE x WHEN 10 THEN ...`), absent for the searched form.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub operand: Option<Expr>,
    pub arms: Vec<(CaseCond, Expr)>,
    pub otherwise: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseCond {
    Value(Expr),
    Predicate(Predicate),
}

/// Scalar expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    /// `arg` is `None` for `COUNT(*)`.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    Arithmetic {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Concat(Box<Expr>, Box<Expr>),
    Cast {
        expr: Box<Expr>,
        kind: ValueKind,
    },
    /// Named SQL function template such as `replace` or `lower`.
    Function {
        name: String,
        args: Vec<Expr>,
        kind: Option<ValueKind>,
    },
    Case(Box<CaseExpr>),
    Subquery(Box<SelectSpec>),
    Alias {
        expr: Box<Expr>,
        alias: String,
    },
}

impl Expr {
    /// Semantic kind of the value this expression yields, if it can be known.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Expr::Column(c) => Some(c.kind),
            Expr::Literal(v) => v.kind(),
            Expr::Aggregate { func, arg, .. } => match func {
                AggregateFunc::Count => Some(ValueKind::Integer),
                AggregateFunc::Avg => Some(ValueKind::Real),
                _ => arg.as_ref().and_then(|a| a.kind()),
            },
            Expr::Arithmetic { lhs, rhs, .. } => match (lhs.kind(), rhs.kind()) {
                (Some(ValueKind::Real), _) | (_, Some(ValueKind::Real)) => Some(ValueKind::Real),
                (Some(k), _) | (None, Some(k)) => Some(k),
                (None, None) => None,
            },
            Expr::Concat(..) => Some(ValueKind::Text),
            Expr::Cast { kind, .. } => Some(*kind),
            Expr::Function { kind, .. } => *kind,
            Expr::Case(case) => case
                .arms
                .iter()
                .map(|(_, result)| result)
                .chain(case.otherwise.iter())
                .find_map(Expr::kind),
            Expr::Subquery(spec) => spec.items.first().and_then(Expr::kind),
            Expr::Alias { expr, .. } => expr.kind(),
        }
    }

    /// Name used to match a projection target field: the alias when present,
    /// otherwise the field name of a bare column.
    pub fn name(&self) -> Option<&str> {
        match self {
            Expr::Alias { alias, .. } => Some(alias),
            Expr::Column(c) => Some(c.field),
            _ => None,
        }
    }

    /// Strip a top-level alias.
    pub fn unaliased(&self) -> &Expr {
        match self {
            Expr::Alias { expr, .. } => expr.unaliased(),
            other => other,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.unaliased(), Expr::Aggregate { .. })
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Literal(Value::Null))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Goe,
    Lt,
    Loe,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Goe => ">=",
            CompareOp::Lt => "<",
            CompareOp::Loe => "<=",
        }
    }
}

/// Boolean expression tree. `True` is the explicit always-true node produced
/// when dynamic composition ends up with no conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    Compare {
        op: CompareOp,
        lhs: Expr,
        rhs: Expr,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
    },
    In {
        expr: Expr,
        set: Vec<Expr>,
    },
    InSubquery {
        expr: Expr,
        query: Box<SelectSpec>,
    },
    IsNull(Expr),
    IsNotNull(Expr),
    Like {
        expr: Expr,
        pattern: Expr,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::True
    }
}

impl Predicate {
    /// Checked comparison between two untyped operands.
    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> QueryResult<Predicate> {
        if rhs.is_null_literal() || lhs.is_null_literal() {
            return Err(QueryError::InvalidPredicate(format!(
                "`{}` against NULL never matches; use is_null",
                op.symbol()
            )));
        }
        if let (Some(l), Some(r)) = (lhs.kind(), rhs.kind()) {
            if !l.is_compatible(r) {
                return Err(QueryError::TypeMismatch {
                    expected: l.as_str(),
                    found: r.as_str(),
                });
            }
        }
        Ok(Predicate::Compare { op, lhs, rhs })
    }

    /// Strict conjunction: every child must be present and there must be at least two.
    pub fn all(children: Vec<Option<Predicate>>) -> QueryResult<Predicate> {
        Self::strict(children, "and").map(Predicate::And)
    }

    /// Strict disjunction, same rules as [`Predicate::all`].
    pub fn any(children: Vec<Option<Predicate>>) -> QueryResult<Predicate> {
        Self::strict(children, "or").map(Predicate::Or)
    }

    fn strict(children: Vec<Option<Predicate>>, op: &str) -> QueryResult<Vec<Predicate>> {
        if children.len() < 2 {
            return Err(QueryError::InvalidPredicate(format!(
                "`{}` needs at least two operands, got {}",
                op,
                children.len()
            )));
        }
        children
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                c.ok_or_else(|| {
                    QueryError::InvalidPredicate(format!("`{}` operand {} is null", op, i))
                })
            })
            .collect()
    }

    /// Conjunction that flattens nested `And` nodes. `True` is the identity.
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Disjunction that flattens nested `Or` nodes. `True` absorbs.
    #[must_use]
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (Predicate::Or(mut a), Predicate::Or(b)) => {
                a.extend(b);
                Predicate::Or(a)
            }
            (Predicate::Or(mut a), p) => {
                a.push(p);
                Predicate::Or(a)
            }
            (p, Predicate::Or(mut b)) => {
                b.insert(0, p);
                Predicate::Or(b)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// AND of every present predicate; `True` when none is present.
    pub fn and_all<I>(preds: I) -> Predicate
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        preds
            .into_iter()
            .flatten()
            .fold(Predicate::True, Predicate::and)
    }
}

/// Anything accepted by a `filter` clause. Lists are ANDed and absent
/// entries are dropped.
pub trait IntoFilter {
    fn into_filter(self) -> Predicate;
}

impl IntoFilter for Predicate {
    fn into_filter(self) -> Predicate {
        self
    }
}

impl IntoFilter for Option<Predicate> {
    fn into_filter(self) -> Predicate {
        self.unwrap_or(Predicate::True)
    }
}

impl IntoFilter for Vec<Predicate> {
    fn into_filter(self) -> Predicate {
        Predicate::and_all(self.into_iter().map(Some))
    }
}

impl IntoFilter for Vec<Option<Predicate>> {
    fn into_filter(self) -> Predicate {
        Predicate::and_all(self)
    }
}

impl<const N: usize> IntoFilter for [Predicate; N] {
    fn into_filter(self) -> Predicate {
        Predicate::and_all(self.into_iter().map(Some))
    }
}

impl<const N: usize> IntoFilter for [Option<Predicate>; N] {
    fn into_filter(self) -> Predicate {
        Predicate::and_all(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &'static str, kind: ValueKind) -> Expr {
        Expr::Column(ColumnRef {
            entity: Arc::from("member"),
            field: name,
            column: name,
            kind,
            nullable: false,
        })
    }

    fn eq(name: &'static str, v: i32) -> Predicate {
        Predicate::Compare {
            op: CompareOp::Eq,
            lhs: col(name, ValueKind::Integer),
            rhs: Expr::Literal(Value::I32(v)),
        }
    }

    #[test]
    fn and_flattens_and_skips_true() {
        let p = eq("a", 1).and(Predicate::True).and(eq("b", 2)).and(eq("c", 3));
        match p {
            Predicate::And(children) => assert_eq!(children.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Predicate::True.and(eq("a", 1)), eq("a", 1));
    }

    #[test]
    fn or_absorbs_true() {
        assert_eq!(eq("a", 1).or(Predicate::True), Predicate::True);
        let p = eq("a", 1).or(eq("b", 2)).or(eq("c", 3));
        assert!(matches!(p, Predicate::Or(ref c) if c.len() == 3));
    }

    #[test]
    fn strict_composites_reject_null_children() {
        let err = Predicate::all(vec![Some(eq("a", 1)), None]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPredicate(_)));
        let err = Predicate::any(vec![Some(eq("a", 1))]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPredicate(_)));
        let ok = Predicate::all(vec![Some(eq("a", 1)), Some(eq("b", 2))]).unwrap();
        assert!(matches!(ok, Predicate::And(ref c) if c.len() == 2));
    }

    #[test]
    fn checked_compare_rejects_mixed_kinds() {
        let err = Predicate::compare(
            CompareOp::Eq,
            col("age", ValueKind::Integer),
            Expr::Literal(Value::String("x".into())),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryError::TypeMismatch {
                expected: "integer",
                found: "text"
            }
        ));
        assert!(Predicate::compare(
            CompareOp::Gt,
            col("age", ValueKind::Integer),
            Expr::Literal(Value::F64(1.5)),
        )
        .is_ok());
    }

    #[test]
    fn and_all_of_nothing_is_true() {
        assert!(Predicate::and_all(vec![None, None]).is_true());
        assert_eq!(Predicate::and_all(vec![None, Some(eq("a", 1))]), eq("a", 1));
    }

    #[test]
    fn double_negation_collapses() {
        assert_eq!(eq("a", 1).not().not(), eq("a", 1));
    }
}
