//! Typed expressions over entity fields.
//!
//! An [`Expression<T>`] carries the Rust type of the value it yields. Operand
//! kinds are checked at compile time through [`SqlType::Kind`]: numeric
//! expressions accept numeric operands, text accepts text, booleans accept
//! booleans.

use crate::expr::{
    AggregateFunc, ArithOp, CaseCond, CaseExpr, ColumnRef, CompareOp, Expr, Predicate,
};
use crate::query::{Direction, NullOrdering, OrderSpec, RelationRef};
use crate::schema::Entity;
use crate::subquery::SubQuery;
use crate::value::{FromValue, Value, ValueKind};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Kind marker for integer and real values.
#[derive(Debug, Clone, Copy)]
pub struct Numeric;
/// Kind marker for strings.
#[derive(Debug, Clone, Copy)]
pub struct Text;
/// Kind marker for booleans.
#[derive(Debug, Clone, Copy)]
pub struct Boolean;

/// Rust types that map onto a column value.
pub trait SqlType: FromValue + Into<Value> + Clone + 'static {
    /// Operand compatibility class.
    type Kind: 'static;
    /// Same kind, admitting NULL (`i32` -> `Option<i32>`).
    type Nullable: SqlType<Kind = Self::Kind>;
    const KIND: ValueKind;
    const NULLABLE: bool;
}

macro_rules! sql_type {
    ($($ty:ty => $marker:ident, $kind:ident);* $(;)?) => {
        $(
            impl SqlType for $ty {
                type Kind = $marker;
                type Nullable = Option<$ty>;
                const KIND: ValueKind = ValueKind::$kind;
                const NULLABLE: bool = false;
            }
        )*
    };
}

sql_type! {
    i32 => Numeric, Integer;
    i64 => Numeric, Integer;
    f64 => Numeric, Real;
    bool => Boolean, Boolean;
    String => Text, Text;
}

impl<T: SqlType> SqlType for Option<T> {
    type Kind = T::Kind;
    type Nullable = Option<T>;
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;
}

/// A literal or expression with a static SQL type.
pub trait ValueExpr {
    type Sql: SqlType;
    fn into_expr(self) -> Expr;
}

/// Anything usable as the right-hand side of an operation on kind `K`.
pub trait Operand<K>: ValueExpr {}

impl<V: ValueExpr> Operand<<V::Sql as SqlType>::Kind> for V {}

macro_rules! literal_value_expr {
    ($($ty:ty => $sql:ty),* $(,)?) => {
        $(
            impl ValueExpr for $ty {
                type Sql = $sql;
                fn into_expr(self) -> Expr {
                    Expr::Literal(Value::from(self))
                }
            }
        )*
    };
}

literal_value_expr! {
    i32 => i32,
    i64 => i64,
    f64 => f64,
    bool => bool,
    String => String,
    &str => String,
}

impl ValueExpr for &String {
    type Sql = String;
    fn into_expr(self) -> Expr {
        Expr::Literal(Value::String(self.clone()))
    }
}

impl<T> ValueExpr for Option<T>
where
    T: SqlType,
{
    type Sql = Option<T>;
    fn into_expr(self) -> Expr {
        Expr::Literal(self.into())
    }
}

/// Typed expression yielding values of `T`.
pub struct Expression<T> {
    expr: Expr,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            _ty: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.expr).finish()
    }
}

impl<T> PartialEq for Expression<T> {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl<T> From<Expression<T>> for Expr {
    fn from(e: Expression<T>) -> Self {
        e.expr
    }
}

impl<T> From<&Expression<T>> for Expr {
    fn from(e: &Expression<T>) -> Self {
        e.expr.clone()
    }
}

impl<T: SqlType> ValueExpr for Expression<T> {
    type Sql = T;
    fn into_expr(self) -> Expr {
        self.expr
    }
}

impl<T: SqlType> ValueExpr for &Expression<T> {
    type Sql = T;
    fn into_expr(self) -> Expr {
        self.expr.clone()
    }
}

impl<T> Expression<T> {
    /// Wrap an untyped node. The caller vouches for `T`.
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            expr,
            _ty: PhantomData,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_inner(self) -> Expr {
        self.expr
    }

    fn compare_with(&self, op: CompareOp, rhs: Expr) -> Predicate {
        Predicate::Compare {
            op,
            lhs: self.expr.clone(),
            rhs,
        }
    }

    fn aggregate<R>(&self, func: AggregateFunc, distinct: bool) -> Expression<R> {
        Expression::from_expr(Expr::Aggregate {
            func,
            arg: Some(Box::new(self.expr.unaliased().clone())),
            distinct,
        })
    }
}

impl<T: SqlType> Expression<T> {
    /// Column handle used by generated entity paths.
    pub fn column(entity: &Arc<str>, field: &'static str, column: &'static str) -> Self {
        Self::from_expr(Expr::Column(ColumnRef {
            entity: entity.clone(),
            field,
            column,
            kind: T::KIND,
            nullable: T::NULLABLE,
        }))
    }

    pub fn eq(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Eq, rhs.into_expr())
    }

    pub fn ne(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Ne, rhs.into_expr())
    }

    pub fn gt(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Gt, rhs.into_expr())
    }

    pub fn goe(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Goe, rhs.into_expr())
    }

    pub fn lt(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Lt, rhs.into_expr())
    }

    pub fn loe(&self, rhs: impl Operand<T::Kind>) -> Predicate {
        self.compare_with(CompareOp::Loe, rhs.into_expr())
    }

    /// Inclusive on both ends.
    pub fn between(&self, low: impl Operand<T::Kind>, high: impl Operand<T::Kind>) -> Predicate {
        Predicate::Between {
            expr: self.expr.clone(),
            low: low.into_expr(),
            high: high.into_expr(),
        }
    }

    /// Membership in a literal list. An empty list matches nothing.
    pub fn is_in<I>(&self, values: I) -> Predicate
    where
        I: IntoIterator,
        I::Item: Operand<T::Kind>,
    {
        Predicate::In {
            expr: self.expr.clone(),
            set: values.into_iter().map(ValueExpr::into_expr).collect(),
        }
    }

    pub fn not_in<I>(&self, values: I) -> Predicate
    where
        I: IntoIterator,
        I::Item: Operand<T::Kind>,
    {
        self.is_in(values).not()
    }

    /// Membership in a single-column subquery.
    pub fn in_subquery<U>(&self, query: SubQuery<U>) -> Predicate
    where
        U: SqlType<Kind = T::Kind>,
    {
        Predicate::InSubquery {
            expr: self.expr.clone(),
            query: Box::new(query.into_spec()),
        }
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::IsNull(self.expr.clone())
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::IsNotNull(self.expr.clone())
    }

    /// `eq` when a value is present, no condition otherwise.
    pub fn eq_opt<V: Operand<T::Kind>>(&self, value: Option<V>) -> Option<Predicate> {
        value.map(|v| self.eq(v))
    }

    pub fn goe_opt<V: Operand<T::Kind>>(&self, value: Option<V>) -> Option<Predicate> {
        value.map(|v| self.goe(v))
    }

    pub fn loe_opt<V: Operand<T::Kind>>(&self, value: Option<V>) -> Option<Predicate> {
        value.map(|v| self.loe(v))
    }

    pub fn asc(&self) -> OrderSpecifier {
        OrderSpecifier::new(self.expr.unaliased().clone(), Direction::Asc)
    }

    pub fn desc(&self) -> OrderSpecifier {
        OrderSpecifier::new(self.expr.unaliased().clone(), Direction::Desc)
    }

    pub fn count(&self) -> Expression<i64> {
        self.aggregate(AggregateFunc::Count, false)
    }

    pub fn count_distinct(&self) -> Expression<i64> {
        self.aggregate(AggregateFunc::Count, true)
    }

    /// NULL over an empty group, hence the nullable result.
    pub fn max(&self) -> Expression<T::Nullable> {
        self.aggregate(AggregateFunc::Max, false)
    }

    pub fn min(&self) -> Expression<T::Nullable> {
        self.aggregate(AggregateFunc::Min, false)
    }

    /// Name this expression in a projection (`expr AS name`).
    pub fn alias(&self, name: &str) -> Expression<T> {
        Expression::from_expr(Expr::Alias {
            expr: Box::new(self.expr.unaliased().clone()),
            alias: name.to_string(),
        })
    }

    /// Start a simple `CASE` on this expression.
    pub fn when(&self, value: impl Operand<T::Kind>) -> CaseStart<Simple<T::Kind>> {
        CaseStart {
            case: CaseExpr {
                operand: Some(self.expr.unaliased().clone()),
                arms: Vec::new(),
                otherwise: None,
            },
            cond: CaseCond::Value(value.into_expr()),
            _mode: PhantomData,
        }
    }
}

impl<T: SqlType<Kind = Numeric>> Expression<T> {
    fn arith(&self, op: ArithOp, rhs: Expr) -> Expression<T> {
        Expression::from_expr(Expr::Arithmetic {
            op,
            lhs: Box::new(self.expr.unaliased().clone()),
            rhs: Box::new(rhs),
        })
    }

    pub fn add(&self, rhs: impl Operand<Numeric>) -> Expression<T> {
        self.arith(ArithOp::Add, rhs.into_expr())
    }

    pub fn subtract(&self, rhs: impl Operand<Numeric>) -> Expression<T> {
        self.arith(ArithOp::Subtract, rhs.into_expr())
    }

    pub fn multiply(&self, rhs: impl Operand<Numeric>) -> Expression<T> {
        self.arith(ArithOp::Multiply, rhs.into_expr())
    }

    pub fn sum(&self) -> Expression<T::Nullable> {
        self.aggregate(AggregateFunc::Sum, false)
    }

    pub fn avg(&self) -> Expression<Option<f64>> {
        self.aggregate(AggregateFunc::Avg, false)
    }

    /// Text rendering of the value (`CAST(x AS TEXT)`).
    pub fn string_value(&self) -> Expression<String> {
        Expression::from_expr(Expr::Cast {
            expr: Box::new(self.expr.unaliased().clone()),
            kind: ValueKind::Text,
        })
    }
}

impl<T: SqlType<Kind = Text>> Expression<T> {
    pub fn concat(&self, rhs: impl Operand<Text>) -> Expression<T> {
        Expression::from_expr(Expr::Concat(
            Box::new(self.expr.unaliased().clone()),
            Box::new(rhs.into_expr()),
        ))
    }

    pub fn lower(&self) -> Expression<T> {
        self.text_function("lower")
    }

    pub fn upper(&self) -> Expression<T> {
        self.text_function("upper")
    }

    fn text_function(&self, name: &str) -> Expression<T> {
        Expression::from_expr(Expr::Function {
            name: name.to_string(),
            args: vec![self.expr.unaliased().clone()],
            kind: Some(ValueKind::Text),
        })
    }

    /// SQL `LIKE` with a caller-supplied pattern.
    pub fn like(&self, pattern: &str) -> Predicate {
        Predicate::Like {
            expr: self.expr.clone(),
            pattern: Expr::Literal(Value::from(pattern)),
        }
    }

    pub fn contains(&self, needle: &str) -> Predicate {
        self.like(&format!("%{}%", needle))
    }

    pub fn starts_with(&self, prefix: &str) -> Predicate {
        self.like(&format!("{}%", prefix))
    }
}

/// Ordering term produced by [`Expression::asc`] / [`Expression::desc`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpecifier {
    spec: OrderSpec,
}

impl OrderSpecifier {
    fn new(expr: Expr, direction: Direction) -> Self {
        Self {
            spec: OrderSpec {
                expr,
                direction,
                nulls: None,
            },
        }
    }

    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.spec.nulls = Some(NullOrdering::First);
        self
    }

    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.spec.nulls = Some(NullOrdering::Last);
        self
    }

    pub fn spec(&self) -> &OrderSpec {
        &self.spec
    }

    pub fn into_spec(self) -> OrderSpec {
        self.spec
    }
}

/// Many-to-one field of a generated entity path (`member.team`).
pub struct RelationPath<T> {
    owner: Arc<str>,
    field: &'static str,
    column: &'static str,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for RelationPath<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            field: self.field,
            column: self.column,
            _target: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RelationPath<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationPath")
            .field("owner", &self.owner)
            .field("field", &self.field)
            .field("column", &self.column)
            .finish()
    }
}

impl<T: Entity> RelationPath<T> {
    pub fn new(owner: &Arc<str>, field: &'static str, column: &'static str) -> Self {
        Self {
            owner: owner.clone(),
            field,
            column,
            _target: PhantomData,
        }
    }

    /// The foreign key column itself.
    pub fn id(&self) -> Expression<Option<i64>> {
        Expression::column(&self.owner, self.field, self.column)
    }

    pub fn is_null(&self) -> Predicate {
        self.id().is_null()
    }

    pub fn relation(&self) -> RelationRef {
        RelationRef {
            owner: self.owner.clone(),
            field: self.field,
            column: self.column,
        }
    }
}

/// Factory for expressions not rooted in a field.
pub struct Expressions;

impl Expressions {
    /// A constant projected alongside the selected columns.
    pub fn constant<V: ValueExpr>(value: V) -> Expression<V::Sql> {
        Expression::from_expr(value.into_expr())
    }

    /// `COUNT(*)`.
    pub fn count_all() -> Expression<i64> {
        Expression::from_expr(Expr::Aggregate {
            func: AggregateFunc::Count,
            arg: None,
            distinct: false,
        })
    }

    /// Call a named SQL function, e.g. `replace`. The name must be a plain identifier.
    pub fn function<T: SqlType>(name: &str) -> FunctionCall<T> {
        FunctionCall {
            name: name.to_string(),
            args: Vec::new(),
            _ty: PhantomData,
        }
    }
}

pub struct FunctionCall<T> {
    name: String,
    args: Vec<Expr>,
    _ty: PhantomData<fn() -> T>,
}

impl<T: SqlType> FunctionCall<T> {
    #[must_use]
    pub fn arg(mut self, value: impl ValueExpr) -> Self {
        self.args.push(value.into_expr());
        self
    }

    pub fn build(self) -> Expression<T> {
        Expression::from_expr(Expr::Function {
            name: self.name,
            args: self.args,
            kind: Some(T::KIND),
        })
    }
}

/// Mode marker for `CASE WHEN <predicate>`.
#[derive(Debug, Clone, Copy)]
pub struct Searched;

/// Mode marker for `CASE <operand> WHEN <value>` over an operand of kind `K`.
pub struct Simple<K>(PhantomData<fn() -> K>);

/// Condition accepted by a `WHEN` arm in mode `M`.
pub trait CaseArm<M> {
    fn into_cond(self) -> CaseCond;
}

impl CaseArm<Searched> for Predicate {
    fn into_cond(self) -> CaseCond {
        CaseCond::Predicate(self)
    }
}

impl<K, O: Operand<K>> CaseArm<Simple<K>> for O {
    fn into_cond(self) -> CaseCond {
        CaseCond::Value(self.into_expr())
    }
}

/// Entry point for searched `CASE` expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseBuilder;

impl CaseBuilder {
    pub fn new() -> Self {
        CaseBuilder
    }

    pub fn when(self, predicate: Predicate) -> CaseStart<Searched> {
        CaseStart {
            case: CaseExpr {
                operand: None,
                arms: Vec::new(),
                otherwise: None,
            },
            cond: CaseCond::Predicate(predicate),
            _mode: PhantomData,
        }
    }
}

/// First `WHEN` arm awaiting its result; the result fixes the case type.
pub struct CaseStart<M> {
    case: CaseExpr,
    cond: CaseCond,
    _mode: PhantomData<fn() -> M>,
}

impl<M> CaseStart<M> {
    pub fn then<V: ValueExpr>(self, value: V) -> Case<V::Sql, M> {
        let mut case = self.case;
        case.arms.push((self.cond, value.into_expr()));
        Case {
            case,
            _ty: PhantomData,
        }
    }
}

/// A `CASE` with at least one arm, yielding `R`.
pub struct Case<R, M> {
    case: CaseExpr,
    _ty: PhantomData<fn() -> (R, M)>,
}

impl<R: SqlType, M> Case<R, M> {
    pub fn when<A: CaseArm<M>>(self, arm: A) -> CaseWhen<R, M> {
        CaseWhen {
            case: self.case,
            cond: arm.into_cond(),
            _ty: PhantomData,
        }
    }

    pub fn otherwise<V: ValueExpr<Sql = R>>(self, value: V) -> Expression<R> {
        let mut case = self.case;
        case.otherwise = Some(value.into_expr());
        Expression::from_expr(Expr::Case(Box::new(case)))
    }

    /// Close without `ELSE`; unmatched rows yield NULL.
    pub fn end(self) -> Expression<R::Nullable> {
        Expression::from_expr(Expr::Case(Box::new(self.case)))
    }
}

pub struct CaseWhen<R, M> {
    case: CaseExpr,
    cond: CaseCond,
    _ty: PhantomData<fn() -> (R, M)>,
}

impl<R: SqlType, M> CaseWhen<R, M> {
    pub fn then<V: ValueExpr<Sql = R>>(self, value: V) -> Case<R, M> {
        let mut case = self.case;
        case.arms.push((self.cond, value.into_expr()));
        Case {
            case,
            _ty: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> Expression<i32> {
        Expression::column(&Arc::from("member"), "age", "age")
    }

    fn username() -> Expression<Option<String>> {
        Expression::column(&Arc::from("member"), "username", "username")
    }

    #[test]
    fn column_carries_kind_and_nullability() {
        match username().expr() {
            Expr::Column(c) => {
                assert_eq!(c.kind, ValueKind::Text);
                assert!(c.nullable);
                assert_eq!(c.column, "username");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn comparisons_build_leaf_nodes() {
        let p = age().goe(30);
        assert!(matches!(
            p,
            Predicate::Compare {
                op: CompareOp::Goe,
                rhs: Expr::Literal(Value::I32(30)),
                ..
            }
        ));
        let p = username().eq("member1");
        assert!(matches!(
            p,
            Predicate::Compare {
                rhs: Expr::Literal(Value::String(_)),
                ..
            }
        ));
        let p = age().between(10, 20);
        assert!(matches!(p, Predicate::Between { .. }));
        let p = age().is_in(vec![10, 20]);
        assert!(matches!(p, Predicate::In { ref set, .. } if set.len() == 2));
    }

    #[test]
    fn optional_helpers_skip_missing_values() {
        assert!(username().eq_opt(None::<String>).is_none());
        assert!(age().goe_opt(Some(10)).is_some());
    }

    #[test]
    fn aggregates_have_expected_kinds() {
        assert_eq!(age().avg().expr().kind(), Some(ValueKind::Real));
        assert_eq!(age().count().expr().kind(), Some(ValueKind::Integer));
        assert_eq!(age().sum().expr().kind(), Some(ValueKind::Integer));
        assert!(age().max().expr().is_aggregate());
    }

    #[test]
    fn alias_is_visible_to_projection_naming() {
        let e = username().alias("name");
        assert_eq!(e.expr().name(), Some("name"));
        assert_eq!(username().expr().name(), Some("username"));
        assert_eq!(age().add(1).expr().name(), None);
    }

    #[test]
    fn simple_and_searched_case() {
        let simple = age().when(10).then("ten").when(20).then("twenty").otherwise("other");
        match simple.expr() {
            Expr::Case(c) => {
                assert!(c.operand.is_some());
                assert_eq!(c.arms.len(), 2);
                assert!(c.otherwise.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        let searched = CaseBuilder::new()
            .when(age().between(0, 20))
            .then(2)
            .when(age().between(21, 30))
            .then(1)
            .otherwise(3);
        assert_eq!(searched.expr().kind(), Some(ValueKind::Integer));
    }

    #[test]
    fn order_specifier_nulls() {
        let o = username().asc().nulls_last();
        assert_eq!(o.spec().nulls, Some(NullOrdering::Last));
        assert_eq!(o.spec().direction, Direction::Asc);
    }

    #[test]
    fn text_functions() {
        let e = username().concat("_").concat(age().string_value());
        assert_eq!(e.expr().kind(), Some(ValueKind::Text));
        let f = Expressions::function::<String>("replace")
            .arg(&username())
            .arg("member")
            .arg("M")
            .build();
        assert!(matches!(f.expr(), Expr::Function { args, .. } if args.len() == 3));
        assert!(matches!(username().contains("mem"), Predicate::Like { .. }));
    }
}
