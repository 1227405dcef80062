//! Structural checks run before any statement reaches the store.

use crate::error::{QueryError, QueryResult};
use crate::expr::{AggregateFunc, CaseCond, Expr, Predicate};
use crate::query::{DeleteSpec, JoinKind, SelectSpec, UpdateSpec};
use crate::value::{Value, ValueKind};
use std::sync::Arc;

/// Identifier accepted for aliases, projection names and function names.
pub fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Aliases visible to an expression: the current select and every
/// enclosing one, innermost last.
#[derive(Default)]
struct Scopes {
    frames: Vec<Vec<Arc<str>>>,
}

impl Scopes {
    fn contains(&self, alias: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.iter().any(|a| a.as_ref() == alias))
    }
}

/// Validate a top-level select. `selected` lists the entity aliases the
/// projection materializes; fetch joins must hang off one of them.
pub fn check_select(spec: &SelectSpec, selected: &[Arc<str>]) -> QueryResult<()> {
    let mut scopes = Scopes::default();
    check_query(spec, &mut scopes, Some(selected))
}

pub fn check_update(spec: &UpdateSpec) -> QueryResult<()> {
    if spec.assignments.is_empty() {
        return Err(QueryError::EmptyUpdate);
    }
    let alias = &spec.target.alias;
    check_alias(alias)?;
    let scopes = &mut Scopes {
        frames: vec![vec![alias.clone()]],
    };
    for a in &spec.assignments {
        if &a.entity != alias {
            return Err(QueryError::InvalidSource(format!(
                "cannot assign `{}.{}` in an update of `{}`",
                a.entity, a.column, alias
            )));
        }
        let column = spec
            .target
            .schema
            .columns
            .iter()
            .find(|c| c.column == a.column)
            .ok_or_else(|| {
                QueryError::InvalidSource(format!(
                    "`{}` has no column `{}`",
                    spec.target.schema.table, a.column
                ))
            })?;
        check_expr(&a.value, scopes)?;
        if !column.nullable && matches!(a.value, Expr::Literal(Value::Null)) {
            return Err(QueryError::InvalidSource(format!(
                "`{}.{}` is not nullable and cannot be set to NULL",
                spec.target.schema.table, a.column
            )));
        }
        if let Some(k) = a.value.kind() {
            ensure_compatible(column.kind, k)?;
        }
    }
    check_predicate(&spec.filter, scopes)
}

/// A delete without a filter is allowed and removes every row.
pub fn check_delete(spec: &DeleteSpec) -> QueryResult<()> {
    check_alias(&spec.target.alias)?;
    let scopes = &mut Scopes {
        frames: vec![vec![spec.target.alias.clone()]],
    };
    check_predicate(&spec.filter, scopes)
}

fn check_alias(alias: &str) -> QueryResult<()> {
    if is_valid_ident(alias) {
        Ok(())
    } else {
        Err(QueryError::InvalidSource(format!("invalid alias `{}`", alias)))
    }
}

fn check_paging(name: &'static str, value: Option<i64>) -> QueryResult<()> {
    match value {
        Some(v) if v < 0 => Err(QueryError::InvalidPaging { name, value: v }),
        _ => Ok(()),
    }
}

fn check_query(
    spec: &SelectSpec,
    scopes: &mut Scopes,
    selected: Option<&[Arc<str>]>,
) -> QueryResult<()> {
    if let Some(msg) = &spec.misuse {
        return Err(QueryError::InvalidSource(msg.clone()));
    }
    if spec.items.is_empty() {
        return Err(QueryError::EmptyProjection);
    }
    check_paging("limit", spec.limit)?;
    check_paging("offset", spec.offset)?;

    let from = spec.from.as_ref().ok_or_else(|| {
        QueryError::InvalidSource("query declares no source; call from()".to_string())
    })?;

    let mut frame: Vec<Arc<str>> = Vec::with_capacity(spec.joins.len() + 1);
    for alias in spec.aliases() {
        check_alias(alias)?;
        if frame.contains(alias) {
            return Err(QueryError::InvalidSource(format!(
                "alias `{}` is declared twice",
                alias
            )));
        }
        frame.push(alias.clone());
    }

    scopes.frames.push(frame);
    let res = check_query_body(spec, &from.alias, scopes, selected);
    scopes.frames.pop();
    res
}

fn check_query_body(
    spec: &SelectSpec,
    root: &Arc<str>,
    scopes: &mut Scopes,
    selected: Option<&[Arc<str>]>,
) -> QueryResult<()> {
    let mut declared = vec![root.clone()];
    for join in &spec.joins {
        let target = &join.target.alias;
        if let Some(rel) = &join.relation {
            if !declared.contains(&rel.owner) {
                return Err(QueryError::InvalidSource(format!(
                    "join path `{}.{}` starts from an alias not declared before it",
                    rel.owner, rel.field
                )));
            }
        }
        match join.kind {
            JoinKind::Inner | JoinKind::Left if join.relation.is_none() && join.on.is_true() => {
                return Err(QueryError::InvalidSource(format!(
                    "join to `{}` needs a relation path or an on condition",
                    target
                )));
            }
            JoinKind::Cross if join.on.is_true() && spec.filter.is_true() => {
                return Err(QueryError::InvalidSource(format!(
                    "theta join to `{}` has no join condition",
                    target
                )));
            }
            _ => {}
        }
        if join.fetch {
            let rel = join.relation.as_ref().ok_or_else(|| {
                QueryError::InvalidSource(format!("fetch join to `{}` needs a relation path", target))
            })?;
            match selected {
                None => {
                    return Err(QueryError::InvalidSource(
                        "fetch join is not allowed in a subquery".to_string(),
                    ))
                }
                Some(sel) if !sel.contains(&rel.owner) => {
                    return Err(QueryError::InvalidSource(format!(
                        "fetch join of `{}.{}` requires `{}` to be selected",
                        rel.owner, rel.field, rel.owner
                    )))
                }
                _ => {}
            }
        }
        declared.push(target.clone());
        check_predicate(&join.on, scopes)?;
    }

    for item in &spec.items {
        check_expr(item, scopes)?;
    }
    check_predicate(&spec.filter, scopes)?;
    for g in &spec.group_by {
        check_expr(g, scopes)?;
    }
    check_predicate(&spec.having, scopes)?;
    for o in &spec.order_by {
        check_expr(&o.expr, scopes)?;
    }
    Ok(())
}

fn ensure_compatible(expected: ValueKind, found: ValueKind) -> QueryResult<()> {
    if expected.is_compatible(found) {
        Ok(())
    } else {
        Err(QueryError::TypeMismatch {
            expected: expected.as_str(),
            found: found.as_str(),
        })
    }
}

fn compatible(lhs: &Expr, rhs: &Expr) -> QueryResult<()> {
    match (lhs.kind(), rhs.kind()) {
        (Some(l), Some(r)) => ensure_compatible(l, r),
        _ => Ok(()),
    }
}

fn require(expr: &Expr, wanted: fn(ValueKind) -> bool, label: &'static str) -> QueryResult<()> {
    match expr.kind() {
        Some(k) if !wanted(k) => Err(QueryError::TypeMismatch {
            expected: label,
            found: k.as_str(),
        }),
        _ => Ok(()),
    }
}

fn is_text(k: ValueKind) -> bool {
    k == ValueKind::Text
}

fn check_expr(expr: &Expr, scopes: &mut Scopes) -> QueryResult<()> {
    match expr {
        Expr::Column(c) => {
            if !scopes.contains(&c.entity) {
                return Err(QueryError::InvalidSource(format!(
                    "`{}.{}` refers to an alias not declared in this query",
                    c.entity, c.field
                )));
            }
            Ok(())
        }
        Expr::Literal(_) => Ok(()),
        Expr::Aggregate { func, arg, .. } => {
            if let Some(a) = arg {
                check_expr(a, scopes)?;
                if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg) {
                    require(a, ValueKind::is_numeric, "numeric")?;
                }
            }
            Ok(())
        }
        Expr::Arithmetic { lhs, rhs, .. } => {
            check_expr(lhs, scopes)?;
            check_expr(rhs, scopes)?;
            require(lhs, ValueKind::is_numeric, "numeric")?;
            require(rhs, ValueKind::is_numeric, "numeric")
        }
        Expr::Concat(lhs, rhs) => {
            check_expr(lhs, scopes)?;
            check_expr(rhs, scopes)?;
            require(lhs, is_text, "text")?;
            require(rhs, is_text, "text")
        }
        Expr::Cast { expr, .. } => check_expr(expr, scopes),
        Expr::Function { name, args, .. } => {
            if !is_valid_ident(name) {
                return Err(QueryError::InvalidPredicate(format!(
                    "invalid function name `{}`",
                    name
                )));
            }
            args.iter().try_for_each(|a| check_expr(a, scopes))
        }
        Expr::Case(case) => {
            if let Some(op) = &case.operand {
                check_expr(op, scopes)?;
            }
            let mut first: Option<&Expr> = None;
            for (cond, result) in &case.arms {
                match cond {
                    CaseCond::Value(v) => {
                        check_expr(v, scopes)?;
                        if let Some(op) = &case.operand {
                            compatible(op, v)?;
                        }
                    }
                    CaseCond::Predicate(p) => check_predicate(p, scopes)?,
                }
                check_expr(result, scopes)?;
                match first {
                    Some(f) => compatible(f, result)?,
                    None => first = Some(result),
                }
            }
            if let Some(other) = &case.otherwise {
                check_expr(other, scopes)?;
                if let Some(f) = first {
                    compatible(f, other)?;
                }
            }
            Ok(())
        }
        Expr::Subquery(spec) => {
            if !spec.is_scalar() {
                return Err(QueryError::SubqueryArity(format!(
                    "subquery used as a value must select one aggregate or use limit(1), found {} column(s)",
                    spec.items.len()
                )));
            }
            check_query(spec, scopes, None)
        }
        Expr::Alias { expr, alias } => {
            if !is_valid_ident(alias) {
                return Err(QueryError::InvalidSource(format!(
                    "invalid projection alias `{}`",
                    alias
                )));
            }
            check_expr(expr, scopes)
        }
    }
}

fn check_predicate(pred: &Predicate, scopes: &mut Scopes) -> QueryResult<()> {
    match pred {
        Predicate::True => Ok(()),
        Predicate::Compare { op, lhs, rhs } => {
            if lhs.is_null_literal() || rhs.is_null_literal() {
                return Err(QueryError::InvalidPredicate(format!(
                    "`{}` against NULL never matches; use is_null",
                    op.symbol()
                )));
            }
            check_expr(lhs, scopes)?;
            check_expr(rhs, scopes)?;
            compatible(lhs, rhs)
        }
        Predicate::Between { expr, low, high } => {
            check_expr(expr, scopes)?;
            check_expr(low, scopes)?;
            check_expr(high, scopes)?;
            compatible(expr, low)?;
            compatible(expr, high)
        }
        Predicate::In { expr, set } => {
            check_expr(expr, scopes)?;
            for v in set {
                check_expr(v, scopes)?;
                compatible(expr, v)?;
            }
            Ok(())
        }
        Predicate::InSubquery { expr, query } => {
            check_expr(expr, scopes)?;
            if query.items.len() != 1 {
                return Err(QueryError::SubqueryArity(format!(
                    "IN subquery must select exactly one column, found {}",
                    query.items.len()
                )));
            }
            compatible(expr, &query.items[0])?;
            check_query(query, scopes, None)
        }
        Predicate::IsNull(e) | Predicate::IsNotNull(e) => check_expr(e, scopes),
        Predicate::Like { expr, pattern } => {
            check_expr(expr, scopes)?;
            check_expr(pattern, scopes)?;
            require(expr, is_text, "text")?;
            require(pattern, is_text, "text")
        }
        Predicate::And(children) | Predicate::Or(children) => {
            children.iter().try_for_each(|c| check_predicate(c, scopes))
        }
        Predicate::Not(inner) => check_predicate(inner, scopes),
    }
}
