#![forbid(unsafe_code)]
//! Renders qdsl statement trees into SQL text plus ordered parameters.
//!
//! Every `render_*` has a `render_*_with` twin taking the [`Placeholder`]
//! dialect, which callers holding a store take from
//! `StoreAdapter::placeholder`. The plain forms use the crate default:
//! - `postgres` feature: $1, $2, ... and `INSERT ... RETURNING <id>`
//! - otherwise: ?
//!
//! Literals are always bound as parameters except `NULL`, which is inlined.
//! `LIMIT`/`OFFSET` are inlined integers.

use qdsl_core::{
    AggregateFunc, CaseCond, DeleteSpec, Direction, Expr, InsertSpec, Join, JoinKind,
    NullOrdering, Predicate, QueryError, QueryResult, SelectSpec, Statement, StatementKind,
    UpdateSpec, Value, ValueKind,
};

pub use qdsl_core::Placeholder;

/// Crate-wide default dialect, chosen by cargo feature.
pub fn placeholder_style() -> Placeholder {
    #[cfg(feature = "postgres")]
    return Placeholder::Dollar;

    #[cfg(not(feature = "postgres"))]
    return Placeholder::Question;
}

fn placeholder_n(ph: Placeholder, n: usize) -> String {
    match ph {
        Placeholder::Dollar => format!("${}", n),
        Placeholder::Question => "?".to_string(),
    }
}

/// Accumulates SQL text and binds parameters in textual order.
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
    style: Placeholder,
}

impl SqlWriter {
    fn new(style: Placeholder) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            style,
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn bind(&mut self, v: Value) {
        if v.is_null() {
            self.sql.push_str("NULL");
            return;
        }
        self.params.push(v);
        let ph = placeholder_n(self.style, self.params.len());
        self.sql.push_str(&ph);
    }

    fn finish(self, kind: StatementKind) -> Statement {
        Statement::new(kind, self.sql, self.params)
    }
}

/// `SELECT ...` for a validated spec.
pub fn render_select(spec: &SelectSpec) -> QueryResult<Statement> {
    render_select_with(spec, placeholder_style())
}

pub fn render_select_with(spec: &SelectSpec, style: Placeholder) -> QueryResult<Statement> {
    let mut w = SqlWriter::new(style);
    write_select(&mut w, spec)?;
    Ok(w.finish(StatementKind::Select))
}

/// Row count of `spec` ignoring ordering and paging. Grouped or distinct
/// selects are counted through a derived table.
pub fn render_count(spec: &SelectSpec) -> QueryResult<Statement> {
    render_count_with(spec, placeholder_style())
}

pub fn render_count_with(spec: &SelectSpec, style: Placeholder) -> QueryResult<Statement> {
    let mut w = SqlWriter::new(style);
    let mut unpaged = spec.clone();
    unpaged.order_by.clear();
    unpaged.limit = None;
    unpaged.offset = None;
    if unpaged.distinct || !unpaged.group_by.is_empty() {
        w.push("SELECT COUNT(*) FROM (");
        write_select(&mut w, &unpaged)?;
        w.push(") AS counted");
    } else {
        w.push("SELECT COUNT(*)");
        write_from_where(&mut w, &unpaged)?;
    }
    Ok(w.finish(StatementKind::Count))
}

/// `UPDATE <table> AS <alias> SET <col> = <expr>, ... [WHERE ...]`
pub fn render_update(spec: &UpdateSpec) -> QueryResult<Statement> {
    render_update_with(spec, placeholder_style())
}

pub fn render_update_with(spec: &UpdateSpec, style: Placeholder) -> QueryResult<Statement> {
    let mut w = SqlWriter::new(style);
    w.push(&format!(
        "UPDATE {table} AS {alias} SET ",
        table = spec.target.schema.table,
        alias = spec.target.alias
    ));
    for (i, a) in spec.assignments.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push(a.column);
        w.push(" = ");
        write_expr(&mut w, &a.value)?;
    }
    write_where(&mut w, &spec.filter)?;
    Ok(w.finish(StatementKind::Update))
}

/// `DELETE FROM <table> AS <alias> [WHERE ...]`
pub fn render_delete(spec: &DeleteSpec) -> QueryResult<Statement> {
    render_delete_with(spec, placeholder_style())
}

pub fn render_delete_with(spec: &DeleteSpec, style: Placeholder) -> QueryResult<Statement> {
    let mut w = SqlWriter::new(style);
    w.push(&format!(
        "DELETE FROM {table} AS {alias}",
        table = spec.target.schema.table,
        alias = spec.target.alias
    ));
    write_where(&mut w, &spec.filter)?;
    Ok(w.finish(StatementKind::Delete))
}

/// `INSERT INTO <table> (<cols>) VALUES (<placeholders>)`.
/// In the `Dollar` dialect this appends `RETURNING <id_column>`.
pub fn render_insert(spec: &InsertSpec) -> QueryResult<Statement> {
    render_insert_with(spec, placeholder_style())
}

pub fn render_insert_with(spec: &InsertSpec, style: Placeholder) -> QueryResult<Statement> {
    let schema = spec.schema;
    let cols: Vec<&str> = schema.insert_columns().map(|c| c.column).collect();
    if cols.len() != spec.values.len() {
        return Err(QueryError::mapping_msg(format!(
            "{} expects {} insert values, got {}",
            schema.entity,
            cols.len(),
            spec.values.len()
        )));
    }
    let mut w = SqlWriter::new(style);
    w.push(&format!(
        "INSERT INTO {table} ({cols}) VALUES (",
        table = schema.table,
        cols = cols.join(", ")
    ));
    for (i, v) in spec.values.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        // Positional: NULL must still occupy a parameter slot on every backend.
        w.params.push(v.clone());
        let ph = placeholder_n(style, w.params.len());
        w.push(&ph);
    }
    w.push(")");
    if style == Placeholder::Dollar {
        if let Some(id) = schema.id_column() {
            w.push(" RETURNING ");
            w.push(id.column);
        }
    }
    Ok(w.finish(StatementKind::Insert))
}

fn write_select(w: &mut SqlWriter, spec: &SelectSpec) -> QueryResult<()> {
    w.push("SELECT ");
    if spec.distinct {
        w.push("DISTINCT ");
    }
    for (i, item) in spec.items.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        match item {
            Expr::Alias { expr, alias } => {
                write_expr(w, expr)?;
                w.push(" AS ");
                w.push(alias);
            }
            other => write_expr(w, other)?,
        }
    }
    write_from_where(w, spec)?;
    if !spec.group_by.is_empty() {
        w.push(" GROUP BY ");
        for (i, g) in spec.group_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            write_expr(w, g)?;
        }
    }
    if !spec.having.is_true() {
        w.push(" HAVING ");
        write_predicate(w, &spec.having)?;
    }
    if !spec.order_by.is_empty() {
        w.push(" ORDER BY ");
        for (i, o) in spec.order_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match &o.expr {
                Expr::Alias { alias, .. } => w.push(alias),
                other => write_expr(w, other)?,
            }
            w.push(match o.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
            match o.nulls {
                Some(NullOrdering::First) => w.push(" NULLS FIRST"),
                Some(NullOrdering::Last) => w.push(" NULLS LAST"),
                None => {}
            }
        }
    }
    write_paging(w, spec.limit, spec.offset);
    Ok(())
}

fn write_paging(w: &mut SqlWriter, limit: Option<i64>, offset: Option<i64>) {
    match (limit, offset) {
        (Some(l), _) => w.push(&format!(" LIMIT {}", l)),
        (None, Some(_)) if w.style == Placeholder::Question => w.push(" LIMIT -1"),
        _ => {}
    }
    if let Some(off) = offset {
        w.push(&format!(" OFFSET {}", off));
    }
}

fn write_from_where(w: &mut SqlWriter, spec: &SelectSpec) -> QueryResult<()> {
    let from = spec.from.as_ref().ok_or_else(|| {
        QueryError::InvalidSource("query declares no source; call from()".to_string())
    })?;
    w.push(&format!(
        " FROM {table} AS {alias}",
        table = from.schema.table,
        alias = from.alias
    ));
    for join in &spec.joins {
        write_join(w, join)?;
    }
    write_where(w, &spec.filter)
}

fn write_join(w: &mut SqlWriter, join: &Join) -> QueryResult<()> {
    let keyword = match join.kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Cross if join.on.is_true() => "CROSS JOIN",
        JoinKind::Cross => "INNER JOIN",
    };
    let target = &join.target;
    w.push(&format!(
        " {keyword} {table} AS {alias}",
        keyword = keyword,
        table = target.schema.table,
        alias = target.alias
    ));
    match &join.relation {
        Some(rel) => {
            let id = target.schema.id_column().ok_or_else(|| {
                QueryError::InvalidSource(format!(
                    "join target {} declares no id column",
                    target.schema.entity
                ))
            })?;
            w.push(&format!(
                " ON {owner}.{fk} = {alias}.{id}",
                owner = rel.owner,
                fk = rel.column,
                alias = target.alias,
                id = id.column
            ));
            if !join.on.is_true() {
                w.push(" AND ");
                write_predicate(w, &join.on)?;
            }
        }
        None if !join.on.is_true() => {
            w.push(" ON ");
            write_predicate(w, &join.on)?;
        }
        None => {}
    }
    Ok(())
}

fn write_where(w: &mut SqlWriter, filter: &Predicate) -> QueryResult<()> {
    if !filter.is_true() {
        w.push(" WHERE ");
        write_predicate(w, filter)?;
    }
    Ok(())
}

fn cast_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Integer => "INTEGER",
        ValueKind::Real => "REAL",
        ValueKind::Text => "TEXT",
        ValueKind::Boolean => "BOOLEAN",
    }
}

fn write_list(w: &mut SqlWriter, items: &[Expr]) -> QueryResult<()> {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        write_expr(w, e)?;
    }
    Ok(())
}

fn write_expr(w: &mut SqlWriter, expr: &Expr) -> QueryResult<()> {
    match expr {
        Expr::Column(c) => w.push(&format!("{}.{}", c.entity, c.column)),
        Expr::Literal(v) => w.bind(v.clone()),
        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => {
            w.push(func.sql_name());
            w.push("(");
            match arg {
                Some(a) => {
                    if *distinct {
                        w.push("DISTINCT ");
                    }
                    write_expr(w, a)?;
                }
                None if *func == AggregateFunc::Count => w.push("*"),
                None => {
                    return Err(QueryError::InvalidPredicate(format!(
                        "{} needs an argument",
                        func.sql_name()
                    )))
                }
            }
            w.push(")");
        }
        Expr::Arithmetic { op, lhs, rhs } => {
            w.push("(");
            write_expr(w, lhs)?;
            w.push(&format!(" {} ", op.symbol()));
            write_expr(w, rhs)?;
            w.push(")");
        }
        Expr::Concat(lhs, rhs) => {
            w.push("(");
            write_expr(w, lhs)?;
            w.push(" || ");
            write_expr(w, rhs)?;
            w.push(")");
        }
        Expr::Cast { expr, kind } => {
            w.push("CAST(");
            write_expr(w, expr)?;
            w.push(&format!(" AS {})", cast_type(*kind)));
        }
        Expr::Function { name, args, .. } => {
            w.push(name);
            w.push("(");
            write_list(w, args)?;
            w.push(")");
        }
        Expr::Case(case) => {
            w.push("CASE");
            if let Some(op) = &case.operand {
                w.push(" ");
                write_expr(w, op)?;
            }
            for (cond, result) in &case.arms {
                w.push(" WHEN ");
                match cond {
                    CaseCond::Value(v) => write_expr(w, v)?,
                    CaseCond::Predicate(p) => write_predicate(w, p)?,
                }
                w.push(" THEN ");
                write_expr(w, result)?;
            }
            if let Some(other) = &case.otherwise {
                w.push(" ELSE ");
                write_expr(w, other)?;
            }
            w.push(" END");
        }
        Expr::Subquery(spec) => {
            w.push("(");
            write_select(w, spec)?;
            w.push(")");
        }
        Expr::Alias { expr, .. } => write_expr(w, expr)?,
    }
    Ok(())
}

fn write_junction(
    w: &mut SqlWriter,
    children: &[Predicate],
    op: &str,
    empty: &str,
) -> QueryResult<()> {
    match children {
        [] => w.push(empty),
        [only] => write_predicate(w, only)?,
        many => {
            w.push("(");
            for (i, c) in many.iter().enumerate() {
                if i > 0 {
                    w.push(op);
                }
                write_predicate(w, c)?;
            }
            w.push(")");
        }
    }
    Ok(())
}

fn write_predicate(w: &mut SqlWriter, pred: &Predicate) -> QueryResult<()> {
    match pred {
        Predicate::True => w.push("1 = 1"),
        Predicate::Compare { op, lhs, rhs } => {
            write_expr(w, lhs)?;
            w.push(&format!(" {} ", op.symbol()));
            write_expr(w, rhs)?;
        }
        Predicate::Between { expr, low, high } => {
            write_expr(w, expr)?;
            w.push(" BETWEEN ");
            write_expr(w, low)?;
            w.push(" AND ");
            write_expr(w, high)?;
        }
        Predicate::In { set, .. } if set.is_empty() => w.push("1 = 0"),
        Predicate::In { expr, set } => {
            write_expr(w, expr)?;
            w.push(" IN (");
            write_list(w, set)?;
            w.push(")");
        }
        Predicate::InSubquery { expr, query } => {
            write_expr(w, expr)?;
            w.push(" IN (");
            write_select(w, query)?;
            w.push(")");
        }
        Predicate::IsNull(e) => {
            write_expr(w, e)?;
            w.push(" IS NULL");
        }
        Predicate::IsNotNull(e) => {
            write_expr(w, e)?;
            w.push(" IS NOT NULL");
        }
        Predicate::Like { expr, pattern } => {
            write_expr(w, expr)?;
            w.push(" LIKE ");
            write_expr(w, pattern)?;
        }
        Predicate::And(children) => write_junction(w, children, " AND ", "1 = 1")?,
        Predicate::Or(children) => write_junction(w, children, " OR ", "1 = 0")?,
        Predicate::Not(inner) => {
            w.push("NOT (");
            write_predicate(w, inner)?;
            w.push(")");
        }
    }
    Ok(())
}
