//! Statement shapes assembled by the query builder and consumed by the renderer.

use crate::expr::{Expr, Predicate};
use crate::schema::EntitySchema;
use crate::value::Value;
use std::sync::Arc;

/// An aliased entity table.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub schema: &'static EntitySchema,
    pub alias: Arc<str>,
}

impl Source {
    pub fn new(schema: &'static EntitySchema, alias: Arc<str>) -> Self {
        Self { schema, alias }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    /// Theta join; the join condition lives in `on` or in the filter.
    Cross,
}

/// Many-to-one relation used as a join path: `owner.column = target.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRef {
    pub owner: Arc<str>,
    pub field: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub target: Source,
    pub relation: Option<RelationRef>,
    pub on: Predicate,
    /// Populate the relation field of the owning entity from the joined columns.
    pub fetch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub expr: Expr,
    pub direction: Direction,
    /// `None` keeps the store's native null placement.
    pub nulls: Option<NullOrdering>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectSpec {
    pub items: Vec<Expr>,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub filter: Predicate,
    pub group_by: Vec<Expr>,
    pub having: Predicate,
    pub order_by: Vec<OrderSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub distinct: bool,
    /// Builder misuse, reported when the select is validated.
    pub misuse: Option<String>,
}

impl SelectSpec {
    /// Every alias declared by this select, in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = &Arc<str>> {
        self.from
            .iter()
            .map(|s| &s.alias)
            .chain(self.joins.iter().map(|j| &j.target.alias))
    }

    /// Usable as a single value: one column that is an ungrouped aggregate or
    /// limited to one row.
    pub fn is_scalar(&self) -> bool {
        self.items.len() == 1
            && ((self.group_by.is_empty() && self.items[0].is_aggregate())
                || self.limit == Some(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: &'static str,
    /// Alias of the column's entity; must match the update target.
    pub entity: Arc<str>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub target: Source,
    pub assignments: Vec<Assignment>,
    pub filter: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSpec {
    pub target: Source,
    pub filter: Predicate,
}

/// Single-row insert over the entity's non-id columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSpec {
    pub schema: &'static EntitySchema,
    pub values: Vec<Value>,
}
