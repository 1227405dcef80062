#![forbid(unsafe_code)]
//! Core types for qdsl: typed expressions and predicates, statement shapes,
//! projections and the store adapter contract.
//! This crate is database-agnostic and should not contain any backend-specific logic.

// Re-export for downstream macro expansions and adapter impls.
pub use async_trait::async_trait;

pub mod error;
pub mod expr;
pub mod path;
pub mod projection;
pub mod query;
pub mod schema;
pub mod store;
pub mod subquery;
pub mod validate;
pub mod value;

pub use error::{QueryError, QueryResult};
pub use expr::{
    AggregateFunc, ArithOp, CaseCond, CaseExpr, ColumnRef, CompareOp, Expr, IntoFilter, Predicate,
};
pub use path::{
    Boolean, Case, CaseArm, CaseBuilder, CaseStart, CaseWhen, Expression, Expressions,
    FunctionCall, Numeric, Operand, OrderSpecifier, RelationPath, Searched, Simple, SqlType, Text,
    ValueExpr,
};
pub use projection::{
    entity_items, entity_read, BeanTarget, ByBean, ByConstructor, ByFields, ConstructorTarget,
    DtoProjection, FetchJoin, FieldTarget, Mapped, MappingStrategy, Projection, Projections, Tuple,
    TupleProjection,
};
pub use query::{
    Assignment, DeleteSpec, Direction, InsertSpec, Join, JoinKind, NullOrdering, OrderSpec,
    RelationRef, SelectSpec, Source, UpdateSpec,
};
pub use schema::{ColumnDef, Entity, EntityPath, EntitySchema, Related};
pub use store::{ExecContext, Placeholder, Statement, StatementKind, StoreAdapter};
pub use subquery::SubQuery;
pub use value::{Cells, FromValue, Row, Value, ValueKind};
