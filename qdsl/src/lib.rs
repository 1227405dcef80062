#![forbid(unsafe_code)]
//! Typed, composable queries over relational entities.
//!
//! This crate is the main public API. It re-exports the core types and the
//! derive macros, and adds the [`QueryFactory`] that builds and executes
//! selects, bulk updates and deletes against a [`StoreAdapter`].
//!
//! # Example
//!
//! ```ignore
//! // Non-runnable: needs a store. See the integration tests under `qdsl/tests/`.
//! use qdsl::{Entity, QueryFactory, Related};
//!
//! #[derive(Entity, Clone, Debug)]
//! pub struct Member {
//!     #[column(id, name = "member_id")]
//!     pub id: Option<i64>,
//!     pub username: Option<String>,
//!     pub age: i32,
//!     #[column(name = "team_id")]
//!     pub team: Related<Team>,
//! }
//!
//! let member = QMember::default();
//! let found = factory
//!     .select_from(&member)
//!     .filter([member.username.eq_opt(name), member.age.goe_opt(min_age)])
//!     .order_by(member.age.desc().nulls_last())
//!     .fetch()
//!     .await?;
//! ```
//!
//! The derives expand to paths under `::qdsl_core`, so crates deriving
//! entities depend on `qdsl_core` next to `qdsl`.

pub mod composer;
pub mod factory;
pub mod mutation;
pub mod select;

pub use composer::{PredicateBuilder, PredicateComposer};
pub use factory::QueryFactory;
pub use mutation::{DeleteClause, UpdateClause};
pub use select::{Page, SelectQuery};

// Re-export everything from the core crate.
pub use qdsl_core::*;

// Re-export all procedural macros.
pub use qdsl_macros::{Entity, Projection};

// Renderer, for callers that want SQL without a store.
pub use qdsl_sql_builder as sql_builder;

/// Subquery entry point: `sub::select(member_sub.age.max()).from(&member_sub)`.
pub mod sub {
    use qdsl_core::{SqlType, SubQuery, ValueExpr};

    pub fn select<T: SqlType, V: ValueExpr<Sql = T>>(item: V) -> SubQuery<T> {
        SubQuery::select(item)
    }
}

// Backend adapters re-exported under a neutral namespace, so end-users don't
// have to depend on backend crates directly. These are feature-gated.
pub mod backends {
    #[cfg(feature = "libsql-backend")]
    pub use qdsl_libsql::{LibsqlStore, StoreConfig};
}
