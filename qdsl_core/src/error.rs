//! Error taxonomy shared by every qdsl crate.
//!
//! Every variant except `NonUniqueResult`, `Mapping` and `Store` is raised while
//! a query is being built or validated, before any statement reaches the store.

/// Lightweight, backend-agnostic error type for query construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A predicate tree could not be composed.
    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),
    /// Two operands of one operation have incompatible semantic kinds.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A select statement without any projected column.
    #[error("projection must select at least one column")]
    EmptyProjection,
    /// Negative offset or limit.
    #[error("invalid paging: {name} must not be negative (got {value})")]
    InvalidPaging { name: &'static str, value: i64 },
    /// `fetch_one` matched more than one row.
    #[error("query returned more than one row")]
    NonUniqueResult,
    /// A subquery used where a single value (or single column) is required.
    #[error("subquery arity: {0}")]
    SubqueryArity(String),
    /// Constructor projection arity differs from the number of selected columns.
    #[error("{target} expects {expected} columns, projection selects {actual}")]
    MappingArity {
        target: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A selected column has no matching field on the projection target.
    #[error("{target} has no field matching `{field}`; alias the column explicitly")]
    UnmappedField { target: &'static str, field: String },
    /// Undeclared or duplicate alias, missing source, or malformed join.
    #[error("invalid source: {0}")]
    InvalidSource(String),
    /// An update clause without any assignment.
    #[error("update requires at least one assignment")]
    EmptyUpdate,
    /// A relation refers to an entity that has not been persisted yet.
    #[error("relation `{field}` refers to an entity without an id")]
    TransientReference { field: &'static str },
    /// Error while converting a store value into a Rust value.
    #[error("mapping error")]
    Mapping {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Opaque error from the store adapter or the underlying driver.
    #[error("store error")]
    Store {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl QueryError {
    /// Wrap a store/driver error.
    pub fn store<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Store {
            source: Box::new(e),
        }
    }

    /// Wrap a value-mapping error.
    pub fn mapping<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Mapping {
            source: Box::new(e),
        }
    }

    /// Mapping error carrying only a message.
    pub fn mapping_msg(msg: impl Into<String>) -> Self {
        Self::mapping(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
    }

    /// Store error carrying only a message.
    pub fn store_msg(msg: impl Into<String>) -> Self {
        Self::store(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
    }

    /// True for errors raised before any statement was sent to the store.
    pub fn is_build_error(&self) -> bool {
        !matches!(
            self,
            QueryError::NonUniqueResult | QueryError::Mapping { .. } | QueryError::Store { .. }
        )
    }
}

/// Convenience alias for results returned by qdsl operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_messages() {
        let e = QueryError::TypeMismatch {
            expected: "numeric",
            found: "text",
        };
        assert_eq!(e.to_string(), "type mismatch: expected numeric, found text");

        let e = QueryError::InvalidPaging {
            name: "offset",
            value: -1,
        };
        assert_eq!(
            e.to_string(),
            "invalid paging: offset must not be negative (got -1)"
        );

        let e = QueryError::store_msg("boom");
        assert_eq!(e.to_string(), "store error");
        assert_eq!(e.source().map(|s| s.to_string()), Some("boom".into()));
    }

    #[test]
    fn build_errors_are_distinguished_from_runtime_errors() {
        assert!(QueryError::EmptyProjection.is_build_error());
        assert!(!QueryError::NonUniqueResult.is_build_error());
        assert!(!QueryError::mapping_msg("bad row").is_build_error());
        assert!(!QueryError::store_msg("down").is_build_error());
    }
}
