use qdsl_core::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for [`LibsqlStore`](crate::LibsqlStore).
///
/// Every field has a default, so a partial JSON document such as
/// `{"url": "app.db"}` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Local database path, or `:memory:`.
    pub url: String,
    /// SQLite busy timeout applied when the connection is opened.
    pub busy_timeout_ms: u64,
    /// Default bound for a single statement when the caller's context has none.
    pub query_timeout_ms: Option<u64>,
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: ":memory:".to_string(),
            busy_timeout_ms: 1000,
            query_timeout_ms: None,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> QueryResult<Self> {
        serde_json::from_str(json).map_err(QueryError::store)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = StoreConfig::from_json(r#"{"url": "members.db", "query_timeout_ms": 250}"#)
            .unwrap();
        assert_eq!(cfg.url, "members.db");
        assert_eq!(cfg.busy_timeout_ms, 1000);
        assert_eq!(cfg.query_timeout(), Some(Duration::from_millis(250)));
        assert!(cfg.foreign_keys);
    }

    #[test]
    fn empty_object_is_in_memory() {
        let cfg = StoreConfig::from_json("{}").unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.query_timeout(), None);
    }

    #[test]
    fn malformed_json_is_a_store_error() {
        let err = StoreConfig::from_json("{url: ").unwrap_err();
        assert!(matches!(err, QueryError::Store { .. }));
    }
}
