//! Backend-agnostic values exchanged with the store, and the row cursor used
//! by projections.

use crate::error::{QueryError, QueryResult};
use std::fmt;

/// A backend-agnostic representation of a parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
}

/// Semantic kind of a column, literal or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Real)
    }

    /// Numeric kinds compare with each other; every other kind only with itself.
    pub fn is_compatible(self, other: ValueKind) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::Text => "text",
            ValueKind::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Kind of a non-null value; `None` for `Null`, which is compatible with every kind.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::I32(_) | Value::I64(_) => Some(ValueKind::Integer),
            Value::F64(_) => Some(ValueKind::Real),
            Value::String(_) => Some(ValueKind::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a result cell into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> QueryResult<Self>;
}

fn unexpected(expected: &str, found: &Value) -> QueryError {
    QueryError::mapping_msg(format!("expected {}, found {:?}", expected, found))
}

impl FromValue for Value {
    fn from_value(value: Value) -> QueryResult<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::I64(v) => Ok(v),
            Value::I32(v) => Ok(v as i64),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::I32(v) => Ok(v),
            Value::I64(v) => i32::try_from(v).map_err(QueryError::mapping),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::F64(v) => Ok(v),
            Value::I64(v) => Ok(v as f64),
            Value::I32(v) => Ok(v as f64),
            other => Err(unexpected("real", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> QueryResult<Self> {
        // SQLite stores booleans as 0/1 integers
        match value {
            Value::Bool(v) => Ok(v),
            Value::I64(v) => Ok(v != 0),
            Value::I32(v) => Ok(v != 0),
            other => Err(unexpected("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::String(v) => Ok(v),
            other => Err(unexpected("text", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> QueryResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row as returned by a store adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Forward-only cursor over the cells of one row.
///
/// Projections consume cells in the order their items were selected.
#[derive(Debug)]
pub struct Cells {
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Cells {
    pub fn new(row: Row) -> Self {
        Self {
            values: row.into_values().into_iter(),
            position: 0,
        }
    }

    pub fn next_value(&mut self) -> QueryResult<Value> {
        let v = self.values.next().ok_or_else(|| {
            QueryError::mapping_msg(format!("row has no column at index {}", self.position))
        })?;
        self.position += 1;
        Ok(v)
    }

    pub fn take<T: FromValue>(&mut self) -> QueryResult<T> {
        let v = self.next_value()?;
        T::from_value(v)
    }

    /// Look ahead `offset` cells without consuming anything.
    pub fn peek(&self, offset: usize) -> Option<&Value> {
        self.values.as_slice().get(offset)
    }

    pub fn skip(&mut self, n: usize) -> QueryResult<()> {
        for _ in 0..n {
            self.next_value()?;
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
