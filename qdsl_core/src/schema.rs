//! Entity metadata and the traits generated by `#[derive(Entity)]`.

use crate::error::{QueryError, QueryResult};
use crate::query::Source;
use crate::value::{Cells, Value, ValueKind};
use std::sync::Arc;

/// Static description of one mapped column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub field: &'static str,
    pub column: &'static str,
    pub kind: ValueKind,
    pub nullable: bool,
    pub id: bool,
    /// Target entity name when the column is a many-to-one foreign key.
    pub relation: Option<&'static str>,
}

/// Static description of one entity table. Columns are listed in field
/// declaration order, which is also the order rows are read in.
#[derive(Debug, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity: &'static str,
    pub table: &'static str,
    pub default_alias: &'static str,
    pub columns: &'static [ColumnDef],
}

impl EntitySchema {
    pub fn id_column(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.id)
    }

    pub fn id_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.id)
    }

    pub fn column(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Columns written by an insert: everything but the generated id.
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.id)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// A persistent record with an `i64` generated key.
///
/// Implemented by `#[derive(Entity)]`; hand-written impls must keep
/// `read_row` and `insert_values` in `SCHEMA.columns` order.
pub trait Entity: Sized + 'static {
    type Path: EntityPath<Entity = Self>;

    const SCHEMA: &'static EntitySchema;

    /// Read one entity from `SCHEMA.width()` cells.
    fn read_row(cells: &mut Cells) -> QueryResult<Self>;

    /// Values for `SCHEMA.insert_columns()`, in order.
    fn insert_values(&self) -> QueryResult<Vec<Value>>;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Populate a relation field from fetch-joined cells.
    fn load_relation(&mut self, field: &str, cells: &mut Cells) -> QueryResult<()>;
}

/// Typed handle for an aliased entity (`QMember`). Generated alongside the entity.
pub trait EntityPath: Clone + 'static {
    type Entity: Entity<Path = Self>;

    /// A fresh handle bound to another alias, e.g. for subqueries or self joins.
    fn aliased(alias: &str) -> Self;

    fn alias(&self) -> &Arc<str>;

    fn source(&self) -> Source {
        Source::new(Self::Entity::SCHEMA, self.alias().clone())
    }
}

/// Many-to-one reference held by the owning entity.
///
/// Without a fetch join only the key is known (`Unloaded`); a fetch join or a
/// reference built from an entity value carries the target (`Loaded`).
#[derive(Debug, Clone, PartialEq)]
pub enum Related<T> {
    Absent,
    Unloaded(i64),
    Loaded(Box<T>),
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Related::Absent
    }
}

impl<T> Related<T> {
    pub fn from_key(key: Option<i64>) -> Self {
        key.map_or(Related::Absent, Related::Unloaded)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Related::Loaded(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Related::Absent)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Related::Loaded(t) => Some(t),
            _ => None,
        }
    }
}

impl<T: Entity> Related<T> {
    /// Reference an entity value. Persisting the owner fails while the
    /// target has no id.
    pub fn to(target: &T) -> Self
    where
        T: Clone,
    {
        Related::Loaded(Box::new(target.clone()))
    }

    pub fn key(&self) -> Option<i64> {
        match self {
            Related::Absent => None,
            Related::Unloaded(k) => Some(*k),
            Related::Loaded(t) => t.id(),
        }
    }

    /// Foreign key value for writes.
    pub fn key_value(&self, field: &'static str) -> QueryResult<Value> {
        match self {
            Related::Absent => Ok(Value::Null),
            Related::Unloaded(k) => Ok(Value::I64(*k)),
            Related::Loaded(t) => t
                .id()
                .map(Value::I64)
                .ok_or(QueryError::TransientReference { field }),
        }
    }

    /// Read a fetch-joined target. A null key (outer join miss) consumes the
    /// target's cells and yields `Absent`.
    pub fn read_loaded(cells: &mut Cells) -> QueryResult<Self> {
        let schema = T::SCHEMA;
        let id_index = schema.id_index().ok_or_else(|| {
            QueryError::mapping_msg(format!("{} declares no id column", schema.entity))
        })?;
        if matches!(cells.peek(id_index), Some(Value::Null)) {
            cells.skip(schema.width())?;
            return Ok(Related::Absent);
        }
        T::read_row(cells).map(|t| Related::Loaded(Box::new(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    #[derive(Debug, Clone, PartialEq)]
    struct Unit {
        id: Option<i64>,
        label: String,
    }

    #[derive(Clone)]
    struct QUnit {
        alias: Arc<str>,
    }

    impl EntityPath for QUnit {
        type Entity = Unit;
        fn aliased(alias: &str) -> Self {
            Self {
                alias: Arc::from(alias),
            }
        }
        fn alias(&self) -> &Arc<str> {
            &self.alias
        }
    }

    impl Entity for Unit {
        type Path = QUnit;
        const SCHEMA: &'static EntitySchema = &EntitySchema {
            entity: "Unit",
            table: "units",
            default_alias: "unit",
            columns: &[
                ColumnDef {
                    field: "id",
                    column: "unit_id",
                    kind: ValueKind::Integer,
                    nullable: true,
                    id: true,
                    relation: None,
                },
                ColumnDef {
                    field: "label",
                    column: "label",
                    kind: ValueKind::Text,
                    nullable: false,
                    id: false,
                    relation: None,
                },
            ],
        };
        fn read_row(cells: &mut Cells) -> QueryResult<Self> {
            Ok(Self {
                id: cells.take()?,
                label: cells.take()?,
            })
        }
        fn insert_values(&self) -> QueryResult<Vec<Value>> {
            Ok(vec![Value::from(self.label.clone())])
        }
        fn id(&self) -> Option<i64> {
            self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
        fn load_relation(&mut self, field: &str, _cells: &mut Cells) -> QueryResult<()> {
            Err(QueryError::InvalidSource(format!("no relation {}", field)))
        }
    }

    #[test]
    fn schema_lookups() {
        let s = Unit::SCHEMA;
        assert_eq!(s.id_index(), Some(0));
        assert_eq!(s.id_column().map(|c| c.column), Some("unit_id"));
        assert_eq!(s.insert_columns().map(|c| c.column).collect::<Vec<_>>(), vec!["label"]);
        assert_eq!(QUnit::aliased("u2").source().alias.as_ref(), "u2");
    }

    #[test]
    fn related_key_value_rejects_transient_target() {
        let unsaved = Unit {
            id: None,
            label: "x".into(),
        };
        let r = Related::to(&unsaved);
        assert!(r.is_loaded());
        assert!(matches!(
            r.key_value("unit"),
            Err(QueryError::TransientReference { field: "unit" })
        ));
        assert_eq!(Related::<Unit>::from_key(Some(4)).key_value("unit").unwrap(), Value::I64(4));
        assert_eq!(Related::<Unit>::default().key_value("unit").unwrap(), Value::Null);
    }

    #[test]
    fn read_loaded_skips_null_target() {
        let mut cells = Cells::new(Row::new(vec![
            Value::Null,
            Value::Null,
            Value::I64(9),
            Value::String("nine".into()),
        ]));
        let first: Related<Unit> = Related::read_loaded(&mut cells).unwrap();
        assert!(first.is_absent());
        let second: Related<Unit> = Related::read_loaded(&mut cells).unwrap();
        assert_eq!(second.get().map(|u| u.label.as_str()), Some("nine"));
        assert_eq!(second.key(), Some(9));
    }
}
