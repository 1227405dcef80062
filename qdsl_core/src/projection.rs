//! Mapping from selected columns to result shapes.
//!
//! A [`Projection`] contributes the expressions to select and reads them back
//! from each row, in the same order. Shapes provided here: single typed
//! expressions, static tuples, dynamic [`Tuple`]s, entities (through their
//! generated paths) and DTOs built by setters, by field assignment or by
//! constructor.

use crate::error::{QueryError, QueryResult};
use crate::expr::{ColumnRef, Expr};
use crate::path::{Expression, SqlType, ValueExpr};
use crate::query::Source;
use crate::schema::{Entity, EntitySchema};
use crate::subquery::SubQuery;
use crate::value::{Cells, FromValue, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// A relation populated eagerly by a fetch join.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchJoin {
    /// Alias of the entity owning the relation field.
    pub owner: Arc<str>,
    pub field: &'static str,
    pub target: Source,
}

pub trait Projection {
    type Output;

    /// Expressions to select, including columns of fetch-joined relations.
    fn items(&self, fetch: &[FetchJoin]) -> Vec<Expr>;

    /// Read one result from the cells produced by `items`.
    fn read(&self, cells: &mut Cells, fetch: &[FetchJoin]) -> QueryResult<Self::Output>;

    /// Shape checks that do not need the store.
    fn check(&self) -> QueryResult<()> {
        Ok(())
    }

    /// Aliases of entities materialized by this projection.
    fn entity_aliases(&self) -> Vec<Arc<str>> {
        Vec::new()
    }
}

impl<P: Projection + ?Sized> Projection for &P {
    type Output = P::Output;

    fn items(&self, fetch: &[FetchJoin]) -> Vec<Expr> {
        (**self).items(fetch)
    }

    fn read(&self, cells: &mut Cells, fetch: &[FetchJoin]) -> QueryResult<Self::Output> {
        (**self).read(cells, fetch)
    }

    fn check(&self) -> QueryResult<()> {
        (**self).check()
    }

    fn entity_aliases(&self) -> Vec<Arc<str>> {
        (**self).entity_aliases()
    }
}

impl<T: SqlType> Projection for Expression<T> {
    type Output = T;

    fn items(&self, _fetch: &[FetchJoin]) -> Vec<Expr> {
        vec![self.expr().clone()]
    }

    fn read(&self, cells: &mut Cells, _fetch: &[FetchJoin]) -> QueryResult<T> {
        cells.take()
    }
}

impl<T: SqlType> Projection for SubQuery<T> {
    type Output = T;

    fn items(&self, _fetch: &[FetchJoin]) -> Vec<Expr> {
        vec![Expr::Subquery(Box::new(self.spec().clone()))]
    }

    fn read(&self, cells: &mut Cells, _fetch: &[FetchJoin]) -> QueryResult<T> {
        cells.take()
    }
}

macro_rules! tuple_projection {
    ($($name:ident),+) => {
        impl<$($name: Projection),+> Projection for ($($name,)+) {
            type Output = ($($name::Output,)+);

            #[allow(non_snake_case)]
            fn items(&self, fetch: &[FetchJoin]) -> Vec<Expr> {
                let ($($name,)+) = self;
                let mut items = Vec::new();
                $(items.extend($name.items(fetch));)+
                items
            }

            #[allow(non_snake_case)]
            fn read(&self, cells: &mut Cells, fetch: &[FetchJoin]) -> QueryResult<Self::Output> {
                let ($($name,)+) = self;
                Ok(($($name.read(cells, fetch)?,)+))
            }

            #[allow(non_snake_case)]
            fn check(&self) -> QueryResult<()> {
                let ($($name,)+) = self;
                $($name.check()?;)+
                Ok(())
            }

            #[allow(non_snake_case)]
            fn entity_aliases(&self) -> Vec<Arc<str>> {
                let ($($name,)+) = self;
                let mut aliases = Vec::new();
                $(aliases.extend($name.entity_aliases());)+
                aliases
            }
        }
    };
}

tuple_projection!(A, B);
tuple_projection!(A, B, C);
tuple_projection!(A, B, C, D);

/// Column references for every mapped column of `schema` under `alias`.
pub fn columns_of(schema: &'static EntitySchema, alias: &Arc<str>) -> Vec<Expr> {
    schema
        .columns
        .iter()
        .map(|c| {
            Expr::Column(ColumnRef {
                entity: alias.clone(),
                field: c.field,
                column: c.column,
                kind: c.kind,
                nullable: c.nullable,
            })
        })
        .collect()
}

/// Items of an entity projection: own columns, then the columns of each
/// relation fetch-joined from this alias.
pub fn entity_items<E: Entity>(alias: &Arc<str>, fetch: &[FetchJoin]) -> Vec<Expr> {
    let mut items = columns_of(E::SCHEMA, alias);
    for f in fetch.iter().filter(|f| &f.owner == alias) {
        items.extend(columns_of(f.target.schema, &f.target.alias));
    }
    items
}

/// Counterpart of [`entity_items`].
pub fn entity_read<E: Entity>(
    alias: &Arc<str>,
    cells: &mut Cells,
    fetch: &[FetchJoin],
) -> QueryResult<E> {
    let mut entity = E::read_row(cells)?;
    for f in fetch.iter().filter(|f| &f.owner == alias) {
        entity.load_relation(f.field, cells)?;
    }
    Ok(entity)
}

/// Projection onto a dynamic [`Tuple`].
#[derive(Debug, Clone, Default)]
pub struct TupleProjection {
    items: Vec<Expr>,
}

impl TupleProjection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, item: impl ValueExpr) -> Self {
        self.items.push(item.into_expr());
        self
    }
}

impl Projection for TupleProjection {
    type Output = Tuple;

    fn items(&self, _fetch: &[FetchJoin]) -> Vec<Expr> {
        self.items.clone()
    }

    fn read(&self, cells: &mut Cells, _fetch: &[FetchJoin]) -> QueryResult<Tuple> {
        let mut values = Vec::with_capacity(self.items.len());
        for _ in 0..self.items.len() {
            values.push(cells.next_value()?);
        }
        Ok(Tuple {
            items: self.items.clone(),
            values,
        })
    }
}

/// One result row addressed by the expressions that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    items: Vec<Expr>,
    values: Vec<Value>,
}

impl Tuple {
    /// Value of a selected expression. Aliases are ignored when matching.
    pub fn get<T: SqlType>(&self, expr: &Expression<T>) -> QueryResult<T> {
        let wanted = expr.expr().unaliased();
        let idx = self
            .items
            .iter()
            .position(|i| i.unaliased() == wanted)
            .ok_or_else(|| QueryError::UnmappedField {
                target: "Tuple",
                field: expr.expr().name().unwrap_or("<expression>").to_string(),
            })?;
        self.get_at(idx)
    }

    pub fn get_at<T: FromValue>(&self, idx: usize) -> QueryResult<T> {
        let v = self.values.get(idx).cloned().ok_or_else(|| {
            QueryError::mapping_msg(format!("tuple has no column at index {}", idx))
        })?;
        T::from_value(v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Projection post-processed by a closure; the typed constructor form.
pub struct Mapped<P, F> {
    inner: P,
    f: F,
}

impl<P, F, R> Projection for Mapped<P, F>
where
    P: Projection,
    F: Fn(P::Output) -> R,
{
    type Output = R;

    fn items(&self, fetch: &[FetchJoin]) -> Vec<Expr> {
        self.inner.items(fetch)
    }

    fn read(&self, cells: &mut Cells, fetch: &[FetchJoin]) -> QueryResult<R> {
        self.inner.read(cells, fetch).map(&self.f)
    }

    fn check(&self) -> QueryResult<()> {
        self.inner.check()
    }

    fn entity_aliases(&self) -> Vec<Arc<str>> {
        self.inner.entity_aliases()
    }
}

/// DTO populated by direct field assignment after default construction.
/// Generated by `#[derive(Projection)]`.
pub trait FieldTarget: Sized {
    const NAME: &'static str;
    const FIELDS: &'static [&'static str];
    fn assign_field(&mut self, field: &str, value: Value) -> QueryResult<()>;
}

/// DTO populated through `set_<field>` mutators.
/// Generated by `#[derive(Projection)]` with `#[projection(setters)]`.
pub trait BeanTarget: FieldTarget {
    fn set_property(&mut self, property: &str, value: Value) -> QueryResult<()>;
}

/// DTO built from a positional argument list.
pub trait ConstructorTarget: Sized {
    const NAME: &'static str;
    const ARITY: usize;
    /// Read exactly `ARITY` cells.
    fn construct(cells: &mut Cells) -> QueryResult<Self>;
}

/// How a [`DtoProjection`] turns cells into a `D`.
pub trait MappingStrategy<D> {
    fn check(items: &[Expr]) -> QueryResult<()>;
    fn build(items: &[Expr], cells: &mut Cells) -> QueryResult<D>;
}

#[derive(Debug, Clone, Copy)]
pub struct ByBean;
#[derive(Debug, Clone, Copy)]
pub struct ByFields;
#[derive(Debug, Clone, Copy)]
pub struct ByConstructor;

fn check_names(target: &'static str, fields: &[&str], items: &[Expr]) -> QueryResult<()> {
    for (i, item) in items.iter().enumerate() {
        let name = item.name().ok_or_else(|| QueryError::UnmappedField {
            target,
            field: format!("#{}", i),
        })?;
        if !fields.contains(&name) {
            return Err(QueryError::UnmappedField {
                target,
                field: name.to_string(),
            });
        }
    }
    Ok(())
}

impl<D: FieldTarget + Default> MappingStrategy<D> for ByFields {
    fn check(items: &[Expr]) -> QueryResult<()> {
        check_names(D::NAME, D::FIELDS, items)
    }

    fn build(items: &[Expr], cells: &mut Cells) -> QueryResult<D> {
        let mut dto = D::default();
        for item in items {
            let v = cells.next_value()?;
            dto.assign_field(item.name().unwrap_or_default(), v)?;
        }
        Ok(dto)
    }
}

impl<D: BeanTarget + Default> MappingStrategy<D> for ByBean {
    fn check(items: &[Expr]) -> QueryResult<()> {
        check_names(<D as FieldTarget>::NAME, D::FIELDS, items)
    }

    fn build(items: &[Expr], cells: &mut Cells) -> QueryResult<D> {
        let mut dto = D::default();
        for item in items {
            let v = cells.next_value()?;
            dto.set_property(item.name().unwrap_or_default(), v)?;
        }
        Ok(dto)
    }
}

impl<D: ConstructorTarget> MappingStrategy<D> for ByConstructor {
    fn check(items: &[Expr]) -> QueryResult<()> {
        if items.len() != D::ARITY {
            return Err(QueryError::MappingArity {
                target: D::NAME,
                expected: D::ARITY,
                actual: items.len(),
            });
        }
        Ok(())
    }

    fn build(_items: &[Expr], cells: &mut Cells) -> QueryResult<D> {
        D::construct(cells)
    }
}

/// DTO projection; see [`Projections`].
pub struct DtoProjection<D, M> {
    items: Vec<Expr>,
    _mode: PhantomData<fn() -> (D, M)>,
}

impl<D, M> Clone for DtoProjection<D, M> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            _mode: PhantomData,
        }
    }
}

impl<D, M> DtoProjection<D, M> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            _mode: PhantomData,
        }
    }

    #[must_use]
    pub fn with(mut self, item: impl ValueExpr) -> Self {
        self.items.push(item.into_expr());
        self
    }
}

impl<D, M: MappingStrategy<D>> Projection for DtoProjection<D, M> {
    type Output = D;

    fn items(&self, _fetch: &[FetchJoin]) -> Vec<Expr> {
        self.items.clone()
    }

    fn read(&self, cells: &mut Cells, _fetch: &[FetchJoin]) -> QueryResult<D> {
        M::build(&self.items, cells)
    }

    fn check(&self) -> QueryResult<()> {
        M::check(&self.items)
    }
}

/// Constructors for the projection shapes.
pub struct Projections;

impl Projections {
    /// Default-construct, then call `set_<name>` for every selected column.
    pub fn bean<D: BeanTarget + Default>() -> DtoProjection<D, ByBean> {
        DtoProjection::new()
    }

    /// Default-construct, then assign fields by column name.
    pub fn fields<D: FieldTarget + Default>() -> DtoProjection<D, ByFields> {
        DtoProjection::new()
    }

    /// Positional construction; column count must equal the arity.
    pub fn constructor<D: ConstructorTarget>() -> DtoProjection<D, ByConstructor> {
        DtoProjection::new()
    }

    pub fn tuple() -> TupleProjection {
        TupleProjection::new()
    }

    pub fn map<P, F, R>(inner: P, f: F) -> Mapped<P, F>
    where
        P: Projection,
        F: Fn(P::Output) -> R,
    {
        Mapped { inner, f }
    }
}
