//! The select builder returned by [`QueryFactory::select`](crate::QueryFactory::select).

use crate::factory::run_query;
use qdsl_core::validate::check_select;
use qdsl_core::{
    Cells, Entity, EntityPath, ExecContext, FetchJoin, FromValue, IntoFilter, Join, JoinKind,
    OrderSpecifier, Predicate, Projection, QueryError, QueryResult, RelationPath, SelectSpec,
    Statement, StoreAdapter, Value, ValueExpr,
};
use qdsl_sql_builder::{render_count_with, render_select_with};
use std::sync::Arc;

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl<T> Page<T> {
    /// True when rows exist past this page.
    pub fn has_next(&self) -> bool {
        let start = self.offset.unwrap_or(0).max(0) as u64;
        start + (self.items.len() as u64) < self.total
    }
}

/// A select under construction.
///
/// Builder methods never fail; misuse is remembered and reported by the
/// first terminal operation, before anything reaches the store.
pub struct SelectQuery<S: ?Sized, P> {
    store: Arc<S>,
    ctx: ExecContext,
    projection: P,
    spec: SelectSpec,
    misuse: Option<String>,
}

impl<S: ?Sized, P: Clone> Clone for SelectQuery<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ctx: self.ctx.clone(),
            projection: self.projection.clone(),
            spec: self.spec.clone(),
            misuse: self.misuse.clone(),
        }
    }
}

impl<S, P> SelectQuery<S, P>
where
    S: StoreAdapter + ?Sized,
    P: Projection,
{
    pub(crate) fn new(store: Arc<S>, ctx: ExecContext, projection: P) -> Self {
        Self {
            store,
            ctx,
            projection,
            spec: SelectSpec::default(),
            misuse: None,
        }
    }

    fn misuse(mut self, msg: impl Into<String>) -> Self {
        if self.misuse.is_none() {
            self.misuse = Some(msg.into());
        }
        self
    }

    fn push_join(mut self, join: Join) -> Self {
        self.spec.joins.push(join);
        self
    }

    /// Root entity of the query. Only one `from` is accepted; extra
    /// entities are joined explicitly (`cross_join` for theta joins).
    pub fn from<Q: EntityPath>(mut self, path: &Q) -> Self {
        if let Some(existing) = &self.spec.from {
            let msg = format!(
                "`{}` is already the root of this query; join `{}` explicitly",
                existing.alias,
                path.alias()
            );
            return self.misuse(msg);
        }
        self.spec.from = Some(path.source());
        self
    }

    /// Inner join along a declared many-to-one relation.
    pub fn join<E: Entity>(self, relation: &RelationPath<E>, target: &E::Path) -> Self {
        self.relation_join(JoinKind::Inner, relation, target)
    }

    pub fn left_join<E: Entity>(self, relation: &RelationPath<E>, target: &E::Path) -> Self {
        self.relation_join(JoinKind::Left, relation, target)
    }

    fn relation_join<E: Entity>(
        self,
        kind: JoinKind,
        relation: &RelationPath<E>,
        target: &E::Path,
    ) -> Self {
        self.push_join(Join {
            kind,
            target: target.source(),
            relation: Some(relation.relation()),
            on: Predicate::True,
            fetch: false,
        })
    }

    /// Inner join without a declared relation.
    pub fn join_on<Q: EntityPath>(self, target: &Q, on: Predicate) -> Self {
        self.push_join(Join {
            kind: JoinKind::Inner,
            target: target.source(),
            relation: None,
            on,
            fetch: false,
        })
    }

    pub fn left_join_on<Q: EntityPath>(self, target: &Q, on: Predicate) -> Self {
        self.push_join(Join {
            kind: JoinKind::Left,
            target: target.source(),
            relation: None,
            on,
            fetch: false,
        })
    }

    /// Theta join. The condition goes into `on` or `filter`.
    pub fn cross_join<Q: EntityPath>(self, target: &Q) -> Self {
        self.push_join(Join {
            kind: JoinKind::Cross,
            target: target.source(),
            relation: None,
            on: Predicate::True,
            fetch: false,
        })
    }

    /// Extra condition on the most recent join.
    pub fn on(mut self, filter: impl IntoFilter) -> Self {
        match self.spec.joins.last_mut() {
            Some(join) => {
                let on = std::mem::take(&mut join.on);
                join.on = on.and(filter.into_filter());
                self
            }
            None => self.misuse("`on` requires a preceding join"),
        }
    }

    /// Populate the relation of the most recent join on the owning entity.
    pub fn fetch_join(mut self) -> Self {
        match self.spec.joins.last_mut() {
            Some(join) => {
                join.fetch = true;
                self
            }
            None => self.misuse("`fetch_join` requires a preceding join"),
        }
    }

    /// Repeated calls AND together; lists are ANDed and `None` entries dropped.
    pub fn filter(mut self, filter: impl IntoFilter) -> Self {
        let current = std::mem::take(&mut self.spec.filter);
        self.spec.filter = current.and(filter.into_filter());
        self
    }

    pub fn group_by(mut self, expr: impl ValueExpr) -> Self {
        self.spec.group_by.push(expr.into_expr());
        self
    }

    pub fn having(mut self, filter: impl IntoFilter) -> Self {
        let current = std::mem::take(&mut self.spec.having);
        self.spec.having = current.and(filter.into_filter());
        self
    }

    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.spec.order_by.push(order.into_spec());
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.spec.offset = Some(n);
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.spec.limit = Some(n);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.spec.distinct = true;
        self
    }

    fn fetch_joins(&self) -> Vec<FetchJoin> {
        self.spec
            .joins
            .iter()
            .filter(|j| j.fetch)
            .filter_map(|j| {
                j.relation.as_ref().map(|r| FetchJoin {
                    owner: r.owner.clone(),
                    field: r.field,
                    target: j.target.clone(),
                })
            })
            .collect()
    }

    /// Final statement shape with the projection's items, validated.
    fn prepare(&self) -> QueryResult<(SelectSpec, Vec<FetchJoin>)> {
        if let Some(msg) = &self.misuse {
            return Err(QueryError::InvalidSource(msg.clone()));
        }
        let fetch = self.fetch_joins();
        let mut spec = self.spec.clone();
        spec.items = self.projection.items(&fetch);
        check_select(&spec, &self.projection.entity_aliases())?;
        self.projection.check()?;
        Ok((spec, fetch))
    }

    /// The validated statement shape, e.g. for use as a subquery or in tests.
    pub fn spec(&self) -> QueryResult<SelectSpec> {
        self.prepare().map(|(spec, _)| spec)
    }

    /// Validate and render without executing.
    pub fn build(&self) -> QueryResult<Statement> {
        let (spec, _) = self.prepare()?;
        render_select_with(&spec, self.store.placeholder())
    }

    async fn fetch_with(
        &self,
        spec: &SelectSpec,
        fetch: &[FetchJoin],
    ) -> QueryResult<Vec<P::Output>> {
        let stmt = render_select_with(spec, self.store.placeholder())?;
        let rows = run_query(&*self.store, &stmt, &self.ctx).await?;
        rows.into_iter()
            .map(|row| self.projection.read(&mut Cells::new(row), fetch))
            .collect()
    }

    pub async fn fetch(&self) -> QueryResult<Vec<P::Output>> {
        let (spec, fetch) = self.prepare()?;
        self.fetch_with(&spec, &fetch).await
    }

    /// `None` for no match; more than one match is an error.
    pub async fn fetch_one(&self) -> QueryResult<Option<P::Output>> {
        let (mut spec, fetch) = self.prepare()?;
        spec.limit = Some(spec.limit.map_or(2, |l| l.min(2)));
        let mut rows = self.fetch_with(&spec, &fetch).await?;
        if rows.len() > 1 {
            return Err(QueryError::NonUniqueResult);
        }
        Ok(rows.pop())
    }

    pub async fn fetch_first(&self) -> QueryResult<Option<P::Output>> {
        let (mut spec, fetch) = self.prepare()?;
        spec.limit = Some(spec.limit.map_or(1, |l| l.min(1)));
        Ok(self.fetch_with(&spec, &fetch).await?.into_iter().next())
    }

    /// Number of rows the query matches, ignoring ordering and paging.
    pub async fn fetch_count(&self) -> QueryResult<u64> {
        let (spec, _) = self.prepare()?;
        self.count_with(&spec).await
    }

    async fn count_with(&self, spec: &SelectSpec) -> QueryResult<u64> {
        let stmt = render_count_with(spec, self.store.placeholder())?;
        let rows = run_query(&*self.store, &stmt, &self.ctx).await?;
        let value = rows
            .into_iter()
            .next()
            .and_then(|r| r.into_values().into_iter().next())
            .unwrap_or(Value::I64(0));
        let n = i64::from_value(value)?;
        u64::try_from(n).map_err(QueryError::mapping)
    }

    /// The current page plus the total count; two round-trips.
    pub async fn fetch_page(&self) -> QueryResult<Page<P::Output>> {
        let (spec, fetch) = self.prepare()?;
        let total = self.count_with(&spec).await?;
        let items = self.fetch_with(&spec, &fetch).await?;
        Ok(Page {
            items,
            total,
            offset: spec.offset,
            limit: spec.limit,
        })
    }
}

#[cfg(feature = "stream-ext")]
impl<S, P> SelectQuery<S, P>
where
    S: StoreAdapter + ?Sized,
    P: Projection + Sync,
{
    /// Yields the rows of [`fetch`](Self::fetch) one by one. The rows are
    /// still materialized by a single round-trip.
    pub fn fetch_stream(
        &self,
    ) -> std::pin::Pin<Box<dyn futures_core::Stream<Item = QueryResult<P::Output>> + '_>> {
        Box::pin(async_stream::try_stream! {
            let items = self.fetch().await?;
            for item in items {
                yield item;
            }
        })
    }
}
