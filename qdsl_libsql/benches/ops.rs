// Criterion benches for rendered selects and bulk updates on libsql (SQLite) in-memory.
// Run locally with:
//   cargo bench -p qdsl_libsql --features libsql-backend --bench ops

#![allow(unexpected_cfgs)]

#[cfg(feature = "libsql-backend")]
mod bench_impl {
    use criterion::{black_box, BatchSize, Criterion};
    use qdsl_core::{
        EntityPath, ExecContext, Expr, Join, JoinKind, Placeholder, Predicate, SelectSpec,
        Statement, StoreAdapter, UpdateSpec,
    };
    use qdsl_libsql::LibsqlStore;
    use tests_common::{migrations, QMember, QTeam};
    use tokio::runtime::Runtime;

    const SEED_SQL: &str = "INSERT INTO teams (name) VALUES ('teamA'), ('teamB');";

    fn setup_store(rt: &Runtime, members: usize) -> LibsqlStore {
        rt.block_on(async {
            let store = LibsqlStore::in_memory().await.expect("open db");
            store
                .migrate(migrations::LIBSQL_MEMBER_TEAM_SQL)
                .await
                .expect("apply schema");
            let mut sql = String::from(SEED_SQL);
            for i in 0..members {
                sql.push_str(&format!(
                    "INSERT INTO members (username, age, team_id) VALUES ('member{i}', {}, {});",
                    i % 60,
                    i % 2 + 1
                ));
            }
            store.migrate(&sql).await.expect("seed");
            store
        })
    }

    fn search_statement() -> Statement {
        let m = QMember::default();
        let t = QTeam::default();
        let spec = SelectSpec {
            items: vec![
                Expr::from(&m.id),
                Expr::from(&m.username),
                Expr::from(&m.age),
                Expr::from(&t.name),
            ],
            from: Some(m.source()),
            joins: vec![Join {
                kind: JoinKind::Left,
                target: t.source(),
                relation: Some(m.team.relation()),
                on: Predicate::True,
                fetch: false,
            }],
            filter: t.name.eq("teamB").and(m.age.between(10, 40)),
            order_by: vec![m.age.desc().into_spec()],
            limit: Some(20),
            ..SelectSpec::default()
        };
        qdsl_sql_builder::render_select_with(&spec, Placeholder::Question).expect("render select")
    }

    fn bump_statement() -> Statement {
        let m = QMember::default();
        let spec = UpdateSpec {
            target: m.source(),
            assignments: vec![qdsl_core::Assignment {
                column: "age",
                entity: m.alias().clone(),
                value: Expr::from(&m.age.add(1)),
            }],
            filter: m.age.lt(28),
        };
        qdsl_sql_builder::render_update_with(&spec, Placeholder::Question).expect("render update")
    }

    pub fn bench_select(c: &mut Criterion) {
        let rt = Runtime::new().unwrap();
        let store = setup_store(&rt, 500);
        let stmt = search_statement();
        let ctx = ExecContext::default();

        let mut group = c.benchmark_group("libsql_select");
        group.bench_function("join_filter_order_limit", |b| {
            b.iter(|| {
                let rows = rt
                    .block_on(store.execute_query(&stmt, &ctx))
                    .expect("query");
                black_box(rows);
            })
        });
        group.bench_function("render_only", |b| {
            b.iter(|| black_box(search_statement()))
        });
        group.finish();
    }

    pub fn bench_bulk_update(c: &mut Criterion) {
        let rt = Runtime::new().unwrap();
        let stmt = bump_statement();
        let ctx = ExecContext::default();

        let mut group = c.benchmark_group("libsql_bulk_update");
        group.bench_function("bump_age_under_28", |b| {
            b.iter_batched(
                || setup_store(&rt, 200),
                |store| {
                    let n = rt
                        .block_on(store.execute_mutation(&stmt, &ctx))
                        .expect("update");
                    black_box(n);
                },
                BatchSize::SmallInput,
            )
        });
        group.finish();
    }
}

// Define the Criterion entry points at the crate root so `main` exists at crate level.
#[cfg(feature = "libsql-backend")]
use bench_impl::{bench_bulk_update, bench_select};
#[cfg(feature = "libsql-backend")]
criterion::criterion_group!(benches, bench_select, bench_bulk_update);
#[cfg(feature = "libsql-backend")]
criterion::criterion_main!(benches);

// Fallback when feature is not enabled: provide a dummy main so the bench binary compiles.
#[cfg(not(feature = "libsql-backend"))]
fn main() {
    eprintln!("Enable feature libsql-backend to run benches.");
}
