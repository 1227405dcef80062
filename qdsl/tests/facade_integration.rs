#![allow(unexpected_cfgs)]
//! End-to-end queries through the facade against an in-memory libsql store.

use qdsl::*;
use qdsl_libsql::LibsqlStore;
use tests_common::{migrations, seed, Member, QMember, QTeam, Seeded, Team};

async fn setup() -> QueryResult<(QueryFactory<LibsqlStore>, Seeded)> {
    let store = LibsqlStore::in_memory().await?;
    store.migrate(migrations::LIBSQL_MEMBER_TEAM_SQL).await?;
    let qf = QueryFactory::new(store);
    let seeded = seed(&qf).await?;
    Ok((qf, seeded))
}

fn names(found: &[Member]) -> Vec<&str> {
    found.iter().filter_map(|m| m.username.as_deref()).collect()
}

#[tokio::test]
async fn search_with_and_or() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let found = qf
        .select_from(&m)
        .filter(m.username.eq("member1").and(m.age.eq(10)))
        .fetch_one()
        .await?
        .expect("member1");
    assert_eq!(found.username.as_deref(), Some("member1"));
    assert_eq!(found.age, 10);

    // Array form is an AND of its parts; absent parts vanish.
    let found = qf
        .select_from(&m)
        .filter([m.username.eq_opt(Some("member1")), m.age.eq_opt(None::<i32>)])
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["member1"]);

    let found = qf
        .select_from(&m)
        .filter(m.age.lt(15).or(m.age.gt(35)))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["member1", "member4"]);

    let found = qf
        .select_from(&m)
        .filter(m.age.between(20, 30).and(m.username.contains("member")))
        .order_by(m.age.desc())
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["member3", "member2"]);

    let found = qf
        .select_from(&m)
        .filter(m.age.is_in([10, 40]).not())
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["member2", "member3"]);
    Ok(())
}

#[tokio::test]
async fn fetch_first_and_fetch_one() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let first = qf
        .select_from(&m)
        .order_by(m.age.desc())
        .fetch_first()
        .await?
        .expect("some member");
    assert_eq!(first.age, 40);

    let err = qf.select_from(&m).fetch_one().await.unwrap_err();
    assert!(matches!(err, QueryError::NonUniqueResult));

    let none = qf
        .select_from(&m)
        .filter(m.username.eq("nobody"))
        .fetch_one()
        .await?;
    assert!(none.is_none());
    Ok(())
}

#[tokio::test]
async fn relation_join_filters_on_team() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let t = QTeam::default();

    let found = qf
        .select_from(&m)
        .join(&m.team, &t)
        .filter(t.name.eq("teamA"))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["member1", "member2"]);
    // A plain join leaves the relation unloaded.
    assert!(matches!(found[0].team, Related::Unloaded(_)));
    Ok(())
}

#[tokio::test]
async fn left_join_keeps_members_without_team() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let t = QTeam::default();
    let mut loner = Member::new("member5", 50, None);
    qf.persist(&mut loner).await?;

    let rows = qf
        .select(Projections::tuple().with(&m.username).with(&t.name))
        .from(&m)
        .left_join(&m.team, &t)
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[4].get(&m.username)?, Some("member5".to_string()));
    assert_eq!(rows[4].get_at::<Option<String>>(1)?, None);
    assert_eq!(rows[0].get(&t.name)?, "teamA");

    let inner = qf.select_from(&m).join(&m.team, &t).fetch_count().await?;
    assert_eq!(inner, 4);
    Ok(())
}

#[tokio::test]
async fn join_on_narrows_the_joined_rows() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let t = QTeam::default();

    let rows = qf
        .select(Projections::tuple().with(&m.username).with(&t.name))
        .from(&m)
        .left_join(&m.team, &t)
        .on(t.name.eq("teamA"))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    let teams = rows
        .iter()
        .map(|row| row.get_at::<Option<String>>(1))
        .collect::<QueryResult<Vec<_>>>()?;
    assert_eq!(
        teams,
        vec![Some("teamA".into()), Some("teamA".into()), None, None]
    );
    Ok(())
}

#[tokio::test]
async fn fetch_join_loads_relation() -> QueryResult<()> {
    let (qf, seeded) = setup().await?;
    let m = QMember::default();
    let t = QTeam::default();

    let found = qf
        .select_from(&m)
        .join(&m.team, &t)
        .fetch_join()
        .filter(m.username.eq("member1"))
        .fetch_one()
        .await?
        .expect("member1");
    assert!(found.team.is_loaded());
    assert_eq!(found.team.get(), Some(&seeded.team_a));
    Ok(())
}

#[tokio::test]
async fn theta_join_matches_unrelated_columns() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    for name in ["teamA", "teamB", "teamC"] {
        qf.persist(&mut Member::new(name, 0, None)).await?;
    }
    let m = QMember::default();
    let t = QTeam::default();

    let found = qf
        .select_from(&m)
        .cross_join(&t)
        .filter(m.username.eq(&t.name))
        .order_by(m.username.asc())
        .fetch()
        .await?;
    assert_eq!(names(&found), vec!["teamA", "teamB"]);

    let err = qf.select_from(&m).cross_join(&t).fetch().await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidSource(_)));
    Ok(())
}

#[tokio::test]
async fn subqueries_in_where_and_select() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let ms = QMember::new("member_sub");

    let oldest = qf
        .select_from(&m)
        .filter(m.age.eq(sub::select(ms.age.max()).from(&ms)))
        .fetch()
        .await?;
    assert_eq!(names(&oldest), vec!["member4"]);

    let above_avg = qf
        .select_from(&m)
        .filter(m.age.goe(sub::select(ms.age.avg()).from(&ms)))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&above_avg), vec!["member3", "member4"]);

    let in_set = qf
        .select_from(&m)
        .filter(m.age.in_subquery(sub::select(&ms.age).from(&ms).filter(ms.age.gt(10))))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&in_set), vec!["member2", "member3", "member4"]);

    // Oldest member of each team, correlated on the outer row's team.
    let per_team = qf
        .select_from(&m)
        .filter(
            m.age.eq(sub::select(ms.age.max())
                .from(&ms)
                .filter(ms.team.id().eq(&m.team.id()))),
        )
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(names(&per_team), vec!["member2", "member4"]);

    let with_avg = qf
        .select((m.username.clone(), sub::select(ms.age.avg()).from(&ms)))
        .from(&m)
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(with_avg.len(), 4);
    assert!(with_avg.iter().all(|(_, avg)| *avg == Some(25.0)));
    Ok(())
}

#[tokio::test]
async fn multi_column_subquery_is_rejected() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let ms = QMember::new("member_sub");

    let mut wide = sub::select(&ms.age).from(&ms).into_spec();
    wide.items.push(Expr::from(&ms.username));
    let err = qf
        .select_from(&m)
        .filter(Predicate::InSubquery {
            expr: Expr::from(&m.age),
            query: Box::new(wide),
        })
        .fetch()
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::SubqueryArity(_)));
    Ok(())
}

#[tokio::test]
async fn case_expressions() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let simple = qf
        .select(
            m.age
                .when(10)
                .then("ten")
                .when(20)
                .then("twenty")
                .otherwise("other"),
        )
        .from(&m)
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(simple, vec!["ten", "twenty", "other", "other"]);

    let searched = qf
        .select(
            CaseBuilder::new()
                .when(m.age.between(0, 20))
                .then("0-20")
                .when(m.age.between(21, 30))
                .then("21-30")
                .otherwise("other"),
        )
        .from(&m)
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(searched, vec!["0-20", "0-20", "21-30", "other"]);

    let open_ended = qf
        .select(m.age.when(10).then("ten").end())
        .from(&m)
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(open_ended, vec![Some("ten".to_string()), None, None, None]);
    Ok(())
}

#[tokio::test]
async fn constants_concat_and_functions() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let with_constant = qf
        .select((m.username.clone(), Expressions::constant("A")))
        .from(&m)
        .filter(m.age.eq(10))
        .fetch()
        .await?;
    assert_eq!(with_constant, vec![(Some("member1".to_string()), "A".to_string())]);

    let joined = qf
        .select(m.username.concat("_").concat(m.age.string_value()))
        .from(&m)
        .filter(m.username.eq("member1"))
        .fetch_one()
        .await?;
    assert_eq!(joined, Some(Some("member1_10".to_string())));

    let replaced = qf
        .select(
            Expressions::function::<Option<String>>("replace")
                .arg(&m.username)
                .arg("member")
                .arg("M")
                .build(),
        )
        .from(&m)
        .order_by(m.age.asc())
        .fetch_first()
        .await?;
    assert_eq!(replaced, Some(Some("M1".to_string())));

    let upper = qf
        .select_from(&m)
        .filter(m.username.upper().eq("MEMBER2"))
        .fetch()
        .await?;
    assert_eq!(names(&upper), vec!["member2"]);
    Ok(())
}

#[tokio::test]
async fn aggregates_group_by_and_having() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let t = QTeam::default();

    let totals = qf
        .select((
            Expressions::count_all(),
            m.age.sum(),
            m.age.avg(),
            m.age.max(),
        ))
        .from(&m)
        .fetch_one()
        .await?
        .expect("one row");
    assert_eq!(totals, (4, Some(100), Some(25.0), Some(40)));

    let per_team = qf
        .select((t.name.clone(), m.age.avg()))
        .from(&m)
        .join(&m.team, &t)
        .group_by(&t.name)
        .order_by(t.name.asc())
        .fetch()
        .await?;
    assert_eq!(
        per_team,
        vec![
            ("teamA".to_string(), Some(15.0)),
            ("teamB".to_string(), Some(35.0)),
        ]
    );

    let busy = qf
        .select(t.name.clone())
        .from(&m)
        .join(&m.team, &t)
        .group_by(&t.name)
        .having(m.age.avg().gt(20))
        .fetch()
        .await?;
    assert_eq!(busy, vec!["teamB".to_string()]);
    Ok(())
}

#[tokio::test]
async fn order_by_with_nulls_last() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();
    let mut unnamed = Member::new("", 100, None);
    unnamed.username = None;
    qf.persist(&mut unnamed).await?;
    qf.persist(&mut Member::new("member5", 100, None)).await?;
    qf.persist(&mut Member::new("member6", 100, None)).await?;

    let found = qf
        .select_from(&m)
        .filter(m.age.eq(100))
        .order_by(m.age.desc())
        .order_by(m.username.asc().nulls_last())
        .fetch()
        .await?;
    let usernames: Vec<Option<String>> = found.into_iter().map(|m| m.username).collect();
    assert_eq!(
        usernames,
        vec![Some("member5".into()), Some("member6".into()), None]
    );

    let found = qf
        .select(m.username.clone())
        .from(&m)
        .filter(m.age.eq(100))
        .order_by(m.username.asc().nulls_first())
        .fetch_first()
        .await?;
    assert_eq!(found, Some(None));
    Ok(())
}

#[tokio::test]
async fn paging_and_counting() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let page = qf
        .select_from(&m)
        .order_by(m.username.desc())
        .offset(1)
        .limit(2)
        .fetch_page()
        .await?;
    assert_eq!(page.total, 4);
    assert_eq!(page.offset, Some(1));
    assert_eq!(page.limit, Some(2));
    assert_eq!(names(&page.items), vec!["member3", "member2"]);
    assert!(page.has_next());

    let tail = qf
        .select_from(&m)
        .order_by(m.username.desc())
        .offset(3)
        .fetch()
        .await?;
    assert_eq!(names(&tail), vec!["member1"]);

    let distinct_teams = qf
        .select(m.team.id())
        .from(&m)
        .distinct()
        .fetch_count()
        .await?;
    assert_eq!(distinct_teams, 2);
    Ok(())
}

#[tokio::test]
async fn bulk_update_and_delete() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let m = QMember::default();

    let renamed = qf
        .update(&m)
        .set(&m.username, "guest")
        .filter(m.age.lt(28))
        .execute()
        .await?;
    assert_eq!(renamed, 2);

    let bumped = qf.update(&m).set(&m.age, m.age.add(1)).execute().await?;
    assert_eq!(bumped, 4);
    let ages = qf.select(m.age.clone()).from(&m).order_by(m.age.asc()).fetch().await?;
    assert_eq!(ages, vec![11, 21, 31, 41]);

    let doubled = qf
        .update(&m)
        .set(&m.age, m.age.multiply(2))
        .filter(m.username.eq("guest"))
        .execute()
        .await?;
    assert_eq!(doubled, 2);
    let guests = qf
        .select(m.age.clone())
        .from(&m)
        .filter(m.username.eq("guest"))
        .order_by(m.age.asc())
        .fetch()
        .await?;
    assert_eq!(guests, vec![22, 42]);

    let cleared = qf
        .update(&m)
        .set_null(&m.username)
        .filter(m.age.gt(40))
        .execute()
        .await?;
    assert_eq!(cleared, 2);

    let deleted = qf.delete(&m).filter(m.username.is_null()).execute().await?;
    assert_eq!(deleted, 2);
    assert_eq!(qf.delete(&m).execute().await?, 2);
    assert_eq!(qf.select_from(&m).fetch_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn persisted_rows_read_back() -> QueryResult<()> {
    let (qf, seeded) = setup().await?;
    let t = QTeam::default();

    let teams = qf.select_from(&t).order_by(t.name.asc()).fetch().await?;
    assert_eq!(teams, vec![seeded.team_a.clone(), seeded.team_b.clone()]);

    let mut transient = Member::new("member9", 9, Some(&Team::new("teamZ")));
    let err = qf.persist(&mut transient).await.unwrap_err();
    assert!(matches!(err, QueryError::TransientReference { field: "team" }));
    assert_eq!(transient.id, None);
    Ok(())
}

#[derive(Entity, Clone, Debug, PartialEq)]
struct Ghost {
    #[column(id)]
    id: Option<i64>,
    label: String,
}

#[tokio::test]
async fn store_failures_surface_as_store_errors() -> QueryResult<()> {
    let (qf, _) = setup().await?;
    let g = QGhost::default();

    let err = qf.select_from(&g).fetch().await.unwrap_err();
    assert!(matches!(err, QueryError::Store { .. }));
    assert!(!err.is_build_error());

    // Build errors are raised before the store is touched.
    let err = qf.select_from(&g).limit(-1).fetch().await.unwrap_err();
    assert!(err.is_build_error());
    Ok(())
}
