#![allow(unexpected_cfgs)]
//! Common integration testing utilities: the Member/Team model, its
//! migrations, seed data and scenarios reusable across stores.

use async_trait::async_trait;
use qdsl::{Entity, Predicate, Projection, QueryFactory, QueryResult, Related, StoreAdapter};
use std::sync::Arc;

#[derive(Entity, Clone, Debug, PartialEq)]
pub struct Team {
    #[column(id, name = "team_id")]
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

#[derive(Entity, Clone, Debug, PartialEq)]
pub struct Member {
    #[column(id, name = "member_id")]
    pub id: Option<i64>,
    pub username: Option<String>,
    pub age: i32,
    #[column(name = "team_id")]
    pub team: Related<Team>,
}

impl Member {
    pub fn new(username: &str, age: i32, team: Option<&Team>) -> Self {
        Self {
            id: None,
            username: Some(username.to_string()),
            age,
            team: team.map_or(Related::Absent, Related::to),
        }
    }
}

/// Filled through its setters.
#[derive(Projection, Default, Debug, Clone, PartialEq)]
#[projection(setters)]
pub struct MemberDto {
    pub username: Option<String>,
    pub age: i32,
}

impl MemberDto {
    pub fn new(username: Option<String>, age: i32) -> Self {
        Self { username, age }
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_age(&mut self, age: i32) {
        self.age = age;
    }
}

/// Field names differ from the entity: `name` must be aliased from `username`.
#[derive(Projection, Default, Debug, Clone, PartialEq)]
pub struct UserDto {
    pub name: Option<String>,
    pub age: i32,
}

#[derive(Projection, Default, Debug, Clone, PartialEq)]
pub struct MemberTeamDto {
    pub member_id: Option<i64>,
    pub username: Option<String>,
    pub age: i32,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
}

/// Optional search inputs; absent fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberSearchCondition {
    pub username: Option<String>,
    pub team_name: Option<String>,
    pub age_goe: Option<i32>,
    pub age_loe: Option<i32>,
}

impl MemberSearchCondition {
    pub fn filters(&self, member: &QMember, team: &QTeam) -> [Option<Predicate>; 4] {
        [
            member.username.eq_opt(self.username.clone()),
            team.name.eq_opt(self.team_name.clone()),
            member.age.goe_opt(self.age_goe),
            member.age.loe_opt(self.age_loe),
        ]
    }
}

/// Expose migration SQL via constants for harnesses.
pub mod migrations {
    pub const LIBSQL_MEMBER_TEAM_SQL: &str =
        include_str!("../migrations/libsql/001_member_team.sql");
}

#[async_trait]
pub trait StoreFactory {
    /// Construct a clean store with the member/team schema applied.
    async fn new_store(&self) -> QueryResult<Arc<dyn StoreAdapter>>;
}

/// Rows written by [`seed`], with their generated ids.
#[derive(Debug, Clone)]
pub struct Seeded {
    pub team_a: Team,
    pub team_b: Team,
    pub members: Vec<Member>,
}

/// teamA: member1 (10), member2 (20); teamB: member3 (30), member4 (40).
pub async fn seed<S: StoreAdapter + ?Sized>(qf: &QueryFactory<S>) -> QueryResult<Seeded> {
    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    qf.persist(&mut team_a).await?;
    qf.persist(&mut team_b).await?;

    let mut members = vec![
        Member::new("member1", 10, Some(&team_a)),
        Member::new("member2", 20, Some(&team_a)),
        Member::new("member3", 30, Some(&team_b)),
        Member::new("member4", 40, Some(&team_b)),
    ];
    for m in members.iter_mut() {
        qf.persist(m).await?;
    }
    Ok(Seeded {
        team_a,
        team_b,
        members,
    })
}

/// Search with a partially filled condition joins teams and honours every present field.
pub async fn test_search_by_condition<F: StoreFactory + Sync>(f: &F) -> QueryResult<()> {
    let qf = QueryFactory::from_arc(f.new_store().await?);
    seed(&qf).await?;
    let member = QMember::default();
    let team = QTeam::default();

    let cond = MemberSearchCondition {
        team_name: Some("teamB".into()),
        age_goe: Some(35),
        age_loe: Some(40),
        ..Default::default()
    };
    let found = qf
        .select_from(&member)
        .left_join(&member.team, &team)
        .filter(cond.filters(&member, &team))
        .fetch()
        .await?;
    let names: Vec<_> = found.iter().filter_map(|m| m.username.clone()).collect();
    assert_eq!(names, vec!["member4".to_string()]);

    let all = qf
        .select_from(&member)
        .left_join(&member.team, &team)
        .filter(MemberSearchCondition::default().filters(&member, &team))
        .fetch_count()
        .await?;
    assert_eq!(all, 4);
    Ok(())
}

/// Bulk update and delete report the same number of rows a count sees beforehand.
pub async fn test_bulk_mutations_match_count<F: StoreFactory + Sync>(f: &F) -> QueryResult<()> {
    let qf = QueryFactory::from_arc(f.new_store().await?);
    seed(&qf).await?;
    let member = QMember::default();

    let younger = member.age.lt(28);
    let expected = qf.select_from(&member).filter(younger.clone()).fetch_count().await?;
    let updated = qf
        .update(&member)
        .set(&member.username, "guest")
        .filter(younger)
        .execute()
        .await?;
    assert_eq!(updated, expected);

    let older = member.age.gt(18);
    let expected = qf.select_from(&member).filter(older.clone()).fetch_count().await?;
    let deleted = qf.delete(&member).filter(older).execute().await?;
    assert_eq!(deleted, expected);
    assert_eq!(qf.select_from(&member).fetch_count().await?, 4 - expected);
    Ok(())
}


#[cfg(test)]
mod in_memory_store_tests {
    use super::*;
    use qdsl::{ExecContext, Row, Statement, StatementKind, Value};
    use std::sync::Mutex;

    /// Hands out increasing ids and remembers inserted parameters.
    #[derive(Default)]
    struct MemStore {
        inserts: Mutex<Vec<Vec<Value>>>,
    }

    #[async_trait]
    impl StoreAdapter for MemStore {
        async fn execute_query(&self, _stmt: &Statement, _ctx: &ExecContext) -> QueryResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute_mutation(&self, _stmt: &Statement, _ctx: &ExecContext) -> QueryResult<u64> {
            Ok(0)
        }

        async fn execute_insert(&self, stmt: &Statement, _ctx: &ExecContext) -> QueryResult<i64> {
            assert_eq!(stmt.kind, StatementKind::Insert);
            let mut g = self.inserts.lock().unwrap();
            g.push(stmt.params.clone());
            Ok(g.len() as i64)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seed_links_members_to_persisted_teams() -> QueryResult<()> {
        let store = Arc::new(MemStore::default());
        let qf = QueryFactory::from_arc(store.clone());
        let seeded = seed(&qf).await?;
        assert_eq!(seeded.team_a.id, Some(1));
        assert_eq!(seeded.team_b.id, Some(2));
        assert_eq!(seeded.members[3].id, Some(6));

        let inserts = store.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 6);
        assert_eq!(
            inserts[2],
            vec![Value::from("member1"), Value::I32(10), Value::I64(1)]
        );
        assert_eq!(inserts[5][2], Value::I64(2));
        Ok(())
    }
}
