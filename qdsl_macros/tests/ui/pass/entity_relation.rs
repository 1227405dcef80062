use qdsl_core::{Cells, Entity, EntityPath, FetchJoin, Projection, Related, Row, Value};
use qdsl_macros::Entity;

#[derive(Entity, Clone, Debug, PartialEq)]
struct Team {
    #[column(id, name = "team_id")]
    id: Option<i64>,
    name: String,
}

#[derive(Entity, Clone, Debug, PartialEq)]
struct Member {
    #[column(id, name = "member_id")]
    id: Option<i64>,
    username: Option<String>,
    #[column(name = "team_id")]
    team: Related<Team>,
}

fn main() {
    let team_col = Member::SCHEMA.column("team").unwrap();
    assert_eq!(team_col.relation, Some("Team"));
    assert!(team_col.nullable);

    let m = QMember::default();
    let t = QTeam::default();
    let fetch = vec![FetchJoin {
        owner: m.alias().clone(),
        field: "team",
        target: t.source(),
    }];
    assert_eq!(m.items(&fetch).len(), 5);

    let mut cells = Cells::new(Row::new(vec![
        Value::I64(1),
        Value::from("member1"),
        Value::I64(3),
        Value::I64(3),
        Value::from("teamA"),
    ]));
    let member = m.read(&mut cells, &fetch).unwrap();
    assert_eq!(member.team.get().map(|t| t.name.as_str()), Some("teamA"));

    let unsaved = Member {
        id: None,
        username: None,
        team: Related::to(&Team { id: None, name: "x".into() }),
    };
    assert!(unsaved.insert_values().is_err());
    let _ = m.team.id().eq(3i64);
}
