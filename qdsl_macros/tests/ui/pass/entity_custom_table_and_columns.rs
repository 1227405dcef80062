use qdsl_core::{Cells, Entity, EntityPath, Row, Value};
use qdsl_macros::Entity;

#[derive(Entity, Clone, Debug, PartialEq)]
#[entity(table = "people", alias = "person")]
struct Person {
    #[column(id, name = "person_id")]
    id: i64,
    #[column(name = "email_address")]
    email: String,
    #[column(skip)]
    cached: Option<String>,
    active: bool,
}

fn main() {
    assert_eq!(Person::SCHEMA.table, "people");
    let cols: Vec<_> = Person::SCHEMA.columns.iter().map(|c| c.column).collect();
    assert_eq!(cols, vec!["person_id", "email_address", "active"]);
    assert_eq!(Person::SCHEMA.id_column().map(|c| c.column), Some("person_id"));

    let mut cells = Cells::new(Row::new(vec![
        Value::I64(7),
        Value::from("a@b.c"),
        Value::I64(1),
    ]));
    let p = Person::read_row(&mut cells).unwrap();
    assert_eq!(p, Person { id: 7, email: "a@b.c".into(), cached: None, active: true });

    let other = QPerson::aliased("p2");
    assert_eq!(other.alias().as_ref(), "p2");
    let _ = other.email.eq("x");
}
