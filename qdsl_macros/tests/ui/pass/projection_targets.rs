use qdsl_core::{BeanTarget, ConstructorTarget, FieldTarget, Value};
use qdsl_macros::Projection;

#[derive(Projection, Default, Debug, PartialEq)]
#[projection(setters)]
struct MemberDto {
    username: Option<String>,
    age: i32,
}

impl MemberDto {
    fn set_username(&mut self, username: Option<String>) {
        self.username = username.map(|u| u.to_uppercase());
    }

    fn set_age(&mut self, age: i32) {
        self.age = age;
    }
}

fn main() {
    assert_eq!(<MemberDto as FieldTarget>::FIELDS, &["username", "age"]);
    assert_eq!(<MemberDto as ConstructorTarget>::ARITY, 2);

    let mut by_field = MemberDto::default();
    by_field.assign_field("username", Value::from("m1")).unwrap();
    assert_eq!(by_field.username.as_deref(), Some("m1"));

    let mut by_setter = MemberDto::default();
    by_setter.set_property("username", Value::from("m1")).unwrap();
    by_setter.set_property("age", Value::I64(10)).unwrap();
    assert_eq!(by_setter.username.as_deref(), Some("M1"));
    assert!(by_setter.set_property("name", Value::Null).is_err());
}
