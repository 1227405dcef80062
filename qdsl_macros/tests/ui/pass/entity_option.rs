use qdsl_core::{Entity, EntityPath, Value, ValueKind};
use qdsl_macros::Entity;

#[derive(Entity, Clone, Debug, PartialEq)]
struct Article {
    #[column(id)]
    id: Option<i64>,
    title: String,
    // Optional fields map to nullable columns and insert as NULL when absent
    subtitle: Option<String>,
}

fn main() {
    // Macro should pluralize table name: "articles"
    assert_eq!(Article::SCHEMA.table, "articles");
    assert_eq!(Article::SCHEMA.default_alias, "article");
    let cols: Vec<_> = Article::SCHEMA.columns.iter().map(|c| c.column).collect();
    assert_eq!(cols, vec!["id", "title", "subtitle"]);
    let subtitle = &Article::SCHEMA.columns[2];
    assert!(subtitle.nullable);
    assert_eq!(subtitle.kind, ValueKind::Text);

    let mut a = Article { id: None, title: "t".into(), subtitle: None };
    assert_eq!(a.insert_values().unwrap(), vec![Value::from("t"), Value::Null]);
    a.set_id(5);
    assert_eq!(a.id(), Some(5));

    let q = QArticle::default();
    assert_eq!(q.alias().as_ref(), "article");
    let _pred = q.subtitle.is_null().and(q.title.starts_with("t"));
}
