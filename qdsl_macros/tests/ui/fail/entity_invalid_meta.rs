use qdsl_macros::Entity;

#[derive(Entity)]
struct BadMeta {
    #[column(id)]
    id: Option<i64>,
    #[column(name)]
    title: String,
}

fn main() {}
