use qdsl_macros::Entity;

#[derive(Entity)]
struct BadColumn {
    #[column(id)]
    id: Option<i64>,
    #[column(name = "user-name")]
    username: String,
}

fn main() {}
