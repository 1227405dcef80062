use qdsl_macros::Entity;

#[derive(Entity)]
struct NoId {
    name: String,
}

fn main() {}
