use qdsl_macros::Entity;

#[derive(Entity)]
struct TwoIds {
    #[column(id)]
    id1: i64,
    #[column(id)]
    id2: i64,
}

fn main() {}
