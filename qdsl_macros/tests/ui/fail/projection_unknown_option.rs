use qdsl_macros::Projection;

#[derive(Projection, Default)]
#[projection(getters)]
struct Dto {
    name: String,
}

fn main() {}
