use modkit_shape::Accessible;

#[derive(Accessible)]
pub struct Pair(pub i32, pub i32);

fn main() {}
