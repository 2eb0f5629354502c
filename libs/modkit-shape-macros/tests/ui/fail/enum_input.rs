use modkit_shape::Accessible;

#[derive(Accessible)]
pub enum Mode { Fast, Slow }

fn main() {}
