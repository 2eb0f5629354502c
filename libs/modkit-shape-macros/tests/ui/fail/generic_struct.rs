use modkit_shape::Accessible;

#[derive(Accessible)]
pub struct Wrapper<T> {
    pub value: T,
}

fn main() {}
