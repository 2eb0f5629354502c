use modkit_shape::Accessible;

#[derive(Accessible)]
pub struct Widget {
    #[shape(bogus)]
    pub name: String,
}

fn main() {}
