use modkit_shape::Accessible;

#[derive(Accessible)]
#[shape(property(name = "label", ty = "String"))]
pub struct Badge {
    pub text: String,
}

fn main() {}
