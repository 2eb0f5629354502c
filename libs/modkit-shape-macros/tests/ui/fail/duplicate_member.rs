use modkit_shape::Accessible;

#[derive(Accessible)]
pub struct Account {
    pub name: String,
    #[shape(rename = "name")]
    pub display_name: String,
}

fn main() {}
