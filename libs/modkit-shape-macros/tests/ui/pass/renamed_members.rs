use std::collections::HashMap;

use modkit_shape::{Accessible, AccessorMembers, MemberKinds, VisibilityScope};

#[derive(Accessible, Default)]
#[shape(default, rename = "CatalogProduct")]
pub struct Product {
    #[shape(rename = "productId")]
    pub id: uuid::Uuid,
    pub r#type: String,
    #[shape(skip)]
    pub cache: HashMap<String, String>,
}

fn main() {
    assert_eq!(Product::type_info().name, "CatalogProduct");
    let members = AccessorMembers::describe::<Product>(MemberKinds::ALL, VisibilityScope::ALL);
    assert_eq!(members.names().collect::<Vec<_>>(), vec!["productId", "type"]);
    assert!(Product::construct().is_some_and(|p| p.cache.is_empty()));
}
