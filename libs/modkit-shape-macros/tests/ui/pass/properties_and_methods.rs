use modkit_shape::{Accessible, AccessorMembers, MemberKind, MemberKinds, VisibilityScope};

#[derive(Accessible, Default)]
#[shape(default)]
#[shape(property(name = "width", ty = "i64", get = "Self::width", set = "Self::set_width"))]
#[shape(property(name = "area", ty = "i64", get = "Self::area", private))]
#[shape(method(name = "normalize"))]
pub struct Rect {
    pub w: i64,
    pub h: i64,
}

impl Rect {
    fn width(&self) -> i64 {
        self.w
    }

    fn set_width(&mut self, w: i64) {
        self.w = w;
    }

    fn area(&self) -> i64 {
        self.w * self.h
    }
}

fn main() {
    let members = AccessorMembers::describe::<Rect>(MemberKinds::ALL, VisibilityScope::ALL);
    assert_eq!(
        members.names().collect::<Vec<_>>(),
        vec!["w", "h", "width", "area", "normalize"]
    );
    assert!(members.get("width").is_some_and(|m| m.can_read && m.can_write));
    assert!(members.get("area").is_some_and(|m| !m.can_write && !m.is_public()));
    assert!(members
        .get("normalize")
        .is_some_and(|m| m.kind == MemberKind::Method && !m.can_read));
}
