#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # modkit-shape
//!
//! Response shaping for REST APIs: typed member accessors, `$include` /
//! `$exclude` field projection and `@deltaLink` envelopes.
//!
//! ```ignore
//! use modkit_shape::{Accessible, FieldSelection, ShapeRuntime};
//!
//! #[derive(Accessible)]
//! #[shape(default)]
//! pub struct Foo {
//!     pub id: uuid::Uuid,
//!     pub bar: String,
//! }
//!
//! let runtime = ShapeRuntime::default();
//! let foo = Foo { id: uuid::Uuid::new_v4(), bar: "Baz".into() };
//! let shaped = runtime.shape(&foo, &FieldSelection::include(["Bar"]))?;
//! assert_eq!(serde_json::to_string(&shaped)?, r#"{"bar":"Baz"}"#);
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod delta;
pub mod error;
pub mod member;
pub mod naming;
pub mod patch;
pub mod query;
pub mod runtime;
pub mod shape;
pub mod value;

pub use accessor::{AccessorStrategy, TypeReadAccessor, TypeWriteAccessor};
pub use cache::{AccessorCache, AccessorMembersKey, AccessorSet, TypeHandle};
pub use config::{DeltaConfig, ShapeConfig};
pub use delta::{
    Change, ChangeKind, DELTA_LINK_KEY, DeltaCollection, DeltaEnvelope, DeltaTracker,
    DeltaTrackingInfo,
};
pub use error::{AccessError, ConfigError, QueryError, ValueError};
pub use member::{
    Accessible, AccessorMembers, Member, MemberAttribute, MemberDescriptor, MemberKind,
    MemberKinds, TypeInfo, Visibility, VisibilityScope,
};
pub use naming::NamingPolicy;
pub use patch::{MergePatch, PatchOutcome};
pub use query::{QueryLimits, ShapeParams};
pub use runtime::ShapeRuntime;
pub use shape::{FieldSelection, FieldShaper, ShapeOptions, ShapedPayload, read_shaped};
pub use value::{DeclaredType, MemberValue, Value, ValueKind};

pub use modkit_shape_macros::Accessible;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
