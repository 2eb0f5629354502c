//! # modkit-shape-macros
//!
//! `#[derive(Accessible)]` emits the member table `modkit-shape` needs to read
//! and write a struct's members by name, plus a `MemberValue` impl so the
//! struct can itself be the value of another type's member.
//!
//! Generated code refers to `::modkit_shape`, so the deriving crate must
//! depend on `cf-modkit-shape`.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod accessible;

/// Derive `modkit_shape::Accessible` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use modkit_shape::Accessible;
///
/// #[derive(Accessible, Default)]
/// #[shape(default)]
/// #[shape(property(name = "title_len", ty = "i64", get = "Self::title_len"))]
/// #[shape(method(name = "archive"))]
/// pub struct Article {
///     pub id: uuid::Uuid,
///     #[shape(rename = "headline")]
///     pub title: String,
///     #[shape(read_only, last_modified)]
///     pub updated_at: chrono::DateTime<chrono::Utc>,
///     #[shape(skip)]
///     pub cache_key: u64,
///     owner: String,
/// }
/// ```
///
/// Struct attributes: `default` (construct through `Default`), `internal`
/// (declared inside a non-public scope), `rename = "..."`,
/// `property(name, ty, get, set?, private?)`, `method(name, private?)`.
///
/// Field attributes: `rename`, `skip`, `read_only`, `last_modified`,
/// `policy = "..."`, `marker = "..."`.
#[proc_macro_derive(Accessible, attributes(shape))]
#[proc_macro_error]
pub fn derive_accessible(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    accessible::expand_derive_accessible(&input).into()
}
