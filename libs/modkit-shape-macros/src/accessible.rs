use std::collections::HashSet;

use proc_macro2::{Span, TokenStream};
use proc_macro_error2::{abort, emit_error};
use quote::quote;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Path, Type, Visibility};

/// Options from `#[shape(...)]` on the struct.
#[derive(Default)]
struct TypeAttrs {
    default: bool,
    internal: bool,
    rename: Option<String>,
    properties: Vec<PropertyAttr>,
    methods: Vec<MethodAttr>,
}

/// `#[shape(property(name = "...", ty = "...", get = "...", set = "...", private))]`
struct PropertyAttr {
    name: String,
    ty: Type,
    get: Path,
    set: Option<Path>,
    private: bool,
    span: Span,
}

struct MethodAttr {
    name: String,
    private: bool,
    span: Span,
}

/// Options from `#[shape(...)]` on a field.
#[derive(Default)]
struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
    read_only: bool,
    last_modified: bool,
    policy: Option<String>,
    markers: Vec<String>,
}

fn string_value(meta: &ParseNestedMeta) -> syn::Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

fn parse_type_attrs(attrs: &[Attribute]) -> TypeAttrs {
    let mut out = TypeAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("shape") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                out.default = true;
            } else if meta.path.is_ident("internal") {
                out.internal = true;
            } else if meta.path.is_ident("rename") {
                out.rename = Some(string_value(&meta)?);
            } else if meta.path.is_ident("property") {
                out.properties.push(parse_property(&meta)?);
            } else if meta.path.is_ident("method") {
                out.methods.push(parse_method(&meta)?);
            } else {
                return Err(meta.error("unsupported #[shape] option on a struct"));
            }
            Ok(())
        });
        if let Err(e) = result {
            emit_error!(e.span(), "{}", e);
        }
    }
    out
}

fn parse_property(meta: &ParseNestedMeta) -> syn::Result<PropertyAttr> {
    let span = meta.path.span();
    let mut name = None;
    let mut ty = None;
    let mut get = None;
    let mut set = None;
    let mut private = false;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("name") {
            name = Some(string_value(&inner)?);
        } else if inner.path.is_ident("ty") {
            ty = Some(inner.value()?.parse::<LitStr>()?.parse::<Type>()?);
        } else if inner.path.is_ident("get") {
            get = Some(inner.value()?.parse::<LitStr>()?.parse::<Path>()?);
        } else if inner.path.is_ident("set") {
            set = Some(inner.value()?.parse::<LitStr>()?.parse::<Path>()?);
        } else if inner.path.is_ident("private") {
            private = true;
        } else {
            return Err(inner.error("unsupported property option"));
        }
        Ok(())
    })?;
    let (Some(name), Some(ty), Some(get)) = (name, ty, get) else {
        return Err(syn::Error::new(
            span,
            "property requires `name`, `ty` and `get`",
        ));
    };
    Ok(PropertyAttr {
        name,
        ty,
        get,
        set,
        private,
        span,
    })
}

fn parse_method(meta: &ParseNestedMeta) -> syn::Result<MethodAttr> {
    let span = meta.path.span();
    let mut name = None;
    let mut private = false;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("name") {
            name = Some(string_value(&inner)?);
        } else if inner.path.is_ident("private") {
            private = true;
        } else {
            return Err(inner.error("unsupported method option"));
        }
        Ok(())
    })?;
    let Some(name) = name else {
        return Err(syn::Error::new(span, "method requires `name`"));
    };
    Ok(MethodAttr {
        name,
        private,
        span,
    })
}

fn parse_field_attrs(field: &syn::Field) -> FieldAttrs {
    let mut out = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("shape") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                out.rename = Some(string_value(&meta)?);
            } else if meta.path.is_ident("skip") {
                out.skip = true;
            } else if meta.path.is_ident("read_only") {
                out.read_only = true;
            } else if meta.path.is_ident("last_modified") {
                out.last_modified = true;
            } else if meta.path.is_ident("policy") {
                out.policy = Some(string_value(&meta)?);
            } else if meta.path.is_ident("marker") {
                out.markers.push(string_value(&meta)?);
            } else {
                return Err(meta.error("unsupported #[shape] option on a field"));
            }
            Ok(())
        });
        if let Err(e) = result {
            emit_error!(e.span(), "{}", e);
        }
    }
    out
}

fn visibility_tokens(public: bool) -> TokenStream {
    if public {
        quote!(::modkit_shape::member::Visibility::Public)
    } else {
        quote!(::modkit_shape::member::Visibility::Private)
    }
}

fn is_public(vis: &Visibility) -> bool {
    matches!(vis, Visibility::Public(_))
}

fn attribute_tokens(attrs: &FieldAttrs) -> Vec<TokenStream> {
    let mut out = Vec::new();
    if attrs.read_only {
        out.push(quote!(::modkit_shape::member::MemberAttribute::ReadOnly));
    }
    if attrs.last_modified {
        out.push(quote!(::modkit_shape::member::MemberAttribute::LastModified));
    }
    if let Some(policy) = &attrs.policy {
        out.push(quote! {
            ::modkit_shape::member::MemberAttribute::ProtectedByPolicy(
                ::std::string::String::from(#policy)
            )
        });
    }
    for marker in &attrs.markers {
        out.push(quote! {
            ::modkit_shape::member::MemberAttribute::Marker(::std::string::String::from(#marker))
        });
    }
    out
}

/// Reject a member name already used by an earlier member.
fn check_unique(seen: &mut HashSet<String>, name: &str, span: Span) {
    if !seen.insert(name.to_owned()) {
        emit_error!(span, "duplicate member name `{}`", name);
    }
}

pub fn expand_derive_accessible(input: &DeriveInput) -> TokenStream {
    let ident = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => abort!(
                input,
                "#[derive(Accessible)] requires a struct with named fields"
            ),
        },
        _ => abort!(input, "#[derive(Accessible)] can only be applied to structs"),
    };

    if !input.generics.params.is_empty() {
        abort!(
            input.generics,
            "#[derive(Accessible)] does not support generic structs"
        );
    }

    let type_attrs = parse_type_attrs(&input.attrs);
    let type_name = type_attrs
        .rename
        .clone()
        .unwrap_or_else(|| ident.unraw().to_string());
    let type_visibility = visibility_tokens(is_public(&input.vis));
    let nested = type_attrs.internal.then(|| quote!(.nested_in_private()));

    let mut seen = HashSet::new();
    let mut members = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            abort!(field, "#[derive(Accessible)] requires named fields");
        };
        let attrs = parse_field_attrs(field);
        if attrs.skip {
            continue;
        }
        let name = attrs
            .rename
            .clone()
            .unwrap_or_else(|| field_ident.unraw().to_string());
        check_unique(&mut seen, &name, field_ident.span());

        let ty = &field.ty;
        let visibility = visibility_tokens(is_public(&field.vis));
        let setter = (!attrs.read_only).then(|| {
            quote! {
                .setter(|this: &mut Self, value: ::modkit_shape::value::Value| {
                    this.#field_ident = ::modkit_shape::value::MemberValue::from_value(value)?;
                    ::core::result::Result::Ok(())
                })
            }
        });
        let attributes = attribute_tokens(&attrs);

        members.push(quote! {
            ::modkit_shape::member::Member::<Self>::field::<#ty>(#name)
                .visibility(#visibility)
                .getter(|this: &Self| ::modkit_shape::value::MemberValue::to_value(&this.#field_ident))
                #setter
                #(.attribute(#attributes))*
        });
    }

    for property in &type_attrs.properties {
        let PropertyAttr {
            name,
            ty,
            get,
            set,
            private,
            span,
        } = property;
        check_unique(&mut seen, name, *span);
        let visibility = visibility_tokens(!private);
        let setter = set.as_ref().map(|set| {
            quote! {
                .setter(|this: &mut Self, value: ::modkit_shape::value::Value| {
                    #set(this, ::modkit_shape::value::MemberValue::from_value(value)?);
                    ::core::result::Result::Ok(())
                })
            }
        });
        members.push(quote! {
            ::modkit_shape::member::Member::<Self>::property::<#ty>(#name)
                .visibility(#visibility)
                .getter(|this: &Self| ::modkit_shape::value::MemberValue::to_value(&#get(this)))
                #setter
        });
    }

    for method in &type_attrs.methods {
        check_unique(&mut seen, &method.name, method.span);
        let name = &method.name;
        let visibility = visibility_tokens(!method.private);
        members.push(quote! {
            ::modkit_shape::member::Member::<Self>::method(#name).visibility(#visibility)
        });
    }

    let construct = type_attrs.default.then(|| {
        quote! {
            fn construct() -> ::core::option::Option<Self> {
                ::core::option::Option::Some(<Self as ::core::default::Default>::default())
            }
        }
    });

    quote! {
        impl ::modkit_shape::member::Accessible for #ident {
            fn type_info() -> ::modkit_shape::member::TypeInfo {
                ::modkit_shape::member::TypeInfo::new(#type_name, #type_visibility)#nested
            }

            fn members() -> ::std::vec::Vec<::modkit_shape::member::Member<Self>> {
                ::std::vec![#(#members),*]
            }

            #construct
        }

        impl ::modkit_shape::value::MemberValue for #ident {
            fn declared_type() -> ::modkit_shape::value::DeclaredType {
                ::modkit_shape::value::DeclaredType::Composite(#type_name)
            }

            fn to_value(&self) -> ::modkit_shape::value::Value {
                ::modkit_shape::member::composite_to_value(self)
            }

            fn from_value(
                value: ::modkit_shape::value::Value,
            ) -> ::core::result::Result<Self, ::modkit_shape::error::ValueError> {
                ::modkit_shape::member::composite_from_value(value)
            }

            fn decode_json(
                json: &::modkit_shape::__private::serde_json::Value,
            ) -> ::core::result::Result<::modkit_shape::value::Value, ::modkit_shape::error::ValueError> {
                ::modkit_shape::member::composite_decode_json::<Self>(json)
            }
        }
    }
}
