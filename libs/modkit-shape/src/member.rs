//! Member descriptor model.
//!
//! A type opts into accessor support by implementing [`Accessible`], usually
//! through `#[derive(Accessible)]`, which emits the member table at compile
//! time. [`AccessorMembers::describe`] turns that table into the ordered,
//! immutable descriptor set for one `(type, kinds, scope)` selection.
//!
//! Ordering policy: declaration order. Derived tables list fields in source
//! order, then registered properties, then registered methods.

use std::any::Any;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::error::ValueError;
use crate::naming::names_match;
use crate::value::{DeclaredType, MemberValue, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Property,
    Method,
}

impl MemberKind {
    #[must_use]
    pub const fn flag(self) -> MemberKinds {
        match self {
            MemberKind::Field => MemberKinds::FIELDS,
            MemberKind::Property => MemberKinds::PROPERTIES,
            MemberKind::Method => MemberKinds::METHODS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    #[must_use]
    pub const fn flag(self) -> VisibilityScope {
        match self {
            Visibility::Public => VisibilityScope::PUBLIC,
            Visibility::Private => VisibilityScope::PRIVATE,
        }
    }
}

/// Bit mask selecting member kinds: `FIELDS = 1`, `PROPERTIES = 2`, `METHODS = 4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberKinds(u8);

impl MemberKinds {
    pub const NONE: Self = Self(0);
    pub const FIELDS: Self = Self(1);
    pub const PROPERTIES: Self = Self(2);
    pub const METHODS: Self = Self(4);
    pub const ALL: Self = Self(7);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn admits(self, kind: MemberKind) -> bool {
        self.contains(kind.flag())
    }
}

impl BitOr for MemberKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for MemberKinds {
    fn default() -> Self {
        Self::FIELDS | Self::PROPERTIES
    }
}

/// Bit mask selecting visibility: `PUBLIC = 1`, `PRIVATE = 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VisibilityScope(u8);

impl VisibilityScope {
    pub const PUBLIC: Self = Self(1);
    pub const PRIVATE: Self = Self(2);
    pub const ALL: Self = Self(3);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn admits(self, visibility: Visibility) -> bool {
        self.contains(visibility.flag())
    }
}

impl BitOr for VisibilityScope {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for VisibilityScope {
    fn default() -> Self {
        Self::PUBLIC
    }
}

/// Out-of-band marker attached to a member. Not part of its identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberAttribute {
    LastModified,
    ReadOnly,
    ProtectedByPolicy(String),
    Marker(String),
}

impl fmt::Display for MemberAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberAttribute::LastModified => f.write_str("last-modified"),
            MemberAttribute::ReadOnly => f.write_str("read-only"),
            MemberAttribute::ProtectedByPolicy(policy) => write!(f, "protected-by-policy:{policy}"),
            MemberAttribute::Marker(marker) => f.write_str(marker),
        }
    }
}

impl FromStr for MemberAttribute {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "last-modified" => MemberAttribute::LastModified,
            "read-only" => MemberAttribute::ReadOnly,
            other => match other.strip_prefix("protected-by-policy:") {
                Some(policy) => MemberAttribute::ProtectedByPolicy(policy.to_owned()),
                None => MemberAttribute::Marker(other.to_owned()),
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    pub declared_type: DeclaredType,
    pub visibility: Visibility,
    pub can_read: bool,
    pub can_write: bool,
    pub attributes: Vec<MemberAttribute>,
}

impl MemberDescriptor {
    #[must_use]
    pub fn has_attribute(&self, attribute: &MemberAttribute) -> bool {
        self.attributes.contains(attribute)
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// Identity and visibility of a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: &'static str,
    pub visibility: Visibility,
    /// Visibility of the scope the type is declared in.
    pub enclosing: Visibility,
}

impl TypeInfo {
    #[must_use]
    pub const fn new(name: &'static str, visibility: Visibility) -> Self {
        Self {
            name,
            visibility,
            enclosing: Visibility::Public,
        }
    }

    #[must_use]
    pub const fn nested_in_private(mut self) -> Self {
        self.enclosing = Visibility::Private;
        self
    }

    #[must_use]
    pub fn is_publicly_visible(&self) -> bool {
        self.visibility == Visibility::Public && self.enclosing == Visibility::Public
    }
}

pub type Getter<T> = fn(&T) -> Value;
pub type Setter<T> = fn(&mut T, Value) -> Result<(), ValueError>;
pub type Decoder = fn(&serde_json::Value) -> Result<Value, ValueError>;

/// One registered member: descriptor plus its accessor functions.
pub struct Member<T> {
    descriptor: MemberDescriptor,
    getter: Option<Getter<T>>,
    setter: Option<Setter<T>>,
    decoder: Decoder,
}

impl<T> Clone for Member<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            getter: self.getter,
            setter: self.setter,
            decoder: self.decoder,
        }
    }
}

impl<T> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl<T> Member<T> {
    /// Start registering a member whose values have type `V`.
    pub fn new<V: MemberValue>(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            descriptor: MemberDescriptor {
                name: name.into(),
                kind,
                declared_type: V::declared_type(),
                visibility: Visibility::Public,
                can_read: false,
                can_write: false,
                attributes: Vec::new(),
            },
            getter: None,
            setter: None,
            decoder: V::decode_json,
        }
    }

    pub fn field<V: MemberValue>(name: impl Into<String>) -> Self {
        Self::new::<V>(name, MemberKind::Field)
    }

    pub fn property<V: MemberValue>(name: impl Into<String>) -> Self {
        Self::new::<V>(name, MemberKind::Property)
    }

    /// Methods are described but never bound for reading or writing.
    pub fn method(name: impl Into<String>) -> Self {
        Self::new::<Value>(name, MemberKind::Method)
    }

    #[must_use]
    pub fn getter(mut self, getter: Getter<T>) -> Self {
        if self.descriptor.kind != MemberKind::Method {
            self.getter = Some(getter);
            self.descriptor.can_read = true;
        }
        self
    }

    #[must_use]
    pub fn setter(mut self, setter: Setter<T>) -> Self {
        if self.descriptor.kind != MemberKind::Method
            && !self.descriptor.has_attribute(&MemberAttribute::ReadOnly)
        {
            self.setter = Some(setter);
            self.descriptor.can_write = true;
        }
        self
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.descriptor.visibility = visibility;
        self
    }

    #[must_use]
    pub fn private(self) -> Self {
        self.visibility(Visibility::Private)
    }

    /// Attach a marker. `ReadOnly` also drops any registered setter.
    #[must_use]
    pub fn attribute(mut self, attribute: MemberAttribute) -> Self {
        if attribute == MemberAttribute::ReadOnly {
            self.setter = None;
            self.descriptor.can_write = false;
        }
        if !self.descriptor.attributes.contains(&attribute) {
            self.descriptor.attributes.push(attribute);
        }
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &MemberDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn get_fn(&self) -> Option<Getter<T>> {
        self.getter
    }

    #[must_use]
    pub fn set_fn(&self) -> Option<Setter<T>> {
        self.setter
    }

    #[must_use]
    pub fn decoder(&self) -> Decoder {
        self.decoder
    }

    fn selected_by(&self, kinds: MemberKinds, scope: VisibilityScope) -> bool {
        kinds.admits(self.descriptor.kind) && scope.admits(self.descriptor.visibility)
    }
}

/// A type whose members can be read and written by name.
///
/// Implemented by `#[derive(Accessible)]`; hand-written impls use the
/// [`Member`] builder, naming the owner type so getter and setter closures
/// type-check:
///
/// ```ignore
/// fn members() -> Vec<Member<Self>> {
///     vec![Member::<Self>::field::<i64>("id").getter(|s| s.id.to_value())]
/// }
/// ```
pub trait Accessible: Any + Sized {
    fn type_info() -> TypeInfo;

    /// Every member of the type, in declaration order.
    fn members() -> Vec<Member<Self>>;

    /// A fresh instance, when the type registered a constructor.
    fn construct() -> Option<Self> {
        None
    }
}

/// Members of `T` matching `kinds` and `scope`, in declaration order.
pub(crate) fn select_members<T: Accessible>(
    kinds: MemberKinds,
    scope: VisibilityScope,
) -> Vec<Member<T>> {
    T::members()
        .into_iter()
        .filter(|m| m.selected_by(kinds, scope))
        .collect()
}

/// Ordered, immutable descriptor set for one `(type, kinds, scope)` selection.
#[derive(Clone, Debug)]
pub struct AccessorMembers {
    type_name: &'static str,
    kinds: MemberKinds,
    scope: VisibilityScope,
    members: Vec<MemberDescriptor>,
    index: HashMap<String, usize>,
}

impl AccessorMembers {
    /// Describe the members of `T` selected by `kinds` and `scope`.
    #[must_use]
    pub fn describe<T: Accessible>(kinds: MemberKinds, scope: VisibilityScope) -> Self {
        Self::from_members(
            T::type_info().name,
            kinds,
            scope,
            &select_members::<T>(kinds, scope),
        )
    }

    pub(crate) fn from_members<T>(
        type_name: &'static str,
        kinds: MemberKinds,
        scope: VisibilityScope,
        members: &[Member<T>],
    ) -> Self {
        let members: Vec<MemberDescriptor> =
            members.iter().map(|m| m.descriptor().clone()).collect();
        let mut index = HashMap::with_capacity(members.len());
        for (i, m) in members.iter().enumerate() {
            index.entry(m.name.clone()).or_insert(i);
        }
        Self {
            type_name,
            kinds,
            scope,
            members,
            index,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn kinds(&self) -> MemberKinds {
        self.kinds
    }

    #[must_use]
    pub fn scope(&self) -> VisibilityScope {
        self.scope
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    /// Exact-name lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MemberDescriptor> {
        self.index.get(name).map(|&i| &self.members[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Exact lookup first, then case/separator-insensitive.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&MemberDescriptor> {
        self.get(name)
            .or_else(|| self.members.iter().find(|m| names_match(&m.name, name)))
    }

    pub fn readable(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.can_read)
    }

    pub fn writable(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.members.iter().filter(|m| m.can_write)
    }

    /// First name registered twice, if any.
    #[must_use]
    pub fn duplicate_name(&self) -> Option<&str> {
        (self.index.len() != self.members.len())
            .then(|| {
                self.members
                    .iter()
                    .enumerate()
                    .find(|(i, m)| self.index.get(&m.name) != Some(i))
                    .map(|(_, m)| m.name.as_str())
            })
            .flatten()
    }

    #[must_use]
    pub fn any_non_public(&self) -> bool {
        self.members.iter().any(|m| !m.is_public())
    }
}

/// Object value of the public readable fields and properties of `instance`.
///
/// Backs the `MemberValue` impl generated for composites.
pub fn composite_to_value<T: Accessible>(instance: &T) -> Value {
    Value::Object(
        select_members::<T>(MemberKinds::default(), VisibilityScope::PUBLIC)
            .iter()
            .filter_map(|m| m.get_fn().map(|get| (m.name().to_owned(), get(instance))))
            .collect(),
    )
}

/// Build `T` from an object value; unknown entries are ignored.
///
/// # Errors
/// `ValueError::NotConstructible` when `T` registered no constructor,
/// `ValueError::TypeMismatch` for a non-object value, `ValueError::Field`
/// when a member rejects its value.
pub fn composite_from_value<T: Accessible>(value: Value) -> Result<T, ValueError> {
    let info = T::type_info();
    let Value::Object(entries) = value else {
        return Err(ValueError::mismatch(info.name, value.kind()));
    };
    let mut instance = T::construct().ok_or(ValueError::NotConstructible(info.name))?;
    let members = select_members::<T>(MemberKinds::default(), VisibilityScope::ALL);
    for (name, v) in entries {
        let Some(member) = find_member(&members, &name) else {
            continue;
        };
        if let Some(set) = member.set_fn() {
            set(&mut instance, v).map_err(|e| ValueError::Field {
                field: member.name().to_owned(),
                message: e.to_string(),
            })?;
        }
    }
    Ok(instance)
}

/// Decode a wire object into canonical member names, member by member.
///
/// # Errors
/// `ValueError::TypeMismatch` for non-object JSON or a mismatching member.
pub fn composite_decode_json<T: Accessible>(json: &serde_json::Value) -> Result<Value, ValueError> {
    let serde_json::Value::Object(map) = json else {
        return Err(ValueError::mismatch(
            T::type_info().name,
            Value::untyped(json).kind(),
        ));
    };
    let members = select_members::<T>(MemberKinds::default(), VisibilityScope::ALL);
    let mut out = Vec::with_capacity(map.len());
    for (key, raw) in map {
        if let Some(member) = find_member(&members, key) {
            out.push((member.name().to_owned(), (member.decoder())(raw)?));
        }
    }
    Ok(Value::Object(out))
}

fn find_member<'a, T>(members: &'a [Member<T>], name: &str) -> Option<&'a Member<T>> {
    members
        .iter()
        .find(|m| m.name() == name)
        .or_else(|| members.iter().find(|m| names_match(m.name(), name)))
}
