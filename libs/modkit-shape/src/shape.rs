//! Field shaping for `$include` / `$exclude` projections.
//!
//! A [`FieldShaper`] wraps a read accessor, resolves a [`FieldSelection`] to an
//! ordered list of member names and produces a [`ShapedPayload`] that
//! serializes exactly those members through serde.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::accessor::{TypeReadAccessor, TypeWriteAccessor};
use crate::error::AccessError;
use crate::member::{AccessorMembers, MemberDescriptor};
use crate::naming::{NamingPolicy, names_match};
use crate::value::Value;

/// Which members a projection emits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// Every readable member, in declaration order.
    #[default]
    All,
    /// Allow-list, emitted in the given order.
    Include(Vec<String>),
    /// Deny-list; the rest is emitted in declaration order.
    Exclude(Vec<String>),
}

impl FieldSelection {
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(names.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(names.into_iter().map(Into::into).collect())
    }
}

/// Serialization settings applied to every shaped payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShapeOptions {
    pub naming: NamingPolicy,
    pub ignore_nulls: bool,
}

/// Projects instances of one type through its read accessor.
#[derive(Clone)]
pub struct FieldShaper {
    read: Arc<dyn TypeReadAccessor>,
    options: ShapeOptions,
}

impl fmt::Debug for FieldShaper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldShaper")
            .field("type", &self.read.type_name())
            .field("options", &self.options)
            .finish()
    }
}

impl FieldShaper {
    #[must_use]
    pub fn new(read: Arc<dyn TypeReadAccessor>, options: ShapeOptions) -> Self {
        Self { read, options }
    }

    #[must_use]
    pub fn members(&self) -> &AccessorMembers {
        self.read.members()
    }

    #[must_use]
    pub fn options(&self) -> ShapeOptions {
        self.options
    }

    /// Resolve `selection` to canonical member names.
    ///
    /// Inclusion keeps the caller's order and collapses repeats; exclusion
    /// keeps declaration order. Names that match no readable member are
    /// dropped.
    #[must_use]
    pub fn resolve(&self, selection: &FieldSelection) -> Vec<String> {
        let members = self.members();
        match selection {
            FieldSelection::All => members.readable().map(|m| m.name.clone()).collect(),
            FieldSelection::Include(names) => {
                let mut seen = HashSet::with_capacity(names.len());
                names
                    .iter()
                    .filter_map(|requested| {
                        let resolved = resolve_readable(members, requested);
                        if resolved.is_none() {
                            trace!(
                                type_name = members.type_name(),
                                field = %requested,
                                "dropping unknown field from projection"
                            );
                        }
                        resolved
                    })
                    .filter(|m| seen.insert(m.name.as_str()))
                    .map(|m| m.name.clone())
                    .collect()
            }
            FieldSelection::Exclude(denied) => members
                .readable()
                .filter(|m| !denied.iter().any(|d| names_match(&m.name, d)))
                .map(|m| m.name.clone())
                .collect(),
        }
    }

    /// Shape a single instance.
    #[must_use]
    pub fn project<'a>(&self, instance: &'a dyn Any, selection: &FieldSelection) -> ShapedPayload<'a> {
        ShapedPayload {
            read: self.read.clone(),
            fields: self.resolve(selection).into(),
            options: self.options,
            subject: Subject::One(instance),
        }
    }

    /// Shape a homogeneous sequence; serializes as a JSON array.
    pub fn project_many<'a, T, I>(&self, items: I, selection: &FieldSelection) -> ShapedPayload<'a>
    where
        T: Any,
        I: IntoIterator<Item = &'a T>,
    {
        ShapedPayload {
            read: self.read.clone(),
            fields: self.resolve(selection).into(),
            options: self.options,
            subject: Subject::Many(items.into_iter().map(|i| i as &dyn Any).collect()),
        }
    }
}

fn resolve_readable<'m>(members: &'m AccessorMembers, requested: &str) -> Option<&'m MemberDescriptor> {
    members
        .get(requested)
        .filter(|m| m.can_read)
        .or_else(|| members.readable().find(|m| names_match(&m.name, requested)))
}

enum Subject<'a> {
    One(&'a dyn Any),
    Many(Vec<&'a dyn Any>),
}

/// Instance(s) plus the resolved field list; serialize to emit the wire form.
///
/// Reading members happens during serialization, so an instance of the wrong
/// type surfaces as a serializer error.
pub struct ShapedPayload<'a> {
    read: Arc<dyn TypeReadAccessor>,
    fields: Arc<[String]>,
    options: ShapeOptions,
    subject: Subject<'a>,
}

impl ShapedPayload<'_> {
    /// Resolved member names, before the naming policy.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self.subject, Subject::Many(_))
    }

    /// # Errors
    /// Fails when an instance does not match the accessor's type.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl fmt::Debug for ShapedPayload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapedPayload")
            .field("type", &self.read.type_name())
            .field("fields", &self.fields)
            .field("sequence", &self.is_sequence())
            .finish_non_exhaustive()
    }
}

impl Serialize for ShapedPayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.subject {
            Subject::One(instance) => self.shaped(*instance).serialize(serializer),
            Subject::Many(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for instance in items {
                    seq.serialize_element(&self.shaped(*instance))?;
                }
                seq.end()
            }
        }
    }
}

impl<'p> ShapedPayload<'p> {
    fn shaped<'s>(&'s self, instance: &'p dyn Any) -> ShapedObject<'s, 'p> {
        ShapedObject {
            payload: self,
            instance,
        }
    }
}

struct ShapedObject<'s, 'p> {
    payload: &'s ShapedPayload<'p>,
    instance: &'p dyn Any,
}

impl Serialize for ShapedObject<'_, '_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = self.payload;
        let ShapeOptions {
            naming,
            ignore_nulls,
        } = payload.options;
        let mut map = serializer.serialize_map(None)?;
        for field in payload.fields.iter() {
            let value = payload
                .read
                .get(self.instance, field)
                .map_err(S::Error::custom)?;
            if ignore_nulls && value.is_null() {
                continue;
            }
            map.serialize_entry(&naming.apply(field), &PolicyValue::new(&value, naming))?;
        }
        map.end()
    }
}

/// Serializes a [`Value`] with object keys renamed by the naming policy.
pub(crate) struct PolicyValue<'a> {
    value: &'a Value,
    naming: NamingPolicy,
}

impl<'a> PolicyValue<'a> {
    pub(crate) fn new(value: &'a Value, naming: NamingPolicy) -> Self {
        Self { value, naming }
    }
}

impl Serialize for PolicyValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) => serializer.serialize_str(s),
            Value::Uuid(u) => serializer.collect_str(&u.hyphenated()),
            Value::DateTime(dt) => {
                serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Date(d) => serializer.collect_str(&d.format("%Y-%m-%d")),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&PolicyValue::new(item, self.naming))?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(
                        &self.naming.apply(key),
                        &PolicyValue::new(item, self.naming),
                    )?;
                }
                map.end()
            }
        }
    }
}

/// Rebuild a `T` from a shaped wire object.
///
/// The instance comes from the type's constructor; only members present in
/// `json` are assigned, everything else keeps its constructed value. Keys are
/// matched against the policy-transformed member names first, then
/// case/separator-insensitively. Unknown and non-writable keys are ignored.
///
/// # Errors
/// `AccessError::Construction` when `T` has no constructor,
/// `AccessError::Assignment` when a present value does not fit its member,
/// `AccessError::InstanceMismatch` when `write` is not bound to `T`.
pub fn read_shaped<T: Any>(
    json: &serde_json::Map<String, serde_json::Value>,
    write: &dyn TypeWriteAccessor,
    naming: NamingPolicy,
) -> Result<T, AccessError> {
    let mut instance = write.create_instance()?;
    let members = write.members();
    for (key, raw) in json {
        let member = members
            .writable()
            .find(|m| naming.apply(&m.name) == *key)
            .or_else(|| members.resolve(key).filter(|m| m.can_write));
        let Some(member) = member else {
            trace!(type_name = write.type_name(), field = %key, "ignoring field on read");
            continue;
        };
        let value = write.decode(&member.name, raw)?;
        write.set(&mut *instance, &member.name, value)?;
    }
    instance
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| AccessError::InstanceMismatch {
            expected: write.type_name(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::{CompiledAccessor, ScanAccessor};
    use crate::member::{
        Accessible, Member, MemberKinds, TypeInfo, Visibility, VisibilityScope, select_members,
    };
    use crate::value::MemberValue;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq)]
    struct Article {
        title: String,
        created_at: i64,
        summary: Option<String>,
        tags: Vec<String>,
    }

    impl Accessible for Article {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Article", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            vec![
                Member::<Self>::field::<String>("title")
                    .getter(|a| a.title.to_value())
                    .setter(|a, v| {
                        a.title = MemberValue::from_value(v)?;
                        Ok(())
                    }),
                Member::<Self>::field::<i64>("created_at")
                    .getter(|a| a.created_at.to_value())
                    .setter(|a, v| {
                        a.created_at = MemberValue::from_value(v)?;
                        Ok(())
                    }),
                Member::<Self>::field::<Option<String>>("summary")
                    .getter(|a| a.summary.to_value())
                    .setter(|a, v| {
                        a.summary = MemberValue::from_value(v)?;
                        Ok(())
                    }),
                Member::<Self>::field::<Vec<String>>("tags").getter(|a| a.tags.to_value()),
                Member::<Self>::property::<Value>("meta").getter(|a| {
                    Value::Object(vec![("word_count".to_owned(), Value::Int(i64::from(a.created_at > 0)))])
                }),
            ]
        }

        fn construct() -> Option<Self> {
            Some(Self::default())
        }
    }

    fn compiled() -> Arc<CompiledAccessor<Article>> {
        let kinds = MemberKinds::default();
        let scope = VisibilityScope::PUBLIC;
        let members = Arc::new(AccessorMembers::describe::<Article>(kinds, scope));
        Arc::new(CompiledAccessor::new(members, &select_members::<Article>(kinds, scope)))
    }

    fn shaper(options: ShapeOptions) -> FieldShaper {
        FieldShaper::new(compiled(), options)
    }

    fn article() -> Article {
        Article {
            title: "Hello".to_owned(),
            created_at: 42,
            summary: None,
            tags: vec!["a".to_owned()],
        }
    }

    #[test]
    fn test_include_keeps_requested_order_and_drops_unknown() {
        let shaper = shaper(ShapeOptions::default());
        let a = article();
        let payload = shaper.project(&a, &FieldSelection::include(["createdAt", "bogus", "TITLE", "title"]));
        assert_eq!(payload.fields(), ["created_at", "title"]);
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"createdAt":42,"title":"Hello"}"#
        );
    }

    #[test]
    fn test_exclude_is_complement_in_declaration_order() {
        let shaper = shaper(ShapeOptions::default());
        let excluded = shaper.resolve(&FieldSelection::exclude(["summary", "Tags"]));
        assert_eq!(excluded, ["title", "created_at", "meta"]);

        let a = article();
        let by_exclusion = shaper.project(&a, &FieldSelection::exclude(["summary", "Tags"]));
        let by_inclusion = shaper.project(&a, &FieldSelection::Include(excluded));
        assert_eq!(by_exclusion.to_json().unwrap(), by_inclusion.to_json().unwrap());
    }

    #[test]
    fn test_empty_selection_is_empty_object() {
        let shaper = shaper(ShapeOptions::default());
        let a = article();
        let payload = shaper.project(&a, &FieldSelection::Include(Vec::new()));
        assert_eq!(serde_json::to_string(&payload).unwrap(), "{}");

        let items = [article(), article()];
        let many = shaper.project_many(&items, &FieldSelection::include(["nothing"]));
        assert_eq!(serde_json::to_string(&many).unwrap(), "[{},{}]");
    }

    #[test]
    fn test_nested_keys_follow_policy_and_nulls_can_be_dropped() {
        let a = article();
        let camel = shaper(ShapeOptions::default());
        assert_eq!(
            camel.project(&a, &FieldSelection::All).to_json().unwrap(),
            json!({"title": "Hello", "createdAt": 42, "summary": null, "tags": ["a"], "meta": {"wordCount": 1}})
        );

        let snake = shaper(ShapeOptions {
            naming: NamingPolicy::SnakeCase,
            ignore_nulls: true,
        });
        assert_eq!(
            snake.project(&a, &FieldSelection::All).to_json().unwrap(),
            json!({"title": "Hello", "created_at": 42, "tags": ["a"], "meta": {"word_count": 1}})
        );
    }

    #[test]
    fn test_wrong_instance_is_serializer_error() {
        let shaper = shaper(ShapeOptions::default());
        let wrong = 7_u32;
        let payload = shaper.project(&wrong, &FieldSelection::All);
        assert!(serde_json::to_string(&payload).is_err());
    }

    #[test]
    fn test_read_shaped_populates_only_present_fields() {
        let shaper = shaper(ShapeOptions::default());
        let a = article();
        let wire = shaper
            .project(&a, &FieldSelection::include(["created_at"]))
            .to_json()
            .unwrap();
        let write = compiled();
        let back: Article = read_shaped(wire.as_object().unwrap(), &*write, NamingPolicy::CamelCase).unwrap();
        assert_eq!(
            back,
            Article {
                created_at: 42,
                ..Article::default()
            }
        );

        let members = Arc::new(AccessorMembers::describe::<Article>(MemberKinds::default(), VisibilityScope::ALL));
        let scan = ScanAccessor::new(members, select_members::<Article>(MemberKinds::default(), VisibilityScope::ALL));
        let err = read_shaped::<Article>(
            json!({"title": 5}).as_object().unwrap(),
            &scan,
            NamingPolicy::CamelCase,
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Assignment { .. }));
    }
}
