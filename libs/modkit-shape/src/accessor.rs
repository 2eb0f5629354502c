//! Type-erased read/write accessors.
//!
//! Two strategies expose the same contract:
//! - [`CompiledAccessor`]: hash binding tables built once from the member
//!   table; O(1) dispatch straight into the generated getter/setter.
//! - [`ScanAccessor`]: the universal path. Keeps the member table as-is and
//!   resolves names by scanning it on every call. Used for non-public types
//!   and selections that reach non-public members.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AccessError;
use crate::member::{Accessible, AccessorMembers, Decoder, Getter, Member, Setter};
use crate::value::{MemberValue, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessorStrategy {
    Compiled,
    Universal,
}

/// Reads named members of one bound type.
pub trait TypeReadAccessor: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn strategy(&self) -> AccessorStrategy;

    fn members(&self) -> &AccessorMembers;

    /// # Errors
    /// `AccessError::MemberNotFound` when `name` is not a readable member,
    /// `AccessError::InstanceMismatch` when `instance` is not the bound type.
    fn get(&self, instance: &dyn Any, name: &str) -> Result<Value, AccessError>;

    fn try_get(&self, instance: &dyn Any, name: &str) -> Option<Value> {
        self.get(instance, name).ok()
    }
}

/// Writes named members of one bound type.
pub trait TypeWriteAccessor: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn strategy(&self) -> AccessorStrategy;

    fn members(&self) -> &AccessorMembers;

    /// # Errors
    /// `AccessError::MemberNotFound`, `AccessError::NotWritable`,
    /// `AccessError::Assignment` on a value of the wrong type, or
    /// `AccessError::InstanceMismatch`.
    fn set(&self, instance: &mut dyn Any, name: &str, value: Value) -> Result<(), AccessError>;

    /// Best-effort `set`: `false` instead of an error.
    fn try_set(&self, instance: &mut dyn Any, name: &str, value: Value) -> bool {
        self.set(instance, name, value).is_ok()
    }

    /// Decode wire JSON for a writable member into a value `set` accepts.
    ///
    /// # Errors
    /// `AccessError::MemberNotFound` / `AccessError::NotWritable`, or
    /// `AccessError::Assignment` when the JSON does not fit the member.
    fn decode(&self, name: &str, json: &serde_json::Value) -> Result<Value, AccessError>;

    /// # Errors
    /// `AccessError::Construction` when the type registered no constructor.
    fn create_instance(&self) -> Result<Box<dyn Any>, AccessError>;
}

impl dyn TypeReadAccessor {
    /// Typed read for call sites that know the member type statically.
    ///
    /// # Errors
    /// As [`TypeReadAccessor::get`], plus `AccessError::Assignment` when the
    /// member value does not convert into `V`.
    pub fn get_as<V: MemberValue>(&self, instance: &dyn Any, name: &str) -> Result<V, AccessError> {
        let value = self.get(instance, name)?;
        V::from_value(value).map_err(|source| AccessError::Assignment {
            type_name: self.type_name(),
            member: name.to_owned(),
            source,
        })
    }
}

fn downcast_ref<'a, T: Any>(instance: &'a dyn Any, expected: &'static str) -> Result<&'a T, AccessError> {
    instance
        .downcast_ref::<T>()
        .ok_or(AccessError::InstanceMismatch { expected })
}

fn downcast_mut<'a, T: Any>(
    instance: &'a mut dyn Any,
    expected: &'static str,
) -> Result<&'a mut T, AccessError> {
    instance
        .downcast_mut::<T>()
        .ok_or(AccessError::InstanceMismatch { expected })
}

fn construct<T: Accessible>(type_name: &'static str) -> Result<Box<dyn Any>, AccessError> {
    T::construct()
        .map(|instance| Box::new(instance) as Box<dyn Any>)
        .ok_or_else(|| AccessError::Construction {
            type_name,
            reason: "no registered constructor".to_owned(),
        })
}

fn assign<T>(
    setter: Setter<T>,
    instance: &mut T,
    type_name: &'static str,
    name: &str,
    value: Value,
) -> Result<(), AccessError> {
    setter(instance, value).map_err(|source| AccessError::Assignment {
        type_name,
        member: name.to_owned(),
        source,
    })
}

/// Write-side failure for a name that exists but is not writable.
fn write_miss(members: &AccessorMembers, name: &str) -> AccessError {
    if members.contains(name) {
        AccessError::NotWritable {
            type_name: members.type_name(),
            member: name.to_owned(),
        }
    } else {
        AccessError::MemberNotFound {
            type_name: members.type_name(),
            member: name.to_owned(),
        }
    }
}

fn decode_with(
    decoder: Decoder,
    type_name: &'static str,
    name: &str,
    json: &serde_json::Value,
) -> Result<Value, AccessError> {
    decoder(json).map_err(|source| AccessError::Assignment {
        type_name,
        member: name.to_owned(),
        source,
    })
}

/// Accessor backed by name-keyed binding tables.
pub struct CompiledAccessor<T> {
    members: Arc<AccessorMembers>,
    getters: HashMap<String, Getter<T>>,
    setters: HashMap<String, (Setter<T>, Decoder)>,
}

impl<T: Accessible> CompiledAccessor<T> {
    /// Bind the readable and writable entries of `table`.
    #[must_use]
    pub fn new(members: Arc<AccessorMembers>, table: &[Member<T>]) -> Self {
        let getters = table
            .iter()
            .filter_map(|m| m.get_fn().map(|g| (m.name().to_owned(), g)))
            .collect();
        let setters = table
            .iter()
            .filter_map(|m| m.set_fn().map(|s| (m.name().to_owned(), (s, m.decoder()))))
            .collect();
        Self {
            members,
            getters,
            setters,
        }
    }
}

impl<T: Accessible> TypeReadAccessor for CompiledAccessor<T> {
    fn type_name(&self) -> &'static str {
        self.members.type_name()
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Compiled
    }

    fn members(&self) -> &AccessorMembers {
        &self.members
    }

    fn get(&self, instance: &dyn Any, name: &str) -> Result<Value, AccessError> {
        let getter = self
            .getters
            .get(name)
            .ok_or_else(|| AccessError::MemberNotFound {
                type_name: self.members.type_name(),
                member: name.to_owned(),
            })?;
        let instance = downcast_ref::<T>(instance, self.members.type_name())?;
        Ok(getter(instance))
    }
}

impl<T: Accessible> TypeWriteAccessor for CompiledAccessor<T> {
    fn type_name(&self) -> &'static str {
        self.members.type_name()
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Compiled
    }

    fn members(&self) -> &AccessorMembers {
        &self.members
    }

    fn set(&self, instance: &mut dyn Any, name: &str, value: Value) -> Result<(), AccessError> {
        let (setter, _) = self
            .setters
            .get(name)
            .ok_or_else(|| write_miss(&self.members, name))?;
        let type_name = self.members.type_name();
        let instance = downcast_mut::<T>(instance, type_name)?;
        assign(*setter, instance, type_name, name, value)
    }

    fn decode(&self, name: &str, json: &serde_json::Value) -> Result<Value, AccessError> {
        let (_, decoder) = self
            .setters
            .get(name)
            .ok_or_else(|| write_miss(&self.members, name))?;
        decode_with(*decoder, self.members.type_name(), name, json)
    }

    fn create_instance(&self) -> Result<Box<dyn Any>, AccessError> {
        construct::<T>(self.members.type_name())
    }
}

/// Universal accessor: linear scan over the member table on every call.
pub struct ScanAccessor<T> {
    members: Arc<AccessorMembers>,
    table: Vec<Member<T>>,
}

impl<T: Accessible> ScanAccessor<T> {
    #[must_use]
    pub fn new(members: Arc<AccessorMembers>, table: Vec<Member<T>>) -> Self {
        Self { members, table }
    }

    fn find(&self, name: &str) -> Option<&Member<T>> {
        self.table.iter().find(|m| m.name() == name)
    }

    fn writable(&self, name: &str) -> Result<(Setter<T>, Decoder), AccessError> {
        self.find(name)
            .and_then(|m| m.set_fn().map(|s| (s, m.decoder())))
            .ok_or_else(|| write_miss(&self.members, name))
    }
}

impl<T: Accessible> TypeReadAccessor for ScanAccessor<T> {
    fn type_name(&self) -> &'static str {
        self.members.type_name()
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Universal
    }

    fn members(&self) -> &AccessorMembers {
        &self.members
    }

    fn get(&self, instance: &dyn Any, name: &str) -> Result<Value, AccessError> {
        let getter = self
            .find(name)
            .and_then(Member::get_fn)
            .ok_or_else(|| AccessError::MemberNotFound {
                type_name: self.members.type_name(),
                member: name.to_owned(),
            })?;
        let instance = downcast_ref::<T>(instance, self.members.type_name())?;
        Ok(getter(instance))
    }
}

impl<T: Accessible> TypeWriteAccessor for ScanAccessor<T> {
    fn type_name(&self) -> &'static str {
        self.members.type_name()
    }

    fn strategy(&self) -> AccessorStrategy {
        AccessorStrategy::Universal
    }

    fn members(&self) -> &AccessorMembers {
        &self.members
    }

    fn set(&self, instance: &mut dyn Any, name: &str, value: Value) -> Result<(), AccessError> {
        let (setter, _) = self.writable(name)?;
        let type_name = self.members.type_name();
        let instance = downcast_mut::<T>(instance, type_name)?;
        assign(setter, instance, type_name, name, value)
    }

    fn decode(&self, name: &str, json: &serde_json::Value) -> Result<Value, AccessError> {
        let (_, decoder) = self.writable(name)?;
        decode_with(decoder, self.members.type_name(), name, json)
    }

    fn create_instance(&self) -> Result<Box<dyn Any>, AccessError> {
        construct::<T>(self.members.type_name())
    }
}
