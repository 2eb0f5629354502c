//! Merge patch: a bag of named field changes replayed through a write accessor.

use std::any::Any;

use tracing::warn;

use crate::accessor::TypeWriteAccessor;
use crate::error::AccessError;
use crate::value::Value;

/// Ordered field changes. Setting a name twice keeps its first position and
/// the last value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergePatch {
    changes: Vec<(String, Value)>,
}

/// Result of [`MergePatch::apply_to`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

impl PatchOutcome {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl MergePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        let name = name.into();
        match self.changes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.changes.push((name, value)),
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.changes.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Touched names, in first-touch order.
    pub fn touched(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Build a patch from a JSON merge-patch document.
    ///
    /// Keys resolve against the members of `write` by exact, then
    /// case/separator-insensitive name and are stored under the canonical
    /// member name. Writable members decode through their own type, nested
    /// composites included; values for other members are kept untyped and
    /// skipped on apply. Returns the patch and the keys that resolved to no
    /// member.
    ///
    /// # Errors
    /// `AccessError::Assignment` when a value does not fit its member.
    pub fn from_json(
        document: &serde_json::Map<String, serde_json::Value>,
        write: &dyn TypeWriteAccessor,
    ) -> Result<(Self, Vec<String>), AccessError> {
        let members = write.members();
        let mut patch = Self::new();
        let mut unknown = Vec::new();
        for (key, raw) in document {
            let Some(member) = members.resolve(key) else {
                unknown.push(key.clone());
                continue;
            };
            let value = if member.can_write {
                write.decode(&member.name, raw)?
            } else {
                Value::untyped(raw)
            };
            patch.set(member.name.clone(), value);
        }
        Ok((patch, unknown))
    }

    /// Replay the changes onto `instance`, field by field.
    ///
    /// Best effort: a change that cannot be assigned is logged and reported in
    /// `skipped`; the remaining changes still apply.
    pub fn apply_to(&self, instance: &mut dyn Any, write: &dyn TypeWriteAccessor) -> PatchOutcome {
        let mut outcome = PatchOutcome::default();
        for (name, value) in &self.changes {
            if write.try_set(instance, name, value.clone()) {
                outcome.applied.push(name.clone());
            } else {
                warn!(type_name = write.type_name(), field = %name, "skipping patch field");
                outcome.skipped.push(name.clone());
            }
        }
        outcome
    }
}
