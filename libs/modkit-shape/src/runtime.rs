//! Process-wide shaping runtime.
//!
//! Owns the accessor cache, the delta tracker and the configuration. Build
//! one at startup and share it (`Arc<ShapeRuntime>`); tests build their own.

use std::any::Any;

use tracing::info;

use crate::accessor::TypeWriteAccessor;
use crate::cache::AccessorCache;
use crate::config::ShapeConfig;
use crate::delta::{Change, DeltaCollection, DeltaEnvelope, DeltaTracker};
use crate::error::{AccessError, QueryError};
use crate::member::{Accessible, MemberKinds, VisibilityScope};
use crate::patch::{MergePatch, PatchOutcome};
use crate::query::{ShapeParams, parse_delta_token};
use crate::shape::{FieldSelection, FieldShaper, ShapedPayload, read_shaped};

#[derive(Debug)]
pub struct ShapeRuntime {
    config: ShapeConfig,
    cache: AccessorCache,
    tracker: DeltaTracker,
}

impl Default for ShapeRuntime {
    fn default() -> Self {
        Self::new(ShapeConfig::default())
    }
}

impl ShapeRuntime {
    #[must_use]
    pub fn new(config: ShapeConfig) -> Self {
        info!(
            naming_policy = ?config.naming_policy,
            ignore_nulls = config.ignore_nulls,
            retention = %humantime::format_duration(config.delta.retention),
            "shape runtime initialized"
        );
        Self {
            tracker: DeltaTracker::new(config.delta.retention),
            cache: AccessorCache::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShapeConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &AccessorCache {
        &self.cache
    }

    #[must_use]
    pub fn tracker(&self) -> &DeltaTracker {
        &self.tracker
    }

    /// Selection requested by the query parameters, checked against the
    /// configured limits.
    ///
    /// # Errors
    /// See [`FieldSelection::from_params`].
    pub fn selection(&self, params: &ShapeParams) -> Result<FieldSelection, QueryError> {
        FieldSelection::from_params(params, &self.config.limits)
    }

    /// Shaper over the public fields and properties of `T`.
    ///
    /// # Errors
    /// `AccessError::Construction` when the accessors for `T` cannot be built.
    pub fn shaper<T: Accessible>(&self) -> Result<FieldShaper, AccessError> {
        let read = self
            .cache
            .read_accessor::<T>(MemberKinds::default(), VisibilityScope::PUBLIC)?;
        Ok(FieldShaper::new(read, self.config.shape_options()))
    }

    /// # Errors
    /// As [`ShapeRuntime::shaper`].
    pub fn shape<'a, T: Accessible>(
        &self,
        instance: &'a T,
        selection: &FieldSelection,
    ) -> Result<ShapedPayload<'a>, AccessError> {
        Ok(self.shaper::<T>()?.project(instance, selection))
    }

    /// Shape `instance` and attach a freshly issued delta link for `T`.
    ///
    /// # Errors
    /// As [`ShapeRuntime::shaper`].
    pub fn envelope<'a, T: Accessible>(
        &self,
        instance: &'a T,
        selection: &FieldSelection,
    ) -> Result<DeltaEnvelope<ShapedPayload<'a>>, AccessError> {
        let payload = self.shape(instance, selection)?;
        Ok(DeltaEnvelope::new(payload, self.tracker.build_link::<T>()))
    }

    /// Shape `items` under `value` and attach a freshly issued delta link.
    ///
    /// # Errors
    /// As [`ShapeRuntime::shaper`].
    pub fn collection_envelope<'a, T, I>(
        &self,
        items: I,
        selection: &FieldSelection,
    ) -> Result<DeltaCollection<ShapedPayload<'a>>, AccessError>
    where
        T: Accessible,
        I: IntoIterator<Item = &'a T>,
    {
        let payload = self.shaper::<T>()?.project_many(items, selection);
        Ok(DeltaCollection::new(payload, self.tracker.build_link::<T>()))
    }

    /// Changes to `T` since the link in `token`.
    ///
    /// `Ok(None)` for a well-formed token that is unknown, expired or issued
    /// for another type.
    ///
    /// # Errors
    /// `QueryError` when the token is malformed.
    pub fn resolve_delta<T: Accessible + Send + Sync>(
        &self,
        token: &str,
    ) -> Result<Option<Vec<Change<T>>>, QueryError> {
        let token = parse_delta_token(token, &self.config.limits)?;
        Ok(self.tracker.try_resolve_delta::<T>(token))
    }

    /// Rebuild a `T` from a shaped wire object.
    ///
    /// # Errors
    /// See [`read_shaped`].
    pub fn read<T: Accessible>(
        &self,
        json: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<T, AccessError> {
        let write = self.write_accessor::<T>()?;
        read_shaped(json, &*write, self.config.naming_policy)
    }

    /// Apply a JSON merge-patch document to `instance`.
    ///
    /// Keys that match no member are reported as skipped.
    ///
    /// # Errors
    /// `AccessError::Construction` when the accessors cannot be built,
    /// `AccessError::Assignment` when a value does not fit its declared type.
    pub fn patch<T: Accessible>(
        &self,
        instance: &mut T,
        document: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PatchOutcome, AccessError> {
        let write = self.write_accessor::<T>()?;
        let (patch, unknown) = MergePatch::from_json(document, &*write)?;
        let mut outcome = patch.apply_to(instance as &mut dyn Any, &*write);
        outcome.skipped.extend(unknown);
        Ok(outcome)
    }

    fn write_accessor<T: Accessible>(
        &self,
    ) -> Result<std::sync::Arc<dyn TypeWriteAccessor>, AccessError> {
        self.cache
            .write_accessor::<T>(MemberKinds::default(), VisibilityScope::PUBLIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{ChangeKind, DELTA_LINK_KEY};
    use crate::member::{Member, TypeInfo, Visibility};
    use crate::value::MemberValue;
    use serde_json::json;
    use tracing_test::traced_test;

    #[derive(Debug, Default, PartialEq)]
    struct Task {
        title: String,
        done: bool,
    }

    impl Accessible for Task {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Task", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            vec![
                Member::<Self>::field::<String>("title")
                    .getter(|t| t.title.to_value())
                    .setter(|t, v| {
                        t.title = MemberValue::from_value(v)?;
                        Ok(())
                    }),
                Member::<Self>::field::<bool>("done")
                    .getter(|t| t.done.to_value())
                    .setter(|t, v| {
                        t.done = MemberValue::from_value(v)?;
                        Ok(())
                    }),
            ]
        }

        fn construct() -> Option<Self> {
            Some(Self::default())
        }
    }

    #[test]
    #[traced_test]
    fn test_runtime_logs_initialization() {
        let _runtime = ShapeRuntime::default();
        assert!(logs_contain("shape runtime initialized"));
    }

    #[test]
    fn test_runtime_debug_lists_components() {
        let runtime = ShapeRuntime::default();
        runtime.shaper::<Task>().unwrap();
        let rendered = format!("{runtime:?}");
        assert!(rendered.contains("AccessorCache { entries: 1"));
        assert!(rendered.contains("DeltaTracker"));
    }

    #[test]
    fn test_envelope_and_delta_round_trip() {
        let runtime = ShapeRuntime::default();
        let task = Task {
            title: "write docs".to_owned(),
            done: false,
        };
        let envelope = runtime
            .envelope(&task, &FieldSelection::include(["title"]))
            .unwrap();
        let wire = serde_json::to_value(&envelope).unwrap();
        let link = wire[DELTA_LINK_KEY].as_str().unwrap().to_owned();
        assert_eq!(wire["title"], json!("write docs"));
        assert!(wire.get("done").is_none());

        runtime.tracker().record(ChangeKind::Updated, Task {
            title: "write docs".to_owned(),
            done: true,
        });
        let changes = runtime.resolve_delta::<Task>(&link).unwrap().unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].item.done);

        assert_eq!(runtime.resolve_delta::<Task>("bm90LWEtbGluaw").unwrap().map(|c| c.len()), None);
        assert_eq!(
            runtime.resolve_delta::<Task>("not a token").unwrap_err(),
            QueryError::MalformedToken
        );
    }

    #[test]
    fn test_collection_envelope() {
        let runtime = ShapeRuntime::default();
        let tasks = vec![Task::default(), Task {
            title: "b".to_owned(),
            done: true,
        }];
        let selection = runtime
            .selection(&ShapeParams {
                exclude: Some("title".to_owned()),
                ..ShapeParams::default()
            })
            .unwrap();
        let collection = runtime.collection_envelope(&tasks, &selection).unwrap();
        let wire = serde_json::to_value(&collection).unwrap();
        assert_eq!(wire["value"], json!([{"done": false}, {"done": true}]));
        assert!(wire[DELTA_LINK_KEY].is_string());
    }

    #[test]
    fn test_read_and_patch() {
        let runtime = ShapeRuntime::default();
        let task: Task = runtime.read(json!({"title": "x"}).as_object().unwrap()).unwrap();
        assert_eq!(task, Task {
            title: "x".to_owned(),
            done: false,
        });

        let mut task = task;
        let outcome = runtime
            .patch(&mut task, json!({"done": true, "owner": "me"}).as_object().unwrap())
            .unwrap();
        assert_eq!(outcome.applied, vec!["done"]);
        assert_eq!(outcome.skipped, vec!["owner"]);
        assert!(task.done);
        assert_eq!(runtime.cache().builds(), 1);
    }
}
