//! Accessor cache.
//!
//! Maps `(type, member kinds, visibility scope)` to the descriptor set and the
//! read/write accessors built for it. Each key is built at most once: the
//! first caller takes a per-key build lock, concurrent callers for the same
//! key wait on it and then read the finished entry. Entries are never evicted;
//! the set of registered types is finite.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::accessor::{AccessorStrategy, CompiledAccessor, ScanAccessor, TypeReadAccessor, TypeWriteAccessor};
use crate::error::AccessError;
use crate::member::{Accessible, AccessorMembers, MemberKinds, VisibilityScope, select_members};

type BuildFn = fn(MemberKinds, VisibilityScope) -> Result<AccessorSet, AccessError>;

/// Runtime handle for an [`Accessible`] type.
///
/// Lets callers that only hold a handle (for example a route table built at
/// startup) request accessors without naming the concrete type.
#[derive(Clone, Copy)]
pub struct TypeHandle {
    id: TypeId,
    name: &'static str,
    build: BuildFn,
}

impl TypeHandle {
    #[must_use]
    pub fn of<T: Accessible>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::type_info().name,
            build: build_accessor_set::<T>,
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Cache key: equal iff type, kinds and scope are all equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccessorMembersKey {
    pub ty: TypeHandle,
    pub kinds: MemberKinds,
    pub scope: VisibilityScope,
}

impl AccessorMembersKey {
    #[must_use]
    pub fn new(ty: TypeHandle, kinds: MemberKinds, scope: VisibilityScope) -> Self {
        Self { ty, kinds, scope }
    }

    #[must_use]
    pub fn of<T: Accessible>(kinds: MemberKinds, scope: VisibilityScope) -> Self {
        Self::new(TypeHandle::of::<T>(), kinds, scope)
    }
}

/// Descriptors plus the accessors bound to them, shared by every caller.
#[derive(Clone)]
pub struct AccessorSet {
    pub members: Arc<AccessorMembers>,
    pub read: Arc<dyn TypeReadAccessor>,
    pub write: Arc<dyn TypeWriteAccessor>,
}

impl AccessorSet {
    #[must_use]
    pub fn strategy(&self) -> AccessorStrategy {
        self.read.strategy()
    }
}

impl fmt::Debug for AccessorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorSet")
            .field("type", &self.members.type_name())
            .field("strategy", &self.strategy())
            .field("members", &self.members.len())
            .finish()
    }
}

/// Universal accessors are required when the type or any selected member is
/// not publicly visible.
fn needs_universal<T: Accessible>(members: &AccessorMembers) -> bool {
    !T::type_info().is_publicly_visible() || members.any_non_public()
}

fn build_accessor_set<T: Accessible>(
    kinds: MemberKinds,
    scope: VisibilityScope,
) -> Result<AccessorSet, AccessError> {
    let info = T::type_info();
    let table = select_members::<T>(kinds, scope);
    let members = Arc::new(AccessorMembers::from_members(info.name, kinds, scope, &table));

    if let Some(dup) = members.duplicate_name() {
        return Err(AccessError::Construction {
            type_name: info.name,
            reason: format!("member '{dup}' is registered more than once"),
        });
    }

    if needs_universal::<T>(&members) {
        let accessor = Arc::new(ScanAccessor::new(members.clone(), table));
        Ok(AccessorSet {
            members,
            read: accessor.clone(),
            write: accessor,
        })
    } else {
        let accessor = Arc::new(CompiledAccessor::new(members.clone(), &table));
        Ok(AccessorSet {
            members,
            read: accessor.clone(),
            write: accessor,
        })
    }
}

/// Process-lifetime accessor cache. Construct once and share.
#[derive(Default)]
pub struct AccessorCache {
    entries: DashMap<AccessorMembersKey, Arc<AccessorSet>>,
    build_locks: DashMap<AccessorMembersKey, Arc<Mutex<()>>>,
    builds: AtomicUsize,
}

impl fmt::Debug for AccessorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorCache")
            .field("entries", &self.entries.len())
            .field("pending_builds", &self.build_locks.len())
            .field("builds", &self.builds())
            .finish()
    }
}

impl AccessorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached entry for `key`, building it on first use.
    ///
    /// # Errors
    /// Propagates `AccessError::Construction` from the build; nothing is
    /// cached in that case and the next call retries.
    pub fn get_or_build(&self, key: AccessorMembersKey) -> Result<Arc<AccessorSet>, AccessError> {
        if let Some(entry) = self.entries.get(&key) {
            trace!(type_name = key.ty.name(), "accessor cache hit");
            return Ok(entry.value().clone());
        }

        let lock = self.build_locks.entry(key).or_default().value().clone();
        let _guard = lock.lock();

        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.value().clone());
        }

        let set = match (key.ty.build)(key.kinds, key.scope) {
            Ok(set) => Arc::new(set),
            Err(err) => {
                self.build_locks.remove(&key);
                return Err(err);
            }
        };
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            type_name = key.ty.name(),
            kinds = key.kinds.bits(),
            scope = key.scope.bits(),
            strategy = ?set.strategy(),
            members = set.members.len(),
            "built accessors"
        );
        self.entries.insert(key, set.clone());
        self.build_locks.remove(&key);
        Ok(set)
    }

    /// # Errors
    /// See [`AccessorCache::get_or_build`].
    pub fn create_read_accessor(
        &self,
        ty: TypeHandle,
        kinds: MemberKinds,
        scope: VisibilityScope,
    ) -> Result<(Arc<dyn TypeReadAccessor>, Arc<AccessorMembers>), AccessError> {
        let set = self.get_or_build(AccessorMembersKey::new(ty, kinds, scope))?;
        Ok((set.read.clone(), set.members.clone()))
    }

    /// # Errors
    /// See [`AccessorCache::get_or_build`].
    pub fn create_write_accessor(
        &self,
        ty: TypeHandle,
        kinds: MemberKinds,
        scope: VisibilityScope,
    ) -> Result<Arc<dyn TypeWriteAccessor>, AccessError> {
        let set = self.get_or_build(AccessorMembersKey::new(ty, kinds, scope))?;
        Ok(set.write.clone())
    }

    /// # Errors
    /// See [`AccessorCache::get_or_build`].
    pub fn read_accessor<T: Accessible>(
        &self,
        kinds: MemberKinds,
        scope: VisibilityScope,
    ) -> Result<Arc<dyn TypeReadAccessor>, AccessError> {
        self.create_read_accessor(TypeHandle::of::<T>(), kinds, scope)
            .map(|(read, _)| read)
    }

    /// # Errors
    /// See [`AccessorCache::get_or_build`].
    pub fn write_accessor<T: Accessible>(
        &self,
        kinds: MemberKinds,
        scope: VisibilityScope,
    ) -> Result<Arc<dyn TypeWriteAccessor>, AccessError> {
        self.create_write_accessor(TypeHandle::of::<T>(), kinds, scope)
    }

    /// Number of entries built so far.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{Member, TypeInfo, Visibility};
    use crate::value::MemberValue;
    use std::sync::Barrier;

    #[derive(Default)]
    struct Open {
        a: i64,
        b: String,
    }

    impl Accessible for Open {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Open", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            vec![
                Member::<Self>::field::<i64>("a").getter(|o| o.a.to_value()),
                Member::<Self>::field::<String>("b").private().getter(|o| o.b.to_value()),
            ]
        }
    }

    struct Nested;

    impl Accessible for Nested {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Nested", Visibility::Public).nested_in_private()
        }

        fn members() -> Vec<Member<Self>> {
            vec![Member::<Self>::field::<i64>("n").getter(|_| 1_i64.to_value())]
        }
    }

    struct Twice;

    impl Accessible for Twice {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Twice", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            vec![Member::<Self>::field::<i64>("x"), Member::<Self>::field::<i64>("x")]
        }
    }

    #[test]
    fn test_strategy_decision_rule() {
        let cache = AccessorCache::new();
        let public_only = cache
            .get_or_build(AccessorMembersKey::of::<Open>(MemberKinds::ALL, VisibilityScope::PUBLIC))
            .unwrap();
        assert_eq!(public_only.strategy(), AccessorStrategy::Compiled);

        let all = cache
            .get_or_build(AccessorMembersKey::of::<Open>(MemberKinds::ALL, VisibilityScope::ALL))
            .unwrap();
        assert_eq!(all.strategy(), AccessorStrategy::Universal);

        let nested = cache
            .get_or_build(AccessorMembersKey::of::<Nested>(MemberKinds::ALL, VisibilityScope::PUBLIC))
            .unwrap();
        assert_eq!(nested.strategy(), AccessorStrategy::Universal);
    }

    #[test]
    fn test_same_key_reuses_entry() {
        let cache = AccessorCache::new();
        let key = AccessorMembersKey::of::<Open>(MemberKinds::FIELDS, VisibilityScope::PUBLIC);
        let first = cache.get_or_build(key).unwrap();
        let second = cache.get_or_build(key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.builds(), 1);

        let other = AccessorMembersKey::of::<Open>(MemberKinds::FIELDS, VisibilityScope::ALL);
        cache.get_or_build(other).unwrap();
        assert_eq!(cache.builds(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_first_requests_build_once() {
        const THREADS: usize = 16;
        let cache = AccessorCache::new();
        let barrier = Barrier::new(THREADS);
        let key = AccessorMembersKey::of::<Open>(MemberKinds::ALL, VisibilityScope::ALL);

        let sets: Vec<Arc<AccessorSet>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get_or_build(key).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.builds(), 1);
        assert!(sets.iter().all(|s| Arc::ptr_eq(s, &sets[0])));
    }

    #[test]
    fn test_duplicate_members_fail_construction() {
        let cache = AccessorCache::new();
        let err = cache
            .get_or_build(AccessorMembersKey::of::<Twice>(MemberKinds::ALL, VisibilityScope::ALL))
            .unwrap_err();
        assert!(matches!(err, AccessError::Construction { type_name: "Twice", .. }));
        assert_eq!(cache.builds(), 0);
        assert!(cache.is_empty());
        assert!(cache.build_locks.is_empty());

        let again = cache
            .get_or_build(AccessorMembersKey::of::<Twice>(MemberKinds::ALL, VisibilityScope::ALL));
        assert!(again.is_err());
        assert!(cache.build_locks.is_empty());
    }

    #[test]
    fn test_debug_reports_counts() {
        let cache = AccessorCache::new();
        cache
            .get_or_build(AccessorMembersKey::of::<Open>(MemberKinds::ALL, VisibilityScope::ALL))
            .unwrap();
        assert!(cache.build_locks.is_empty());
        assert_eq!(
            format!("{cache:?}"),
            "AccessorCache { entries: 1, pending_builds: 0, builds: 1 }"
        );
    }

    #[test]
    fn test_create_read_and_write_accessor_share_entry() {
        let cache = AccessorCache::new();
        let ty = TypeHandle::of::<Open>();
        let (read, members) = cache
            .create_read_accessor(ty, MemberKinds::FIELDS, VisibilityScope::PUBLIC)
            .unwrap();
        let write = cache
            .create_write_accessor(ty, MemberKinds::FIELDS, VisibilityScope::PUBLIC)
            .unwrap();
        assert_eq!(cache.builds(), 1);
        assert_eq!(members.names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(read.type_name(), "Open");
        assert_eq!(write.type_name(), "Open");
        assert_eq!(ty.name(), "Open");
        assert_eq!(ty, TypeHandle::of::<Open>());
        assert_ne!(ty, TypeHandle::of::<Nested>());
    }
}
