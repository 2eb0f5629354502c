//! Delta links and the `@deltaLink` envelope.
//!
//! [`DeltaTracker`] issues opaque links per tracked type and keeps an
//! append-only change log per type. A link resolves to the changes recorded
//! after it was issued, so repeated resolution of one link returns the same
//! list until the next `record` for that type. Links expire after the
//! configured retention; issuing a link or recording a change sweeps expired
//! state at most once per retention window.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::TypeHandle;
use crate::member::Accessible;

/// Reserved wire key carrying the link. Always written last.
pub const DELTA_LINK_KEY: &str = "@deltaLink";

/// A payload followed by its delta link.
///
/// `data` must serialize as a map; its entries come first and `@deltaLink`
/// is appended after them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaEnvelope<T> {
    #[serde(flatten)]
    pub data: T,
    #[serde(rename = "@deltaLink")]
    pub delta_link: String,
}

impl<T> DeltaEnvelope<T> {
    pub fn new(data: T, delta_link: impl Into<String>) -> Self {
        Self {
            data,
            delta_link: delta_link.into(),
        }
    }
}

/// A sequence payload under `value`, followed by its delta link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaCollection<T> {
    pub value: T,
    #[serde(rename = "@deltaLink")]
    pub delta_link: String,
}

impl<T> DeltaCollection<T> {
    pub fn new(value: T, delta_link: impl Into<String>) -> Self {
        Self {
            value,
            delta_link: delta_link.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// One recorded mutation of a tracked item.
#[derive(Debug)]
pub struct Change<T> {
    pub kind: ChangeKind,
    pub item: Arc<T>,
}

impl<T> Clone for Change<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            item: self.item.clone(),
        }
    }
}

/// What a link was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaTrackingInfo {
    pub type_name: String,
    pub issued_at: DateTime<Utc>,
    pub sequence: u64,
}

impl DeltaTrackingInfo {
    /// Opaque URL-safe link: base64url of a compact JSON object.
    #[must_use]
    pub fn encode(&self) -> String {
        let wire = serde_json::json!({
            "v": 1,
            "t": self.type_name,
            "ts": self.issued_at.timestamp_millis(),
            "n": self.sequence,
        });
        URL_SAFE_NO_PAD.encode(wire.to_string())
    }

    /// Inverse of [`DeltaTrackingInfo::encode`]; `None` for anything else.
    #[must_use]
    pub fn decode(link: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Wire {
            v: u8,
            t: String,
            ts: i64,
            n: u64,
        }

        let bytes = URL_SAFE_NO_PAD.decode(link).ok()?;
        let wire: Wire = serde_json::from_slice(&bytes).ok()?;
        if wire.v != 1 {
            return None;
        }
        Some(Self {
            type_name: wire.t,
            issued_at: DateTime::from_timestamp_millis(wire.ts)?,
            sequence: wire.n,
        })
    }
}

struct LinkEntry {
    type_id: TypeId,
    info: DeltaTrackingInfo,
}

struct ChangeRecord {
    sequence: u64,
    kind: ChangeKind,
    item: Arc<dyn Any + Send + Sync>,
}

/// In-memory link table and change log.
pub struct DeltaTracker {
    retention: TimeDelta,
    sequence: AtomicU64,
    /// Millisecond timestamp of the last sweep.
    last_sweep: AtomicI64,
    links: DashMap<String, LinkEntry>,
    tracked: DashMap<TypeId, Vec<DeltaTrackingInfo>>,
    changes: DashMap<TypeId, Vec<ChangeRecord>>,
}

impl fmt::Debug for DeltaTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeltaTracker")
            .field("retention", &self.retention)
            .field("links", &self.links.len())
            .field("tracked_types", &self.tracked.len())
            .field("logged_types", &self.changes.len())
            .finish_non_exhaustive()
    }
}

impl DeltaTracker {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
            sequence: AtomicU64::new(0),
            last_sweep: AtomicI64::new(Utc::now().timestamp_millis()),
            links: DashMap::new(),
            tracked: DashMap::new(),
            changes: DashMap::new(),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Purge once a full retention window has passed since the last sweep.
    /// Only the caller that claims the window runs the purge.
    fn sweep_if_due(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.retention.num_milliseconds() {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired_at(now);
        }
    }

    /// Issue a new link for `T`. Every call yields a distinct link.
    pub fn build_link<T: Accessible>(&self) -> String {
        self.build_link_for(TypeHandle::of::<T>())
    }

    pub fn build_link_for(&self, ty: TypeHandle) -> String {
        self.build_link_at(ty, Utc::now())
    }

    fn build_link_at(&self, ty: TypeHandle, now: DateTime<Utc>) -> String {
        self.sweep_if_due(now);
        let info = DeltaTrackingInfo {
            type_name: ty.name().to_owned(),
            issued_at: now,
            sequence: self.next_sequence(),
        };
        let link = info.encode();
        debug!(
            type_name = ty.name(),
            sequence = info.sequence,
            "issued delta link"
        );
        self.tracked.entry(ty.id()).or_default().push(info.clone());
        self.links.insert(
            link.clone(),
            LinkEntry {
                type_id: ty.id(),
                info,
            },
        );
        link
    }

    fn is_expired(&self, info: &DeltaTrackingInfo, now: DateTime<Utc>) -> bool {
        info.issued_at
            .checked_add_signed(self.retention)
            .is_some_and(|deadline| deadline < now)
    }

    /// Tracking info of a live link.
    #[must_use]
    pub fn resolve_link(&self, link: &str) -> Option<DeltaTrackingInfo> {
        self.resolve_link_at(link, Utc::now())
    }

    fn resolve_link_at(&self, link: &str, now: DateTime<Utc>) -> Option<DeltaTrackingInfo> {
        let entry = self.links.get(link)?;
        (!self.is_expired(&entry.info, now)).then(|| entry.info.clone())
    }

    /// Links issued for `T` and not yet purged, in issue order.
    #[must_use]
    pub fn tracked_links<T: Accessible>(&self) -> Vec<DeltaTrackingInfo> {
        self.tracked
            .get(&TypeId::of::<T>())
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// Append a change for `T` to the log.
    pub fn record<T: Accessible + Send + Sync>(&self, kind: ChangeKind, item: T) {
        self.record_at(kind, item, Utc::now());
    }

    fn record_at<T: Accessible + Send + Sync>(&self, kind: ChangeKind, item: T, now: DateTime<Utc>) {
        self.sweep_if_due(now);
        let sequence = self.next_sequence();
        self.changes
            .entry(TypeId::of::<T>())
            .or_default()
            .push(ChangeRecord {
                sequence,
                kind,
                item: Arc::new(item),
            });
    }

    /// Changes to `T` recorded after `link` was issued, in record order.
    ///
    /// `None` when the link is unknown, expired or was issued for another type.
    #[must_use]
    pub fn try_resolve_delta<T: Accessible + Send + Sync>(&self, link: &str) -> Option<Vec<Change<T>>> {
        self.try_resolve_delta_at(link, Utc::now())
    }

    fn try_resolve_delta_at<T: Accessible + Send + Sync>(
        &self,
        link: &str,
        now: DateTime<Utc>,
    ) -> Option<Vec<Change<T>>> {
        let type_id = TypeId::of::<T>();
        let since = {
            let entry = self.links.get(link)?;
            if entry.type_id != type_id || self.is_expired(&entry.info, now) {
                return None;
            }
            entry.info.sequence
        };
        let Some(log) = self.changes.get(&type_id) else {
            return Some(Vec::new());
        };
        Some(
            log.iter()
                .filter(|r| r.sequence > since)
                .filter_map(|r| {
                    r.item.clone().downcast::<T>().ok().map(|item| Change {
                        kind: r.kind,
                        item,
                    })
                })
                .collect(),
        )
    }

    /// Drop expired links and the change records no live link can reach.
    ///
    /// Returns the number of links removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.links.len();
        self.links.retain(|_, entry| !self.is_expired(&entry.info, now));
        let removed = before.saturating_sub(self.links.len());

        self.tracked.retain(|_, list| {
            list.retain(|info| !self.is_expired(info, now));
            !list.is_empty()
        });
        self.changes.retain(|type_id, log| {
            let Some(oldest) = self
                .tracked
                .get(type_id)
                .and_then(|list| list.iter().map(|i| i.sequence).min())
            else {
                return false;
            };
            log.retain(|r| r.sequence > oldest);
            true
        });

        if removed > 0 {
            debug!(removed, "purged expired delta links");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{Member, TypeInfo, Visibility};
    use crate::value::MemberValue;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Order {
        id: i64,
    }

    impl Accessible for Order {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Order", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            vec![Member::<Self>::field::<i64>("id").getter(|o| o.id.to_value())]
        }
    }

    struct Invoice;

    impl Accessible for Invoice {
        fn type_info() -> TypeInfo {
            TypeInfo::new("Invoice", Visibility::Public)
        }

        fn members() -> Vec<Member<Self>> {
            Vec::new()
        }
    }

    fn tracker() -> DeltaTracker {
        DeltaTracker::new(Duration::from_secs(60))
    }

    #[test]
    fn test_links_are_unique_and_url_safe() {
        let tracker = tracker();
        let now = Utc::now();
        let a = tracker.build_link_at(TypeHandle::of::<Order>(), now);
        let b = tracker.build_link_at(TypeHandle::of::<Order>(), now);
        assert_ne!(a, b);
        for link in [&a, &b] {
            assert!(link.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
            assert!(tracker.resolve_link(link).is_some());
        }
        assert_eq!(tracker.tracked_links::<Order>().len(), 2);
    }

    #[test]
    fn test_link_encodes_tracking_info() {
        let tracker = tracker();
        let link = tracker.build_link::<Order>();
        let info = tracker.resolve_link(&link).unwrap();
        assert_eq!(info.type_name, "Order");
        assert_eq!(DeltaTrackingInfo::decode(&link).unwrap().sequence, info.sequence);
        assert!(DeltaTrackingInfo::decode("garbage-token").is_none());
    }

    #[test]
    fn test_unknown_link_is_not_found() {
        let tracker = tracker();
        assert!(tracker.resolve_link("garbage-token").is_none());
        assert!(tracker.try_resolve_delta::<Order>("garbage-token").is_none());
    }

    #[test]
    fn test_changes_after_link_are_reproducible() {
        let tracker = tracker();
        tracker.record(ChangeKind::Added, Order { id: 1 });
        let link = tracker.build_link::<Order>();
        assert!(tracker.try_resolve_delta::<Order>(&link).unwrap().is_empty());

        tracker.record(ChangeKind::Updated, Order { id: 2 });
        tracker.record(ChangeKind::Removed, Order { id: 3 });
        let first = tracker.try_resolve_delta::<Order>(&link).unwrap();
        let second = tracker.try_resolve_delta::<Order>(&link).unwrap();
        let summary = |changes: &[Change<Order>]| {
            changes
                .iter()
                .map(|c| (c.kind, c.item.id))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            summary(&first),
            vec![(ChangeKind::Updated, 2), (ChangeKind::Removed, 3)]
        );
        assert_eq!(summary(&first), summary(&second));
    }

    #[test]
    fn test_link_for_other_type_does_not_resolve() {
        let tracker = tracker();
        let link = tracker.build_link::<Invoice>();
        assert!(tracker.try_resolve_delta::<Order>(&link).is_none());
    }

    #[test]
    fn test_expired_links_are_purged() {
        let tracker = tracker();
        let issued = Utc::now();
        let old = tracker.build_link_at(TypeHandle::of::<Order>(), issued);
        tracker.record(ChangeKind::Added, Order { id: 1 });
        let later = issued + TimeDelta::seconds(30);
        let fresh = tracker.build_link_at(TypeHandle::of::<Order>(), later);
        tracker.record(ChangeKind::Added, Order { id: 2 });

        let after_old = issued + TimeDelta::seconds(61);
        assert!(tracker.resolve_link_at(&old, after_old).is_none());
        assert!(tracker.try_resolve_delta_at::<Order>(&old, after_old).is_none());
        assert_eq!(tracker.try_resolve_delta_at::<Order>(&fresh, after_old).unwrap().len(), 1);

        assert_eq!(tracker.purge_expired_at(after_old), 1);
        assert_eq!(tracker.tracked_links::<Order>().len(), 1);
        let log_len = tracker.changes.get(&TypeId::of::<Order>()).map(|l| l.len());
        assert_eq!(log_len, Some(1));

        let all_gone = later + TimeDelta::seconds(61);
        assert_eq!(tracker.purge_expired_at(all_gone), 1);
        assert!(tracker.changes.is_empty());
    }

    #[test]
    fn test_expired_state_is_swept_without_manual_purge() {
        let tracker = tracker();
        let ty = TypeHandle::of::<Order>();
        let start = Utc::now();
        for id in 0..100 {
            tracker.build_link_at(ty, start);
            tracker.record_at(ChangeKind::Added, Order { id }, start);
        }
        assert_eq!(tracker.links.len(), 100);
        assert_eq!(tracker.tracked_links::<Order>().len(), 100);

        let later = start + TimeDelta::seconds(61);
        let link = tracker.build_link_at(ty, later);
        assert_eq!(tracker.links.len(), 1);
        assert_eq!(tracker.tracked_links::<Order>().len(), 1);
        assert!(tracker.changes.is_empty());
        assert!(tracker.resolve_link_at(&link, later).is_some());

        tracker.record_at(ChangeKind::Updated, Order { id: 7 }, later);
        let changes = tracker.try_resolve_delta_at::<Order>(&link, later).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].item.id, 7);
    }

    #[test]
    fn test_sweep_waits_for_a_full_window() {
        let tracker = tracker();
        let ty = TypeHandle::of::<Order>();
        let start = Utc::now();
        tracker.build_link_at(ty, start);
        tracker.build_link_at(ty, start + TimeDelta::seconds(30));
        assert_eq!(tracker.links.len(), 2);

        tracker.record_at(ChangeKind::Added, Order { id: 1 }, start + TimeDelta::seconds(75));
        assert_eq!(tracker.links.len(), 1);
        assert_eq!(tracker.changes.get(&TypeId::of::<Order>()).map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_envelopes_put_link_last() {
        let envelope = DeltaEnvelope::new(json!({"id": 1, "bar": "Baz"}), "xyz");
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(text.ends_with(r#""@deltaLink":"xyz"}"#));

        let collection = DeltaCollection::new(vec![json!({"id": 1})], "xyz");
        assert_eq!(
            serde_json::to_string(&collection).unwrap(),
            r#"{"value":[{"id":1}],"@deltaLink":"xyz"}"#
        );

        let back: DeltaEnvelope<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&text).unwrap();
        assert_eq!(back.delta_link, "xyz");
        assert_eq!(back.data.get("bar"), Some(&json!("Baz")));
    }
}
