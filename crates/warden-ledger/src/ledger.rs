//! Violation ledger: the in-memory source of truth.
//!
//! The ledger owns the [`Snapshot`] behind a `parking_lot::RwLock`. Every
//! operation takes the lock for the duration of one read or one
//! read-modify-write, so a single [`ViolationLedger::increment_warning`] can
//! never lose an update, whatever the interleaving.
//!
//! Enforcement needs more than that: the increment, the audit append and the
//! save that follows must not interleave with another enforcement for the same
//! member. [`ViolationLedger::lock_member`] hands out a per-`(community,
//! member)` async mutex for that. Different members never contend.
//!
//! Mutating operations do not persist. Callers group related mutations and
//! then call [`ViolationLedger::persist`] once.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use warden_core::{AuditEntry, CommunityId, MemberId, MemberKey, Snapshot};

use crate::error::StoreError;
use crate::store::{LoadOrigin, SnapshotStore};

/// Which warning counters [`ViolationLedger::reset_warnings`] clears.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetScope {
    /// One member in one community.
    Member(CommunityId, MemberId),
    /// Every member in one community.
    Community(CommunityId),
    /// Every member in every community.
    All,
}

impl ResetScope {
    /// Scope from optional arguments: both → member, community only →
    /// community, neither → all.
    pub fn from_parts(community: Option<CommunityId>, member: Option<MemberId>) -> Self {
        match (community, member) {
            (Some(c), Some(m)) => Self::Member(c, m),
            (Some(c), None) => Self::Community(c),
            (None, _) => Self::All,
        }
    }
}

/// Aggregate warning figures for one community.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommunityStats {
    /// Sum of all member counts.
    pub total_warnings: u64,
    /// Members with a non-zero count.
    pub warned_members: usize,
}

/// Exclusive access to one member, from [`ViolationLedger::lock_member`].
///
/// Dropping it releases the lock and forgets the entry once nobody else holds
/// or awaits it.
#[must_use = "the member lock is released when the guard is dropped"]
pub struct MemberGuard<'a> {
    locks: &'a DashMap<MemberKey, Arc<Mutex<()>>>,
    key: MemberKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MemberGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the Arc under the shard lock, so a count of one means
        // only the map still refers to it.
        let _ = self
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// In-memory ledger backed by a [`SnapshotStore`].
pub struct ViolationLedger {
    state: RwLock<Snapshot>,
    member_locks: DashMap<MemberKey, Arc<Mutex<()>>>,
    store: Arc<dyn SnapshotStore>,
    persist_lock: Mutex<()>,
    origin: LoadOrigin,
}

impl ViolationLedger {
    /// Load the persisted snapshot and build a ledger around it.
    pub async fn open(store: Arc<dyn SnapshotStore>) -> Self {
        let loaded = store.load().await;
        if matches!(loaded.origin, LoadOrigin::Recovered { .. }) {
            warn!("ledger started from an empty state after recovery");
        }
        info!(
            enabled_communities = loaded.snapshot.enabled_count(),
            "violation ledger ready"
        );
        Self::build(loaded.snapshot, store, loaded.origin)
    }

    /// Build a ledger from an already validated snapshot.
    pub fn with_snapshot(snapshot: Snapshot, store: Arc<dyn SnapshotStore>) -> Self {
        Self::build(snapshot, store, LoadOrigin::Existing)
    }

    fn build(snapshot: Snapshot, store: Arc<dyn SnapshotStore>, origin: LoadOrigin) -> Self {
        Self {
            state: RwLock::new(snapshot),
            member_locks: DashMap::new(),
            store,
            persist_lock: Mutex::new(()),
            origin,
        }
    }

    /// How the starting snapshot was obtained.
    pub fn load_origin(&self) -> &LoadOrigin {
        &self.origin
    }

    // ── Enablement ──────────────────────────────────────────────────────

    /// Whether enforcement is on for `community`. Unknown → `false`.
    pub fn is_enabled(&self, community: &CommunityId) -> bool {
        self.state
            .read()
            .enabled
            .get(community)
            .copied()
            .unwrap_or(false)
    }

    /// Switch enforcement on or off for `community`.
    pub fn set_enabled(&self, community: &CommunityId, enabled: bool) {
        let _ = self.state.write().enabled.insert(community.clone(), enabled);
        debug!(community_id = %community, enabled, "enforcement flag set");
    }

    /// Number of communities with enforcement on.
    pub fn enabled_count(&self) -> usize {
        self.state.read().enabled_count()
    }

    // ── Warning counters ────────────────────────────────────────────────

    /// Current warning count. Unknown → 0.
    pub fn get_warning_count(&self, community: &CommunityId, member: &MemberId) -> u32 {
        self.state
            .read()
            .warnings
            .get(community)
            .and_then(|members| members.get(member))
            .copied()
            .unwrap_or(0)
    }

    /// Add exactly one warning and return the new count.
    pub fn increment_warning(&self, community: &CommunityId, member: &MemberId) -> u32 {
        let mut state = self.state.write();
        let count = state
            .warnings
            .entry(community.clone())
            .or_default()
            .entry(member.clone())
            .or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Clear warning counters. Returns how many member counters were removed.
    pub fn reset_warnings(&self, scope: &ResetScope) -> usize {
        let mut state = self.state.write();
        let cleared = match scope {
            ResetScope::Member(community, member) => state
                .warnings
                .get_mut(community)
                .and_then(|members| members.remove(member))
                .map_or(0, |_| 1),
            ResetScope::Community(community) => state
                .warnings
                .remove(community)
                .map_or(0, |members| members.len()),
            ResetScope::All => {
                let cleared = state.warnings.values().map(|m| m.len()).sum();
                state.warnings.clear();
                cleared
            }
        };
        drop(state);
        info!(?scope, cleared, "warnings reset");
        cleared
    }

    /// Members of `community` with their counts, highest first.
    pub fn community_warnings(&self, community: &CommunityId) -> Vec<(MemberId, u32)> {
        let state = self.state.read();
        let mut rows: Vec<(MemberId, u32)> = state
            .warnings
            .get(community)
            .map(|members| members.iter().map(|(m, c)| (m.clone(), *c)).collect())
            .unwrap_or_default();
        drop(state);
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Warning totals for `community`.
    pub fn community_stats(&self, community: &CommunityId) -> CommunityStats {
        let state = self.state.read();
        let Some(members) = state.warnings.get(community) else {
            return CommunityStats::default();
        };
        CommunityStats {
            total_warnings: members.values().map(|c| u64::from(*c)).sum(),
            warned_members: members.values().filter(|c| **c > 0).count(),
        }
    }

    // ── Audit trail ─────────────────────────────────────────────────────

    /// Append an entry to the audit trail.
    pub fn append_audit(&self, entry: AuditEntry) {
        self.state.write().audit.push(entry);
    }

    /// Copy of the audit trail, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.state.read().audit.clone()
    }

    // ── Serialization & persistence ─────────────────────────────────────

    /// Copy of the full current state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    /// Serialize access for one `(community, member)` pair.
    ///
    /// Hold the guard across increment, audit append and [`Self::persist`].
    pub async fn lock_member(&self, community: &CommunityId, member: &MemberId) -> MemberGuard<'_> {
        let key = MemberKey::new(community, member);
        let lock = self.member_locks.entry(key.clone()).or_default().clone();
        MemberGuard {
            locks: &self.member_locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Members with a live lock entry (held or awaited).
    pub fn member_lock_count(&self) -> usize {
        self.member_locks.len()
    }

    /// Write the current full state through the store.
    ///
    /// Saves are serialized and the snapshot is taken after the persist lock
    /// is held, so the document on disk always moves forward in time.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        self.store.save(&snapshot).await.inspect_err(|e| {
            warn!(error = %e, failure_class = %e.failure_class(), "ledger persist failed; in-memory state remains authoritative");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, Loaded};
    use async_trait::async_trait;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::AuditEntryId;

    /// Store that remembers the last saved snapshot in memory.
    #[derive(Default)]
    struct MemoryStore {
        saved: parking_lot::Mutex<Option<Snapshot>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn load(&self) -> Loaded {
            Loaded {
                snapshot: self.saved.lock().clone().unwrap_or_default(),
                origin: LoadOrigin::Existing,
            }
        }

        async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
            let _ = self.saves.fetch_add(1, Ordering::SeqCst);
            *self.saved.lock() = Some(snapshot.clone());
            Ok(())
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl SnapshotStore for BrokenStore {
        async fn load(&self) -> Loaded {
            Loaded {
                snapshot: Snapshot::default(),
                origin: LoadOrigin::Existing,
            }
        }

        async fn save(&self, _snapshot: &Snapshot) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn ledger() -> ViolationLedger {
        ViolationLedger::with_snapshot(Snapshot::default(), Arc::new(MemoryStore::default()))
    }

    fn g(id: &str) -> CommunityId {
        CommunityId::from(id)
    }

    fn u(id: &str) -> MemberId {
        MemberId::from(id)
    }

    fn entry(community: &str, member: &str, count: u32) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            timestamp: Utc::now(),
            community_id: g(community),
            member_id: u(member),
            message_id: None,
            score: 0.9,
            warning_count: count,
            timeout_secs: 600,
            message_deleted: true,
            member_timed_out: true,
        }
    }

    #[test]
    fn unknown_community_is_disabled() {
        assert!(!ledger().is_enabled(&g("nowhere")));
    }

    #[test]
    fn set_enabled_is_idempotent() {
        let ledger = ledger();
        ledger.set_enabled(&g("g1"), true);
        ledger.set_enabled(&g("g1"), true);
        assert!(ledger.is_enabled(&g("g1")));
        assert_eq!(ledger.enabled_count(), 1);

        ledger.set_enabled(&g("g1"), false);
        assert!(!ledger.is_enabled(&g("g1")));
        assert_eq!(ledger.snapshot().enabled.len(), 1);
    }

    #[test]
    fn unknown_member_has_zero_warnings() {
        assert_eq!(ledger().get_warning_count(&g("g1"), &u("u1")), 0);
    }

    #[test]
    fn increment_returns_new_count() {
        let ledger = ledger();
        assert_eq!(ledger.increment_warning(&g("g1"), &u("u1")), 1);
        assert_eq!(ledger.increment_warning(&g("g1"), &u("u1")), 2);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 2);
    }

    #[test]
    fn counters_are_scoped_by_community() {
        let ledger = ledger();
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        assert_eq!(ledger.get_warning_count(&g("g2"), &u("u1")), 0);
    }

    #[test]
    fn reset_member_only_touches_that_member() {
        let ledger = ledger();
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        let _ = ledger.increment_warning(&g("g1"), &u("u2"));

        assert_eq!(ledger.reset_warnings(&ResetScope::Member(g("g1"), u("u1"))), 1);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 0);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u2")), 1);

        // Idempotent.
        assert_eq!(ledger.reset_warnings(&ResetScope::Member(g("g1"), u("u1"))), 0);
    }

    #[test]
    fn reset_community_only_touches_that_community() {
        let ledger = ledger();
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        let _ = ledger.increment_warning(&g("g1"), &u("u2"));
        let _ = ledger.increment_warning(&g("g2"), &u("u1"));

        assert_eq!(ledger.reset_warnings(&ResetScope::Community(g("g1"))), 2);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 0);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u2")), 0);
        assert_eq!(ledger.get_warning_count(&g("g2"), &u("u1")), 1);
        assert_eq!(ledger.reset_warnings(&ResetScope::Community(g("g1"))), 0);
    }

    #[test]
    fn reset_all_is_global() {
        let ledger = ledger();
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        let _ = ledger.increment_warning(&g("g2"), &u("u2"));

        assert_eq!(ledger.reset_warnings(&ResetScope::All), 2);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 0);
        assert_eq!(ledger.get_warning_count(&g("g2"), &u("u2")), 0);
    }

    #[test]
    fn reset_keeps_enablement_and_audit() {
        let ledger = ledger();
        ledger.set_enabled(&g("g1"), true);
        ledger.append_audit(entry("g1", "u1", 1));
        let _ = ledger.reset_warnings(&ResetScope::All);
        assert!(ledger.is_enabled(&g("g1")));
        assert_eq!(ledger.audit_trail().len(), 1);
    }

    #[test]
    fn reset_scope_from_parts() {
        assert_eq!(
            ResetScope::from_parts(Some(g("g")), Some(u("u"))),
            ResetScope::Member(g("g"), u("u"))
        );
        assert_eq!(ResetScope::from_parts(Some(g("g")), None), ResetScope::Community(g("g")));
        assert_eq!(ResetScope::from_parts(None, Some(u("u"))), ResetScope::All);
    }

    #[test]
    fn leaderboard_sorted_by_count_desc() {
        let ledger = ledger();
        let _ = ledger.increment_warning(&g("g1"), &u("a"));
        for _ in 0..3 {
            let _ = ledger.increment_warning(&g("g1"), &u("b"));
        }
        for _ in 0..2 {
            let _ = ledger.increment_warning(&g("g1"), &u("c"));
        }
        let rows = ledger.community_warnings(&g("g1"));
        let order: Vec<&str> = rows.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(order, ["b", "c", "a"]);

        let stats = ledger.community_stats(&g("g1"));
        assert_eq!(stats.total_warnings, 6);
        assert_eq!(stats.warned_members, 3);
        assert_eq!(ledger.community_stats(&g("empty")), CommunityStats::default());
    }

    #[test]
    fn audit_is_append_only_in_order() {
        let ledger = ledger();
        ledger.append_audit(entry("g1", "u1", 1));
        ledger.append_audit(entry("g1", "u1", 2));
        let trail = ledger.audit_trail();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].warning_count, 1);
        assert_eq!(trail[1].warning_count, 2);
    }

    #[tokio::test]
    async fn mutations_do_not_persist_on_their_own() {
        let store = Arc::new(MemoryStore::default());
        let ledger = ViolationLedger::with_snapshot(Snapshot::default(), store.clone());
        ledger.set_enabled(&g("g1"), true);
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);

        ledger.persist().await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(store.saved.lock().clone().unwrap(), ledger.snapshot());
    }

    #[tokio::test]
    async fn persist_failure_keeps_memory_state() {
        let ledger = ViolationLedger::with_snapshot(Snapshot::default(), Arc::new(BrokenStore));
        let _ = ledger.increment_warning(&g("g1"), &u("u1"));
        assert!(ledger.persist().await.is_err());
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 1);
    }

    #[tokio::test]
    async fn open_from_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let first = ViolationLedger::open(Arc::new(JsonFileStore::new(&path))).await;
        assert_eq!(first.load_origin(), &LoadOrigin::Created);
        first.set_enabled(&g("g1"), true);
        let _ = first.increment_warning(&g("g1"), &u("u1"));
        first.append_audit(entry("g1", "u1", 1));
        first.persist().await.unwrap();

        let second = ViolationLedger::open(Arc::new(JsonFileStore::new(&path))).await;
        assert_eq!(second.load_origin(), &LoadOrigin::Existing);
        assert_eq!(second.snapshot(), first.snapshot());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_nothing() {
        let ledger = Arc::new(ledger());
        let k = 200;
        let mut handles = Vec::with_capacity(k);
        for _ in 0..k {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.increment_warning(&g("g1"), &u("u1"))
            }));
        }
        let mut seen = Vec::with_capacity(k);
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        let expected: Vec<u32> = (1..=200).collect();
        assert_eq!(seen, expected);
        assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn member_lock_serializes_unit_of_work() {
        let ledger = Arc::new(ledger());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let _guard = ledger.lock_member(&g("g1"), &u("u1")).await;
                let count = ledger.increment_warning(&g("g1"), &u("u1"));
                tokio::task::yield_now().await;
                ledger.append_audit(entry("g1", "u1", count));
                ledger.persist().await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Under the member lock, audit entries land in count order.
        let counts: Vec<u32> = ledger.audit_trail().iter().map(|e| e.warning_count).collect();
        let expected: Vec<u32> = (1..=50).collect();
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn released_member_locks_are_forgotten() {
        let ledger = ledger();
        let first = ledger.lock_member(&g("g1"), &u("u1")).await;
        let other = ledger.lock_member(&g("g1"), &u("u2")).await;
        assert_eq!(ledger.member_lock_count(), 2);

        drop(first);
        assert_eq!(ledger.member_lock_count(), 1);
        drop(other);
        assert_eq!(ledger.member_lock_count(), 0);
    }

    #[tokio::test]
    async fn awaited_member_lock_is_kept_for_the_waiter() {
        let ledger = Arc::new(ledger());
        let held = ledger.lock_member(&g("g1"), &u("u1")).await;

        let waiter = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let _guard = ledger.lock_member(&g("g1"), &u("u1")).await;
                ledger.increment_warning(&g("g1"), &u("u1"))
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(ledger.member_lock_count(), 0);
    }

    #[tokio::test]
    async fn different_members_do_not_contend() {
        let ledger = ledger();
        let _a = ledger.lock_member(&g("g1"), &u("u1")).await;
        let b = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            ledger.lock_member(&g("g1"), &u("u2")),
        )
        .await;
        assert!(b.is_ok());
    }

    proptest! {
        #[test]
        fn sequential_increments_count_exactly(n in 0u32..200) {
            let ledger = ledger();
            for _ in 0..n {
                let _ = ledger.increment_warning(&g("g1"), &u("u1"));
            }
            prop_assert_eq!(ledger.get_warning_count(&g("g1"), &u("u1")), n);
        }
    }
}
