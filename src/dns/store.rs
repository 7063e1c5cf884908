//! The Record Store: a thread-safe in-memory map of records with
//! versioning, change-notification fan-out, and atomic partial reload
//! (§4.1). Grounded on the donor's `authority.rs` `Zone`/`Zones` pair — a
//! `std::sync::RwLock`-guarded map on the same call path as query serving —
//! rather than the donor's `parking_lot`-based modules (`geodns.rs`,
//! `k8s/operator.rs`), which sit off the hot path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::dns::cancellation::{CancellationContext, Cancelled};
use crate::dns::errors::StoreError;
use crate::dns::record::{Record, RecordKey, RecordType};

/// Where a `Reloaded` event came from — lets subscribers distinguish a
/// document-driven reload from any other one without racing a shared flag
/// against queue-drain timing (§4.3 "Echo suppression", P10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOrigin {
    /// Applied by the Declarative Synchronizer from an incoming document.
    Document,
    /// Any other source (a full `hot_reload`, or `partial_reload` called
    /// outside the document-sync path).
    Internal,
}

/// A change in the store's contents, the unit of change-notification
/// fan-out (§3 "Storage event").
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    Added(Record),
    Updated(Record),
    Deleted(RecordKey),
    Reloaded(ReloadOrigin),
}

/// `(added[], updated[], deleted[key])` — the unit of atomic reload (§3
/// "Change set"), produced by the Diff Engine and consumed by
/// `PartialReload`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<Record>,
    pub updated: Vec<Record>,
    pub deleted: Vec<RecordKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Capacity of each subscriber's event queue. Chosen generously relative to
/// a typical reload's record count; a subscriber that falls further behind
/// than this is, by design, allowed to miss events (§4.1, §9 "Event fan-out
/// vs back-pressure").
const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

struct Subscriber {
    id: u64,
    sender: SyncSender<StorageEvent>,
}

/// How often a cancellable `Subscription::recv` wakes to recheck its
/// context between queue polls.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live subscription returned by `Store::watch`. Dropping it unregisters
/// the subscriber and releases its queue slot. `recv` additionally
/// terminates as soon as its cancellation context is cancelled, releasing
/// the subscription slot on the way out (§4.1 "Watch streams terminate when
/// the context is cancelled and release their subscription slot").
pub struct Subscription {
    id: u64,
    store: Arc<Store>,
    cancellation: CancellationContext,
    pub receiver: std::sync::mpsc::Receiver<StorageEvent>,
}

impl Subscription {
    /// Blocks for the next event, waking periodically to check
    /// `cancellation` so the call returns promptly after cancellation
    /// instead of blocking indefinitely on an event that may never come.
    pub fn recv(&self) -> Result<StorageEvent, Cancelled> {
        loop {
            self.cancellation.check()?;
            match self.receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(event) => return Ok(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(Cancelled),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
    }
}

/// The Record Store. Construct behind an `Arc` — `watch` hands subscribers
/// a clone of that `Arc` so their `Subscription` can unregister itself.
pub struct Store {
    records: RwLock<HashMap<RecordKey, Record>>,
    version: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Store {
        Store {
            records: RwLock::new(HashMap::new()),
            version: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Non-blocking fan-out: a subscriber whose queue is full simply misses
    /// this event (§4.1 concurrency note).
    fn emit(&self, event: StorageEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|sub| match sub.sender.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn watch(self: &Arc<Self>, ctx: CancellationContext) -> Subscription {
        let (tx, rx) = sync_channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { id, sender: tx });

        Subscription {
            id,
            store: Arc::clone(self),
            cancellation: ctx,
            receiver: rx,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|sub| sub.id != id);
    }

    pub fn get(
        &self,
        name: &str,
        rtype: RecordType,
        ctx: &CancellationContext,
    ) -> Result<Record, StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let key = RecordKey::new(name, rtype);
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&key).cloned().ok_or(StoreError::RecordNotFound)
    }

    pub fn list(&self, ctx: &CancellationContext) -> Result<Vec<Record>, StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.values().cloned().collect())
    }

    pub fn create(&self, record: Record, ctx: &CancellationContext) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let key = record.key();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&key) {
            return Err(StoreError::RecordAlreadyExists);
        }
        records.insert(key, record.clone());
        drop(records);

        self.bump_version();
        self.emit(StorageEvent::Added(record));
        Ok(())
    }

    pub fn update(&self, record: Record, ctx: &CancellationContext) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let key = record.key();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if !records.contains_key(&key) {
            return Err(StoreError::RecordNotFound);
        }
        records.insert(key, record.clone());
        drop(records);

        self.bump_version();
        self.emit(StorageEvent::Updated(record));
        Ok(())
    }

    /// Create-or-append semantics for the ACME DNS-01 collaborator (§6): if
    /// a record already exists at `record`'s key, its `value` list is
    /// appended to rather than replaced.
    pub fn create_or_append(
        &self,
        record: Record,
        ctx: &CancellationContext,
    ) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let key = record.key();
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let event = match records.get_mut(&key) {
            Some(existing) => {
                existing.value.extend(record.value.iter().cloned());
                existing.ttl = record.ttl;
                StorageEvent::Updated(existing.clone())
            }
            None => {
                records.insert(key, record.clone());
                StorageEvent::Added(record)
            }
        };
        drop(records);

        self.bump_version();
        self.emit(event);
        Ok(())
    }

    pub fn delete(
        &self,
        name: &str,
        rtype: RecordType,
        ctx: &CancellationContext,
    ) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let key = RecordKey::new(name, rtype);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.remove(&key).is_none() {
            return Err(StoreError::RecordNotFound);
        }
        drop(records);

        self.bump_version();
        self.emit(StorageEvent::Deleted(key));
        Ok(())
    }

    /// Wildcard fallback lookup (§4.5 "Wildcard fallback"): for
    /// `a.b.c.tld.`, tries `*.b.c.tld.`, `*.*.c.tld.`, ... in that order,
    /// first match wins. Never matches the apex domain itself (a name with
    /// two labels or fewer has no wildcard pattern to try).
    pub fn get_wildcard(
        &self,
        name: &str,
        rtype: RecordType,
        ctx: &CancellationContext,
    ) -> Result<Record, StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let trimmed = name.trim_end_matches('.');
        let labels: Vec<&str> = trimmed.split('.').filter(|l| !l.is_empty()).collect();

        if labels.len() <= 2 {
            return Err(StoreError::RecordNotFound);
        }

        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        for k in 1..=(labels.len() - 2) {
            ctx.check().map_err(|_| StoreError::Cancelled)?;
            let stars = vec!["*"; k].join(".");
            let pattern = format!("{stars}.{}.", labels[k..].join("."));
            let key = RecordKey::new(pattern, rtype);
            if let Some(record) = records.get(&key) {
                return Ok(record.clone());
            }
        }

        Err(StoreError::RecordNotFound)
    }

    /// Replaces the entire contents of the store atomically (§4.1 "Reload
    /// atomicity").
    pub fn hot_reload(
        &self,
        new_records: Vec<Record>,
        ctx: &CancellationContext,
    ) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.clear();
        for record in new_records {
            records.insert(record.key(), record);
        }
        drop(records);

        self.bump_version();
        self.emit(StorageEvent::Reloaded(ReloadOrigin::Internal));
        Ok(())
    }

    /// Applies an add/update/delete change set under a single exclusive
    /// lock acquisition: observers see all of it or none of it (P4).
    /// `origin` is carried on the resulting `Reloaded` event so subscribers
    /// can tell a document-driven reload apart from any other one without
    /// consulting external shared state (§4.3 "Echo suppression").
    pub fn partial_reload(
        &self,
        changes: ChangeSet,
        origin: ReloadOrigin,
        ctx: &CancellationContext,
    ) -> Result<(), StoreError> {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        for record in changes.added {
            records.insert(record.key(), record);
        }
        for record in changes.updated {
            records.insert(record.key(), record);
        }
        for key in changes.deleted {
            records.remove(&key);
        }
        drop(records);

        self.bump_version();
        self.emit(StorageEvent::Reloaded(origin));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, rtype: RecordType, ttl: u32, values: &[&str]) -> Record {
        Record::new(
            name,
            rtype,
            ttl,
            values.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn ctx() -> CancellationContext {
        CancellationContext::none()
    }

    #[test]
    fn test_create_get_delete() {
        let store = Store::new();
        let r = rec("www.example.com.", RecordType::A, 300, &["1.2.3.4"]);
        store.create(r.clone(), &ctx()).unwrap();

        let got = store.get("www.example.com.", RecordType::A, &ctx()).unwrap();
        assert_eq!(got, r);

        store.delete("www.example.com.", RecordType::A, &ctx()).unwrap();
        assert_eq!(
            store.get("www.example.com.", RecordType::A, &ctx()),
            Err(StoreError::RecordNotFound)
        );
    }

    #[test]
    fn test_create_existing_key_fails() {
        let store = Store::new();
        let r = rec("www.example.com.", RecordType::A, 300, &["1.2.3.4"]);
        store.create(r.clone(), &ctx()).unwrap();
        assert_eq!(
            store.create(r, &ctx()),
            Err(StoreError::RecordAlreadyExists)
        );
    }

    #[test]
    fn test_update_missing_key_fails() {
        let store = Store::new();
        let r = rec("www.example.com.", RecordType::A, 300, &["1.2.3.4"]);
        assert_eq!(store.update(r, &ctx()), Err(StoreError::RecordNotFound));
    }

    #[test]
    fn test_cancelled_context_short_circuits_every_operation() {
        let store = Store::new();
        let handle = crate::dns::cancellation::CancellationHandle::new();
        let cancelled = handle.context();
        handle.cancel();

        let r = rec("a.example.com.", RecordType::A, 300, &["1.1.1.1"]);
        assert_eq!(store.create(r.clone(), &cancelled), Err(StoreError::Cancelled));
        assert_eq!(
            store.get("a.example.com.", RecordType::A, &cancelled),
            Err(StoreError::Cancelled)
        );
        assert_eq!(store.list(&cancelled), Err(StoreError::Cancelled));
    }

    #[test]
    fn test_version_monotonic_on_write_not_on_read() {
        let store = Store::new();
        let before = store.version();
        store
            .create(rec("a.example.com.", RecordType::A, 300, &["1.1.1.1"]), &ctx())
            .unwrap();
        let after_write = store.version();
        assert!(after_write > before);

        let _ = store.get("a.example.com.", RecordType::A, &ctx());
        let _ = store.list(&ctx());
        assert_eq!(store.version(), after_write);
    }

    #[test]
    fn test_create_or_append_appends_values() {
        let store = Store::new();
        store
            .create_or_append(
                rec("_acme-challenge.ex.com.", RecordType::Txt, 60, &["t1"]),
                &ctx(),
            )
            .unwrap();
        store
            .create_or_append(
                rec("_acme-challenge.ex.com.", RecordType::Txt, 60, &["t2"]),
                &ctx(),
            )
            .unwrap();

        let got = store
            .get("_acme-challenge.ex.com.", RecordType::Txt, &ctx())
            .unwrap();
        assert_eq!(got.value, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn test_partial_reload_atomic_and_single_version_bump() {
        let store = Store::new();
        store
            .create(rec("keep.ex.com.", RecordType::A, 300, &["1.1.1.1"]), &ctx())
            .unwrap();
        store
            .create(rec("gone.ex.com.", RecordType::A, 300, &["2.2.2.2"]), &ctx())
            .unwrap();

        let before = store.version();
        store
            .partial_reload(
                ChangeSet {
                    added: vec![rec("new.ex.com.", RecordType::A, 300, &["3.3.3.3"])],
                    updated: vec![rec("keep.ex.com.", RecordType::A, 600, &["1.1.1.1"])],
                    deleted: vec![RecordKey::new("gone.ex.com.", RecordType::A)],
                },
                ReloadOrigin::Internal,
                &ctx(),
            )
            .unwrap();
        assert_eq!(store.version(), before + 1);

        assert!(store.get("new.ex.com.", RecordType::A, &ctx()).is_ok());
        assert_eq!(
            store.get("keep.ex.com.", RecordType::A, &ctx()).unwrap().ttl,
            600
        );
        assert_eq!(
            store.get("gone.ex.com.", RecordType::A, &ctx()),
            Err(StoreError::RecordNotFound)
        );
    }

    #[test]
    fn test_empty_changeset_is_noop() {
        let store = Store::new();
        let before = store.version();
        store
            .partial_reload(ChangeSet::default(), ReloadOrigin::Internal, &ctx())
            .unwrap();
        assert_eq!(store.version(), before);
    }

    #[test]
    fn test_wildcard_fallback_first_match_wins() {
        let store = Store::new();
        store
            .create(rec("*.b.c.tld.", RecordType::A, 300, &["9.9.9.9"]), &ctx())
            .unwrap();
        store
            .create(rec("*.*.c.tld.", RecordType::A, 300, &["8.8.8.8"]), &ctx())
            .unwrap();

        let got = store
            .get_wildcard("a.b.c.tld.", RecordType::A, &ctx())
            .unwrap();
        assert_eq!(got.value, vec!["9.9.9.9".to_string()]);
    }

    #[test]
    fn test_wildcard_never_matches_apex() {
        let store = Store::new();
        store
            .create(rec("*.tld.", RecordType::A, 300, &["9.9.9.9"]), &ctx())
            .unwrap();
        assert_eq!(
            store.get_wildcard("tld.", RecordType::A, &ctx()),
            Err(StoreError::RecordNotFound)
        );
    }

    #[test]
    fn test_watch_receives_events_and_drop_unsubscribes() {
        let store = Arc::new(Store::new());
        let sub = store.watch(ctx());
        store
            .create(rec("a.example.com.", RecordType::A, 300, &["1.1.1.1"]), &ctx())
            .unwrap();

        match sub.receiver.try_recv() {
            Ok(StorageEvent::Added(r)) => assert_eq!(r.name, "a.example.com."),
            other => panic!("expected Added event, got {other:?}"),
        }

        drop(sub);
        assert_eq!(store.subscribers.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_watch_drops_events_when_subscriber_queue_full() {
        let store = Arc::new(Store::new());
        let sub = store.watch(ctx());
        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            store
                .create(
                    rec(&format!("host{i}.example.com."), RecordType::A, 300, &["1.1.1.1"]),
                    &ctx(),
                )
                .unwrap();
        }
        // The store itself must not have blocked or errored on the full queue.
        assert_eq!(store.list(&ctx()).unwrap().len(), SUBSCRIBER_QUEUE_CAPACITY + 10);
        drop(sub);
    }

    #[test]
    fn test_subscription_recv_returns_cancelled_once_context_cancels() {
        let store = Arc::new(Store::new());
        let handle = crate::dns::cancellation::CancellationHandle::new();
        let sub = store.watch(handle.context());
        handle.cancel();
        assert_eq!(sub.recv(), Err(Cancelled));
    }
}
