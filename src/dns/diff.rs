//! The Diff Engine (§4.2): compares an incoming record set against the
//! store's current contents and produces an Added/Updated/Deleted change
//! set. No direct donor equivalent exists (the donor's `authority.rs` has no
//! diffing logic); this module follows the donor's general style of a free
//! function over a flat map projection, paralleling how `server.rs` free
//! functions operate directly on `DnsPacket`/`Vec<DnsRecord>` rather than
//! wrapping everything in a struct.

use std::collections::HashMap;

use crate::dns::cancellation::CancellationContext;
use crate::dns::errors::StoreError;
use crate::dns::record::{Record, RecordKey};
use crate::dns::store::{ChangeSet, Store};

/// Computes the change set that would bring the store's contents in line
/// with `new_set`. Takes only a shared lock (`Store::list`).
pub fn calculate_changes(
    store: &Store,
    new_set: &[Record],
    ctx: &CancellationContext,
) -> Result<ChangeSet, StoreError> {
    let old: HashMap<RecordKey, Record> =
        store.list(ctx)?.into_iter().map(|r| (r.key(), r)).collect();
    let new: HashMap<RecordKey, &Record> = new_set.iter().map(|r| (r.key(), r)).collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut deleted = Vec::new();

    for (key, new_record) in &new {
        ctx.check().map_err(|_| StoreError::Cancelled)?;
        match old.get(key) {
            None => added.push((*new_record).clone()),
            Some(old_record) => {
                if old_record.ttl != new_record.ttl || old_record.value != new_record.value {
                    updated.push((*new_record).clone());
                }
            }
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            deleted.push(key.clone());
        }
    }

    Ok(ChangeSet {
        added,
        updated,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::RecordType;

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
    fn test_added_updated_deleted() {
        let store = Store::new();
        store
            .create(rec("keep.ex.com.", RecordType::A, 300, &["1.1.1.1"]), &ctx())
            .unwrap();
        store
            .create(rec("change.ex.com.", RecordType::A, 300, &["2.2.2.2"]), &ctx())
            .unwrap();
        store
            .create(rec("remove.ex.com.", RecordType::A, 300, &["3.3.3.3"]), &ctx())
            .unwrap();

        let new_set = vec![
            rec("keep.ex.com.", RecordType::A, 300, &["1.1.1.1"]),
            rec("change.ex.com.", RecordType::A, 600, &["2.2.2.2"]),
            rec("new.ex.com.", RecordType::A, 300, &["4.4.4.4"]),
        ];

        let changes = calculate_changes(&store, &new_set, &ctx()).unwrap();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].name, "new.ex.com.");
        assert_eq!(changes.updated.len(), 1);
        assert_eq!(changes.updated[0].name, "change.ex.com.");
        assert_eq!(changes.deleted.len(), 1);
        assert_eq!(changes.deleted[0].name, "remove.ex.com.");
    }

    #[test]
    fn test_round_trip_through_diff_is_empty() {
        // P3: CalculateChanges(List()) is always the empty change set.
        let store = Store::new();
        store
            .create(rec("a.ex.com.", RecordType::A, 300, &["1.1.1.1"]), &ctx())
            .unwrap();
        store
            .create(rec("b.ex.com.", RecordType::Txt, 300, &["hello", "world"]), &ctx())
            .unwrap();

        let snapshot = store.list(&ctx()).unwrap();
        let changes = calculate_changes(&store, &snapshot, &ctx()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_value_order_is_significant() {
        let store = Store::new();
        store
            .create(rec("a.ex.com.", RecordType::Txt, 300, &["t1", "t2"]), &ctx())
            .unwrap();

        let reordered = vec![rec("a.ex.com.", RecordType::Txt, 300, &["t2", "t1"])];
        let changes = calculate_changes(&store, &reordered, &ctx()).unwrap();
        assert_eq!(changes.updated.len(), 1);
    }

    #[test]
    fn test_cancelled_context_short_circuits() {
        let store = Store::new();
        let handle = crate::dns::cancellation::CancellationHandle::new();
        let cancelled = handle.context();
        handle.cancel();
        assert_eq!(
            calculate_changes(&store, &[], &cancelled),
            Err(StoreError::Cancelled)
        );
    }
}
