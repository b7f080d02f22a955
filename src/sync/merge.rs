//! Entity merge logic
//!
//! Pure functions only: no shared state, so the pollers of different kinds
//! can call them concurrently.

use std::collections::HashMap;

use crate::model::{AidRequest, CanonicalId, HazardZone, Record, ReliefCenter, SosAlert};

/// Merge `remote` over `seed` keyed by canonical id.
///
/// Seed records keep their position, remote records replace seed records
/// sharing an id in place, and remote-only records are appended in the order
/// they were first seen. Duplicate ids inside `remote` collapse to the last one.
pub fn merge_by_id<T: Record>(seed: &[T], remote: &[T]) -> Vec<T> {
    let mut merged: Vec<T> = Vec::with_capacity(seed.len() + remote.len());
    let mut index: HashMap<CanonicalId, usize> = HashMap::with_capacity(merged.capacity());

    for record in seed.iter().chain(remote) {
        match index.get(record.canonical_id()) {
            Some(&slot) => merged[slot] = record.clone(),
            None => {
                index.insert(record.canonical_id().clone(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged
}

/// Replace (or append) one record by id, returning the new collection.
pub fn upsert<T: Record>(records: &[T], record: T) -> Vec<T> {
    merge_by_id(records, std::slice::from_ref(&record))
}

/// Drop one record by id, returning the new collection.
pub fn without<T: Record>(records: &[T], id: &CanonicalId) -> Vec<T> {
    records
        .iter()
        .filter(|r| r.canonical_id() != id)
        .cloned()
        .collect()
}

/// How a freshly fetched collection is folded into the current one.
pub trait Reconcile: Record {
    fn reconcile(previous: &[Self], seed: &[Self], remote: Vec<Self>) -> Vec<Self> {
        let _ = previous;
        merge_by_id(seed, &remote)
    }
}

impl Reconcile for ReliefCenter {}

impl Reconcile for HazardZone {}

impl Reconcile for SosAlert {}

impl Reconcile for AidRequest {
    /// Requests already known to be fulfilled or rejected never go back to
    /// pending, even if a stale snapshot completes after a fresh one.
    fn reconcile(previous: &[Self], seed: &[Self], remote: Vec<Self>) -> Vec<Self> {
        let terminal: HashMap<&CanonicalId, &AidRequest> = previous
            .iter()
            .filter(|r| r.is_terminal())
            .map(|r| (&r.id, r))
            .collect();

        merge_by_id(seed, &remote)
            .into_iter()
            .map(|incoming| match terminal.get(&incoming.id) {
                Some(known) if !incoming.is_terminal() => (*known).clone(),
                _ => incoming,
            })
            .collect()
    }
}
