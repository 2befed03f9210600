//! Snapshot diff: which records of the current poll were not in the previous one.
//!
//! Rules:
//! - No previous snapshot (first cycle): everything in `current` is new.
//! - Otherwise a record is new iff its `id` is absent from the whole previous
//!   snapshot. Membership goes through a HashSet of previous ids, so the order
//!   of `previous` never matters.
//! - Output keeps `current`'s relative order. Duplicate ids inside `current`
//!   are classified one by one (both copies of a new id are returned).
//!
//! Pure: no I/O, inputs are only borrowed.

use std::collections::HashSet;

use crate::record::{Record, Snapshot};

/// Records of `current` that are new relative to `previous`, in `current`'s order.
pub fn compute_new_records(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<Record> {
    new_record_refs(previous, current).into_iter().cloned().collect()
}

/// Borrowing variant of [`compute_new_records`].
pub fn new_record_refs<'a>(previous: Option<&Snapshot>, current: &'a Snapshot) -> Vec<&'a Record> {
    let Some(previous) = previous else {
        return current.iter().collect();
    };

    let seen: HashSet<&str> = previous.iter().map(|r| r.id.as_str()).collect();
    current
        .iter()
        .filter(|r| !seen.contains(r.id.as_str()))
        .collect()
}
