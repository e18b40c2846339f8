//! The logical document and the pending-change arithmetic applied to it.
//!
//! Every backend except the embedded store persists application state as a
//! single JSON object mapping string keys to arbitrary JSON values. Writes
//! that have not reached the backing store yet are tracked as a
//! [`ChangeSet`]: a map from key to [`PendingChange`]. A
//! [`PendingChange::Delete`] marker means "remove this key", which is
//! different from the key being absent from the change set (no change).

use std::collections::BTreeMap;

use serde_json::Value;

/// A whole logical document: key -> JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Unflushed changes keyed by document key.
///
/// Uses `BTreeMap` so that snapshots iterate in a deterministic order.
pub type ChangeSet = BTreeMap<String, PendingChange>;

/// A single unflushed write.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    /// Overwrite the key with a new value.
    Put(Value),
    /// Remove the key from the document.
    Delete,
}

/// Applies one change to `doc` in place.
pub fn apply_change(doc: &mut Document, key: &str, change: &PendingChange) {
    match change {
        PendingChange::Put(value) => {
            doc.insert(key.to_string(), value.clone());
        }
        PendingChange::Delete => {
            doc.remove(key);
        }
    }
}

/// Applies every change in `changes` to `doc`, in key order.
pub fn apply_changes(doc: &mut Document, changes: &ChangeSet) {
    for (key, change) in changes {
        apply_change(doc, key, change);
    }
}

/// Returns a copy of `base` with each change set in `layers` applied on top,
/// earlier layers first.
#[must_use]
pub fn overlay(base: &Document, layers: &[&ChangeSet]) -> Document {
    let mut doc = base.clone();
    for changes in layers {
        apply_changes(&mut doc, changes);
    }
    doc
}

/// Puts the entries of a failed `snapshot` back into `pending`.
///
/// Keys that received a newer change while the snapshot was in flight keep
/// the newer change. Returns the number of entries restored.
pub fn requeue(pending: &mut ChangeSet, snapshot: ChangeSet) -> usize {
    let mut restored = 0;
    for (key, change) in snapshot {
        if let std::collections::btree_map::Entry::Vacant(slot) = pending.entry(key) {
            slot.insert(change);
            restored += 1;
        }
    }
    restored
}

/// Parses a serialized document.
///
/// # Errors
///
/// Returns an error if `raw` is not valid JSON or is not a JSON object.
pub fn parse_document(raw: &str) -> serde_json::Result<Document> {
    serde_json::from_str(raw)
}

/// Parses a serialized document, treating corrupt content as empty.
///
/// Blank input is an empty document. Anything unparseable is logged and
/// also yields an empty document.
#[must_use]
pub fn parse_document_lossy(raw: &str, origin: &str) -> Document {
    if raw.trim().is_empty() {
        return Document::new();
    }
    match parse_document(raw) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(origin = %origin, error = %e, "stored document is corrupt; reading it as empty");
            Document::new()
        }
    }
}

/// Serializes a document as indented JSON, the on-the-wire layout of the
/// remote document file.
///
/// # Errors
///
/// Returns an error if a value cannot be serialized.
pub fn encode_document_pretty(doc: &Document) -> serde_json::Result<String> {
    serde_json::to_string_pretty(doc)
}
