//! Merging a fresh fetch into a hashtag's stored posts.
//!
//! Policy on id collision: the fetched record replaces the stored one. Stored
//! records missing from the fetch are kept, since the search is paginated and
//! capped and absence says nothing about deletion.

use harvest_core::{PostRecord, RecordError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub merged: Vec<PostRecord>,
    /// Fetched ids that were not in the stored dataset.
    pub new_count: usize,
    /// Distinct ids in the stored dataset before the merge.
    pub previously_known_count: usize,
    /// Stored records overwritten by their fetched version.
    pub replaced_count: usize,
    /// Fetched records dropped for lack of a usable id.
    pub rejected: Vec<RecordError>,
}

impl Reconciliation {
    /// Whether the merged set differs from what was stored. Replacements
    /// count, since a refetched post usually carries fresher stats.
    pub fn has_changes(&self) -> bool {
        self.new_count > 0 || self.replaced_count > 0
    }
}

/// Validate a raw batch. Records without a usable id are returned as errors
/// and take no further part in the merge.
pub fn validate_batch(batch: Vec<Value>) -> (Vec<PostRecord>, Vec<RecordError>) {
    let mut records = Vec::with_capacity(batch.len());
    let mut rejected = Vec::new();
    for (index, value) in batch.into_iter().enumerate() {
        match PostRecord::parse(value, index) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(e),
        }
    }
    (records, rejected)
}

/// Collapse repeated ids, keeping the last record seen for each id at the
/// position where the id first appeared.
pub fn dedup_last_wins(records: Vec<PostRecord>) -> Vec<PostRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<PostRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(record.id()) {
            Some(&pos) => unique[pos] = record,
            None => {
                positions.insert(record.id().to_string(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

/// Merge a raw fetched batch into the stored dataset.
pub fn reconcile(existing: Vec<PostRecord>, fetched: Vec<Value>) -> Reconciliation {
    let (fetched, rejected) = validate_batch(fetched);
    let mut reconciliation = merge(existing, fetched);
    reconciliation.rejected = rejected;
    reconciliation
}

/// Merge already validated records. The result holds the retained stored
/// records in their stored order followed by the fetched records in batch
/// order.
pub fn merge(existing: Vec<PostRecord>, fetched: Vec<PostRecord>) -> Reconciliation {
    let existing = dedup_last_wins(existing);
    let previously_known_count = existing.len();

    if fetched.is_empty() {
        return Reconciliation {
            merged: existing,
            new_count: 0,
            previously_known_count,
            replaced_count: 0,
            rejected: Vec::new(),
        };
    }

    let fetched = dedup_last_wins(fetched);
    let existing_ids: HashSet<&str> = existing.iter().map(PostRecord::id).collect();
    let fetched_ids: HashSet<&str> = fetched.iter().map(PostRecord::id).collect();
    let new_count = fetched_ids.difference(&existing_ids).count();
    let replaced_count = fetched_ids.len() - new_count;
    let keep: Vec<bool> = existing
        .iter()
        .map(|record| !fetched_ids.contains(record.id()))
        .collect();

    let mut merged = Vec::with_capacity(keep.iter().filter(|k| **k).count() + fetched.len());
    merged.extend(
        existing
            .into_iter()
            .zip(keep)
            .filter_map(|(record, keep)| keep.then_some(record)),
    );
    merged.extend(fetched);

    Reconciliation {
        merged,
        new_count,
        previously_known_count,
        replaced_count,
        rejected: Vec::new(),
    }
}
