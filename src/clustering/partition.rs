// src/clustering/partition.rs - Groups active records by administrative unit

use log::debug;
use std::collections::BTreeMap;

use crate::models::voter::VoterRecord;

/// Active records sharing one partition key, in ascending id order.
#[derive(Debug, Clone)]
pub struct Partition {
    pub key: String,
    pub records: Vec<VoterRecord>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Splits records into partitions ordered by key. Inactive records are
/// dropped; a missing key lands in the `UNKNOWN` bucket.
pub fn build_partitions(records: Vec<VoterRecord>) -> Vec<Partition> {
    let mut by_key: BTreeMap<String, Vec<VoterRecord>> = BTreeMap::new();
    let mut skipped_inactive = 0usize;

    for record in records {
        if !record.is_active() {
            skipped_inactive += 1;
            continue;
        }
        by_key
            .entry(record.partition().to_string())
            .or_default()
            .push(record);
    }

    if skipped_inactive > 0 {
        debug!("Skipped {} inactive records while partitioning", skipped_inactive);
    }

    by_key
        .into_iter()
        .map(|(key, mut records)| {
            records.sort_by_key(|r| r.id);
            Partition { key, records }
        })
        .collect()
}
