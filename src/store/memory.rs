// src/store/memory.rs - In-process record store for tests and demos

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::stats_models::{PartitionCount, PartitionStat, StoreStatistics};
use crate::models::voter::{NameField, VoterRecord, REVIEW_DUPLICATE_DETECTED, STATUS_INACTIVE};
use crate::store::{duplicate_percentage, RecordStore, TOP_PARTITIONS};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<BTreeMap<i64, VoterRecord>>,
    /// When set, `mark_duplicates` fails once this many calls have succeeded.
    fail_after_batches: Option<usize>,
    mark_calls: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new(records: Vec<VoterRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|r| (r.id, r)).collect()),
            fail_after_batches: None,
            mark_calls: AtomicUsize::new(0),
        }
    }

    /// A store whose mutation calls start failing after `batches` successes.
    pub fn with_failure_after(records: Vec<VoterRecord>, batches: usize) -> Self {
        Self {
            fail_after_batches: Some(batches),
            ..Self::new(records)
        }
    }

    /// Snapshot of every record in id order.
    pub fn records(&self) -> Vec<VoterRecord> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, id: i64) -> Option<VoterRecord> {
        self.lock().get(&id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, VoterRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_active_records(
        &self,
        partition_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VoterRecord>> {
        let mut active: Vec<VoterRecord> = self
            .lock()
            .values()
            .filter(|r| r.is_active())
            .filter(|r| partition_filter.map_or(true, |p| r.partition() == p))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.partition().cmp(b.partition()).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            active.truncate(limit);
        }
        Ok(active)
    }

    async fn mark_duplicates(&self, pairs: &[(i64, i64)]) -> Result<usize> {
        let call = self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after_batches {
            if call >= limit {
                bail!("simulated store failure on batch {}", call + 1);
            }
        }

        let mut records = self.lock();
        let mut updated = 0;
        for &(member_id, primary_id) in pairs {
            if let Some(record) = records.get_mut(&member_id) {
                record.status = Some(STATUS_INACTIVE.to_string());
                record.duplicate_of = Some(primary_id);
                record.review_flag = Some(REVIEW_DUPLICATE_DETECTED.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn reset_markers(&self) -> Result<usize> {
        let mut records = self.lock();
        let mut reset = 0;
        for record in records.values_mut().filter(|r| r.has_dedup_markers()) {
            record.status = None;
            record.duplicate_of = None;
            record.review_flag = None;
            reset += 1;
        }
        Ok(reset)
    }

    async fn fetch_records_by_ids(&self, ids: &[i64]) -> Result<Vec<VoterRecord>> {
        let records = self.lock();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let records = self.lock();
        let mut per_partition: HashMap<&str, (usize, usize)> = HashMap::new();
        let mut inactive = 0;
        for record in records.values() {
            let entry = per_partition.entry(record.partition()).or_default();
            entry.0 += 1;
            if !record.is_active() {
                entry.1 += 1;
                inactive += 1;
            }
        }

        let total = records.len();
        let mut top_partitions: Vec<PartitionStat> = per_partition
            .iter()
            .map(|(partition, &(total_records, inactive_records))| PartitionStat {
                partition: partition.to_string(),
                total_records,
                inactive_records,
            })
            .collect();
        top_partitions.sort_by(|a, b| {
            b.inactive_records
                .cmp(&a.inactive_records)
                .then_with(|| a.partition.cmp(&b.partition))
        });
        top_partitions.truncate(TOP_PARTITIONS);

        Ok(StoreStatistics {
            total_records: total,
            active_records: total - inactive,
            inactive_records: inactive,
            duplicate_percentage: duplicate_percentage(inactive, total),
            total_partitions: per_partition.len(),
            top_partitions,
        })
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionCount>> {
        let records = self.lock();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for record in records.values().filter(|r| r.is_active()) {
            *counts.entry(record.partition()).or_default() += 1;
        }
        let mut partitions: Vec<PartitionCount> = counts
            .into_iter()
            .map(|(partition, active_records)| PartitionCount {
                partition: partition.to_string(),
                active_records,
            })
            .collect();
        partitions.sort_by(|a, b| b.active_records.cmp(&a.active_records));
        Ok(partitions)
    }

    async fn search_candidates(
        &self,
        patterns: &[String],
        fields: &[NameField],
        partition_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VoterRecord>> {
        let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
        Ok(self
            .lock()
            .values()
            .filter(|r| partition_filter.map_or(true, |p| r.partition() == p))
            .filter(|r| {
                fields.iter().any(|field| {
                    let value = field.value(r).to_lowercase();
                    lowered.iter().any(|p| value.contains(p.as_str()))
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
