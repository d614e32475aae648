// src/store/mod.rs - Record store boundary used by the orchestrator

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::stats_models::{PartitionCount, StoreStatistics};
use crate::models::voter::{NameField, VoterRecord};

pub use memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;

/// Partitions reported in `StoreStatistics::top_partitions`.
pub const TOP_PARTITIONS: usize = 10;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Checks that the configured table and columns exist.
    async fn validate(&self) -> Result<()>;

    /// Active records ordered by partition key then id. `partition_filter`
    /// matches the bucketed key, so `"UNKNOWN"` selects records with no key.
    async fn fetch_active_records(
        &self,
        partition_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VoterRecord>>;

    /// Applies `(member id, primary id)` deactivations as one unit and
    /// returns the number of rows updated.
    async fn mark_duplicates(&self, pairs: &[(i64, i64)]) -> Result<usize>;

    /// Clears status, duplicate-of and review markers on every record that
    /// carries any of them. Returns the number of rows reset.
    async fn reset_markers(&self) -> Result<usize>;

    async fn fetch_records_by_ids(&self, ids: &[i64]) -> Result<Vec<VoterRecord>>;

    async fn statistics(&self) -> Result<StoreStatistics>;

    /// Partitions with their active record counts, largest first.
    async fn list_partitions(&self) -> Result<Vec<PartitionCount>>;

    /// Records of any status where one of `fields` contains one of
    /// `patterns`, ignoring case. Ordered by id, at most `limit` rows.
    async fn search_candidates(
        &self,
        patterns: &[String],
        fields: &[NameField],
        partition_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VoterRecord>>;
}

/// Share of inactive records as a percentage, two decimals.
pub(crate) fn duplicate_percentage(inactive: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    crate::models::matching::round2(inactive as f64 / total as f64 * 100.0)
}
