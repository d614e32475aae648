// src/models/stats_models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::matching::{DuplicateGroup, Gender, NameSignature};
use crate::models::voter::VoterRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: RunStatus,
    pub step: String,
    pub processed: usize,
    pub total: usize,
    pub duplicates_found: usize,
    pub partitions_processed: usize,
    pub total_partitions: usize,
    pub percentage: f64,
    pub eta_seconds: Option<u64>,
}

/// Thresholds and gate used for a run, echoed back in every report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub voter_threshold: f64,
    pub relative_threshold: f64,
    pub use_gender: bool,
    pub max_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub settings: MatchSettings,
    pub partition_filter: Option<String>,
    pub partitions_processed: usize,
    pub records_analyzed: usize,
    pub duplicate_group_count: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// One record scheduled for deactivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeactivationDetail {
    pub id: i64,
    pub voter_name: String,
    pub relative_name: String,
    pub gender: Gender,
    pub partition: String,
    pub duplicate_of: i64,
    pub voter_score: f64,
    pub relative_score: f64,
    pub combined_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub settings: MatchSettings,
    pub records_processed: usize,
    pub partitions_processed: usize,
    pub groups_found: usize,
    pub to_deactivate_count: usize,
    /// Rows actually updated by the store; zero on a dry run.
    pub records_deactivated: usize,
    pub details: Vec<DeactivationDetail>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetReport {
    pub records_reset: usize,
}

/// Structured failure of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub run_id: String,
    pub message: String,
    pub state: ProgressSnapshot,
    /// Ids whose deactivation was committed before the failure.
    pub committed: usize,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} failed during '{}': {} ({} records already committed)",
            self.run_id, self.state.step, self.message, self.committed
        )
    }
}

impl std::error::Error for RunFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCount {
    pub partition: String,
    pub active_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStat {
    pub partition: String,
    pub total_records: usize,
    pub inactive_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_records: usize,
    pub active_records: usize,
    pub inactive_records: usize,
    pub duplicate_percentage: f64,
    pub total_partitions: usize,
    pub top_partitions: Vec<PartitionStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPhonetics {
    pub id: i64,
    pub voter_name: String,
    pub relative_name: String,
    pub gender: Gender,
    pub voter_signature: NameSignature,
    pub relative_signature: NameSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub record1: RecordPhonetics,
    pub record2: RecordPhonetics,
    pub voter_score: f64,
    pub relative_score: f64,
    pub combined_score: f64,
    pub genders_compatible: bool,
    /// Whether the pair would merge under the configured settings.
    pub is_duplicate: bool,
}

/// How a search query is matched against stored names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Every comma-separated term against both name fields.
    Phonetic,
    /// `voter, relative`: the first term narrows voters, the second ranks relatives.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: VoterRecord,
    pub match_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub query: String,
    pub mode: SearchMode,
    pub partition_filter: Option<String>,
    /// Records returned by the substring prefilter.
    pub candidates_scanned: usize,
    pub hits: Vec<SearchHit>,
}
