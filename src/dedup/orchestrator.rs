// src/dedup/orchestrator.rs - Drives preview, deduplicate and reset runs against a record store

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::clustering::{
    build_partitions, cluster_partition, evaluate_pair, ClusterConfig, PartitionResult,
    PreparedRecord,
};
use crate::dedup::progress::ProgressHandle;
use crate::error::{Cancelled, ConfigError};
use crate::matching::search::SearchQuery;
use crate::models::matching::DuplicateGroup;
use crate::models::stats_models::{
    ComparisonReport, DeactivationDetail, DedupReport, PartitionCount, PreviewReport,
    ProgressSnapshot, RecordPhonetics, ResetReport, RunFailure, RunStatus, SearchHit, SearchMode,
    SearchReport, StoreStatistics,
};
use crate::models::voter::VoterRecord;
use crate::store::RecordStore;
use crate::utils::cancel::CancelToken;
use crate::utils::dedup_config::DedupConfig;
use crate::utils::progress_bars::logging::{DedupLogger, RunKind};

/// Arguments of a preview run.
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub partition_filter: Option<String>,
    pub cluster: ClusterConfig,
    /// Groups returned in the report.
    pub limit: usize,
    /// Records read from the store.
    pub sample_size: usize,
}

impl PreviewRequest {
    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            partition_filter: None,
            cluster: config.cluster_config(),
            limit: config.preview_limit,
            sample_size: config.preview_sample,
        }
    }
}

/// Arguments of a deduplicate run. `dry_run` reports without mutating.
#[derive(Debug, Clone)]
pub struct DedupRequest {
    pub cluster: ClusterConfig,
    pub dry_run: bool,
}

impl DedupRequest {
    pub fn from_config(config: &DedupConfig, dry_run: bool) -> Self {
        Self {
            cluster: config.cluster_config(),
            dry_run,
        }
    }
}

/// Arguments of a ranked name search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Comma-separated terms; `voter, relative` in sequential mode.
    pub query: String,
    pub mode: SearchMode,
    pub partition_filter: Option<String>,
    /// Hits returned in the report.
    pub limit: Option<usize>,
}

pub struct DedupOrchestrator {
    store: Arc<dyn RecordStore>,
    config: DedupConfig,
    progress: ProgressHandle,
    cancel: CancelToken,
}

impl DedupOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, config: DedupConfig) -> Self {
        Self {
            store,
            config,
            progress: ProgressHandle::new(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Progress of the current or most recent run.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Clusters a sample of active records and reports groups without
    /// touching the store.
    pub async fn preview(&self, request: &PreviewRequest) -> Result<PreviewReport, RunFailure> {
        let run_id = Uuid::new_v4().to_string();
        let logger = DedupLogger::new(RunKind::Preview);
        let started_at = Utc::now();
        logger.log_start(&run_id, true);
        self.progress.start("Starting preview");

        match self.preview_inner(&run_id, started_at, request, &logger).await {
            Ok(report) => {
                self.progress.finish(RunStatus::Completed, "Preview completed");
                logger.log_completion(report.duplicate_group_count, 0, 0);
                Ok(report)
            }
            Err(e) => Err(self.fail(&run_id, e, 0, &logger)),
        }
    }

    async fn preview_inner(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        request: &PreviewRequest,
        logger: &DedupLogger,
    ) -> Result<PreviewReport> {
        request.cluster.validate()?;
        if request.sample_size == 0 {
            return Err(ConfigError::ZeroLimit("sample_size").into());
        }
        self.config.validate()?;
        self.store.validate().await.context("Record store validation failed")?;

        self.progress.set_step("Loading records");
        let records = self
            .store
            .fetch_active_records(request.partition_filter.as_deref(), Some(request.sample_size))
            .await
            .context("Failed to load records for preview")?;
        let records_analyzed = records.len();

        let results = self.cluster_all(records, &request.cluster, logger).await?;
        let partitions_processed = results.len();
        let mut groups: Vec<DuplicateGroup> =
            results.into_iter().flat_map(|r| r.groups).collect();
        let duplicate_group_count = groups.len();
        groups.truncate(request.limit);

        Ok(PreviewReport {
            run_id: run_id.to_string(),
            started_at,
            settings: request.cluster.settings(),
            partition_filter: request.partition_filter.clone(),
            partitions_processed,
            records_analyzed,
            duplicate_group_count,
            groups,
        })
    }

    /// Clusters every active record. Unless `dry_run`, subordinate records
    /// are marked inactive in batches; a failing batch aborts the run with
    /// earlier batches left committed.
    pub async fn deduplicate(&self, request: &DedupRequest) -> Result<DedupReport, RunFailure> {
        let run_id = Uuid::new_v4().to_string();
        let logger = DedupLogger::new(RunKind::Dedupe);
        let started_at = Utc::now();
        logger.log_start(&run_id, request.dry_run);
        self.progress.start("Starting deduplication");

        let mut committed = 0usize;
        match self.deduplicate_inner(&run_id, started_at, request, &logger, &mut committed).await {
            Ok(report) => {
                let step = if report.dry_run {
                    "Dry run completed"
                } else {
                    "Duplicates marked as INACTIVE"
                };
                self.progress.finish(RunStatus::Completed, step);
                logger.log_completion(
                    report.groups_found,
                    report.to_deactivate_count,
                    report.records_deactivated,
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(&run_id, e, committed, &logger)),
        }
    }

    async fn deduplicate_inner(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        request: &DedupRequest,
        logger: &DedupLogger,
        committed: &mut usize,
    ) -> Result<DedupReport> {
        request.cluster.validate()?;
        self.config.validate()?;
        self.store.validate().await.context("Record store validation failed")?;

        self.progress.set_step("Loading records");
        let records = self
            .store
            .fetch_active_records(None, None)
            .await
            .context("Failed to load active records")?;
        let records_processed = records.len();

        let results = self.cluster_all(records, &request.cluster, logger).await?;
        let partitions_processed = results.len();
        let groups: Vec<DuplicateGroup> = results.into_iter().flat_map(|r| r.groups).collect();

        let pairs: Vec<(i64, i64)> = groups.iter().flat_map(|g| g.deactivation_pairs()).collect();
        let mut details: Vec<DeactivationDetail> = groups
            .iter()
            .flat_map(|group| {
                group.members.iter().map(move |member| DeactivationDetail {
                    id: member.record.id,
                    voter_name: member.record.voter_name_str().to_string(),
                    relative_name: member.record.relative_name_str().to_string(),
                    gender: member.gender,
                    partition: group.partition.clone(),
                    duplicate_of: group.primary.id,
                    voter_score: member.voter_score,
                    relative_score: member.relative_score,
                    combined_score: member.combined_score,
                })
            })
            .collect();
        details.truncate(self.config.detail_limit);

        let mut records_deactivated = 0;
        if !request.dry_run && !pairs.is_empty() {
            records_deactivated = self.commit(&pairs, logger, committed).await?;
        }

        Ok(DedupReport {
            run_id: run_id.to_string(),
            started_at,
            dry_run: request.dry_run,
            settings: request.cluster.settings(),
            records_processed,
            partitions_processed,
            groups_found: groups.len(),
            to_deactivate_count: pairs.len(),
            records_deactivated,
            details,
            elapsed_secs: logger.elapsed_secs(),
        })
    }

    async fn commit(
        &self,
        pairs: &[(i64, i64)],
        logger: &DedupLogger,
        committed: &mut usize,
    ) -> Result<usize> {
        self.progress.set_step("Marking duplicates as INACTIVE");
        let batch_size = self.config.batch_size;
        let total_batches = pairs.len().div_ceil(batch_size);
        let mut updated = 0;

        for (idx, batch) in pairs.chunks(batch_size).enumerate() {
            self.cancel.check()?;
            logger.log_batch_progress(idx + 1, total_batches, batch.len());
            updated += self
                .store
                .mark_duplicates(batch)
                .await
                .with_context(|| format!("Batch {}/{} failed", idx + 1, total_batches))?;
            *committed += batch.len();
        }
        Ok(updated)
    }

    /// Clears every dedup marker in the store. Safe to repeat.
    pub async fn reset_to_active(&self) -> Result<ResetReport> {
        let logger = DedupLogger::new(RunKind::Reset);
        logger.log_phase("Clearing duplicate markers", None);
        let records_reset = self
            .store
            .reset_markers()
            .await
            .context("Failed to reset records to active")?;
        logger.log_phase("Reset complete", Some(&format!("{} records reset", records_reset)));
        Ok(ResetReport { records_reset })
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        self.store.statistics().await.context("Failed to compute statistics")
    }

    pub async fn list_partitions(&self) -> Result<Vec<PartitionCount>> {
        self.store.list_partitions().await.context("Failed to list partitions")
    }

    /// Side-by-side signatures and scores of two stored records.
    pub async fn compare_records(
        &self,
        id1: i64,
        id2: i64,
        cluster: &ClusterConfig,
    ) -> Result<ComparisonReport> {
        let records = self
            .store
            .fetch_records_by_ids(&[id1, id2])
            .await
            .context("Failed to fetch records for comparison")?;
        let find = |id: i64| -> Result<VoterRecord> {
            records
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("Record {} not found", id))
        };
        let first = PreparedRecord::new(find(id1)?);
        let second = PreparedRecord::new(find(id2)?);
        let evaluation = evaluate_pair(&first, &second, cluster);

        Ok(ComparisonReport {
            record1: phonetics(first),
            record2: phonetics(second),
            voter_score: evaluation.voter_score,
            relative_score: evaluation.relative_score,
            combined_score: evaluation.combined_score,
            genders_compatible: evaluation.genders_compatible,
            is_duplicate: evaluation.is_duplicate,
        })
    }

    /// Prefilters records by substring in the store, scores them against the
    /// query and returns hits best first.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchReport> {
        let query = SearchQuery::parse(&request.query, request.mode)?;
        let (patterns, fields) = query.prefilter();
        let candidates = self
            .store
            .search_candidates(
                &patterns,
                fields,
                request.partition_filter.as_deref(),
                self.config.search_candidates,
            )
            .await
            .context("Failed to fetch search candidates")?;
        if candidates.len() == self.config.search_candidates {
            warn!(
                "Search prefilter hit the {} candidate cap; results may be incomplete",
                self.config.search_candidates
            );
        }

        let candidates_scanned = candidates.len();
        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|record| {
                query
                    .score(&record)
                    .map(|match_score| SearchHit { record, match_score })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.match_score
                .total_cmp(&a.match_score)
                .then(a.record.id.cmp(&b.record.id))
        });
        if let Some(limit) = request.limit {
            hits.truncate(limit);
        }
        debug!(
            "Search '{}' scanned {} candidates, {} hits",
            request.query,
            candidates_scanned,
            hits.len()
        );

        Ok(SearchReport {
            query: request.query.clone(),
            mode: request.mode,
            partition_filter: request.partition_filter.clone(),
            candidates_scanned,
            hits,
        })
    }

    /// Partitions the records and clusters them on a bounded blocking pool.
    /// Results come back in partition-key order regardless of finish order.
    async fn cluster_all(
        &self,
        records: Vec<VoterRecord>,
        cluster: &ClusterConfig,
        logger: &DedupLogger,
    ) -> Result<Vec<PartitionResult>> {
        let record_count = records.len();
        let partitions = build_partitions(records);
        let total_partitions = partitions.len();
        logger.log_data_loaded(record_count, total_partitions);
        self.progress.set_totals(record_count, total_partitions);
        self.progress.set_step("Clustering partitions");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let cluster = Arc::new(cluster.clone());
        let mut tasks: JoinSet<Result<PartitionResult, Cancelled>> = JoinSet::new();

        let mut first_error: Option<anyhow::Error> = None;
        for partition in partitions {
            if let Err(cancelled) = self.cancel.check() {
                first_error = Some(cancelled.into());
                break;
            }
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    first_error = Some(anyhow::Error::new(e).context("Worker pool closed"));
                    break;
                }
            };
            let cluster = Arc::clone(&cluster);
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = cluster_partition(partition, &cluster, &cancel)?;
                progress.record_partition(&result.partition, result.records, result.groups.len());
                Ok(result)
            });
        }

        // Drain every started worker before returning.
        let mut results = Vec::with_capacity(total_partitions);
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .context("Partition worker panicked")
                .and_then(|result| result.map_err(anyhow::Error::from));
            match outcome {
                Ok(result) if first_error.is_none() => {
                    logger.log_partition_done(
                        &result.partition,
                        result.records,
                        result.groups.len(),
                        results.len() + 1,
                        total_partitions,
                    );
                    results.push(result);
                }
                Ok(_) => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        results.sort_by(|a, b| a.partition.cmp(&b.partition));

        let comparisons: usize = results.iter().map(|r| r.comparisons).sum();
        debug!("{} candidate comparisons across {} partitions", comparisons, total_partitions);
        Ok(results)
    }

    fn fail(
        &self,
        run_id: &str,
        error: anyhow::Error,
        committed: usize,
        logger: &DedupLogger,
    ) -> RunFailure {
        let status = if error.downcast_ref::<Cancelled>().is_some() {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        let message = format!("{:#}", error);
        self.progress.finish(status, &message);
        logger.log_failure(&message, committed);
        if status == RunStatus::Cancelled {
            // A cancellation is consumed by the run it stopped.
            self.cancel.reset();
            info!("Run {} cancelled", run_id);
        }
        RunFailure {
            run_id: run_id.to_string(),
            message,
            state: self.progress.snapshot(),
            committed,
        }
    }
}

fn phonetics(prepared: PreparedRecord) -> RecordPhonetics {
    RecordPhonetics {
        id: prepared.record.id,
        voter_name: prepared.record.voter_name_str().to_string(),
        relative_name: prepared.record.relative_name_str().to_string(),
        gender: prepared.gender,
        voter_signature: prepared.voter_signature,
        relative_signature: prepared.relative_signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::search::SEARCH_MIN_SCORE;
    use crate::models::voter::{REVIEW_DUPLICATE_DETECTED, STATUS_INACTIVE};
    use crate::store::InMemoryRecordStore;

    fn record(id: i64, voter: &str, relative: &str, gender: &str, partition: &str) -> VoterRecord {
        VoterRecord::new(id, voter, relative, gender, Some(partition))
    }

    fn test_config() -> DedupConfig {
        DedupConfig {
            workers: 2,
            ..DedupConfig::default()
        }
    }

    fn build_orchestrator(records: Vec<VoterRecord>) -> (Arc<InMemoryRecordStore>, DedupOrchestrator) {
        let store = Arc::new(InMemoryRecordStore::new(records));
        let orchestrator = DedupOrchestrator::new(store.clone(), test_config());
        (store, orchestrator)
    }

    fn fixture() -> Vec<VoterRecord> {
        vec![
            record(1, "विजय कुमार", "राम लाल", "पु", "Rampur"),
            record(2, "vijay kumar", "ram lal", "M", "Rampur"),
            record(3, "sita", "janak", "F", "Rampur"),
            record(4, "seeta", "janak", "महिला", "Rampur"),
            record(5, "geeta", "hari", "F", "Rampur"),
            record(6, "ram", "mohan", "M", "Alipur"),
            record(7, "ram", "mohan", "M", "Alipur"),
            record(8, "ramu", "mohan", "", "Alipur"),
            record(9, "mohan", "sohan", "M", "Alipur"),
        ]
    }

    #[tokio::test]
    async fn test_preview_finds_cross_script_duplicate() {
        let (store, orchestrator) = build_orchestrator(vec![
            record(1, "विजय कुमार", "राम लाल", "पु", "Rampur"),
            record(2, "vijay kumar", "ram lal", "M", "Rampur"),
        ]);
        let request = PreviewRequest::from_config(orchestrator.config());
        let report = orchestrator.preview(&request).await.unwrap();

        assert_eq!(report.records_analyzed, 2);
        assert_eq!(report.partitions_processed, 1);
        assert_eq!(report.duplicate_group_count, 1);
        let group = &report.groups[0];
        assert_eq!(group.primary.id, 1);
        assert_eq!(group.members[0].record.id, 2);
        assert_eq!(group.members[0].combined_score, 100.0);

        // Preview never mutates.
        assert!(store.records().iter().all(|r| !r.has_dedup_markers()));
        assert_eq!(orchestrator.progress().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_gender_conflict_blocks_group() {
        let (_, orchestrator) = build_orchestrator(vec![
            record(1, "विजय कुमार", "राम लाल", "पु", "Rampur"),
            record(2, "vijay kumar", "ram lal", "महिला", "Rampur"),
        ]);
        let request = PreviewRequest::from_config(orchestrator.config());
        let report = orchestrator.preview(&request).await.unwrap();
        assert_eq!(report.duplicate_group_count, 0);
        assert!(report.groups.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_then_commit() {
        let (store, orchestrator) = build_orchestrator(vec![
            record(1, "विजय कुमार", "राम लाल", "पु", "Rampur"),
            record(2, "vijay kumar", "ram lal", "M", "Rampur"),
        ]);

        let dry = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), true))
            .await
            .unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.groups_found, 1);
        assert_eq!(dry.to_deactivate_count, 1);
        assert_eq!(dry.records_deactivated, 0);
        assert_eq!(dry.details[0].id, 2);
        assert_eq!(dry.details[0].duplicate_of, 1);
        assert!(store.records().iter().all(|r| r.is_active()));

        let commit = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), false))
            .await
            .unwrap();
        assert_eq!(commit.records_deactivated, 1);
        let duplicate = store.get(2).unwrap();
        assert_eq!(duplicate.status.as_deref(), Some(STATUS_INACTIVE));
        assert_eq!(duplicate.duplicate_of, Some(1));
        assert_eq!(duplicate.review_flag.as_deref(), Some(REVIEW_DUPLICATE_DETECTED));
        assert!(store.get(1).unwrap().is_active());

        // Inactive records are excluded from later runs.
        let again = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), true))
            .await
            .unwrap();
        assert_eq!(again.records_processed, 1);
        assert_eq!(again.groups_found, 0);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (store, orchestrator) = build_orchestrator(fixture());
        orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), false))
            .await
            .unwrap();
        let marked = store.records().iter().filter(|r| r.has_dedup_markers()).count();
        assert!(marked > 0);

        assert_eq!(orchestrator.reset_to_active().await.unwrap().records_reset, marked);
        assert_eq!(orchestrator.reset_to_active().await.unwrap().records_reset, 0);
        assert_eq!(store.records(), fixture());
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let (_, orchestrator) = build_orchestrator(vec![
            record(1, "ram", "mohan", "M", "Rampur"),
            record(2, "ram", "mohan", "M", "Alipur"),
        ]);
        let request = PreviewRequest::from_config(orchestrator.config());
        let report = orchestrator.preview(&request).await.unwrap();
        assert_eq!(report.partitions_processed, 2);
        assert_eq!(report.duplicate_group_count, 0);

        // Adding another partition leaves existing groups untouched.
        let base = fixture();
        let mut extended = base.clone();
        extended.push(record(20, "ram", "mohan", "M", "Sultanpur"));
        extended.push(record(21, "ram", "mohan", "M", "Sultanpur"));

        let (_, base_run) = build_orchestrator(base);
        let (_, extended_run) = build_orchestrator(extended);
        let base_groups = base_run
            .preview(&PreviewRequest::from_config(base_run.config()))
            .await
            .unwrap()
            .groups;
        let extended_groups: Vec<DuplicateGroup> = extended_run
            .preview(&PreviewRequest::from_config(extended_run.config()))
            .await
            .unwrap()
            .groups
            .into_iter()
            .filter(|g| g.partition != "Sultanpur")
            .collect();
        assert_eq!(base_groups, extended_groups);
    }

    #[tokio::test]
    async fn test_partition_filter() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let request = PreviewRequest {
            partition_filter: Some("Alipur".to_string()),
            ..PreviewRequest::from_config(orchestrator.config())
        };
        let report = orchestrator.preview(&request).await.unwrap();
        assert_eq!(report.records_analyzed, 4);
        assert!(report.groups.iter().all(|g| g.partition == "Alipur"));
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let request = DedupRequest::from_config(orchestrator.config(), true);
        let first = orchestrator.deduplicate(&request).await.unwrap();
        let second = orchestrator.deduplicate(&request).await.unwrap();
        assert_eq!(first.details, second.details);
        assert_eq!(first.groups_found, second.groups_found);
    }

    #[tokio::test]
    async fn test_higher_threshold_never_adds_deactivations() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let mut previous = usize::MAX;
        for threshold in [80.0, 85.0, 90.0, 95.0, 100.0] {
            let mut request = DedupRequest::from_config(orchestrator.config(), true);
            request.cluster.voter_threshold = threshold;
            let report = orchestrator.deduplicate(&request).await.unwrap();
            assert!(report.to_deactivate_count <= previous, "threshold {}", threshold);
            previous = report.to_deactivate_count;
        }
        // Identical or sort-key-equal names still merge at 100.
        assert_eq!(previous, 3);
    }

    #[tokio::test]
    async fn test_higher_relative_threshold_never_adds_deactivations() {
        let mut records = fixture();
        records.push(record(20, "ram", "mohan", "M", "Sultanpur"));
        records.push(record(21, "ram", "mohun", "M", "Sultanpur"));
        records.push(record(22, "sita", "janki", "F", "Sultanpur"));
        records.push(record(23, "seeta", "janak", "F", "Sultanpur"));
        let (_, orchestrator) = build_orchestrator(records);

        let mut previous = usize::MAX;
        for threshold in [0.0, 50.0, 80.0, 90.0, 100.0] {
            let mut request = DedupRequest::from_config(orchestrator.config(), true);
            request.cluster.relative_threshold = threshold;
            let report = orchestrator.deduplicate(&request).await.unwrap();
            assert!(report.to_deactivate_count <= previous, "threshold {}", threshold);
            previous = report.to_deactivate_count;
        }
        // Pairs with identical relative names survive the strictest setting.
        assert!(previous >= 3);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_commits() {
        let store = Arc::new(InMemoryRecordStore::with_failure_after(fixture(), 1));
        let config = DedupConfig {
            batch_size: 1,
            ..test_config()
        };
        let orchestrator = DedupOrchestrator::new(store.clone(), config);

        let failure = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), false))
            .await
            .unwrap_err();
        assert_eq!(failure.committed, 1);
        assert_eq!(failure.state.status, RunStatus::Failed);
        assert!(failure.message.contains("Batch 2/"));
        assert_eq!(store.records().iter().filter(|r| !r.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let (store, orchestrator) = build_orchestrator(fixture());
        orchestrator.cancel_token().cancel();
        let failure = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), false))
            .await
            .unwrap_err();
        assert_eq!(failure.state.status, RunStatus::Cancelled);
        assert_eq!(failure.committed, 0);
        assert!(store.records().iter().all(|r| r.is_active()));

        // The next run on the same orchestrator is not affected.
        assert!(!orchestrator.cancel_token().is_cancelled());
        let report = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), true))
            .await
            .unwrap();
        assert!(report.groups_found > 0);
    }

    #[tokio::test]
    async fn test_invalid_thresholds_fail_before_reading() {
        let (store, orchestrator) = build_orchestrator(fixture());
        let mut request = DedupRequest::from_config(orchestrator.config(), false);
        request.cluster.relative_threshold = 150.0;
        let failure = orchestrator.deduplicate(&request).await.unwrap_err();
        assert_eq!(failure.state.status, RunStatus::Failed);
        assert!(failure.message.contains("relative_threshold"));
        assert_eq!(failure.state.total, 0);
        assert!(store.records().iter().all(|r| r.is_active()));
    }

    #[tokio::test]
    async fn test_compare_records() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let cluster = orchestrator.config().cluster_config();

        let report = orchestrator.compare_records(1, 2, &cluster).await.unwrap();
        assert_eq!(report.voter_score, 100.0);
        assert_eq!(report.relative_score, 100.0);
        assert!(report.genders_compatible);
        assert!(report.is_duplicate);
        assert_eq!(report.record1.voter_signature.sort_key, report.record2.voter_signature.sort_key);

        let blocked = orchestrator.compare_records(2, 4, &cluster).await.unwrap();
        assert!(!blocked.genders_compatible);
        assert!(!blocked.is_duplicate);

        assert!(orchestrator.compare_records(1, 404, &cluster).await.is_err());
    }

    #[tokio::test]
    async fn test_statistics_after_commit() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let report = orchestrator
            .deduplicate(&DedupRequest::from_config(orchestrator.config(), false))
            .await
            .unwrap();

        let stats = orchestrator.statistics().await.unwrap();
        assert_eq!(stats.total_records, 9);
        assert_eq!(stats.inactive_records, report.records_deactivated);
        assert_eq!(stats.total_partitions, 2);

        let partitions = orchestrator.list_partitions().await.unwrap();
        let active: usize = partitions.iter().map(|p| p.active_records).sum();
        assert_eq!(active, 9 - report.records_deactivated);

        let progress = orchestrator.progress();
        assert_eq!(progress.status, RunStatus::Completed);
        assert_eq!(progress.processed, progress.total);
        assert_eq!(progress.percentage, 100.0);
    }

    fn search_request(query: &str, mode: SearchMode) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            mode,
            partition_filter: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_phonetic_search_ranks_hits() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let report = orchestrator
            .search(&search_request("ram", SearchMode::Phonetic))
            .await
            .unwrap();

        assert_eq!(report.candidates_scanned, 4);
        assert_eq!(report.hits.len(), 4);
        let ids: Vec<i64> = report.hits.iter().map(|h| h.record.id).collect();
        assert_eq!(&ids[..2], &[6, 7]);
        assert_eq!(report.hits[0].match_score, 120.0);
        assert!(report
            .hits
            .windows(2)
            .all(|pair| pair[0].match_score >= pair[1].match_score));
        assert!(report.hits.iter().all(|h| h.match_score >= SEARCH_MIN_SCORE));
    }

    #[tokio::test]
    async fn test_sequential_search_filters_and_limits() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let mut request = search_request("ram, mohan", SearchMode::Sequential);
        let report = orchestrator.search(&request).await.unwrap();
        let ids: Vec<i64> = report.hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![6, 7, 8]);

        request.limit = Some(2);
        assert_eq!(orchestrator.search(&request).await.unwrap().hits.len(), 2);

        request.partition_filter = Some("Rampur".to_string());
        let report = orchestrator.search(&request).await.unwrap();
        assert_eq!(report.candidates_scanned, 0);
        assert!(report.hits.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_search_needs_two_terms() {
        let (_, orchestrator) = build_orchestrator(fixture());
        let err = orchestrator
            .search(&search_request("ram", SearchMode::Sequential))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exactly two"));
    }
}
