// src/dedup/progress.rs - Per-run progress shared between the orchestrator, workers and callers

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::models::matching::round2;
use crate::models::stats_models::{ProgressSnapshot, RunStatus};

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    step: String,
    started_at: Option<Instant>,
}

#[derive(Debug)]
struct ProgressInner {
    state: Mutex<RunState>,
    processed: AtomicUsize,
    total: AtomicUsize,
    duplicates_found: AtomicUsize,
    partitions_processed: AtomicUsize,
    total_partitions: AtomicUsize,
    bar: Option<ProgressBar>,
    /// Names each finished partition in the bar message.
    detailed: bool,
}

/// Cheap to clone; every clone updates and reads the same run.
#[derive(Debug, Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::build(None, false)
    }
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors record progress onto an indicatif bar.
    pub fn with_bar(bar: ProgressBar, detailed: bool) -> Self {
        Self::build(Some(bar), detailed)
    }

    fn build(bar: Option<ProgressBar>, detailed: bool) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                state: Mutex::new(RunState {
                    status: RunStatus::Idle,
                    step: String::new(),
                    started_at: None,
                }),
                processed: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                duplicates_found: AtomicUsize::new(0),
                partitions_processed: AtomicUsize::new(0),
                total_partitions: AtomicUsize::new(0),
                bar,
                detailed,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resets every counter and moves the run to RUNNING.
    pub fn start(&self, step: &str) {
        {
            let mut state = self.state();
            state.status = RunStatus::Running;
            state.step = step.to_string();
            state.started_at = Some(Instant::now());
        }
        for counter in [
            &self.inner.processed,
            &self.inner.total,
            &self.inner.duplicates_found,
            &self.inner.partitions_processed,
            &self.inner.total_partitions,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        if let Some(bar) = &self.inner.bar {
            bar.reset();
            bar.set_length(0);
            bar.set_message(step.to_string());
        }
    }

    pub fn set_step(&self, step: &str) {
        self.state().step = step.to_string();
        if let Some(bar) = &self.inner.bar {
            bar.set_message(step.to_string());
        }
    }

    pub fn set_totals(&self, records: usize, partitions: usize) {
        self.inner.total.store(records, Ordering::SeqCst);
        self.inner.total_partitions.store(partitions, Ordering::SeqCst);
        if let Some(bar) = &self.inner.bar {
            bar.set_length(records as u64);
        }
    }

    /// Called by a worker once a partition has been clustered.
    pub fn record_partition(&self, partition: &str, records: usize, duplicates: usize) {
        self.inner.processed.fetch_add(records, Ordering::SeqCst);
        self.inner.duplicates_found.fetch_add(duplicates, Ordering::SeqCst);
        let done = self.inner.partitions_processed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(bar) = &self.inner.bar {
            bar.inc(records as u64);
            if self.inner.detailed {
                bar.set_message(partition_message(
                    partition,
                    duplicates,
                    done,
                    self.inner.total_partitions.load(Ordering::SeqCst),
                ));
            }
        }
    }

    pub fn finish(&self, status: RunStatus, step: &str) {
        {
            let mut state = self.state();
            state.status = status;
            state.step = step.to_string();
        }
        if let Some(bar) = &self.inner.bar {
            bar.finish_with_message(format!("{}: {}", status, step));
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let (status, step, started_at) = {
            let state = self.state();
            (state.status, state.step.clone(), state.started_at)
        };
        let processed = self.inner.processed.load(Ordering::SeqCst);
        let total = self.inner.total.load(Ordering::SeqCst);

        let percentage = if total > 0 {
            round2(processed as f64 / total as f64 * 100.0)
        } else {
            0.0
        };
        let eta_seconds = match started_at {
            Some(start) if status == RunStatus::Running && processed > 0 && total >= processed => {
                let rate = processed as f64 / start.elapsed().as_secs_f64().max(f64::EPSILON);
                Some(((total - processed) as f64 / rate) as u64)
            }
            _ => None,
        };

        ProgressSnapshot {
            status,
            step,
            processed,
            total,
            duplicates_found: self.inner.duplicates_found.load(Ordering::SeqCst),
            partitions_processed: self.inner.partitions_processed.load(Ordering::SeqCst),
            total_partitions: self.inner.total_partitions.load(Ordering::SeqCst),
            percentage,
            eta_seconds,
        }
    }
}

fn partition_message(partition: &str, duplicates: usize, done: usize, total: usize) -> String {
    format!("{}/{} partitions, last '{}' ({} groups)", done, total, partition, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_snapshot() {
        let snapshot = ProgressHandle::new().snapshot();
        assert_eq!(snapshot.status, RunStatus::Idle);
        assert_eq!(snapshot.percentage, 0.0);
        assert_eq!(snapshot.eta_seconds, None);
    }

    #[test]
    fn test_counters_and_percentage() {
        let progress = ProgressHandle::new();
        progress.start("Clustering");
        progress.set_totals(8, 2);

        let worker = progress.clone();
        worker.record_partition("Rampur", 2, 1);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.percentage, 25.0);
        assert_eq!(snapshot.duplicates_found, 1);
        assert_eq!(snapshot.partitions_processed, 1);
        assert!(snapshot.eta_seconds.is_some());

        worker.record_partition("Alipur", 6, 0);
        progress.finish(RunStatus::Completed, "done");
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.percentage, 100.0);
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.eta_seconds, None);
    }

    #[test]
    fn test_start_resets_counters() {
        let progress = ProgressHandle::new();
        progress.start("first");
        progress.set_totals(4, 1);
        progress.record_partition("Rampur", 4, 2);
        progress.finish(RunStatus::Completed, "done");

        progress.start("second");
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.duplicates_found, 0);
        assert_eq!(snapshot.step, "second");
    }

    #[test]
    fn test_detailed_bar_names_partitions() {
        let bar = ProgressBar::hidden();
        let progress = ProgressHandle::with_bar(bar.clone(), true);
        progress.start("Clustering");
        progress.set_totals(5, 2);
        progress.record_partition("Rampur", 3, 1);
        assert_eq!(bar.message(), "1/2 partitions, last 'Rampur' (1 groups)");
        assert_eq!(bar.position(), 3);

        let plain_bar = ProgressBar::hidden();
        let plain = ProgressHandle::with_bar(plain_bar.clone(), false);
        plain.start("Clustering");
        plain.record_partition("Rampur", 3, 1);
        assert_eq!(plain_bar.message(), "Clustering");
    }
}
