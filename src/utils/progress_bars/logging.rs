// src/utils/progress_bars/logging.rs - Phase-tagged logging for dedup runs
use log::{info, warn};
use std::time::Instant;

/// The kind of run being logged; selects the log prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Preview,
    Dedupe,
    Reset,
}

#[derive(Clone)]
pub struct DedupLogger {
    run_name: &'static str,
    run_emoji: &'static str,
    start_time: Instant,
}

impl DedupLogger {
    pub fn new(kind: RunKind) -> Self {
        let (run_name, run_emoji) = match kind {
            RunKind::Preview => ("PREVIEW", "🔎"),
            RunKind::Dedupe => ("DEDUPE", "🧹"),
            RunKind::Reset => ("RESET", "♻️"),
        };
        Self {
            run_name,
            run_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, dry_run: bool) {
        info!(
            "[{}] {} 🚀 Starting run (run ID: {}){}",
            self.run_name,
            self.run_emoji,
            run_id,
            if dry_run { " in dry-run mode" } else { "" }
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.run_name, self.run_emoji, phase, details, elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.run_name, self.run_emoji, phase, elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_data_loaded(&self, count: usize, partitions: usize) {
        info!(
            "[{}] {} 📊 Loaded {} active records across {} partitions",
            self.run_name, self.run_emoji, count, partitions
        );
    }

    pub fn log_partition_done(&self, partition: &str, records: usize, groups: usize, done: usize, total: usize) {
        if groups > 0 || done == total || done % 25 == 0 {
            info!(
                "[{}] {} 📍 Partition {}/{} '{}': {} records, {} duplicate groups",
                self.run_name, self.run_emoji, done, total, partition, records, groups
            );
        }
    }

    pub fn log_batch_progress(&self, batch_num: usize, total_batches: usize, ids_in_batch: usize) {
        if batch_num % 5 == 0 || batch_num == 1 || batch_num == total_batches {
            info!(
                "[{}] {} 📦 Committing batch {}/{} ({} ids)",
                self.run_name, self.run_emoji, batch_num, total_batches, ids_in_batch
            );
        }
    }

    pub fn log_completion(&self, groups: usize, to_deactivate: usize, deactivated: usize) {
        let duration = self.start_time.elapsed();
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {} groups, {} records to deactivate, {} deactivated",
            self.run_name, self.run_emoji, duration, groups, to_deactivate, deactivated
        );
    }

    pub fn log_failure(&self, message: &str, committed: usize) {
        warn!(
            "[{}] {} ⚠️  Run failed after {:.2?}: {} ({} ids already committed)",
            self.run_name,
            self.run_emoji,
            self.start_time.elapsed(),
            message,
            committed
        );
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
