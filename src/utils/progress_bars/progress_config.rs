// src/utils/progress_bars/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for interactive progress output
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-partition detail in the bar message
    pub detailed: bool,
    /// Refresh rate for progress bars in milliseconds
    pub refresh_rate_ms: u64,
    /// Whether to show memory usage in progress messages
    pub show_memory: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            refresh_rate_ms: 100,
            show_memory: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            refresh_rate_ms: env::var("PROGRESS_REFRESH_RATE_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            show_memory: env::var("PROGRESS_SHOW_MEMORY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    /// Adds a styled record counter to `multi`.
    pub fn create_bar(&self, multi: &MultiProgress, len: u64) -> ProgressBar {
        let pb = multi.add(ProgressBar::new(len));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(self.refresh_rate_ms.max(10)));
        pb
    }

    /// Check if detailed progress should be shown
    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    /// Check if memory usage should be shown
    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }
}
