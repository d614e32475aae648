// src/utils/dedup_config.rs - Run settings and voter table layout, read from the environment

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::str::FromStr;

use crate::clustering::adaptive_window::{
    ClusterConfig, DEFAULT_MAX_WINDOW, DEFAULT_RELATIVE_THRESHOLD, DEFAULT_VOTER_THRESHOLD,
};
use crate::error::ConfigError;
use crate::matching::ScoringWeights;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DETAIL_LIMIT: usize = 100;
pub const DEFAULT_PREVIEW_LIMIT: usize = 50;
pub const DEFAULT_PREVIEW_SAMPLE: usize = 50_000;
pub const DEFAULT_SEARCH_CANDIDATES: usize = 10_000;

static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub voter_threshold: f64,
    pub relative_threshold: f64,
    pub use_gender: bool,
    pub max_window: usize,
    /// Partitions clustered concurrently.
    pub workers: usize,
    /// Ids per mutation statement on commit.
    pub batch_size: usize,
    /// Deactivation details kept in a report.
    pub detail_limit: usize,
    /// Groups returned by a preview.
    pub preview_limit: usize,
    /// Records read by a preview.
    pub preview_sample: usize,
    /// Records pulled by the substring prefilter of a name search.
    pub search_candidates: usize,
    pub weights: ScoringWeights,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            voter_threshold: DEFAULT_VOTER_THRESHOLD,
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            use_gender: true,
            max_window: DEFAULT_MAX_WINDOW,
            workers: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
            detail_limit: DEFAULT_DETAIL_LIMIT,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            preview_sample: DEFAULT_PREVIEW_SAMPLE,
            search_candidates: DEFAULT_SEARCH_CANDIDATES,
            weights: ScoringWeights::default(),
        }
    }
}

impl DedupConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            voter_threshold: env_or("DEDUP_VOTER_THRESHOLD", defaults.voter_threshold),
            relative_threshold: env_or("DEDUP_RELATIVE_THRESHOLD", defaults.relative_threshold),
            use_gender: env_or("DEDUP_USE_GENDER", defaults.use_gender),
            max_window: env_or("DEDUP_MAX_WINDOW", defaults.max_window),
            workers: env_or("DEDUP_WORKERS", defaults.workers),
            batch_size: env_or("DEDUP_BATCH_SIZE", defaults.batch_size),
            detail_limit: env_or("DEDUP_DETAIL_LIMIT", defaults.detail_limit),
            preview_limit: env_or("DEDUP_PREVIEW_LIMIT", defaults.preview_limit),
            preview_sample: env_or("DEDUP_PREVIEW_SAMPLE", defaults.preview_sample),
            search_candidates: env_or("DEDUP_SEARCH_CANDIDATES", defaults.search_candidates),
            weights: defaults.weights,
        }
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            voter_threshold: self.voter_threshold,
            relative_threshold: self.relative_threshold,
            use_gender: self.use_gender,
            max_window: self.max_window,
            weights: self.weights,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster_config().validate()?;
        for (name, value) in [
            ("workers", self.workers),
            ("batch_size", self.batch_size),
            ("preview_sample", self.preview_sample),
            ("search_candidates", self.search_candidates),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!("⚙️  Dedup configuration:");
        info!(
            "   • thresholds: voter {:.1}, relative {:.1}",
            self.voter_threshold, self.relative_threshold
        );
        info!(
            "   • gender gate {}, window {}",
            if self.use_gender { "ON" } else { "OFF" },
            self.max_window
        );
        info!(
            "   • {} workers, batch size {}, detail cap {}, search candidates {}",
            self.workers, self.batch_size, self.detail_limit, self.search_candidates
        );
    }
}

/// Where voter rows live and what their columns are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub schema: String,
    pub table: String,
    pub id_column: String,
    pub voter_name_column: String,
    pub relative_column: String,
    pub gender_column: String,
    pub partition_column: String,
    pub status_column: String,
    pub duplicate_of_column: String,
    pub review_column: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "gram_panchayat_voters".to_string(),
            id_column: "id".to_string(),
            voter_name_column: "voter_name".to_string(),
            relative_column: "father_husband_mother_name".to_string(),
            gender_column: "gender".to_string(),
            partition_column: "gram_panchayat".to_string(),
            status_column: "status".to_string(),
            duplicate_of_column: "similar_too".to_string(),
            review_column: "check_status".to_string(),
        }
    }
}

impl TableConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            schema: env_string("VOTER_SCHEMA", &defaults.schema),
            table: env_string("VOTER_TABLE", &defaults.table),
            id_column: env_string("VOTER_ID_COLUMN", &defaults.id_column),
            voter_name_column: env_string("VOTER_NAME_COLUMN", &defaults.voter_name_column),
            relative_column: env_string("VOTER_RELATIVE_COLUMN", &defaults.relative_column),
            gender_column: env_string("VOTER_GENDER_COLUMN", &defaults.gender_column),
            partition_column: env_string("VOTER_PARTITION_COLUMN", &defaults.partition_column),
            status_column: env_string("VOTER_STATUS_COLUMN", &defaults.status_column),
            duplicate_of_column: env_string("VOTER_DUPLICATE_OF_COLUMN", &defaults.duplicate_of_column),
            review_column: env_string("VOTER_REVIEW_COLUMN", &defaults.review_column),
        }
    }

    /// `schema.table`, safe to interpolate once `validate` has passed.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Every configured column, keyed by the setting it came from.
    pub fn columns(&self) -> [(&'static str, &str); 8] {
        [
            ("id_column", self.id_column.as_str()),
            ("voter_name_column", self.voter_name_column.as_str()),
            ("relative_column", self.relative_column.as_str()),
            ("gender_column", self.gender_column.as_str()),
            ("partition_column", self.partition_column.as_str()),
            ("status_column", self.status_column.as_str()),
            ("duplicate_of_column", self.duplicate_of_column.as_str()),
            ("review_column", self.review_column.as_str()),
        ]
    }

    /// Rejects anything that is not a plain SQL identifier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [("schema", self.schema.as_str()), ("table", self.table.as_str())];
        for (field, value) in names.into_iter().chain(self.columns()) {
            if !SQL_IDENTIFIER.is_match(value) {
                return Err(ConfigError::InvalidIdentifier {
                    field,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DedupConfig::default();
        assert_eq!(config.voter_threshold, 85.0);
        assert_eq!(config.relative_threshold, 80.0);
        assert!(config.use_gender);
        assert_eq!(config.max_window, 200);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.detail_limit, 100);
        assert_eq!(config.search_candidates, 10_000);
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());

        let table = TableConfig::default();
        assert_eq!(table.partition_column, "gram_panchayat");
        assert_eq!(table.qualified_table(), "public.gram_panchayat_voters");
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_env_config() {
        env::set_var("DEDUP_VOTER_THRESHOLD", "90");
        env::set_var("DEDUP_USE_GENDER", "false");
        env::set_var("DEDUP_MAX_WINDOW", "not-a-number");
        env::set_var("VOTER_PARTITION_COLUMN", "ward");

        let config = DedupConfig::from_env();
        assert_eq!(config.voter_threshold, 90.0);
        assert!(!config.use_gender);
        assert_eq!(config.max_window, 200);
        assert_eq!(TableConfig::from_env().partition_column, "ward");

        // Clean up
        env::remove_var("DEDUP_VOTER_THRESHOLD");
        env::remove_var("DEDUP_USE_GENDER");
        env::remove_var("DEDUP_MAX_WINDOW");
        env::remove_var("VOTER_PARTITION_COLUMN");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = DedupConfig {
            relative_threshold: -1.0,
            ..DedupConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange { name: "relative_threshold", .. })
        ));

        let config = DedupConfig {
            batch_size: 0,
            ..DedupConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("batch_size")));

        let config = DedupConfig {
            search_candidates: 0,
            ..DedupConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroLimit("search_candidates")));
    }

    #[test]
    fn test_identifier_validation() {
        let table = TableConfig {
            table: "voters; DROP TABLE x".to_string(),
            ..TableConfig::default()
        };
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidIdentifier { field: "table", .. })
        ));

        let table = TableConfig {
            partition_column: "1ward".to_string(),
            ..TableConfig::default()
        };
        assert!(matches!(
            table.validate(),
            Err(ConfigError::InvalidIdentifier { field: "partition_column", .. })
        ));
    }
}
