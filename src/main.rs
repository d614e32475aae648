// src/main.rs
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use dedupe_lib::clustering::ClusterConfig;
use dedupe_lib::dedup::{
    DedupOrchestrator, DedupRequest, PreviewRequest, ProgressHandle, SearchRequest,
};
use dedupe_lib::matching::gender::GENDER_SAMPLE_VALUES;
use dedupe_lib::matching::{generate_signature, name_similarity, normalize_gender};
use dedupe_lib::models::matching::NameSignature;
use dedupe_lib::models::stats_models::{RunStatus, SearchMode};
use dedupe_lib::store::PgRecordStore;
use dedupe_lib::utils::cancel::CancelToken;
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::dedup_config::{DedupConfig, TableConfig};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::get_memory_usage;
use dedupe_lib::utils::progress_bars::progress_config::ProgressConfig;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(author, version, about = "Phonetic duplicate detection for Hindi/English voter rolls", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report duplicate groups on a sample without modifying records
    Preview {
        /// Only analyze this partition ("UNKNOWN" for records without one)
        #[arg(long)]
        partition: Option<String>,
        /// Maximum number of groups to print
        #[arg(long)]
        limit: Option<usize>,
        /// Maximum number of records to read
        #[arg(long)]
        sample: Option<usize>,
        #[command(flatten)]
        matching: MatchArgs,
    },
    /// Find duplicates across all partitions; dry run unless --commit is given
    Dedupe {
        /// Mark subordinate duplicates as INACTIVE
        #[arg(long)]
        commit: bool,
        #[command(flatten)]
        matching: MatchArgs,
    },
    /// Clear every duplicate marker and make all records active again
    Reset,
    /// Table-wide duplicate statistics
    Stats,
    /// Partitions with their active record counts
    Partitions,
    /// Score two stored records against each other
    Compare {
        id1: i64,
        id2: i64,
        #[command(flatten)]
        matching: MatchArgs,
    },
    /// Rank stored records against comma-separated name terms
    Search {
        query: String,
        /// Treat the query as "voter, relative" and rank on the relative name
        #[arg(long)]
        sequential: bool,
        /// Only search this partition ("UNKNOWN" for records without one)
        #[arg(long)]
        partition: Option<String>,
        /// Maximum number of hits to print
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Score two names without touching the database
    Score { name1: String, name2: String },
    /// Show how gender values are normalized (built-in samples when none given)
    GenderCheck { values: Vec<String> },
}

/// Per-run overrides of the environment configuration.
#[derive(Args, Clone)]
struct MatchArgs {
    /// Minimum voter-name similarity (0-100)
    #[arg(long)]
    voter_threshold: Option<f64>,
    /// Minimum relative-name similarity (0-100)
    #[arg(long)]
    relative_threshold: Option<f64>,
    /// Disable the gender compatibility gate
    #[arg(long)]
    no_gender: bool,
    /// Maximum forward candidates per anchor
    #[arg(long)]
    max_window: Option<usize>,
    /// Group on voter name alone
    #[arg(long, conflicts_with = "relative_threshold")]
    voter_only: bool,
    /// Raise thresholds to at least 90 (voter) and 85 (relative)
    #[arg(long)]
    strict: bool,
}

impl MatchArgs {
    fn apply(&self, base: ClusterConfig) -> ClusterConfig {
        let mut cluster = ClusterConfig {
            voter_threshold: self.voter_threshold.unwrap_or(base.voter_threshold),
            relative_threshold: self.relative_threshold.unwrap_or(base.relative_threshold),
            use_gender: base.use_gender && !self.no_gender,
            max_window: self.max_window.unwrap_or(base.max_window),
            weights: base.weights,
        };
        if self.strict {
            cluster = cluster.strict();
        }
        if self.voter_only {
            cluster = cluster.voter_only();
        }
        cluster
    }
}

#[derive(Serialize)]
struct GenderCheckRow {
    raw: Option<String>,
    normalized: String,
}

#[derive(Serialize)]
struct ScoreReport {
    name1: NameSignature,
    name2: NameSignature,
    similarity: f64,
}

/// Logs the run snapshot periodically when progress bars are disabled.
fn spawn_progress_reporter(progress: ProgressHandle) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_LOG_INTERVAL);
        loop {
            ticker.tick().await;
            let snapshot = progress.snapshot();
            if snapshot.status == RunStatus::Running {
                info!(
                    "⏳ {} - {}/{} records ({:.2}%), {} partitions done, {} duplicates, ETA {}",
                    snapshot.step,
                    snapshot.processed,
                    snapshot.total,
                    snapshot.percentage,
                    snapshot.partitions_processed,
                    snapshot.duplicates_found,
                    snapshot
                        .eta_seconds
                        .map(|s| format!("{}s", s))
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    match &cli.command {
        Command::Score { name1, name2 } => {
            let sig1 = generate_signature(name1);
            let sig2 = generate_signature(name2);
            let similarity = name_similarity(&sig1, &sig2);
            return print_json(&ScoreReport {
                name1: sig1,
                name2: sig2,
                similarity,
            });
        }
        Command::GenderCheck { values } => {
            let raw: Vec<Option<String>> = if values.is_empty() {
                GENDER_SAMPLE_VALUES.iter().map(|v| v.map(str::to_string)).collect()
            } else {
                values.iter().cloned().map(Some).collect()
            };
            let rows: Vec<GenderCheckRow> = raw
                .into_iter()
                .map(|value| GenderCheckRow {
                    normalized: normalize_gender(value.as_deref()).to_string(),
                    raw: value,
                })
                .collect();
            return print_json(&rows);
        }
        _ => {}
    }

    let config = DedupConfig::from_env();
    config.log_config();
    let table = TableConfig::from_env();

    let pool = connect().await.context("Failed to connect to database")?;
    let (size, idle, in_use) = get_pool_status(&pool);
    debug!("Pool status: size={}, idle={}, in_use={}", size, idle, in_use);
    let store = Arc::new(PgRecordStore::new(pool, table).context("Invalid table configuration")?);

    let progress_config = ProgressConfig::from_env();
    let multi = progress_config.create_multi_progress();
    let progress = match &multi {
        Some(multi) => ProgressHandle::with_bar(
            progress_config.create_bar(multi, 0),
            progress_config.should_show_detailed(),
        ),
        None => {
            let progress = ProgressHandle::new();
            spawn_progress_reporter(progress.clone());
            progress
        }
    };

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let orchestrator = DedupOrchestrator::new(store, config.clone())
        .with_progress(progress)
        .with_cancel_token(cancel);

    let outcome = run_command(&cli.command, &orchestrator, &config).await;

    if progress_config.should_show_memory() {
        info!("📈 Memory usage: {} MB", get_memory_usage().await);
    }
    outcome
}

async fn run_command(
    command: &Command,
    orchestrator: &DedupOrchestrator,
    config: &DedupConfig,
) -> Result<()> {
    match command {
        Command::Preview {
            partition,
            limit,
            sample,
            matching,
        } => {
            let defaults = PreviewRequest::from_config(config);
            let request = PreviewRequest {
                partition_filter: partition.clone(),
                cluster: matching.apply(defaults.cluster),
                limit: limit.unwrap_or(defaults.limit),
                sample_size: sample.unwrap_or(defaults.sample_size),
            };
            match orchestrator.preview(&request).await {
                Ok(report) => print_json(&report),
                Err(failure) => {
                    print_json(&failure)?;
                    Err(failure.into())
                }
            }
        }
        Command::Dedupe { commit, matching } => {
            if !commit {
                warn!("🔍 DRY RUN MODE: No records will be modified (pass --commit to apply)");
            }
            let mut request = DedupRequest::from_config(config, !commit);
            request.cluster = matching.apply(request.cluster);
            match orchestrator.deduplicate(&request).await {
                Ok(report) => print_json(&report),
                Err(failure) => {
                    print_json(&failure)?;
                    Err(failure.into())
                }
            }
        }
        Command::Reset => print_json(&orchestrator.reset_to_active().await?),
        Command::Stats => print_json(&orchestrator.statistics().await?),
        Command::Partitions => print_json(&orchestrator.list_partitions().await?),
        Command::Compare { id1, id2, matching } => {
            let cluster = matching.apply(config.cluster_config());
            print_json(&orchestrator.compare_records(*id1, *id2, &cluster).await?)
        }
        Command::Search {
            query,
            sequential,
            partition,
            limit,
        } => {
            let request = SearchRequest {
                query: query.clone(),
                mode: if *sequential {
                    SearchMode::Sequential
                } else {
                    SearchMode::Phonetic
                },
                partition_filter: partition.clone(),
                limit: *limit,
            };
            print_json(&orchestrator.search(&request).await?)
        }
        Command::Score { .. } | Command::GenderCheck { .. } => Ok(()),
    }
}
