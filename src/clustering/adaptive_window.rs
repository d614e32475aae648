// src/clustering/adaptive_window.rs - Sorted-neighbourhood duplicate clustering within a partition

use log::debug;
use serde::{Deserialize, Serialize};

use crate::clustering::partition::Partition;
use crate::error::{Cancelled, ConfigError};
use crate::matching::{
    generate_signature, genders_compatible, name_similarity_weighted, normalize_gender,
    ScoringWeights,
};
use crate::models::matching::{round2, DuplicateGroup, Gender, GroupMember, NameSignature};
use crate::models::stats_models::MatchSettings;
use crate::models::voter::VoterRecord;
use crate::utils::cancel::CancelToken;

pub const DEFAULT_VOTER_THRESHOLD: f64 = 85.0;
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 80.0;
pub const DEFAULT_MAX_WINDOW: usize = 200;
pub const STRICT_VOTER_THRESHOLD: f64 = 90.0;
pub const STRICT_RELATIVE_THRESHOLD: f64 = 85.0;

/// Anchors processed between two cancel checks.
const CANCEL_CHECK_INTERVAL: usize = 64;
/// Prefix length compared for the early stop of the forward scan.
const PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub voter_threshold: f64,
    pub relative_threshold: f64,
    pub use_gender: bool,
    pub max_window: usize,
    pub weights: ScoringWeights,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            voter_threshold: DEFAULT_VOTER_THRESHOLD,
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            use_gender: true,
            max_window: DEFAULT_MAX_WINDOW,
            weights: ScoringWeights::default(),
        }
    }
}

impl ClusterConfig {
    /// Groups on voter name alone: any relative name passes.
    pub fn voter_only(self) -> Self {
        Self {
            relative_threshold: 0.0,
            ..self
        }
    }

    /// Raises both thresholds to the strict analysis floor.
    pub fn strict(self) -> Self {
        Self {
            voter_threshold: self.voter_threshold.max(STRICT_VOTER_THRESHOLD),
            relative_threshold: self.relative_threshold.max(STRICT_RELATIVE_THRESHOLD),
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("voter_threshold", self.voter_threshold),
            ("relative_threshold", self.relative_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.max_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    pub fn settings(&self) -> MatchSettings {
        MatchSettings {
            voter_threshold: self.voter_threshold,
            relative_threshold: self.relative_threshold,
            use_gender: self.use_gender,
            max_window: self.max_window,
        }
    }
}

/// A record with its derived signatures and canonical gender.
#[derive(Debug, Clone)]
pub struct PreparedRecord {
    pub record: VoterRecord,
    pub voter_signature: NameSignature,
    pub relative_signature: NameSignature,
    pub gender: Gender,
}

impl PreparedRecord {
    pub fn new(record: VoterRecord) -> Self {
        let voter_signature = generate_signature(record.voter_name_str());
        let relative_signature = generate_signature(record.relative_name_str());
        let gender = normalize_gender(record.gender_raw.as_deref());
        Self {
            record,
            voter_signature,
            relative_signature,
            gender,
        }
    }

    fn sort_key(&self) -> &str {
        &self.voter_signature.sort_key
    }
}

/// Full scoring of one pair under a configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairEvaluation {
    pub voter_score: f64,
    pub relative_score: f64,
    pub combined_score: f64,
    pub genders_compatible: bool,
    pub is_duplicate: bool,
}

pub fn evaluate_pair(a: &PreparedRecord, b: &PreparedRecord, config: &ClusterConfig) -> PairEvaluation {
    let voter_score = name_similarity_weighted(&a.voter_signature, &b.voter_signature, &config.weights);
    let relative_score =
        name_similarity_weighted(&a.relative_signature, &b.relative_signature, &config.weights);
    let compatible = genders_compatible(a.gender, b.gender);
    PairEvaluation {
        voter_score,
        relative_score,
        combined_score: round2((voter_score + relative_score) / 2.0),
        genders_compatible: compatible,
        is_duplicate: voter_score >= config.voter_threshold
            && relative_score >= config.relative_threshold
            && (!config.use_gender || compatible),
    }
}

/// Short-circuiting merge test used by the scan.
fn should_merge(anchor: &PreparedRecord, candidate: &PreparedRecord, config: &ClusterConfig) -> bool {
    let voter_score = name_similarity_weighted(
        &anchor.voter_signature,
        &candidate.voter_signature,
        &config.weights,
    );
    if voter_score < config.voter_threshold {
        return false;
    }
    let relative_score = name_similarity_weighted(
        &anchor.relative_signature,
        &candidate.relative_signature,
        &config.weights,
    );
    if relative_score < config.relative_threshold {
        return false;
    }
    !config.use_gender || genders_compatible(anchor.gender, candidate.gender)
}

fn prefixes_diverge(key1: &str, key2: &str) -> bool {
    if key1.chars().count() < PREFIX_LEN || key2.chars().count() < PREFIX_LEN {
        return false;
    }
    !key1.chars().take(PREFIX_LEN).eq(key2.chars().take(PREFIX_LEN))
}

#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub partition: String,
    pub records: usize,
    pub groups: Vec<DuplicateGroup>,
    /// Candidate pairs scored during the scan.
    pub comparisons: usize,
}

/// Clusters one partition with a single greedy pass over the records sorted
/// by voter-name sort key. Each unprocessed anchor scans forward over at
/// most `max_window` unprocessed candidates, stopping early once the sort
/// keys diverge in their first three characters.
pub fn cluster_partition(
    partition: Partition,
    config: &ClusterConfig,
    cancel: &CancelToken,
) -> Result<PartitionResult, Cancelled> {
    let key = partition.key;
    let record_count = partition.records.len();

    let mut prepared: Vec<PreparedRecord> = partition
        .records
        .into_iter()
        .map(PreparedRecord::new)
        .collect();
    prepared.sort_by(|a, b| {
        a.sort_key()
            .cmp(b.sort_key())
            .then(a.record.id.cmp(&b.record.id))
    });

    let mut grouped = vec![false; prepared.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut comparisons = 0usize;

    for anchor in 0..prepared.len() {
        if anchor % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }
        if grouped[anchor] {
            continue;
        }
        grouped[anchor] = true;
        let mut cluster = vec![anchor];
        // First known gender in the cluster; every later member must agree with it.
        let mut cluster_gender = prepared[anchor].gender;

        let mut checked = 0usize;
        let mut candidate = anchor + 1;
        while candidate < prepared.len() && checked < config.max_window {
            if grouped[candidate] {
                candidate += 1;
                continue;
            }
            if prefixes_diverge(prepared[anchor].sort_key(), prepared[candidate].sort_key()) {
                break;
            }

            comparisons += 1;
            let fits_cluster =
                !config.use_gender || genders_compatible(cluster_gender, prepared[candidate].gender);
            if fits_cluster && should_merge(&prepared[anchor], &prepared[candidate], config) {
                grouped[candidate] = true;
                cluster.push(candidate);
                if cluster_gender == Gender::Unknown {
                    cluster_gender = prepared[candidate].gender;
                }
            }
            checked += 1;
            candidate += 1;
        }

        if cluster.len() > 1 {
            clusters.push(cluster);
        }
    }

    let groups: Vec<DuplicateGroup> = clusters
        .into_iter()
        .map(|cluster| build_group(&key, &prepared, cluster, config))
        .collect();

    debug!(
        "Partition '{}': {} records, {} comparisons, {} groups",
        key,
        record_count,
        comparisons,
        groups.len()
    );

    Ok(PartitionResult {
        partition: key,
        records: record_count,
        groups,
        comparisons,
    })
}

/// The lowest id becomes the primary; member scores are taken against it.
fn build_group(
    partition: &str,
    prepared: &[PreparedRecord],
    mut cluster: Vec<usize>,
    config: &ClusterConfig,
) -> DuplicateGroup {
    cluster.sort_by_key(|&idx| prepared[idx].record.id);
    let primary = &prepared[cluster[0]];

    let members = cluster[1..]
        .iter()
        .map(|&idx| {
            let member = &prepared[idx];
            let evaluation = evaluate_pair(primary, member, config);
            GroupMember {
                record: member.record.clone(),
                gender: member.gender,
                voter_score: evaluation.voter_score,
                relative_score: evaluation.relative_score,
                combined_score: evaluation.combined_score,
            }
        })
        .collect();

    DuplicateGroup {
        partition: partition.to_string(),
        primary: primary.record.clone(),
        primary_gender: primary.gender,
        members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::partition::build_partitions;

    fn record(id: i64, voter: &str, relative: &str, gender: &str) -> VoterRecord {
        VoterRecord::new(id, voter, relative, gender, Some("Rampur"))
    }

    fn cluster(records: Vec<VoterRecord>, config: &ClusterConfig) -> PartitionResult {
        let partition = build_partitions(records).remove(0);
        cluster_partition(partition, config, &CancelToken::new()).unwrap()
    }

    #[test]
    fn test_hindi_and_english_spellings_group() {
        let result = cluster(
            vec![
                record(1, "विजय कुमार", "राम लाल", "पु"),
                record(2, "vijay kumar", "ram lal", "M"),
            ],
            &ClusterConfig::default(),
        );

        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.primary.id, 1);
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].record.id, 2);
        assert_eq!(group.members[0].voter_score, 100.0);
        assert_eq!(group.members[0].relative_score, 100.0);
        assert_eq!(group.members[0].combined_score, 100.0);
    }

    #[test]
    fn test_gender_gate_blocks_merge() {
        let records = vec![
            record(1, "विजय कुमार", "राम लाल", "पु"),
            record(2, "vijay kumar", "ram lal", "महिला"),
        ];
        let gated = cluster(records.clone(), &ClusterConfig::default());
        assert!(gated.groups.is_empty());

        let ungated = cluster(
            records,
            &ClusterConfig {
                use_gender: false,
                ..ClusterConfig::default()
            },
        );
        assert_eq!(ungated.groups.len(), 1);
    }

    #[test]
    fn test_unknown_anchor_does_not_bridge_genders() {
        let config = ClusterConfig {
            voter_threshold: 50.0,
            ..ClusterConfig::default()
        };
        let result = cluster(
            vec![
                record(9, "ram", "mohan", ""),
                record(1, "ramu", "mohan", "F"),
                record(2, "ramu", "mohan", "M"),
            ],
            &config,
        );
        for group in &result.groups {
            let mut known: Vec<Gender> = std::iter::once(group.primary_gender)
                .chain(group.members.iter().map(|m| m.gender))
                .filter(|g| *g != Gender::Unknown)
                .collect();
            known.dedup();
            assert!(known.len() <= 1, "mixed genders in {:?}", group.record_ids());
        }
        // The unknown anchor takes the first known record; the other stays out.
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].record_ids(), vec![1, 9]);

        let ungated = cluster(
            vec![
                record(9, "ram", "mohan", ""),
                record(1, "ramu", "mohan", "F"),
                record(2, "ramu", "mohan", "M"),
            ],
            &ClusterConfig {
                use_gender: false,
                ..config
            },
        );
        assert_eq!(ungated.groups[0].size(), 3);
    }

    #[test]
    fn test_distinct_people_stay_apart() {
        let result = cluster(
            vec![
                record(1, "ram", "mohan", "M"),
                record(2, "sita", "janak", "F"),
                record(3, "geeta", "hari", "F"),
            ],
            &ClusterConfig::default(),
        );
        assert!(result.groups.is_empty());
        assert_eq!(result.records, 3);
    }

    #[test]
    fn test_voter_only_ignores_relatives() {
        let records = vec![
            record(1, "ram", "mohan", "M"),
            record(2, "ram", "geeta", "M"),
        ];
        assert!(cluster(records.clone(), &ClusterConfig::default()).groups.is_empty());

        let voter_only = ClusterConfig::default().voter_only();
        assert_eq!(voter_only.voter_threshold, DEFAULT_VOTER_THRESHOLD);
        let result = cluster(records, &voter_only);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].record_ids(), vec![1, 2]);
    }

    #[test]
    fn test_strict_raises_thresholds() {
        let strict = ClusterConfig::default().strict();
        assert_eq!(strict.voter_threshold, STRICT_VOTER_THRESHOLD);
        assert_eq!(strict.relative_threshold, STRICT_RELATIVE_THRESHOLD);

        let already_higher = ClusterConfig {
            voter_threshold: 95.0,
            ..ClusterConfig::default()
        };
        assert_eq!(already_higher.strict().voter_threshold, 95.0);
    }

    #[test]
    fn test_window_limits_candidates() {
        let records = vec![
            record(1, "ram", "mohan", "M"),
            record(2, "ram", "gopal", "M"),
            record(3, "ram", "mohan", "M"),
        ];

        let narrow = ClusterConfig {
            max_window: 1,
            ..ClusterConfig::default()
        };
        assert!(cluster(records.clone(), &narrow).groups.is_empty());

        let wide = ClusterConfig {
            max_window: 2,
            ..ClusterConfig::default()
        };
        let result = cluster(records, &wide);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].record_ids(), vec![1, 3]);
    }

    #[test]
    fn test_primary_is_lowest_id_not_anchor() {
        // "ram" sorts before "ramu", so record 9 anchors the scan.
        let config = ClusterConfig {
            voter_threshold: 50.0,
            ..ClusterConfig::default()
        };
        let result = cluster(
            vec![record(4, "ramu", "mohan", "M"), record(9, "ram", "mohan", "M")],
            &config,
        );
        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.primary.id, 4);
        assert_eq!(group.members[0].record.id, 9);

        let expected = name_similarity_weighted(
            &generate_signature("ramu"),
            &generate_signature("ram"),
            &config.weights,
        );
        assert_eq!(group.members[0].voter_score, expected);
    }

    #[test]
    fn test_each_record_in_at_most_one_group() {
        let result = cluster(
            vec![
                record(1, "ram", "mohan", "M"),
                record(2, "raam", "mohan", "M"),
                record(3, "ram", "mohan", ""),
                record(4, "sita", "janak", "F"),
                record(5, "seeta", "janak", "F"),
            ],
            &ClusterConfig::default(),
        );
        let mut ids: Vec<i64> = result.groups.iter().flat_map(|g| g.record_ids()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(result.groups.len(), 2);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let records = vec![
            record(5, "seeta", "janak", "F"),
            record(1, "ram", "mohan", "M"),
            record(4, "sita", "janak", "F"),
            record(2, "raam", "mohan", "M"),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let config = ClusterConfig::default();
        let first = cluster(records, &config);
        let second = cluster(reversed, &config);
        assert_eq!(first.groups, second.groups);
    }

    #[test]
    fn test_cancelled_token_stops_the_scan() {
        let partition = build_partitions(vec![record(1, "ram", "mohan", "M")]).remove(0);
        let token = CancelToken::new();
        token.cancel();
        let result = cluster_partition(partition, &ClusterConfig::default(), &token);
        assert!(matches!(result, Err(Cancelled)));
    }

    #[test]
    fn test_config_validation() {
        assert!(ClusterConfig::default().validate().is_ok());
        let bad_threshold = ClusterConfig {
            voter_threshold: 120.0,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            bad_threshold.validate(),
            Err(ConfigError::ThresholdOutOfRange { name: "voter_threshold", .. })
        ));
        let zero_window = ClusterConfig {
            max_window: 0,
            ..ClusterConfig::default()
        };
        assert_eq!(zero_window.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn test_prefix_divergence() {
        assert!(prefixes_diverge("bijy", "rmsh"));
        assert!(!prefixes_diverge("rmsh", "rmshk"));
        assert!(!prefixes_diverge("rm", "sit"));
    }
}
