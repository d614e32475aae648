// src/models/voter.rs

use serde::{Deserialize, Serialize};

/// Status value written to subordinate duplicates on commit.
pub const STATUS_INACTIVE: &str = "INACTIVE";
/// Review marker written next to `STATUS_INACTIVE`.
pub const REVIEW_DUPLICATE_DETECTED: &str = "DUPLICATE_DETECTED";
/// Bucket for records whose partition key is unset.
pub const UNKNOWN_PARTITION: &str = "UNKNOWN";

/// Name column a search term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameField {
    Voter,
    Relative,
}

impl NameField {
    pub fn value<'a>(&self, record: &'a VoterRecord) -> &'a str {
        match self {
            NameField::Voter => record.voter_name_str(),
            NameField::Relative => record.relative_name_str(),
        }
    }
}

/// One electoral-roll row as seen at the record store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub id: i64,
    pub voter_name: Option<String>,
    /// Father / husband / mother name.
    pub relative_name: Option<String>,
    pub gender_raw: Option<String>,
    pub partition_key: Option<String>,
    pub status: Option<String>,
    pub duplicate_of: Option<i64>,
    pub review_flag: Option<String>,
}

impl VoterRecord {
    pub fn new(
        id: i64,
        voter_name: &str,
        relative_name: &str,
        gender_raw: &str,
        partition_key: Option<&str>,
    ) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            id,
            voter_name: non_empty(voter_name),
            relative_name: non_empty(relative_name),
            gender_raw: non_empty(gender_raw),
            partition_key: partition_key.map(|p| p.to_string()),
            status: None,
            duplicate_of: None,
            review_flag: None,
        }
    }

    /// Anything other than an explicit `INACTIVE` status counts as active.
    pub fn is_active(&self) -> bool {
        self.status.as_deref() != Some(STATUS_INACTIVE)
    }

    /// True when any of the dedup markers is set.
    pub fn has_dedup_markers(&self) -> bool {
        !self.is_active() || self.duplicate_of.is_some() || self.review_flag.is_some()
    }

    pub fn partition(&self) -> &str {
        match self.partition_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => UNKNOWN_PARTITION,
        }
    }

    pub fn voter_name_str(&self) -> &str {
        self.voter_name.as_deref().unwrap_or("")
    }

    pub fn relative_name_str(&self) -> &str {
        self.relative_name.as_deref().unwrap_or("")
    }
}
