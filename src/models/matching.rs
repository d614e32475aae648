// src/models/matching.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::voter::VoterRecord;

/// The four derived forms of a name used for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameSignature {
    pub latin: String,
    /// Latin form with vowels removed.
    pub skeleton: String,
    /// Primary Double Metaphone code of the Latin form.
    pub phonetic_code: String,
    /// Aggressively normalized form used to order records before the window scan.
    pub sort_key: String,
}

impl NameSignature {
    pub fn is_empty(&self) -> bool {
        self.latin.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::Other => "OTHER",
            Gender::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-primary record of a duplicate group, scored against the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub record: VoterRecord,
    pub gender: Gender,
    pub voter_score: f64,
    pub relative_score: f64,
    pub combined_score: f64,
}

/// Records judged to be the same person. `primary` survives a commit, every
/// member is marked inactive and points at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub partition: String,
    pub primary: VoterRecord,
    pub primary_gender: Gender,
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    pub fn size(&self) -> usize {
        self.members.len() + 1
    }

    pub fn record_ids(&self) -> Vec<i64> {
        std::iter::once(self.primary.id)
            .chain(self.members.iter().map(|m| m.record.id))
            .collect()
    }

    /// `(member id, primary id)` pairs as handed to the store on commit.
    pub fn deactivation_pairs(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.members.iter().map(move |m| (m.record.id, self.primary.id))
    }
}

/// Rounds a score to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
