// src/matching/similarity.rs - Multi-signal similarity between two name signatures

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strsim::normalized_levenshtein;

use crate::models::matching::{round2, NameSignature};

/// Score for a skeleton contained in the other one.
const SKELETON_SUBSTRING_SCORE: f64 = 70.0;
/// Largest length difference (in chars) still credited as a substring match.
const SKELETON_MAX_LENGTH_DIFF: usize = 2;
/// Score for skeletons sharing most of their distinct characters.
const SKELETON_OVERLAP_SCORE: f64 = 50.0;
const SKELETON_OVERLAP_RATIO: f64 = 0.8;

/// Blend weights for the five component scores. They sum to one by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub phonetic: f64,
    pub skeleton: f64,
    pub fuzzy: f64,
    pub partial: f64,
    pub token_overlap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            phonetic: 0.25,
            skeleton: 0.25,
            fuzzy: 0.20,
            partial: 0.15,
            token_overlap: 0.15,
        }
    }
}

/// Similarity in `[0, 100]` with the default weights.
pub fn name_similarity(sig1: &NameSignature, sig2: &NameSignature) -> f64 {
    name_similarity_weighted(sig1, sig2, &ScoringWeights::default())
}

pub fn name_similarity_weighted(
    sig1: &NameSignature,
    sig2: &NameSignature,
    weights: &ScoringWeights,
) -> f64 {
    match (sig1.latin.is_empty(), sig2.latin.is_empty()) {
        (true, true) => return 100.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    if sig1.latin == sig2.latin {
        return 100.0;
    }
    if !sig1.sort_key.is_empty() && sig1.sort_key == sig2.sort_key {
        return 100.0;
    }

    let phonetic = if !sig1.phonetic_code.is_empty() && sig1.phonetic_code == sig2.phonetic_code {
        100.0
    } else {
        0.0
    };
    let skeleton = skeleton_score(&sig1.skeleton, &sig2.skeleton);
    let fuzzy = token_sort_ratio(&sig1.latin, &sig2.latin);
    let partial = partial_ratio(&sig1.latin, &sig2.latin);
    let overlap = token_overlap(&sig1.latin, &sig2.latin);

    let score = phonetic * weights.phonetic
        + skeleton * weights.skeleton
        + fuzzy * weights.fuzzy
        + partial * weights.partial
        + overlap * weights.token_overlap;

    round2(score.clamp(0.0, 100.0))
}

/// Consonant-skeleton agreement: exact, near-substring, or mostly shared
/// characters. A substring with too large a length difference scores zero
/// without falling back to the overlap check.
pub fn skeleton_score(skel1: &str, skel2: &str) -> f64 {
    if skel1.is_empty() || skel2.is_empty() {
        return 0.0;
    }
    if skel1 == skel2 {
        return 100.0;
    }

    let len1 = skel1.chars().count();
    let len2 = skel2.chars().count();
    if skel1.contains(skel2) || skel2.contains(skel1) {
        return if len1.abs_diff(len2) <= SKELETON_MAX_LENGTH_DIFF {
            SKELETON_SUBSTRING_SCORE
        } else {
            0.0
        };
    }

    let chars1: HashSet<char> = skel1.chars().collect();
    let chars2: HashSet<char> = skel2.chars().collect();
    let common = chars1.intersection(&chars2).count();
    let overlap_ratio = common as f64 / len1.max(len2) as f64;
    if overlap_ratio > SKELETON_OVERLAP_RATIO {
        SKELETON_OVERLAP_SCORE
    } else {
        0.0
    }
}

/// Edit-distance similarity scaled to `[0, 100]` and rounded to an integer.
pub fn ratio(s1: &str, s2: &str) -> f64 {
    if s1.is_empty() && s2.is_empty() {
        return 100.0;
    }
    (normalized_levenshtein(s1, s2) * 100.0).round()
}

/// Ratio of the two strings after sorting their tokens, so word order is ignored.
pub fn token_sort_ratio(s1: &str, s2: &str) -> f64 {
    let sorted1 = sorted_tokens(s1);
    let sorted2 = sorted_tokens(s2);
    if sorted1.is_empty() || sorted2.is_empty() {
        return 0.0;
    }
    ratio(&sorted1, &sorted2)
}

fn sorted_tokens(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Best ratio of the shorter string against every equally long window of the
/// longer one.
pub fn partial_ratio(s1: &str, s2: &str) -> f64 {
    let (shorter, longer) = if s1.chars().count() <= s2.chars().count() {
        (s1, s2)
    } else {
        (s2, s1)
    };
    if shorter.is_empty() {
        return 0.0;
    }

    let short_len = shorter.chars().count();
    let long_chars: Vec<char> = longer.chars().collect();
    if short_len == long_chars.len() {
        return ratio(shorter, longer);
    }

    let mut best = 0.0_f64;
    for window in long_chars.windows(short_len) {
        let candidate: String = window.iter().collect();
        best = best.max(ratio(shorter, &candidate));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Shared distinct whitespace tokens over the larger distinct token count.
pub fn token_overlap(s1: &str, s2: &str) -> f64 {
    let tokens1: HashSet<&str> = s1.split_whitespace().collect();
    let tokens2: HashSet<&str> = s2.split_whitespace().collect();
    let largest = tokens1.len().max(tokens2.len());
    if largest == 0 {
        return 0.0;
    }
    tokens1.intersection(&tokens2).count() as f64 / largest as f64 * 100.0
}
