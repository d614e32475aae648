// src/matching/search.rs - Ranked name search scoring over stored records

use crate::error::SearchQueryError;
use crate::matching::signature::generate_signature;
use crate::matching::similarity::{partial_ratio, ratio};
use crate::models::matching::{round2, NameSignature};
use crate::models::stats_models::SearchMode;
use crate::models::voter::{NameField, VoterRecord};

/// Hits scoring below this are dropped.
pub const SEARCH_MIN_SCORE: f64 = 35.0;

const PHONETIC_CODE_BONUS: f64 = 10.0;
const TOKEN_CONTAINED_BONUS: f64 = 20.0;
const FULL_SKELETON_BONUS: f64 = 60.0;
const MAJORITY_TOKENS_BONUS: f64 = 30.0;
const SOME_TOKENS_BONUS: f64 = 15.0;

const BOTH_FIELDS: &[NameField] = &[NameField::Voter, NameField::Relative];
const VOTER_FIELD: &[NameField] = &[NameField::Voter];

/// A parsed query with its terms already turned into signatures.
#[derive(Debug, Clone)]
pub enum SearchQuery {
    Phonetic {
        terms: Vec<String>,
        signatures: Vec<NameSignature>,
    },
    Sequential {
        voter_term: String,
        relative: NameSignature,
    },
}

/// Comma-separated, trimmed, non-empty terms.
pub fn split_terms(query: &str) -> Vec<String> {
    query
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl SearchQuery {
    pub fn parse(query: &str, mode: SearchMode) -> Result<Self, SearchQueryError> {
        let mut terms = split_terms(query);
        if terms.is_empty() {
            return Err(SearchQueryError::Empty);
        }
        match mode {
            SearchMode::Phonetic => Ok(SearchQuery::Phonetic {
                signatures: terms.iter().map(|t| generate_signature(t)).collect(),
                terms,
            }),
            SearchMode::Sequential => {
                if terms.len() != 2 {
                    return Err(SearchQueryError::SequentialTerms(terms.len()));
                }
                let relative_term = terms.pop().unwrap_or_default();
                let voter_term = terms.pop().unwrap_or_default();
                Ok(SearchQuery::Sequential {
                    voter_term,
                    relative: generate_signature(&relative_term),
                })
            }
        }
    }

    /// Raw substrings the store prefilters on, and the fields they apply to.
    pub fn prefilter(&self) -> (Vec<String>, &'static [NameField]) {
        match self {
            SearchQuery::Phonetic { terms, .. } => (terms.clone(), BOTH_FIELDS),
            SearchQuery::Sequential { voter_term, .. } => (vec![voter_term.clone()], VOTER_FIELD),
        }
    }

    /// Best score of the record, rounded to two decimals, or `None` below
    /// `SEARCH_MIN_SCORE`.
    pub fn score(&self, record: &VoterRecord) -> Option<f64> {
        let best = match self {
            SearchQuery::Phonetic { signatures, .. } => BOTH_FIELDS
                .iter()
                .map(|field| generate_signature(field.value(record)))
                .flat_map(|target| {
                    signatures
                        .iter()
                        .map(|query| phonetic_search_score(query, &target))
                        .collect::<Vec<_>>()
                })
                .fold(0.0, f64::max),
            SearchQuery::Sequential { relative, .. } => {
                sequential_search_score(relative, &generate_signature(record.relative_name_str()))
            }
        };
        (best >= SEARCH_MIN_SCORE).then(|| round2(best))
    }
}

/// Skeleton equality, partial and plain ratios, plus bonuses for an equal
/// phonetic code and for a query token found inside the target. Not capped
/// at 100.
pub fn phonetic_search_score(query: &NameSignature, target: &NameSignature) -> f64 {
    let skeleton = if !query.skeleton.is_empty() && query.skeleton == target.skeleton {
        100.0
    } else {
        0.0
    };
    let mut score = skeleton * 0.3
        + partial_ratio(&query.latin, &target.latin) * 0.5
        + ratio(&query.latin, &target.latin) * 0.1;
    if same_phonetic_code(query, target) {
        score += PHONETIC_CODE_BONUS;
    }
    if query
        .latin
        .split_whitespace()
        .any(|token| target.latin.contains(token))
    {
        score += TOKEN_CONTAINED_BONUS;
    }
    score
}

/// Relative-name score of a sequential search: full skeleton match, share of
/// query tokens present in the target, fuzzy ratios and phonetic code.
pub fn sequential_search_score(query: &NameSignature, target: &NameSignature) -> f64 {
    let mut score = 0.0;
    if !query.skeleton.is_empty() && query.skeleton == target.skeleton {
        score += FULL_SKELETON_BONUS;
    }

    let query_tokens: Vec<&str> = query.latin.split_whitespace().collect();
    let target_tokens: Vec<&str> = target.latin.split_whitespace().collect();
    if !query_tokens.is_empty() {
        let matched = query_tokens
            .iter()
            .filter(|token| target_tokens.contains(token))
            .count();
        let token_ratio = matched as f64 / query_tokens.len() as f64;
        if token_ratio >= 0.7 {
            score += MAJORITY_TOKENS_BONUS;
        } else if token_ratio >= 0.4 {
            score += SOME_TOKENS_BONUS;
        }
    }

    score += partial_ratio(&query.latin, &target.latin) * 0.3;
    score += ratio(&query.latin, &target.latin) * 0.1;
    if same_phonetic_code(query, target) {
        score += PHONETIC_CODE_BONUS;
    }
    score
}

fn same_phonetic_code(a: &NameSignature, b: &NameSignature) -> bool {
    !a.phonetic_code.is_empty() && a.phonetic_code == b.phonetic_code
}
