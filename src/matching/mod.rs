// src/matching/mod.rs - Pure name matching: romanization, signatures, scoring, gender

pub mod gender;
pub mod search;
pub mod signature;
pub mod similarity;
pub mod transliterate;

pub use gender::{genders_compatible, normalize_gender};
pub use search::{SearchQuery, SEARCH_MIN_SCORE};
pub use signature::generate_signature;
pub use similarity::{name_similarity, name_similarity_weighted, ScoringWeights};
