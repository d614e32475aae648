pub mod matching;
pub mod stats_models;
pub mod voter;
