// src/error.rs - Typed errors surfaced by the dedup engine

use thiserror::Error;

/// Invalid run or table configuration; raised before any record is read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be between 0 and 100, got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("max_window must be greater than zero")]
    ZeroWindow,

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("invalid SQL identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("column {column} not found in {table}")]
    UnknownColumn { table: String, column: String },
}

/// A name search query that cannot be scored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchQueryError {
    #[error("search query has no terms")]
    Empty,

    #[error("sequential search needs exactly two comma-separated terms (voter, relative), got {0}")]
    SequentialTerms(usize),
}

/// Returned when a run observes its cancel token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;
