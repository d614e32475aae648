pub mod clustering;
pub mod dedup;
pub mod error;
pub mod matching;
pub mod models;
pub mod store;
pub mod utils;
