// src/dedup/mod.rs - Run orchestration and progress tracking

pub mod orchestrator;
pub mod progress;

pub use orchestrator::{DedupOrchestrator, DedupRequest, PreviewRequest, SearchRequest};
pub use progress::ProgressHandle;
