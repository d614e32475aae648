// src/clustering/mod.rs

pub mod adaptive_window;
pub mod partition;

pub use adaptive_window::{cluster_partition, evaluate_pair, ClusterConfig, PairEvaluation, PartitionResult, PreparedRecord};
pub use partition::{build_partitions, Partition};
