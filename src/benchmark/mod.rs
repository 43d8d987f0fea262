//! Benchmarking clustering methods on PCA scores.
//!
//! Each method is run for a range of cluster counts and scored against known
//! sample annotations with AMI and ARI. Results are collected in a
//! [`Leaderboard`] ranked by AMI on the first annotation column.

mod clustering;
mod leaderboard;

pub use clustering::{run_clustering_benchmark, ClusterMethod};
pub use leaderboard::{Leaderboard, LeaderboardRow, TargetScore};
