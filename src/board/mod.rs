//! Leaderboard core
//!
//! This module provides the leaderboard building blocks:
//! - `Score`: signed fixed-point decimal score
//! - `ScoreMap`: concurrent customer -> score table
//! - `RankList`: span-augmented skip list, the ranking index
//! - `Leaderboard`: two-tier locking envelope and public operations
//! - `RankError`: precondition violations inside the index
//! - `dst`: deterministic simulation harness

mod error;
mod leaderboard;
mod score;
mod score_map;
mod skiplist;

pub mod dst;

// Re-export all public types
pub use error::RankError;
pub use leaderboard::Leaderboard;
pub use score::{ParseScoreError, Score};
pub use score_map::ScoreMap;
pub use skiplist::{RankList, RankedEntry};
