pub mod board;
pub mod sim;

pub use board::{Leaderboard, RankError, RankList, RankedEntry, Score, ScoreMap};
