//! Error types for the ranking index.

use std::fmt;

/// Precondition violation inside the ranking index.
///
/// These surface only when the caller's view of membership has diverged
/// from the index; the update path in [`crate::board::Leaderboard`]
/// consults the score map under its stripe lock first, so neither
/// variant is expected there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankError {
    /// `insert` called for a customer already present.
    Duplicate(i64),
    /// `remove` or `update_score` called for a customer not present.
    Absent(i64),
}

impl fmt::Display for RankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankError::Duplicate(customer) => {
                write!(f, "customer {} is already in the ranking index", customer)
            }
            RankError::Absent(customer) => {
                write!(f, "customer {} is not in the ranking index", customer)
            }
        }
    }
}

impl std::error::Error for RankError {}
