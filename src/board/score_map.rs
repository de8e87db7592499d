//! Concurrent customer -> score table.

use ahash::AHashMap;
use parking_lot::RwLock;

use super::Score;

/// Authoritative score per participating customer.
///
/// The inner lock protects only the table itself. Single-customer
/// atomicity and agreement with the ranking index come from the
/// envelope in [`crate::board::Leaderboard`]: reads happen under the
/// customer's stripe lock, mutations additionally under the structural
/// write lock. A customer is retained iff its score is strictly
/// positive; the envelope's update path enforces that.
#[derive(Debug, Default)]
pub struct ScoreMap {
    inner: RwLock<AHashMap<i64, Score>>,
}

impl ScoreMap {
    pub fn new() -> Self {
        ScoreMap {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, customer: i64) -> Option<Score> {
        self.inner.read().get(&customer).copied()
    }

    /// Insert or overwrite.
    pub fn put(&self, customer: i64, score: Score) {
        self.inner.write().insert(customer, score);
    }

    pub fn remove(&self, customer: i64) -> Option<Score> {
        self.inner.write().remove(&customer)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
