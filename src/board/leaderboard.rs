//! Leaderboard envelope: two-tier locking around the ranking index.
//!
//! Updates take a per-customer stripe mutex (serializing concurrent
//! deltas to the same customer) and then the structural write lock for
//! the splice itself. Queries take only the structural read lock, so
//! any number of them proceed in parallel and each sees a consistent
//! snapshot. Lock order is always stripe then structural, never the
//! reverse, and nothing does I/O while holding either.

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{RankList, RankedEntry, Score, ScoreMap};

/// Number of stripe mutexes. Power of two so stripe selection is a mask.
const STRIPE_COUNT: usize = 4096;

/// Process-wide leaderboard state: the score map, the ranking index,
/// and the locks that keep them in agreement.
pub struct Leaderboard {
    stripes: Vec<Mutex<()>>,
    scores: ScoreMap,
    index: RwLock<RankList>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Leaderboard {
            stripes: (0..STRIPE_COUNT).map(|_| Mutex::new(())).collect(),
            scores: ScoreMap::new(),
            index: RwLock::new(RankList::new()),
        }
    }

    #[inline]
    fn stripe(customer: i64) -> usize {
        customer.unsigned_abs() as usize & (STRIPE_COUNT - 1)
    }

    /// Apply a signed delta to a customer's cumulative score and return
    /// the new cumulative value.
    ///
    /// A customer enters the leaderboard on the first delta that makes
    /// its score strictly positive and leaves on any delta that drives
    /// it to zero or below. The returned value may be zero or negative;
    /// such customers are simply not on the board.
    pub fn update_score(&self, customer: i64, delta: Score) -> Score {
        let stripe = self.stripes[Self::stripe(customer)].lock();

        let mut entered = false;
        let mut dropped = false;
        let new_score = match self.scores.get(customer) {
            None => {
                if delta.is_positive() {
                    let mut index = self.index.write();
                    index
                        .insert(customer, delta)
                        .expect("score map and ranking index out of sync");
                    self.scores.put(customer, delta);
                    entered = true;
                }
                delta
            }
            Some(current) => {
                let merged = current + delta;
                let mut index = self.index.write();
                if merged.is_positive() {
                    index
                        .update_score(customer, merged)
                        .expect("score map and ranking index out of sync");
                    self.scores.put(customer, merged);
                } else {
                    index
                        .remove(customer)
                        .expect("score map and ranking index out of sync");
                    self.scores.remove(customer);
                    dropped = true;
                }
                merged
            }
        };

        drop(stripe);
        if entered {
            debug!(customer, score = %new_score, "customer entered leaderboard");
        } else if dropped {
            debug!(customer, score = %new_score, "customer dropped from leaderboard");
        }
        new_score
    }

    /// Entries with ranks in [start, end], ascending. Empty on a
    /// non-sensical range; `end` past the last rank is clamped.
    pub fn range_by_rank(&self, start: i32, end: i32) -> Vec<RankedEntry> {
        if start < 1 || end < start {
            return Vec::new();
        }
        let out = self.index.read().range(start as u64, end as u64);
        trace!(start, end, hits = out.len(), "range query");
        out
    }

    /// The customer with up to `up` higher-ranked and `down`
    /// lower-ranked neighbors, ascending by rank. Empty if the customer
    /// is not on the board or a count is negative.
    pub fn neighbors(&self, customer: i64, up: i32, down: i32) -> Vec<RankedEntry> {
        if up < 0 || down < 0 {
            return Vec::new();
        }
        let out = self.index.read().neighbors(customer, up as usize, down as usize);
        trace!(customer, up, down, hits = out.len(), "neighbor query");
        out
    }

    /// Current participant count.
    pub fn len(&self) -> u64 {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Full structural audit plus membership equivalence between the
    /// score map and the ranking index. For tests and the DST harness.
    pub fn check_invariants(&self) -> Result<(), String> {
        let index = self.index.read();
        index.check_invariants()?;

        if self.scores.len() as u64 != index.len() {
            return Err(format!(
                "score map holds {} customers, index holds {}",
                self.scores.len(),
                index.len()
            ));
        }
        for (customer, score) in index.iter() {
            if !score.is_positive() {
                return Err(format!(
                    "customer {} is ranked with non-positive score {}",
                    customer, score
                ));
            }
            match self.scores.get(customer) {
                Some(mapped) if mapped == score => {}
                Some(mapped) => {
                    return Err(format!(
                        "customer {} scored {} in the map but {} in the index",
                        customer, mapped, score
                    ))
                }
                None => {
                    return Err(format!(
                        "customer {} is ranked but missing from the score map",
                        customer
                    ))
                }
            }
        }
        Ok(())
    }
}

impl Default for Leaderboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(customer: i64, points: i64, rank: u64) -> RankedEntry {
        RankedEntry {
            customer,
            score: Score::from_int(points),
            rank,
        }
    }

    /// Scores 20, 20, 10, 5 across four customers.
    fn seeded() -> Leaderboard {
        let board = Leaderboard::new();
        board.update_score(1, Score::from_int(10));
        board.update_score(2, Score::from_int(20));
        board.update_score(3, Score::from_int(20));
        board.update_score(4, Score::from_int(5));
        board
    }

    #[test]
    fn test_empty_board_queries() {
        let board = Leaderboard::new();
        assert!(board.range_by_rank(1, 10).is_empty());
        assert!(board.neighbors(42, 3, 3).is_empty());
        assert!(board.is_empty());
    }

    #[test]
    fn test_band_is_canonical_order() {
        let board = seeded();
        assert_eq!(
            board.range_by_rank(1, 4),
            vec![entry(2, 20, 1), entry(3, 20, 2), entry(1, 10, 3), entry(4, 5, 4)]
        );
    }

    #[test]
    fn test_neighbors_around_middle() {
        let board = seeded();
        assert_eq!(
            board.neighbors(1, 1, 1),
            vec![entry(3, 20, 2), entry(1, 10, 3), entry(4, 5, 4)]
        );
    }

    #[test]
    fn test_negative_total_drops_customer() {
        let board = seeded();
        let total = board.update_score(4, Score::from_int(-10));
        assert_eq!(total, Score::from_int(-5));
        assert_eq!(
            board.range_by_rank(1, 10),
            vec![entry(2, 20, 1), entry(3, 20, 2), entry(1, 10, 3)]
        );
        assert!(board.neighbors(4, 1, 1).is_empty());
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_delta_promotes_to_top() {
        let board = seeded();
        board.update_score(4, Score::from_int(-10));
        let total = board.update_score(1, Score::from_int(15));
        assert_eq!(total, Score::from_int(25));
        assert_eq!(
            board.range_by_rank(1, 3),
            vec![entry(1, 25, 1), entry(2, 20, 2), entry(3, 20, 3)]
        );
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_zero_delta_is_observably_nop() {
        let board = seeded();
        let before = board.range_by_rank(1, i32::MAX);

        assert_eq!(board.update_score(1, Score::ZERO), Score::from_int(10));
        assert_eq!(board.update_score(999, Score::ZERO), Score::ZERO);

        assert_eq!(board.range_by_rank(1, i32::MAX), before);
        assert!(board.neighbors(999, 0, 0).is_empty());
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_negative_delta_never_creates_entry() {
        let board = Leaderboard::new();
        assert_eq!(
            board.update_score(5, Score::from_int(-3)),
            Score::from_int(-3)
        );
        assert!(board.is_empty());
        // The miss is not remembered: a later positive delta starts fresh
        assert_eq!(board.update_score(5, Score::from_int(3)), Score::from_int(3));
        assert_eq!(board.range_by_rank(1, 1), vec![entry(5, 3, 1)]);
    }

    #[test]
    fn test_invalid_ranges_and_counts_are_empty() {
        let board = seeded();
        assert!(board.range_by_rank(0, 3).is_empty());
        assert!(board.range_by_rank(-2, 1).is_empty());
        assert!(board.range_by_rank(3, 2).is_empty());
        assert!(board.neighbors(1, -1, 2).is_empty());
        assert!(board.neighbors(1, 2, -1).is_empty());
    }

    #[test]
    fn test_fractional_deltas_accumulate_exactly() {
        let board = Leaderboard::new();
        for _ in 0..10 {
            board.update_score(8, "0.1".parse().unwrap());
        }
        assert_eq!(board.update_score(8, Score::ZERO), Score::from_int(1));
        board.check_invariants().unwrap();
    }

    #[test]
    fn test_single_rank_round_trip() {
        let board = seeded();
        for k in 1..=4 {
            let band = board.range_by_rank(k, k);
            assert_eq!(band.len(), 1);
            assert_eq!(band[0].rank, k as u64);
            assert_eq!(
                board.neighbors(band[0].customer, 0, 0),
                vec![band[0]]
            );
        }
    }
}
