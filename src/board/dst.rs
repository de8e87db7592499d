//! Deterministic Simulation Testing for the leaderboard.
//!
//! VOPR-style harness that drives a [`Leaderboard`] with a seeded
//! random mix of deltas and queries while mirroring every update into a
//! plain hash-map model. After each operation the board must agree with
//! the model exactly: membership, scores, returned totals, and the full
//! materialized rank order. Any divergence is recorded with the seed
//! and the operation that exposed it, so a failure replays bit-for-bit.

use ahash::AHashMap;

use super::{Leaderboard, RankedEntry, Score};
use crate::sim::DeterministicRng;

/// Fixed-point units per whole score point, mirrored from `Score`.
const UNIT: i64 = 10_000;

/// Configuration for a leaderboard DST run
#[derive(Debug, Clone)]
pub struct BoardDstConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of distinct customers (bounded id space)
    pub num_customers: usize,
    /// Delta magnitude bound in whole points
    pub max_delta: i64,
    /// Probability an operation is a query probe instead of an update
    pub query_prob: f64,
}

impl Default for BoardDstConfig {
    fn default() -> Self {
        BoardDstConfig {
            seed: 0,
            num_customers: 100,
            max_delta: 1000,
            query_prob: 0.2,
        }
    }
}

impl BoardDstConfig {
    /// Standard configuration with given seed
    pub fn new(seed: u64) -> Self {
        BoardDstConfig {
            seed,
            ..Default::default()
        }
    }

    /// Tight id space and small deltas: many ties, repositions and drops
    pub fn small_keyspace(seed: u64) -> Self {
        BoardDstConfig {
            seed,
            num_customers: 10,
            max_delta: 20,
            query_prob: 0.2,
        }
    }

    /// Wide id space: the board mostly grows
    pub fn large_keyspace(seed: u64) -> Self {
        BoardDstConfig {
            seed,
            num_customers: 1000,
            max_delta: 1000,
            query_prob: 0.1,
        }
    }
}

/// Operation type for failure context
#[derive(Debug, Clone)]
pub enum BoardOp {
    Update { customer: i64, delta: Score },
    Range { start: i32, end: i32 },
    Neighbors { customer: i64, up: i32, down: i32 },
}

/// Result of a leaderboard DST run
#[derive(Debug, Clone)]
pub struct BoardDstResult {
    pub seed: u64,
    pub total_operations: u64,
    /// Deltas that brought a customer onto the board
    pub entered: u64,
    /// Deltas that moved an existing customer
    pub adjusted: u64,
    /// Deltas that pushed a customer off the board
    pub dropped: u64,
    /// Deltas against absent customers that stayed non-positive
    pub misses: u64,
    pub queries: u64,
    /// Invariant violations found (with operation context)
    pub invariant_violations: Vec<String>,
    /// Last operation before failure (if any)
    pub last_op: Option<BoardOp>,
}

impl BoardDstResult {
    pub fn new(seed: u64) -> Self {
        BoardDstResult {
            seed,
            total_operations: 0,
            entered: 0,
            adjusted: 0,
            dropped: 0,
            misses: 0,
            queries: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops ({} entered, {} adjusted, {} dropped, {} misses, {} queries), {} violations",
            self.seed,
            self.total_operations,
            self.entered,
            self.adjusted,
            self.dropped,
            self.misses,
            self.queries,
            self.invariant_violations.len()
        )
    }
}

/// DST harness pairing a [`Leaderboard`] with a hash-map model
pub struct BoardDstHarness {
    config: BoardDstConfig,
    rng: DeterministicRng,
    board: Leaderboard,
    /// Participating customers and their authoritative scores
    model: AHashMap<i64, Score>,
    result: BoardDstResult,
}

impl BoardDstHarness {
    pub fn new(config: BoardDstConfig) -> Self {
        let rng = DeterministicRng::new(config.seed);
        BoardDstHarness {
            result: BoardDstResult::new(config.seed),
            rng,
            board: Leaderboard::new(),
            model: AHashMap::new(),
            config,
        }
    }

    /// Create with just a seed (uses default config)
    pub fn with_seed(seed: u64) -> Self {
        Self::new(BoardDstConfig::new(seed))
    }

    fn random_customer(&mut self) -> i64 {
        self.rng.gen_range(0, self.config.num_customers as u64) as i64
    }

    /// Random delta in ±max_delta. Half the time the delta is a whole
    /// number of points, which keeps score ties frequent.
    fn random_delta(&mut self) -> Score {
        let bound = self.config.max_delta;
        if self.rng.gen_bool(0.5) {
            Score::from_int(self.rng.gen_range_i64(-bound, bound))
        } else {
            Score::from_raw(self.rng.gen_range_i64(-bound * UNIT, bound * UNIT))
        }
    }

    /// The model's canonical order, ranked
    fn expected_order(&self) -> Vec<RankedEntry> {
        let mut entries: Vec<(i64, Score)> =
            self.model.iter().map(|(&c, &s)| (c, s)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (customer, score))| RankedEntry {
                customer,
                score,
                rank: i as u64 + 1,
            })
            .collect()
    }

    fn run_update_op(&mut self) {
        let customer = self.random_customer();
        let delta = self.random_delta();
        self.result.last_op = Some(BoardOp::Update { customer, delta });

        let was_present = self.model.contains_key(&customer);
        let expected = match self.model.get(&customer) {
            Some(&current) => current + delta,
            None => delta,
        };

        let returned = self.board.update_score(customer, delta);
        if returned != expected {
            self.result.invariant_violations.push(format!(
                "update_score({}, {}) returned {} but cumulative score is {}",
                customer, delta, returned, expected
            ));
        }

        if expected.is_positive() {
            self.model.insert(customer, expected);
            if was_present {
                self.result.adjusted += 1;
            } else {
                self.result.entered += 1;
            }
        } else {
            self.model.remove(&customer);
            if was_present {
                self.result.dropped += 1;
            } else {
                self.result.misses += 1;
            }
        }
    }

    fn run_query_op(&mut self) {
        self.result.queries += 1;
        let expected = self.expected_order();

        if self.rng.gen_bool(0.5) {
            // Band probe, deliberately allowed to run past the end
            let start = self.rng.gen_range(1, expected.len() as u64 + 3) as i32;
            let end = start + self.rng.gen_range(0, 10) as i32;
            self.result.last_op = Some(BoardOp::Range { start, end });

            let actual = self.board.range_by_rank(start, end);
            let lo = (start as usize).saturating_sub(1);
            let hi = (end as usize).min(expected.len());
            let want: &[RankedEntry] = if lo >= expected.len() {
                &[]
            } else {
                &expected[lo..hi]
            };
            if actual != want {
                self.result.invariant_violations.push(format!(
                    "range_by_rank({}, {}) returned {} entries, expected {}",
                    start,
                    end,
                    actual.len(),
                    want.len()
                ));
            }
        } else {
            // Neighbor probe around a random customer, present or not
            let customer = self.random_customer();
            let up = self.rng.gen_range(0, 4) as i32;
            let down = self.rng.gen_range(0, 4) as i32;
            self.result.last_op = Some(BoardOp::Neighbors { customer, up, down });

            let actual = self.board.neighbors(customer, up, down);
            let want: Vec<RankedEntry> = match expected
                .iter()
                .position(|e| e.customer == customer)
            {
                Some(pos) => {
                    let lo = pos.saturating_sub(up as usize);
                    let hi = (pos + down as usize + 1).min(expected.len());
                    expected[lo..hi].to_vec()
                }
                None => Vec::new(),
            };
            if actual != want {
                self.result.invariant_violations.push(format!(
                    "neighbors({}, {}, {}) returned {} entries, expected {}",
                    customer,
                    up,
                    down,
                    actual.len(),
                    want.len()
                ));
            }
        }
    }

    /// Run a single random operation and verify every invariant
    fn run_single_op(&mut self) {
        if self.rng.gen_bool(self.config.query_prob) {
            self.run_query_op();
        } else {
            self.run_update_op();
        }
        self.result.total_operations += 1;

        if let Err(violation) = self.check_invariants() {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, self.result.last_op, violation
            ));
        }
    }

    /// Structural audit plus full model comparison
    fn check_invariants(&self) -> Result<(), String> {
        self.board.check_invariants()?;

        if self.board.len() != self.model.len() as u64 {
            return Err(format!(
                "board holds {} customers, model holds {}",
                self.board.len(),
                self.model.len()
            ));
        }

        let expected = self.expected_order();
        let actual = self
            .board
            .range_by_rank(1, expected.len().max(1) as i32);
        if actual != expected {
            let diverged = actual
                .iter()
                .zip(&expected)
                .position(|(a, b)| a != b)
                .unwrap_or(actual.len().min(expected.len()));
            return Err(format!(
                "materialized order diverges from the model at rank {}",
                diverged + 1
            ));
        }

        Ok(())
    }

    /// Run specified number of operations
    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();

            // Stop early if we hit a violation
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &BoardDstResult {
        &self.result
    }

    pub fn board(&self) -> &Leaderboard {
        &self.board
    }
}

/// Run a batch of DST tests with different seeds
pub fn run_board_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> BoardDstConfig,
) -> Vec<BoardDstResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let config = config_fn(seed);
            let mut harness = BoardDstHarness::new(config);
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_batch(results: &[BoardDstResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!(
        "Leaderboard DST Summary\n\
         =======================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}\n",
        total, passed, failed, total_ops
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_dst_single_seed() {
        let mut harness = BoardDstHarness::with_seed(12345);
        harness.run(200);
        let result = harness.result();
        println!("{}", result.summary());
        assert!(result.is_success(), "Seed 12345 failed");
    }

    #[test]
    fn test_board_dst_small_keyspace() {
        // Tight keyspace means constant churn around the drop boundary
        let config = BoardDstConfig::small_keyspace(42);
        let mut harness = BoardDstHarness::new(config);
        harness.run(500);
        let result = harness.result();
        println!("{}", result.summary());
        assert!(result.is_success());
        assert!(result.dropped > 0, "churn config should drop customers");
    }

    #[test]
    fn test_board_dst_10_seeds() {
        let results = run_board_batch(0, 10, 300, BoardDstConfig::new);
        let summary = summarize_batch(&results);
        println!("{}", summary);

        let passed = results.iter().filter(|r| r.is_success()).count();
        assert_eq!(passed, 10, "All 10 seeds should pass");
    }
}
