//! Multithreaded smoke workload against a single leaderboard.
//!
//! Usage: `workload [threads] [ops-per-thread] [customers]`
//!
//! Hammers one [`Leaderboard`] with a mixed read/write load from
//! deterministic per-thread RNGs, reports throughput, and finishes with
//! a full structural audit.

use rankboard::sim::DeterministicRng;
use rankboard::{Leaderboard, Score};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let threads: usize = env::args().nth(1).and_then(|a| a.parse().ok()).unwrap_or(8);
    let ops_per_thread: u64 = env::args()
        .nth(2)
        .and_then(|a| a.parse().ok())
        .unwrap_or(200_000);
    let customers: u64 = env::args()
        .nth(3)
        .and_then(|a| a.parse().ok())
        .unwrap_or(100_000);

    info!(threads, ops_per_thread, customers, "starting workload");

    let board = Arc::new(Leaderboard::new());
    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut handles = vec![];
    for t in 0..threads {
        let board = board.clone();
        let completed = completed.clone();
        handles.push(thread::spawn(move || {
            let mut rng = DeterministicRng::new(t as u64 + 1);
            for _ in 0..ops_per_thread {
                let roll = rng.gen_range(0, 100);
                if roll < 80 {
                    let customer = rng.gen_range(0, customers) as i64;
                    let delta = Score::from_int(rng.gen_range_i64(-1000, 1000));
                    board.update_score(customer, delta);
                } else if roll < 95 {
                    let start_rank = rng.gen_range(1, 1000) as i32;
                    board.range_by_rank(start_rank, start_rank + 9);
                } else {
                    let customer = rng.gen_range(0, customers) as i64;
                    board.neighbors(customer, 5, 5);
                }
                completed.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let elapsed = start.elapsed();
    let total = completed.load(Ordering::Relaxed);
    let ops_per_sec = total as f64 / elapsed.as_secs_f64();

    println!("Workload complete:");
    println!("  {} operations in {:.2}s", total, elapsed.as_secs_f64());
    println!("  {:.0} operations per second", ops_per_sec);
    println!("  {} customers on the board", board.len());

    match board.check_invariants() {
        Ok(()) => println!("  ✅ structural audit passed"),
        Err(violation) => {
            eprintln!("  structural audit FAILED: {}", violation);
            std::process::exit(1);
        }
    }
}
