//! Span-augmented skip list over (score, customer) pairs.
//!
//! The ranking index behind the leaderboard: a probabilistic ordered
//! structure with O(log n) insert, delete, reposition, rank-of-customer
//! and rank-band lookups. Every forward link carries the number of
//! bottom-level steps it crosses, so absolute 1-based ranks fall out of
//! the ordinary descent instead of requiring a scan.

use std::cmp::Ordering;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::{RankError, Score};

const MAX_LEVEL: usize = 32;

/// One customer as seen by a rank query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub customer: i64,
    pub score: Score,
    /// 1-based position in canonical order.
    pub rank: u64,
}

/// A node in the ranking index
#[derive(Clone, Debug)]
struct Node {
    customer: i64,
    score: Score,
    /// Forward pointer and span at each level up to the node's height.
    /// span[i] = bottom-level steps the level-i link crosses.
    levels: Vec<Level>,
    /// Backward pointer for level-0 reverse traversal
    backward: Option<usize>,
}

#[derive(Clone, Debug)]
struct Level {
    forward: Option<usize>, // Index of next node at this level
    span: u64,
}

/// Canonical leaderboard order: higher score first, ties broken by
/// ascending customer id. Total because ids are unique.
#[inline]
fn key_cmp(score_a: Score, customer_a: i64, score_b: Score, customer_b: i64) -> Ordering {
    score_b
        .cmp(&score_a)
        .then_with(|| customer_a.cmp(&customer_b))
}

/// Ordered ranking index over participating customers.
#[derive(Clone, Debug)]
pub struct RankList {
    /// All nodes stored in a Vec (index 0 is the head sentinel)
    nodes: Vec<Option<Node>>,
    /// Free list for reusing slots
    free_slots: Vec<usize>,
    /// Customer id -> arena slot, so id-keyed operations resolve their
    /// ordering key without consulting the score map
    by_customer: AHashMap<i64, usize>,
    /// Index of tail node
    tail: Option<usize>,
    /// Current max level in use
    level: usize,
    /// Number of elements
    length: u64,
    /// RNG state for height generation (xorshift64); only touched under
    /// the envelope's exclusive structural lock
    rng_state: u64,
}

impl RankList {
    pub fn new() -> Self {
        // Head sentinel with max levels; its key is never compared
        let head = Node {
            customer: 0,
            score: Score::ZERO,
            levels: (0..MAX_LEVEL)
                .map(|_| Level {
                    forward: None,
                    span: 0,
                })
                .collect(),
            backward: None,
        };

        RankList {
            nodes: vec![Some(head)],
            free_slots: Vec::new(),
            by_customer: AHashMap::new(),
            tail: None,
            level: 1,
            length: 0,
            rng_state: 0x9e3779b97f4a7c15,
        }
    }

    #[inline]
    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("live arena slot")
    }

    #[inline]
    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("live arena slot")
    }

    /// Geometric height, p = 0.5, capped at MAX_LEVEL.
    fn random_level(&mut self) -> usize {
        let mut height = 1;
        let mut x = self.rng_state;
        while height < MAX_LEVEL {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.rng_state = x;
            if (x & 0xFFFF) >= 0x8000 {
                break;
            }
            height += 1;
        }
        height
    }

    fn alloc_node(&mut self, customer: i64, score: Score, height: usize) -> usize {
        let node = Node {
            customer,
            score,
            levels: (0..height)
                .map(|_| Level {
                    forward: None,
                    span: 0,
                })
                .collect(),
            backward: None,
        };

        if let Some(idx) = self.free_slots.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(Some(node));
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free_slots.push(idx);
    }

    /// Insert a customer that is not yet present.
    pub fn insert(&mut self, customer: i64, score: Score) -> Result<(), RankError> {
        if self.by_customer.contains_key(&customer) {
            return Err(RankError::Duplicate(customer));
        }

        let mut update = [0usize; MAX_LEVEL];
        let mut rank = [0u64; MAX_LEVEL];

        // Find the splice point at each level, accumulating the spans
        // consumed on the way down so rank[i] is the 1-based rank of
        // update[i].
        let mut x = 0;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };

            loop {
                let node = self.node(x);
                if let Some(fwd) = node.levels[i].forward {
                    let fwd_node = self.node(fwd);
                    if key_cmp(fwd_node.score, fwd_node.customer, score, customer)
                        == Ordering::Less
                    {
                        rank[i] += node.levels[i].span;
                        x = fwd;
                        continue;
                    }
                }
                break;
            }
            update[i] = x;
        }

        self.splice(customer, score, &mut update, &mut rank);
        Ok(())
    }

    fn splice(
        &mut self,
        customer: i64,
        score: Score,
        update: &mut [usize; MAX_LEVEL],
        rank: &mut [u64; MAX_LEVEL],
    ) {
        let height = self.random_level();
        let new_idx = self.alloc_node(customer, score, height);

        if height > self.level {
            for i in self.level..height {
                rank[i] = 0;
                update[i] = 0; // Head
                self.node_mut(0).levels[i].span = self.length;
            }
            self.level = height;
        }

        for i in 0..height {
            let old_forward = self.node(update[i]).levels[i].forward;
            let old_span = self.node(update[i]).levels[i].span;

            let new_node = self.node_mut(new_idx);
            new_node.levels[i].forward = old_forward;
            new_node.levels[i].span = old_span - (rank[0] - rank[i]);

            let pre = self.node_mut(update[i]);
            pre.levels[i].forward = Some(new_idx);
            pre.levels[i].span = (rank[0] - rank[i]) + 1;
        }

        // Links that skip over the new node grow by one step
        for i in height..self.level {
            self.node_mut(update[i]).levels[i].span += 1;
        }

        let backward = if update[0] == 0 {
            None
        } else {
            Some(update[0])
        };
        self.node_mut(new_idx).backward = backward;

        let new_fwd = self.node(new_idx).levels[0].forward;
        if let Some(fwd) = new_fwd {
            self.node_mut(fwd).backward = Some(new_idx);
        } else {
            self.tail = Some(new_idx);
        }

        self.by_customer.insert(customer, new_idx);
        self.length += 1;
    }

    /// Remove a customer that is present. Returns its score.
    pub fn remove(&mut self, customer: i64) -> Result<Score, RankError> {
        let target = match self.by_customer.get(&customer) {
            Some(&idx) => idx,
            None => return Err(RankError::Absent(customer)),
        };
        let score = self.node(target).score;

        let mut update = [0usize; MAX_LEVEL];
        let mut x = 0;
        for i in (0..self.level).rev() {
            loop {
                let node = self.node(x);
                if let Some(fwd) = node.levels[i].forward {
                    let fwd_node = self.node(fwd);
                    if key_cmp(fwd_node.score, fwd_node.customer, score, customer)
                        == Ordering::Less
                    {
                        x = fwd;
                        continue;
                    }
                }
                break;
            }
            update[i] = x;
        }

        if self.node(update[0]).levels[0].forward != Some(target) {
            // The id map and the ordered structure disagree
            return Err(RankError::Absent(customer));
        }

        self.unlink(target, &update);
        Ok(score)
    }

    /// Unlink a node at every level it appears, given the predecessor
    /// array collected by the descent.
    fn unlink(&mut self, idx: usize, update: &[usize; MAX_LEVEL]) {
        for i in 0..self.level {
            let pre_fwd = self.node(update[i]).levels[i].forward;
            if pre_fwd == Some(idx) {
                let gone_span = self.node(idx).levels[i].span;
                let gone_fwd = self.node(idx).levels[i].forward;

                let pre = self.node_mut(update[i]);
                pre.levels[i].span = pre.levels[i].span + gone_span - 1;
                pre.levels[i].forward = gone_fwd;
            } else {
                self.node_mut(update[i]).levels[i].span -= 1;
            }
        }

        let fwd = self.node(idx).levels[0].forward;
        let back = self.node(idx).backward;
        if let Some(fwd_idx) = fwd {
            self.node_mut(fwd_idx).backward = back;
        } else {
            self.tail = back;
        }

        while self.level > 1 && self.node(0).levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }

        let customer = self.node(idx).customer;
        self.by_customer.remove(&customer);
        self.free_node(idx);
        self.length -= 1;
    }

    /// Reposition a present customer under a new score.
    ///
    /// Stays in place when the node, already carrying the new score,
    /// would still order strictly between its level-0 neighbors under
    /// the full comparator; otherwise removes and reinserts.
    pub fn update_score(&mut self, customer: i64, new_score: Score) -> Result<(), RankError> {
        let idx = match self.by_customer.get(&customer) {
            Some(&idx) => idx,
            None => return Err(RankError::Absent(customer)),
        };

        let (backward, forward) = {
            let node = self.node(idx);
            (node.backward, node.levels[0].forward)
        };
        let back_ok = match backward {
            None => true,
            Some(b) => {
                let prev = self.node(b);
                key_cmp(prev.score, prev.customer, new_score, customer) == Ordering::Less
            }
        };
        let fwd_ok = match forward {
            None => true,
            Some(f) => {
                let next = self.node(f);
                key_cmp(new_score, customer, next.score, next.customer) == Ordering::Less
            }
        };

        if back_ok && fwd_ok {
            self.node_mut(idx).score = new_score;
            return Ok(());
        }

        self.remove(customer)?;
        self.insert(customer, new_score)
    }

    /// 1-based rank of a customer, or None if absent. O(log n)
    pub fn rank_of(&self, customer: i64) -> Option<u64> {
        let idx = *self.by_customer.get(&customer)?;
        Some(self.rank_of_node(idx))
    }

    /// Position-of-element descent: advance while the next node is at or
    /// before the target, accumulating spans. The sum is the 1-based rank.
    fn rank_of_node(&self, idx: usize) -> u64 {
        let target = self.node(idx);
        let (score, customer) = (target.score, target.customer);

        let mut rank = 0u64;
        let mut x = 0;
        for i in (0..self.level).rev() {
            loop {
                let node = self.node(x);
                if let Some(fwd) = node.levels[i].forward {
                    let fwd_node = self.node(fwd);
                    if key_cmp(fwd_node.score, fwd_node.customer, score, customer)
                        != Ordering::Greater
                    {
                        rank += node.levels[i].span;
                        x = fwd;
                        continue;
                    }
                }
                break;
            }
        }

        debug_assert_eq!(x, idx, "descent must land on the target node");
        rank
    }

    /// Entries with 1-based ranks in [start, end], ascending. `end` is
    /// clamped to the participant count; a start outside [1, len] or an
    /// inverted range yields an empty result. O(log n + k)
    pub fn range(&self, start: u64, end: u64) -> Vec<RankedEntry> {
        if start < 1 || end < start || start > self.length {
            return Vec::new();
        }
        let end = end.min(self.length);

        // Descend to the last node ranked strictly below `start`
        let mut traversed = 0u64;
        let mut x = 0;
        for i in (0..self.level).rev() {
            loop {
                let node = self.node(x);
                if let Some(fwd) = node.levels[i].forward {
                    if traversed + node.levels[i].span < start {
                        traversed += node.levels[i].span;
                        x = fwd;
                        continue;
                    }
                }
                break;
            }
        }

        let mut out = Vec::with_capacity((end - start + 1) as usize);
        let mut rank = traversed;
        let mut cur = self.node(x).levels[0].forward;
        while let Some(idx) = cur {
            rank += 1;
            if rank > end {
                break;
            }
            let node = self.node(idx);
            out.push(RankedEntry {
                customer: node.customer,
                score: node.score,
                rank,
            });
            cur = node.levels[0].forward;
        }
        out
    }

    /// Up to `up` entries immediately above the customer, the customer
    /// itself, and up to `down` entries immediately below, in ascending
    /// rank order. Empty if the customer is absent. O(log n + up + down)
    pub fn neighbors(&self, customer: i64, up: usize, down: usize) -> Vec<RankedEntry> {
        let idx = match self.by_customer.get(&customer) {
            Some(&idx) => idx,
            None => return Vec::new(),
        };
        let rank = self.rank_of_node(idx);

        let mut out = Vec::with_capacity(up + 1 + down);
        let mut back = self.node(idx).backward;
        let mut r = rank;
        for _ in 0..up {
            match back {
                Some(bidx) => {
                    r -= 1;
                    let node = self.node(bidx);
                    out.push(RankedEntry {
                        customer: node.customer,
                        score: node.score,
                        rank: r,
                    });
                    back = node.backward;
                }
                None => break,
            }
        }
        out.reverse();

        let target = self.node(idx);
        out.push(RankedEntry {
            customer,
            score: target.score,
            rank,
        });

        let mut fwd = target.levels[0].forward;
        let mut r = rank;
        for _ in 0..down {
            match fwd {
                Some(fidx) => {
                    r += 1;
                    let node = self.node(fidx);
                    out.push(RankedEntry {
                        customer: node.customer,
                        score: node.score,
                        rank: r,
                    });
                    fwd = node.levels[0].forward;
                }
                None => break,
            }
        }
        out
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Iterate over all entries in canonical order
    pub fn iter(&self) -> RankListIter<'_> {
        RankListIter {
            list: self,
            current: self.node(0).levels[0].forward,
        }
    }

    /// Full structural audit, for tests and the DST harness.
    ///
    /// Checks canonical ordering, span sums at every level, backward
    /// links, the id map, and the level counter.
    pub fn check_invariants(&self) -> Result<(), String> {
        // Level-0 walk: ordering, backward links, ranks, id map
        let mut rank_of_slot: AHashMap<usize, u64> = AHashMap::new();
        let mut prev: Option<usize> = None;
        let mut cur = self.node(0).levels[0].forward;
        let mut count = 0u64;
        while let Some(idx) = cur {
            let node = self.node(idx);
            count += 1;
            rank_of_slot.insert(idx, count);

            if let Some(pidx) = prev {
                let p = self.node(pidx);
                if key_cmp(p.score, p.customer, node.score, node.customer) != Ordering::Less {
                    return Err(format!(
                        "order violated at rank {}: ({}, {}) before ({}, {})",
                        count, p.customer, p.score, node.customer, node.score
                    ));
                }
            }
            if node.backward != prev {
                return Err(format!(
                    "backward link of customer {} does not point at its predecessor",
                    node.customer
                ));
            }
            match self.by_customer.get(&node.customer) {
                Some(&mapped) if mapped == idx => {}
                _ => {
                    return Err(format!(
                        "customer {} is linked but not mapped to its slot",
                        node.customer
                    ))
                }
            }

            prev = Some(idx);
            cur = node.levels[0].forward;
        }

        if count != self.length {
            return Err(format!(
                "length {} but {} nodes linked at level 0",
                self.length, count
            ));
        }
        if self.by_customer.len() as u64 != count {
            return Err(format!(
                "id map holds {} entries for {} nodes",
                self.by_customer.len(),
                count
            ));
        }
        if self.tail != prev {
            return Err("tail does not point at the last level-0 node".to_string());
        }

        // Per-level walk: every link's span must equal the rank distance
        // it crosses, and a trailing nil link must span to the end
        for i in 0..self.level {
            let mut x = 0;
            let mut pos = 0u64;
            loop {
                let node = self.node(x);
                match node.levels[i].forward {
                    Some(fwd) => {
                        pos += node.levels[i].span;
                        let expected = *rank_of_slot
                            .get(&fwd)
                            .ok_or_else(|| format!("level {} links a dead slot", i))?;
                        if pos != expected {
                            return Err(format!(
                                "span sum {} at level {} but customer {} has rank {}",
                                pos,
                                i,
                                self.node(fwd).customer,
                                expected
                            ));
                        }
                        x = fwd;
                    }
                    None => {
                        if node.levels[i].span != self.length - pos {
                            return Err(format!(
                                "trailing span at level {} is {} with {} nodes past rank {}",
                                i,
                                node.levels[i].span,
                                self.length - pos,
                                pos
                            ));
                        }
                        break;
                    }
                }
            }
        }

        // Level counter: the topmost in-use level is level - 1
        if self.length > 0 && self.node(0).levels[self.level - 1].forward.is_none() {
            return Err(format!("level is {} but the top level is empty", self.level));
        }
        for i in self.level..MAX_LEVEL {
            if self.node(0).levels[i].forward.is_some() {
                return Err(format!("level is {} but level {} is linked", self.level, i));
            }
        }

        Ok(())
    }
}

impl Default for RankList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RankListIter<'a> {
    list: &'a RankList,
    current: Option<usize>,
}

impl Iterator for RankListIter<'_> {
    type Item = (i64, Score);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = self.list.node(idx);
        self.current = node.levels[0].forward;
        Some((node.customer, node.score))
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

    fn filled(pairs: &[(i64, i64)]) -> RankList {
        let mut list = RankList::new();
        for &(customer, points) in pairs {
            list.insert(customer, Score::from_int(points)).unwrap();
        }
        list.check_invariants().unwrap();
        list
    }

    #[test]
    fn test_insert_orders_by_score_desc_then_id_asc() {
        let list = filled(&[(1, 10), (2, 20), (3, 20), (4, 5)]);
        let all = list.range(1, 4);
        assert_eq!(
            all,
            vec![entry(2, 20, 1), entry(3, 20, 2), entry(1, 10, 3), entry(4, 5, 4)]
        );
    }

    #[test]
    fn test_insert_duplicate_id_fails() {
        let mut list = filled(&[(7, 10)]);
        assert_eq!(
            list.insert(7, Score::from_int(99)),
            Err(RankError::Duplicate(7))
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_returns_score_and_absent_fails() {
        let mut list = filled(&[(1, 10), (2, 20)]);
        assert_eq!(list.remove(1), Ok(Score::from_int(10)));
        assert_eq!(list.remove(1), Err(RankError::Absent(1)));
        list.check_invariants().unwrap();
        assert_eq!(list.range(1, 10), vec![entry(2, 20, 1)]);
    }

    #[test]
    fn test_rank_of() {
        let list = filled(&[(1, 10), (2, 20), (3, 20), (4, 5)]);
        assert_eq!(list.rank_of(2), Some(1));
        assert_eq!(list.rank_of(3), Some(2));
        assert_eq!(list.rank_of(1), Some(3));
        assert_eq!(list.rank_of(4), Some(4));
        assert_eq!(list.rank_of(42), None);
    }

    #[test]
    fn test_range_clamps_and_rejects() {
        let list = filled(&[(1, 10), (2, 20), (3, 30)]);
        assert_eq!(list.range(1, 100).len(), 3);
        assert_eq!(list.range(2, 2), vec![entry(2, 20, 2)]);
        assert!(list.range(0, 2).is_empty());
        assert!(list.range(3, 2).is_empty());
        assert!(list.range(4, 9).is_empty());
    }

    #[test]
    fn test_update_score_in_place_keeps_rank() {
        let mut list = filled(&[(1, 10), (2, 20), (3, 30)]);
        // 20 -> 25 still sits between 30 and 10
        list.update_score(2, Score::from_int(25)).unwrap();
        list.check_invariants().unwrap();
        assert_eq!(list.rank_of(2), Some(2));
        assert_eq!(list.range(2, 2), vec![entry(2, 25, 2)]);
    }

    #[test]
    fn test_update_score_repositions() {
        let mut list = filled(&[(1, 10), (2, 20), (3, 30)]);
        list.update_score(1, Score::from_int(40)).unwrap();
        list.check_invariants().unwrap();
        assert_eq!(
            list.range(1, 3),
            vec![entry(1, 40, 1), entry(3, 30, 2), entry(2, 20, 3)]
        );
        assert_eq!(
            list.update_score(9, Score::from_int(1)),
            Err(RankError::Absent(9))
        );
    }

    #[test]
    fn test_update_score_tie_respects_id_order() {
        let mut list = filled(&[(5, 10), (6, 20)]);
        // 6 drops to 10: tied with 5, and 5 < 6 means 5 must stay first
        list.update_score(6, Score::from_int(10)).unwrap();
        list.check_invariants().unwrap();
        assert_eq!(list.range(1, 2), vec![entry(5, 10, 1), entry(6, 10, 2)]);
    }

    #[test]
    fn test_neighbors_window() {
        let list = filled(&[(1, 10), (2, 20), (3, 20), (4, 5)]);
        assert_eq!(
            list.neighbors(1, 1, 1),
            vec![entry(3, 20, 2), entry(1, 10, 3), entry(4, 5, 4)]
        );
        // Truncated at both ends
        assert_eq!(
            list.neighbors(2, 5, 0),
            vec![entry(2, 20, 1)]
        );
        assert_eq!(
            list.neighbors(4, 0, 5),
            vec![entry(4, 5, 4)]
        );
        assert!(list.neighbors(42, 3, 3).is_empty());
    }

    #[test]
    fn test_spans_survive_mixed_churn() {
        let mut list = RankList::new();
        for i in 0..200i64 {
            list.insert(i, Score::from_int((i * 7919) % 101)).unwrap();
        }
        list.check_invariants().unwrap();
        for i in (0..200i64).step_by(3) {
            list.remove(i).unwrap();
        }
        list.check_invariants().unwrap();
        for i in (1..200i64).step_by(3) {
            list.update_score(i, Score::from_int((i * 31) % 211)).unwrap();
        }
        list.check_invariants().unwrap();
        assert_eq!(list.len(), 200 - 67);

        // Ranks must agree with a full materialization
        let all = list.range(1, list.len());
        for (pos, entry) in all.iter().enumerate() {
            assert_eq!(entry.rank, pos as u64 + 1);
            assert_eq!(list.rank_of(entry.customer), Some(entry.rank));
        }
    }

    #[test]
    fn test_level_drops_when_top_empties() {
        let mut list = RankList::new();
        for i in 0..500i64 {
            list.insert(i, Score::from_int(i)).unwrap();
        }
        for i in 0..500i64 {
            list.remove(i).unwrap();
        }
        assert!(list.is_empty());
        list.check_invariants().unwrap();
        // Reusable after draining
        list.insert(1, Score::from_int(1)).unwrap();
        assert_eq!(list.range(1, 1), vec![entry(1, 1, 1)]);
    }

    #[test]
    fn test_iter_matches_range() {
        let list = filled(&[(9, 3), (8, 1), (7, 2)]);
        let from_iter: Vec<i64> = list.iter().map(|(customer, _)| customer).collect();
        let from_range: Vec<i64> = list.range(1, 3).iter().map(|e| e.customer).collect();
        assert_eq!(from_iter, from_range);
    }
}
