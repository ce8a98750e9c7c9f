//! Top-K selection over the finished counts of one window.
//!
//! The selector keeps a **bounded min-heap** of capacity `k` while scanning
//! the counts once (`O(N log K)`), then drains the survivors and sorts them.
//! Output is ordered by count descending with ties broken by key ascending,
//! so equal inputs always produce equal outputs.
//!
//! ```
//! use ironrank::topk::select_top_k;
//! use std::collections::HashMap;
//!
//! let counts = HashMap::from([
//!     ("a".to_string(), 3),
//!     ("c".to_string(), 1),
//!     ("b".to_string(), 1),
//! ]);
//! let top = select_top_k(&counts, 2);
//! assert_eq!(top[0].key, "a");
//! assert_eq!(top[1].key, "b");
//! ```

use crate::snapshot::RankedEntry;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// A mergeable partial Top-K.
///
/// Holds a min-heap (via `BinaryHeap<Reverse<RankedEntry>>`) of size ≤ `k`,
/// so memory is bounded by `k`. Two accumulators built over disjoint key sets
/// merge into the Top-K of their union.
#[derive(Clone, Debug)]
pub struct TopKAccumulator {
    k: usize,
    heap: BinaryHeap<Reverse<RankedEntry>>,
}

impl TopKAccumulator {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1)),
        }
    }

    /// Offer one `(key, count)`; the key is only cloned when it survives.
    pub fn offer(&mut self, key: &str, count: u64) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() == self.k {
            // Full: skip anything that ranks at or below the current minimum.
            if let Some(Reverse(min)) = self.heap.peek() {
                if rank(count, key, min.count, &min.key) != Ordering::Greater {
                    return;
                }
            }
        }
        self.push(RankedEntry::new(key, count));
    }

    /// Push an owned entry, dropping the smallest when over capacity.
    pub fn push(&mut self, entry: RankedEntry) {
        if self.k == 0 {
            return;
        }
        self.heap.push(Reverse(entry));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    /// Fold another partial result into this one.
    pub fn merge(&mut self, other: Self) {
        if self.heap.len() + other.heap.len() <= self.k {
            self.heap.extend(other.heap);
            return;
        }
        for Reverse(entry) in other.heap {
            self.push(entry);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain to a `Vec` ordered best first.
    #[must_use]
    pub fn finish(self) -> Vec<RankedEntry> {
        // `into_sorted_vec` on `Reverse` yields the largest inner value first.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(entry)| entry)
            .collect()
    }
}

/// Rank order: higher count wins, then the lexicographically smaller key.
#[inline]
fn rank(count: u64, key: &str, other_count: u64, other_key: &str) -> Ordering {
    count.cmp(&other_count).then_with(|| other_key.cmp(key))
}

impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(self.count, &self.key, other.count, &other.key)
    }
}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the `k` highest-count keys, count descending then key ascending.
///
/// Fewer than `k` distinct keys returns all of them; an empty map returns an
/// empty vector.
#[must_use]
pub fn select_top_k(counts: &HashMap<String, u64>, k: usize) -> Vec<RankedEntry> {
    let mut acc = TopKAccumulator::new(k);
    for (key, &count) in counts {
        acc.offer(key, count);
    }
    acc.finish()
}

/// Parallel variant of [`select_top_k`]: rayon folds partial accumulators
/// and reduces them with [`TopKAccumulator::merge`].
#[cfg(feature = "parallel-select")]
#[must_use]
pub fn select_top_k_par(counts: &HashMap<String, u64>, k: usize) -> Vec<RankedEntry> {
    use rayon::prelude::*;

    counts
        .par_iter()
        .fold(
            || TopKAccumulator::new(k),
            |mut acc, (key, &count)| {
                acc.offer(key, count);
                acc
            },
        )
        .reduce(
            || TopKAccumulator::new(k),
            |mut a, b| {
                a.merge(b);
                a
            },
        )
        .finish()
}

/// The selector used when a window closes.
///
/// Windows with more distinct keys than `parallel_threshold` are ranked on the
/// rayon pool when the `parallel-select` feature is on.
#[derive(Clone, Copy, Debug)]
pub struct TopKSelector {
    k: usize,
    parallel_threshold: usize,
}

impl TopKSelector {
    #[must_use]
    pub const fn new(k: usize, parallel_threshold: usize) -> Self {
        Self { k, parallel_threshold }
    }

    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    #[must_use]
    pub fn select(&self, counts: &HashMap<String, u64>) -> Vec<RankedEntry> {
        #[cfg(feature = "parallel-select")]
        if counts.len() > self.parallel_threshold {
            return select_top_k_par(counts, self.k);
        }
        select_top_k(counts, self.k)
    }
}
