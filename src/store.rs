//! Per-key window store: `(window, key) -> running count`.
//!
//! State is sharded by key hash; each shard is an independent
//! `parking_lot::Mutex`, so increments for different keys never contend on
//! one global lock. Every shard also carries a *sealed-through* watermark.
//! An increment whose window ends at or before the watermark is rejected as
//! late, under the same lock that applies it, so a window sealed by
//! [`WindowStore::seal`] can never change again.

use crate::error::{AggregatorError, Result};
use crate::window::{TimestampMs, Window};
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeSet, HashMap};
use std::hash::BuildHasher;

/// The result of applying one event to all of its windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Windows whose count was incremented.
    pub applied: usize,
    /// Windows that were already sealed and left untouched.
    pub late: usize,
}

impl IngestOutcome {
    /// True when at least one targeted window had already closed.
    #[inline]
    pub const fn has_late(&self) -> bool {
        self.late > 0
    }
}

struct Shard {
    sealed_through: TimestampMs,
    windows: HashMap<Window, HashMap<String, u64>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            sealed_through: TimestampMs::MIN,
            windows: HashMap::new(),
        }
    }

    #[inline]
    fn is_sealed(&self, window: &Window) -> bool {
        window.end <= self.sealed_through
    }

    fn add(&mut self, window: Window, key: &str, weight: u64) -> u64 {
        let keys = self.windows.entry(window).or_default();
        // Only allocate the owned key on first sight.
        if let Some(count) = keys.get_mut(key) {
            *count = count.saturating_add(weight);
            return *count;
        }
        keys.insert(key.to_owned(), weight);
        weight
    }
}

/// Owner of all window count state.
pub struct WindowStore {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
}

impl WindowStore {
    /// Create a store with `shard_count` independently locked shards (min 1).
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(Shard::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    fn shard_for(&self, key: &str) -> &Mutex<Shard> {
        let idx = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Add `weight` to `(window, key)`, creating the entry at 0 if absent.
    /// Returns the new running count.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::LateEvent`] when `window` has been sealed.
    pub fn increment(&self, window: Window, key: &str, weight: u64) -> Result<u64> {
        let mut shard = self.shard_for(key).lock();
        if shard.is_sealed(&window) {
            return Err(AggregatorError::LateEvent { window });
        }
        Ok(shard.add(window, key, weight))
    }

    /// Apply one event to every window in `windows` under a single shard lock.
    pub fn increment_all<I>(&self, windows: I, key: &str, weight: u64) -> IngestOutcome
    where
        I: IntoIterator<Item = Window>,
    {
        let mut outcome = IngestOutcome::default();
        let mut shard = self.shard_for(key).lock();
        for window in windows {
            if shard.is_sealed(&window) {
                outcome.late += 1;
            } else {
                shard.add(window, key, weight);
                outcome.applied += 1;
            }
        }
        outcome
    }

    /// All key counts for `window`, without mutating them.
    #[must_use]
    pub fn snapshot(&self, window: &Window) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for shard in self.shards.iter() {
            let shard = shard.lock();
            if let Some(keys) = shard.windows.get(window) {
                // Keys are disjoint across shards.
                counts.extend(keys.iter().map(|(k, &c)| (k.clone(), c)));
            }
        }
        counts
    }

    /// Remove all entries for `window`; returns how many keys were dropped.
    /// Evicting an absent window is a no-op.
    pub fn evict(&self, window: &Window) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().windows.remove(window).map_or(0, |keys| keys.len()))
            .sum()
    }

    /// Reject all future increments to windows ending at or before `now` and
    /// return the windows holding state that became sealed, oldest first.
    ///
    /// The watermark only moves forward.
    pub fn seal(&self, now: TimestampMs) -> Vec<Window> {
        let mut due = BTreeSet::new();
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.sealed_through = shard.sealed_through.max(now);
            let sealed_through = shard.sealed_through;
            due.extend(
                shard
                    .windows
                    .keys()
                    .filter(|w| w.end <= sealed_through)
                    .copied(),
            );
        }
        due.into_iter().collect()
    }

    /// Windows currently holding state, oldest first.
    #[must_use]
    pub fn windows(&self) -> Vec<Window> {
        let mut all = BTreeSet::new();
        for shard in self.shards.iter() {
            all.extend(shard.lock().windows.keys().copied());
        }
        all.into_iter().collect()
    }

    /// Number of `(window, key)` entries across all shards.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().windows.values().map(HashMap::len).sum::<usize>())
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().windows.is_empty())
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new(num_cpus::get() * 4)
    }
}
