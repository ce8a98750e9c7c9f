//! The emitted result of one closed window.

use crate::window::{TimestampMs, Window};
use serde::{Deserialize, Serialize};

/// One `(key, count)` row of a snapshot.
///
/// Ordering (see [`topk`](crate::topk)) ranks a higher count above a lower
/// one and, on equal counts, the smaller key above the larger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

impl RankedEntry {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

impl From<(&str, u64)> for RankedEntry {
    fn from((key, count): (&str, u64)) -> Self {
        Self::new(key, count)
    }
}

/// Top-K result for one closed window instance. Produced exactly once per
/// window and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKSnapshot {
    pub window_start: TimestampMs,
    pub window_end: TimestampMs,
    pub entries: Vec<RankedEntry>,
}

impl TopKSnapshot {
    pub fn new(window: Window, entries: Vec<RankedEntry>) -> Self {
        Self {
            window_start: window.start,
            window_end: window.end,
            entries,
        }
    }

    #[inline]
    pub fn window(&self) -> Window {
        Window::new(self.window_start, self.window_end)
    }

    /// Entries as `(key, count)` pairs, in rank order.
    pub fn pairs(&self) -> Vec<(&str, u64)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), e.count))
            .collect()
    }
}
