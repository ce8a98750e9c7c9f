//! Sliding window geometry: window instances, their size/slide configuration,
//! and assignment of timestamps to window instances.

use crate::error::{AggregatorError, Result};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;

/// Milliseconds since UNIX epoch (UTC).
pub type TimestampMs = i64;

/// A closed-open time range: [start, end).
///
/// Every window instance produced by [`WindowSpec::assign`] has `start`
/// aligned to a multiple of the slide and `end = start + size`.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, Eq)]
pub struct Window {
    pub start: TimestampMs,
    pub end: TimestampMs,
}

impl Window {
    #[inline]
    pub fn new(start: TimestampMs, end: TimestampMs) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// Whether `ts` falls in `[start, end)`.
    #[inline]
    pub fn contains(&self, ts: TimestampMs) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Whether this window is due to close at `now` (its end has passed).
    #[inline]
    pub fn is_due(&self, now: TimestampMs) -> bool {
        self.end <= now
    }
}

// Hash/Ord so Windows can be used as keys and sorted deterministically.
impl PartialEq for Window {
    #[inline] fn eq(&self, other: &Self) -> bool { self.start == other.start && self.end == other.end }
}
impl Hash for Window {
    #[inline] fn hash<H: Hasher>(&self, state: &mut H) { self.start.hash(state); self.end.hash(state); }
}
impl Ord for Window {
    #[inline] fn cmp(&self, o: &Self) -> std::cmp::Ordering {
        self.start.cmp(&o.start).then(self.end.cmp(&o.end))
    }
}
impl PartialOrd for Window {
    #[inline] fn partial_cmp(&self, o: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(o)) }
}

/// Sliding window configuration: `size` is a positive multiple of `slide`.
///
/// With `size = 60_000` and `slide = 5_000` every timestamp belongs to 12
/// overlapping window instances.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    size_ms: i64,
    slide_ms: i64,
}

impl WindowSpec {
    /// Build a spec, rejecting non-positive durations and a size that is not a
    /// multiple of the slide.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] when the invariant
    /// `size > 0 && slide > 0 && size % slide == 0` does not hold.
    pub fn new(size_ms: i64, slide_ms: i64) -> Result<Self> {
        if size_ms <= 0 {
            return Err(AggregatorError::InvalidConfig(format!(
                "window size must be positive, got {size_ms}ms"
            )));
        }
        if slide_ms <= 0 {
            return Err(AggregatorError::InvalidConfig(format!(
                "window slide must be positive, got {slide_ms}ms"
            )));
        }
        if size_ms % slide_ms != 0 {
            return Err(AggregatorError::InvalidConfig(format!(
                "window size {size_ms}ms is not a multiple of slide {slide_ms}ms"
            )));
        }
        Ok(Self { size_ms, slide_ms })
    }

    #[inline]
    pub const fn size_ms(&self) -> i64 {
        self.size_ms
    }

    #[inline]
    pub const fn slide_ms(&self) -> i64 {
        self.slide_ms
    }

    /// Number of window instances every timestamp belongs to.
    #[inline]
    pub const fn windows_per_event(&self) -> usize {
        (self.size_ms / self.slide_ms) as usize
    }

    /// The window instance starting at the slide boundary at or below `ts`.
    ///
    /// # Panics
    ///
    /// When the window bounds do not fit in a [`TimestampMs`]; see
    /// [`try_assign`](Self::try_assign).
    #[inline]
    pub fn latest_window(&self, ts: TimestampMs) -> Window {
        let start = div_floor(ts, self.slide_ms).checked_mul(self.slide_ms);
        match start.and_then(|start| Some(Window { start, end: start.checked_add(self.size_ms)? })) {
            Some(window) => window,
            None => panic!("window bounds for timestamp {ts} overflow i64"),
        }
    }

    /// All window instances containing `ts`, oldest first.
    ///
    /// Yields exactly [`windows_per_event`](Self::windows_per_event) windows,
    /// each satisfying `start <= ts < start + size` with `start` a multiple of
    /// the slide.
    ///
    /// # Panics
    ///
    /// Like [`latest_window`](Self::latest_window), for timestamps within one
    /// window size of the ends of the `i64` range.
    #[inline]
    pub fn assign(&self, ts: TimestampMs) -> SlidingWindows {
        match self.try_assign(ts) {
            Some(windows) => windows,
            None => panic!("window bounds for timestamp {ts} overflow i64"),
        }
    }

    /// Like [`assign`](Self::assign), but `None` when the oldest start or the
    /// newest end of the windows containing `ts` does not fit in a
    /// [`TimestampMs`].
    pub fn try_assign(&self, ts: TimestampMs) -> Option<SlidingWindows> {
        let latest = div_floor(ts, self.slide_ms).checked_mul(self.slide_ms)?;
        latest.checked_add(self.size_ms)?;
        let next_start = latest.checked_sub(self.size_ms - self.slide_ms)?;
        Some(SlidingWindows {
            next_start,
            remaining: self.windows_per_event(),
            size_ms: self.size_ms,
            slide_ms: self.slide_ms,
        })
    }
}

/// Iterator over the window instances one timestamp belongs to.
#[derive(Clone, Debug)]
pub struct SlidingWindows {
    next_start: TimestampMs,
    remaining: usize,
    size_ms: i64,
    slide_ms: i64,
}

impl Iterator for SlidingWindows {
    type Item = Window;

    #[inline]
    fn next(&mut self) -> Option<Window> {
        if self.remaining == 0 {
            return None;
        }
        let start = self.next_start;
        self.next_start = start.saturating_add(self.slide_ms);
        self.remaining -= 1;
        Some(Window { start, end: start + self.size_ms })
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SlidingWindows {}
impl FusedIterator for SlidingWindows {}

/// Floor division for i64 (unlike `/` which truncates toward zero).
#[inline]
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r > 0) != (b > 0)) { q - 1 } else { q }
}
