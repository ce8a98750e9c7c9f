//! Assertion functions for snapshots and ranked output.

use crate::snapshot::{RankedEntry, TopKSnapshot};

/// Assert that `snapshot` holds exactly `expected` `(key, count)` pairs, in order.
///
/// # Panics
///
/// Panics if the entries differ in length, content or order.
///
/// # Example
///
/// ```
/// use ironrank::testing::assert_ranked;
/// use ironrank::{RankedEntry, TopKSnapshot, Window};
///
/// let snapshot = TopKSnapshot::new(
///     Window::new(0, 10),
///     vec![RankedEntry::new("a", 3), RankedEntry::new("b", 1)],
/// );
/// assert_ranked(&snapshot, &[("a", 3), ("b", 1)]);
/// ```
pub fn assert_ranked(snapshot: &TopKSnapshot, expected: &[(&str, u64)]) {
    let actual = snapshot.pairs();
    assert_eq!(
        actual.len(),
        expected.len(),
        "Snapshot length mismatch for window [{}, {}):\n  Expected: {expected:?}\n  Actual: {actual:?}",
        snapshot.window_start,
        snapshot.window_end
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Snapshot mismatch at rank {i} for window [{}, {}):\n  Expected: {expected:?}\n  Actual: {actual:?}",
            snapshot.window_start, snapshot.window_end
        );
    }
}

/// Assert that `entries` are sorted by count descending, then key ascending.
///
/// # Panics
///
/// Panics at the first adjacent pair that is out of order.
pub fn assert_sorted_by_rank(entries: &[RankedEntry]) {
    for (i, pair) in entries.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        let ordered = a.count > b.count || (a.count == b.count && a.key < b.key);
        assert!(
            ordered,
            "Entries out of rank order at {i}: {a:?} before {b:?}\n  Full: {entries:?}"
        );
    }
}
