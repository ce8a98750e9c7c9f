//! Pre-built event streams with known rankings.

use crate::event::Event;
use crate::window::TimestampMs;

/// Item views spread over `[base, base + 4_000)`:
/// `item-a` x6, `item-b` x4, `item-c` x4, `item-d` x2, `item-e` x1.
///
/// Any window containing the whole span ranks them
/// `item-a, item-b, item-c, item-d, item-e` (b before c by key).
///
/// ```
/// use ironrank::testing::item_views;
///
/// let views = item_views(0);
/// assert_eq!(views.len(), 17);
/// ```
#[must_use]
pub fn item_views(base: TimestampMs) -> Vec<Event> {
    let plan: [(&str, usize); 5] = [
        ("item-a", 6),
        ("item-b", 4),
        ("item-c", 4),
        ("item-d", 2),
        ("item-e", 1),
    ];
    let mut events = Vec::new();
    let mut offset = 0;
    for (key, n) in plan {
        for _ in 0..n {
            events.push(Event::new(key, base + (offset % 4_000)));
            offset += 250;
        }
    }
    events
}

/// The ranking [`item_views`] produces with `k = 5`.
#[must_use]
pub fn item_views_top5() -> Vec<(&'static str, u64)> {
    vec![
        ("item-a", 6),
        ("item-b", 4),
        ("item-c", 4),
        ("item-d", 2),
        ("item-e", 1),
    ]
}
