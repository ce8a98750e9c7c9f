//! Event stream builders for tests.

use crate::event::Event;
use crate::window::TimestampMs;

/// A fluent builder for event streams.
///
/// # Example
///
/// ```
/// use ironrank::testing::EventBuilder;
///
/// let events = EventBuilder::at(1_000)
///     .add("a")
///     .add_repeated("b", 3)
///     .add_weighted("c", 5)
///     .build();
///
/// assert_eq!(events.len(), 5);
/// assert!(events.iter().all(|e| e.occurred_at == 1_000));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EventBuilder {
    ts: TimestampMs,
    events: Vec<Event>,
}

impl EventBuilder {
    /// Start a stream whose events are stamped `ts` until changed.
    #[must_use]
    pub const fn at(ts: TimestampMs) -> Self {
        Self {
            ts,
            events: Vec::new(),
        }
    }

    /// Stamp subsequent events with `ts`.
    #[must_use]
    pub const fn then_at(mut self, ts: TimestampMs) -> Self {
        self.ts = ts;
        self
    }

    #[must_use]
    pub fn add(mut self, key: &str) -> Self {
        self.events.push(Event::new(key, self.ts));
        self
    }

    #[must_use]
    pub fn add_weighted(mut self, key: &str, weight: u64) -> Self {
        self.events.push(Event::new(key, self.ts).with_weight(weight));
        self
    }

    #[must_use]
    pub fn add_repeated(mut self, key: &str, count: usize) -> Self {
        for _ in 0..count {
            self.events.push(Event::new(key, self.ts));
        }
        self
    }

    /// One weight-1 event per key, in order.
    #[must_use]
    pub fn add_keys(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.events.push(Event::new(*key, self.ts));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<Event> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
