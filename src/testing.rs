//! Testing utilities for code built on ironrank.
//!
//! This module provides:
//!
//! - **Sinks**: [`MemorySink`] records every delivered snapshot, [`FlakySink`]
//!   fails a configurable number of times first
//! - **Builders**: [`EventBuilder`] creates event streams fluently
//! - **Assertions**: compare snapshots and check rank order
//! - **Fixtures**: a small item-view stream with known winners
//! - [`TestAggregator`]: an aggregator on a [`ManualClock`] wired to a
//!   [`MemorySink`]
//!
//! # Quick Start
//!
//! ```
//! use ironrank::testing::*;
//! use ironrank::{AggregatorConfig, Event};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let t = TestAggregator::new(AggregatorConfig::sliding(10_000, 5_000).with_top_k(2), 0)?;
//! for key in ["a", "b", "a"] {
//!     t.ingest(Event::new(key, 1_000))?;
//! }
//! t.stop().await;
//!
//! let snapshots = t.sink.snapshots();
//! assert_eq!(snapshots.len(), 2); // windows [-5000, 5000) and [0, 10000)
//! assert_ranked(&snapshots[0], &[("a", 2), ("b", 1)]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod sinks;

// Re-export commonly used items
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;
pub use sinks::*;

use crate::clock::ManualClock;
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::scheduler::TickReport;
use crate::window::TimestampMs;
use crate::Aggregator;
use std::sync::Arc;

/// An [`Aggregator`] on a [`ManualClock`] that delivers into a [`MemorySink`].
///
/// Dereferences to the aggregator, so every aggregator method is available.
/// The aggregator is shared so it can also be handed to a
/// [`LineSource`](crate::LineSource).
pub struct TestAggregator {
    pub aggregator: Arc<Aggregator>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
}

impl TestAggregator {
    /// Build with the clock set to `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: AggregatorConfig, start: TimestampMs) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(start));
        let sink = Arc::new(MemorySink::new());
        let aggregator = Arc::new(Aggregator::with_clock(config, sink.clone(), clock.clone())?);
        Ok(Self {
            aggregator,
            clock,
            sink,
        })
    }

    /// Move the clock to `now` and run one tick.
    pub fn tick_at(&self, now: TimestampMs) -> TickReport {
        self.clock.set(now);
        self.aggregator.tick()
    }
}

impl std::ops::Deref for TestAggregator {
    type Target = Aggregator;

    fn deref(&self) -> &Self::Target {
        &self.aggregator
    }
}
