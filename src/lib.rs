//! # Ironrank
//!
//! A **keyed, sliding-window Top-K aggregator** for Rust. Ironrank ingests a
//! stream of `(key, timestamp)` occurrences, keeps per-key counts for every
//! overlapping window instance, and when a window closes emits its K
//! highest-count keys to a sink.
//!
//! ## Key Features
//!
//! - **Sliding windows** - `size` a multiple of `slide`; every event lands in `size / slide` windows
//! - **Sharded state** - counts are sharded by key, each shard independently locked
//! - **Bounded min-heap Top-K** - `O(N log K)` selection with deterministic tie-breaks
//! - **Wall-time scheduler** - late ticks close every overdue window in one batch
//! - **Non-blocking emission** - a lossless queue and retrying worker sit between closing and the sink
//! - **Clean shutdown** - `stop()` flushes every open window before returning
//! - **Observability** - counters for late events, drops, and sink failures
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironrank::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! // 60s windows sliding every 5s, top 5 keys
//! let config = AggregatorConfig::sliding(60_000, 5_000).with_top_k(5);
//! let aggregator = Arc::new(Aggregator::new(config, Arc::new(LogSink))?);
//! aggregator.start().await?;
//!
//! let now = chrono::Utc::now().timestamp_millis();
//! aggregator.ingest(Event::new("item-1", now))?;
//! aggregator.ingest(Event::new("item-2", now).with_weight(3))?;
//!
//! aggregator.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Windows
//!
//! A [`WindowSpec`] fixes the window `size` and `slide`. A [`Window`] is one
//! concrete instance `[start, start + size)` with `start` a multiple of the
//! slide. [`WindowSpec::assign`] maps a timestamp to all instances containing
//! it.
//!
//! ### Lifecycle of a window
//!
//! Instances are created implicitly by the first event that targets them and
//! move `Open -> Closing -> Closed` ([`WindowState`]). Once closing begins the
//! instance is sealed in the [`WindowStore`]: later increments are dropped and
//! counted as late instead of mutating an emitted result.
//!
//! ### Top-K
//!
//! [`topk::select_top_k`] ranks by count descending and key ascending, so
//! output is reproducible. [`TopKAccumulator`] is mergeable, which lets large
//! windows be ranked in parallel (feature `parallel-select`).
//!
//! ### Sinks
//!
//! Implement [`SnapshotSink`] to receive one [`TopKSnapshot`] per closed
//! window. Built-in: [`LogSink`], [`ChannelSink`] and, with `io-jsonl`,
//! [`JsonlSink`].
//!
//! ## Feature Flags
//!
//! - `io-jsonl` - Enable the JSON Lines snapshot sink
//! - `parallel-select` - Rank very large windows on the rayon pool
//!
//! ## Module Overview
//!
//! - [`window`] - Window geometry and assignment
//! - [`store`] - Sharded per-key window counts
//! - [`topk`] - Bounded min-heap selection
//! - [`scheduler`] - Window closing state machine
//! - [`emitter`] - Asynchronous, retrying snapshot delivery
//! - [`aggregator`] - The public facade
//! - [`source`] - Line-protocol inbound adapter
//! - [`config`] / [`metrics`] / [`validation`] - Ambient concerns
//! - [`testing`] - Sinks, builders and assertions for tests

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod emitter;
pub mod error;
pub mod event;
pub mod metrics;
pub mod scheduler;
pub mod sink;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod testing;
pub mod topk;
pub mod validation;
pub mod window;

// General re-exports
pub use aggregator::{Aggregator, BatchReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregatorConfig, RetryConfig};
pub use error::{AggregatorError, Result};
pub use event::Event;
pub use scheduler::{TickReport, WindowScheduler, WindowState};
pub use sink::{ChannelSink, LogSink, SnapshotSink};
pub use snapshot::{RankedEntry, TopKSnapshot};
pub use source::{LineSource, SourceReport, parse_line};
pub use store::{IngestOutcome, WindowStore};
pub use topk::{TopKAccumulator, TopKSelector, select_top_k};
pub use validation::ValidationMode;
pub use window::{TimestampMs, Window, WindowSpec};

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use sink::JsonlSink;
