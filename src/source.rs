//! Line-oriented inbound adapter.
//!
//! Each non-blank line is one occurrence, stamped with the aggregator's clock
//! on arrival:
//!
//! ```text
//! item-42          weight 1
//! item-42\t3       weight 3
//! item-42,3        weight 3
//! ```
//!
//! A trailing `\t<n>` or `,<n>` is only read as a weight when `<n>` parses as
//! an unsigned integer; otherwise the whole line is the key.

use crate::aggregator::Aggregator;
use crate::error::AggregatorError;
use crate::event::Event;
use crate::window::TimestampMs;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Parse one line into an event at `occurred_at`. Blank lines yield `None`.
#[must_use]
pub fn parse_line(line: &str, occurred_at: TimestampMs) -> Option<Event> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(idx) = line.rfind(['\t', ',']) {
        let (key, weight) = (line[..idx].trim_end(), line[idx + 1..].trim());
        if let Ok(weight) = weight.parse::<u64>() {
            return Some(Event::new(key, occurred_at).with_weight(weight));
        }
    }
    Some(Event::new(line, occurred_at))
}

/// Counters for one [`LineSource::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub lines: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Feeds lines from any async reader into an aggregator.
#[derive(Clone)]
pub struct LineSource {
    aggregator: Arc<Aggregator>,
}

impl LineSource {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    /// Read until EOF or until the aggregator shuts down. Invalid lines are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading from `reader` fails.
    pub async fn run<R>(&self, reader: R) -> anyhow::Result<SourceReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut report = SourceReport::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            report.lines += 1;
            let Some(event) = parse_line(&line, self.aggregator.clock().now_ms()) else {
                continue;
            };
            match self.aggregator.ingest(event) {
                Ok(_) => report.accepted += 1,
                Err(AggregatorError::ShuttingDown) => {
                    log::info!("Aggregator shutting down; closing line source");
                    break;
                }
                Err(err) => {
                    report.rejected += 1;
                    log::warn!("Skipping line {}: {err}", report.lines);
                }
            }
        }
        Ok(report)
    }
}
