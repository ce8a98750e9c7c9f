//! Outbound delivery of closed-window snapshots.
//!
//! A sink receives one [`TopKSnapshot`] per closed window, in the order the
//! emitter dequeues them. Delivery errors are retried by the emitter; the
//! window itself is already evicted by then.

use crate::snapshot::TopKSnapshot;
use async_trait::async_trait;
use std::fmt::Write as _;
use tokio::sync::mpsc;

/// Receiver of Top-K snapshots.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Deliver one snapshot.
    ///
    /// # Errors
    ///
    /// Any error is treated as transient and retried per the aggregator's
    /// `RetryConfig`.
    async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()>;

    /// Short name used in log lines.
    fn name(&self) -> &str {
        "sink"
    }
}

/// Logs one `info` line per snapshot, e.g.
/// `top-k [60000, 120000): a=3, b=1`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl LogSink {
    #[must_use]
    pub fn render(snapshot: &TopKSnapshot) -> String {
        let mut line = format!("top-k [{}, {}):", snapshot.window_start, snapshot.window_end);
        if snapshot.entries.is_empty() {
            line.push_str(" <empty>");
        }
        for (i, entry) in snapshot.entries.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            let _ = write!(line, "{sep}{}={}", entry.key, entry.count);
        }
        line
    }
}

#[async_trait]
impl SnapshotSink for LogSink {
    async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()> {
        log::info!("{}", Self::render(snapshot));
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Forwards snapshots into a tokio channel for in-process consumers.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<TopKSnapshot>,
}

impl ChannelSink {
    /// A sink plus the receiver that observes its output.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TopKSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SnapshotSink for ChannelSink {
    async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()> {
        self.tx
            .send(snapshot.clone())
            .await
            .map_err(|_| anyhow::anyhow!("snapshot receiver dropped"))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(feature = "io-jsonl")]
pub use jsonl::JsonlSink;

#[cfg(feature = "io-jsonl")]
mod jsonl {
    use super::SnapshotSink;
    use crate::snapshot::TopKSnapshot;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::Path;

    /// Writes each snapshot as one JSON object per line.
    pub struct JsonlSink<W: Write + Send> {
        writer: Mutex<W>,
    }

    impl<W: Write + Send> JsonlSink<W> {
        pub fn new(writer: W) -> Self {
            Self {
                writer: Mutex::new(writer),
            }
        }

        /// Recover the underlying writer.
        pub fn into_inner(self) -> W {
            self.writer.into_inner()
        }
    }

    impl JsonlSink<BufWriter<File>> {
        /// Create (or truncate) `path` and write snapshots to it.
        ///
        /// # Errors
        ///
        /// Returns an error if the file cannot be created.
        pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
            Ok(Self::new(BufWriter::new(File::create(path)?)))
        }
    }

    #[async_trait]
    impl<W: Write + Send> SnapshotSink for JsonlSink<W> {
        async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()> {
            let mut line = serde_json::to_vec(snapshot)?;
            line.push(b'\n');
            let mut writer = self.writer.lock();
            writer.write_all(&line)?;
            writer.flush()?;
            Ok(())
        }

        fn name(&self) -> &str {
            "jsonl"
        }
    }
}
