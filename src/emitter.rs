//! Asynchronous snapshot emission.
//!
//! The scheduler hands finished snapshots to an [`EmitQueue`] without ever
//! waiting on the sink. An [`EmitWorker`] drains the queue on the tokio
//! runtime and delivers each snapshot, retrying with exponential backoff.
//! A snapshot that still fails after `max_attempts` is logged and counted,
//! never re-queued: window state has already been evicted and stays correct
//! whether or not the sink is reachable.
//!
//! The queue itself never refuses a snapshot while it is open. `capacity` is
//! the backlog size above which a slow sink gets reported, not a limit: the
//! backlog is bounded by the number of windows that were holding state anyway.

use crate::config::RetryConfig;
use crate::error::{AggregatorError, Result};
use crate::metrics::AggregatorMetrics;
use crate::sink::SnapshotSink;
use crate::snapshot::TopKSnapshot;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Producer half: non-blocking hand-off of snapshots.
pub struct EmitQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<TopKSnapshot>>>,
    backlog: Arc<Backlog>,
    metrics: Arc<AggregatorMetrics>,
}

/// Consumer half: owns the sink and performs delivery.
pub struct EmitWorker {
    rx: mpsc::UnboundedReceiver<TopKSnapshot>,
    backlog: Arc<Backlog>,
    sink: Arc<dyn SnapshotSink>,
    retry: RetryConfig,
    metrics: Arc<AggregatorMetrics>,
}

// Snapshots queued but not yet picked up by the worker.
struct Backlog {
    depth: AtomicUsize,
    capacity: usize,
}

/// Build a queue feeding `sink` that warns once more than `capacity`
/// snapshots are waiting.
pub fn emit_channel(
    capacity: usize,
    sink: Arc<dyn SnapshotSink>,
    retry: RetryConfig,
    metrics: Arc<AggregatorMetrics>,
) -> (EmitQueue, EmitWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let backlog = Arc::new(Backlog {
        depth: AtomicUsize::new(0),
        capacity: capacity.max(1),
    });
    (
        EmitQueue {
            tx: Mutex::new(Some(tx)),
            backlog: Arc::clone(&backlog),
            metrics: Arc::clone(&metrics),
        },
        EmitWorker {
            rx,
            backlog,
            sink,
            retry,
            metrics,
        },
    )
}

impl EmitQueue {
    /// Queue `snapshot` for delivery. Returns `false` only if the queue has
    /// been closed, in which case the snapshot is dropped and counted.
    pub fn enqueue(&self, snapshot: TopKSnapshot) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            log::warn!(
                "Emit queue closed; dropping snapshot for window [{}, {})",
                snapshot.window_start,
                snapshot.window_end
            );
            self.metrics.snapshots_dropped.increment();
            return false;
        };
        let (start, end) = (snapshot.window_start, snapshot.window_end);
        let depth = self.backlog.depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.emit_backlog.set(depth as i64);
        if tx.send(snapshot).is_err() {
            let depth = self.backlog.depth.fetch_sub(1, Ordering::SeqCst) - 1;
            self.metrics.emit_backlog.set(depth as i64);
            log::warn!("Emit worker gone; dropping snapshot for window [{start}, {end})");
            self.metrics.snapshots_dropped.increment();
            return false;
        }
        if depth == self.backlog.capacity + 1 {
            log::warn!(
                "Emit backlog above {} snapshot(s); the sink is falling behind",
                self.backlog.capacity
            );
        }
        true
    }

    /// Snapshots queued and not yet taken by the worker.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.backlog.depth.load(Ordering::SeqCst)
    }

    /// Stop accepting snapshots. The worker finishes once it has drained
    /// everything already queued.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl EmitWorker {
    /// Deliver queued snapshots until the queue is closed and empty.
    pub async fn run(mut self) {
        log::debug!("Emit worker started (sink: {})", self.sink.name());
        while let Some(snapshot) = self.rx.recv().await {
            let depth = self.backlog.depth.fetch_sub(1, Ordering::SeqCst) - 1;
            self.metrics.emit_backlog.set(depth as i64);
            if let Err(err) = self.deliver(&snapshot).await {
                log::error!("{err}");
            }
        }
        log::debug!("Emit worker drained (sink: {})", self.sink.name());
    }

    async fn deliver(&self, snapshot: &TopKSnapshot) -> Result<()> {
        let mut attempt = 0;
        let mut delay_ms = self.retry.initial_delay_ms;

        loop {
            attempt += 1;
            match self.sink.deliver(snapshot).await {
                Ok(()) => {
                    self.metrics.snapshots_emitted.increment();
                    return Ok(());
                }
                Err(err) if attempt >= self.retry.max_attempts => {
                    self.metrics.sink_failures.increment();
                    return Err(AggregatorError::SinkUnavailable {
                        window: snapshot.window(),
                        attempts: attempt,
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    log::warn!(
                        "Sink {} failed for window [{}, {}) (attempt {attempt}/{}): {err}; retrying in {delay_ms}ms",
                        self.sink.name(),
                        snapshot.window_start,
                        snapshot.window_end,
                        self.retry.max_attempts
                    );
                    self.metrics.sink_retries.increment();
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = self.retry.next_delay_ms(delay_ms);
                }
            }
        }
    }
}
