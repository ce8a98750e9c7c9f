//! Window closing.
//!
//! Each window instance moves `Open -> Closing -> Closed` exactly once. On a
//! tick at `now` the scheduler seals every window with `end <= now` in the
//! store (no increment can land after that), ranks its counts, queues the
//! snapshot for emission and evicts the state. Decisions compare `now` with
//! window ends rather than counting ticks, so one late tick closes every
//! overdue window in a single batch.

use crate::emitter::EmitQueue;
use crate::metrics::AggregatorMetrics;
use crate::snapshot::TopKSnapshot;
use crate::store::WindowStore;
use crate::topk::TopKSelector;
use crate::window::{TimestampMs, Window};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Lifecycle of one window instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowState {
    /// Accepting increments.
    Open,
    /// Sealed; its snapshot is being produced.
    Closing,
    /// Snapshot queued and state evicted. Terminal.
    Closed,
}

/// What one tick (or the final flush) did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Windows transitioned to `Closed`.
    pub closed: usize,
    /// Snapshots handed to the emit queue.
    pub queued: usize,
    /// Snapshots refused because the emit queue was already closed.
    pub dropped: usize,
}

pub struct WindowScheduler {
    store: Arc<WindowStore>,
    selector: TopKSelector,
    queue: EmitQueue,
    metrics: Arc<AggregatorMetrics>,
    // Serializes ticks with each other and with the final flush.
    tick_lock: Mutex<()>,
    closing: RwLock<BTreeSet<Window>>,
    // Raised before the store is sealed, so a window that rejects increments
    // never reads as `Open`.
    sealing_through: AtomicI64,
    closed_through: AtomicI64,
}

impl WindowScheduler {
    pub fn new(
        store: Arc<WindowStore>,
        selector: TopKSelector,
        queue: EmitQueue,
        metrics: Arc<AggregatorMetrics>,
    ) -> Self {
        Self {
            store,
            selector,
            queue,
            metrics,
            tick_lock: Mutex::new(()),
            closing: RwLock::new(BTreeSet::new()),
            sealing_through: AtomicI64::new(TimestampMs::MIN),
            closed_through: AtomicI64::new(TimestampMs::MIN),
        }
    }

    /// Close every window whose end is at or before `now`.
    pub fn tick(&self, now: TimestampMs) -> TickReport {
        let _serial = self.tick_lock.lock();
        let report = self.close_through(now);
        if report.closed > 0 {
            log::debug!(
                "Tick at {now}: closed {} window(s), queued {}, dropped {}",
                report.closed,
                report.queued,
                report.dropped
            );
        }
        report
    }

    /// Close every remaining window regardless of its end time and stop
    /// accepting snapshots. Used on shutdown.
    pub fn flush_all(&self) -> TickReport {
        let _serial = self.tick_lock.lock();
        let report = self.close_through(TimestampMs::MAX);
        self.queue.close();
        report
    }

    fn close_through(&self, now: TimestampMs) -> TickReport {
        self.sealing_through.fetch_max(now, Ordering::SeqCst);
        let due = self.store.seal(now);
        self.closing.write().extend(due.iter().copied());
        self.closed_through.fetch_max(now, Ordering::SeqCst);

        let mut report = TickReport::default();
        // Windows are independent; oldest first is incidental, not a guarantee.
        for window in due {
            if self.close_window(window) {
                report.queued += 1;
            } else {
                report.dropped += 1;
            }
            report.closed += 1;
        }
        self.metrics.open_windows.set(self.store.windows().len() as i64);
        report
    }

    fn close_window(&self, window: Window) -> bool {
        let counts = self.store.snapshot(&window);
        let entries = self.selector.select(&counts);
        let snapshot = TopKSnapshot::new(window, entries);
        log::debug!(
            "Closing window [{}, {}) with {} key(s), emitting {}",
            window.start,
            window.end,
            counts.len(),
            snapshot.entries.len()
        );
        let queued = self.queue.enqueue(snapshot);
        self.store.evict(&window);
        self.closing.write().remove(&window);
        self.metrics.windows_closed.increment();
        queued
    }

    /// Current lifecycle state of `window`.
    #[must_use]
    pub fn state(&self, window: &Window) -> WindowState {
        if self.closing.read().contains(window) {
            WindowState::Closing
        } else if window.end <= self.closed_through.load(Ordering::SeqCst) {
            WindowState::Closed
        } else if window.end <= self.sealing_through.load(Ordering::SeqCst) {
            WindowState::Closing
        } else {
            WindowState::Open
        }
    }

    /// Latest `now` the scheduler has closed through.
    #[must_use]
    pub fn closed_through(&self) -> TimestampMs {
        self.closed_through.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn selector(&self) -> &TopKSelector {
        &self.selector
    }
}
