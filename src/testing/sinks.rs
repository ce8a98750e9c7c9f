//! In-memory sinks for tests.

use crate::sink::SnapshotSink;
use crate::snapshot::TopKSnapshot;
use crate::window::Window;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Records every delivered snapshot in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    snapshots: Mutex<Vec<TopKSnapshot>>,
    notify: Notify,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far.
    #[must_use]
    pub fn snapshots(&self) -> Vec<TopKSnapshot> {
        self.snapshots.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }

    /// Every snapshot delivered for `window` (more than one means a bug).
    #[must_use]
    pub fn for_window(&self, window: &Window) -> Vec<TopKSnapshot> {
        self.snapshots
            .lock()
            .iter()
            .filter(|s| s.window() == *window)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` snapshots arrived or `timeout` elapsed.
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let reached = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }

    fn record(&self, snapshot: &TopKSnapshot) {
        self.snapshots.lock().push(snapshot.clone());
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()> {
        self.record(snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Fails the first `failures` deliveries, then records like [`MemorySink`].
/// Optionally sleeps before every attempt to simulate a slow downstream.
#[derive(Debug, Default)]
pub struct FlakySink {
    remaining_failures: AtomicU32,
    attempts: AtomicU32,
    delay: Option<Duration>,
    pub inner: MemorySink,
}

impl FlakySink {
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    /// A sink that always fails.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(u32::MAX)
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delivery attempts seen, successful or not.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSink for FlakySink {
    async fn deliver(&self, snapshot: &TopKSnapshot) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("downstream unavailable");
        }
        self.inner.record(snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}
