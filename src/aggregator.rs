//! The aggregator facade: validated ingestion plus the scheduler lifecycle.
//!
//! ```no_run
//! use ironrank::{Aggregator, AggregatorConfig, Event, LogSink};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let aggregator = Aggregator::new(AggregatorConfig::default(), Arc::new(LogSink))?;
//! aggregator.start().await?;
//!
//! let now = chrono::Utc::now().timestamp_millis();
//! aggregator.ingest(Event::new("item-42", now))?;
//!
//! // Closes and emits every open window before returning.
//! aggregator.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::AggregatorConfig;
use crate::emitter::{EmitWorker, emit_channel};
use crate::error::{AggregatorError, Result};
use crate::event::Event;
use crate::metrics::{AggregatorMetrics, MetricsCollector};
use crate::scheduler::{TickReport, WindowScheduler, WindowState};
use crate::sink::SnapshotSink;
use crate::store::{IngestOutcome, WindowStore};
use crate::topk::TopKSelector;
use crate::validation::{ErrorCollector, Validate, ValidationError, ValidationMode};
use crate::window::{SlidingWindows, TimestampMs, Window, WindowSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;
const STOPPED: u8 = 3;

/// Summary of [`Aggregator::ingest_batch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted events that hit at least one closed window.
    pub late: usize,
}

#[derive(Default)]
struct Lifecycle {
    worker: Option<EmitWorker>,
    tick_task: Option<JoinHandle<()>>,
    emit_task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Keyed sliding-window Top-K aggregator.
///
/// `ingest` is synchronous and safe to call from many threads at once (share
/// the aggregator behind an `Arc`). `start`/`stop` drive the tick loop and
/// the emitter on the current tokio runtime.
pub struct Aggregator {
    config: Arc<AggregatorConfig>,
    spec: WindowSpec,
    store: Arc<WindowStore>,
    scheduler: Arc<WindowScheduler>,
    clock: Arc<dyn Clock>,
    metrics: Arc<AggregatorMetrics>,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
}

impl Aggregator {
    /// Build an aggregator on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: AggregatorConfig, sink: Arc<dyn SnapshotSink>) -> Result<Self> {
        Self::with_clock(config, sink, Arc::new(SystemClock))
    }

    /// Build an aggregator on an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] if `config` fails validation.
    pub fn with_clock(
        config: AggregatorConfig,
        sink: Arc<dyn SnapshotSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let spec = config.window_spec()?;
        let metrics = Arc::new(AggregatorMetrics::new());
        let store = Arc::new(WindowStore::new(config.shard_count));
        let (queue, worker) = emit_channel(
            config.emit_queue_capacity,
            sink,
            config.retry,
            Arc::clone(&metrics),
        );
        let selector = TopKSelector::new(config.top_k, config.parallel_select_threshold);
        let scheduler = Arc::new(WindowScheduler::new(
            Arc::clone(&store),
            selector,
            queue,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config: Arc::new(config),
            spec,
            store,
            scheduler,
            clock,
            metrics,
            state: AtomicU8::new(IDLE),
            lifecycle: Mutex::new(Lifecycle {
                worker: Some(worker),
                ..Lifecycle::default()
            }),
        })
    }

    /// Count `event` in every window instance containing its timestamp.
    ///
    /// Windows that already closed are skipped and counted as late in the
    /// metrics; that is reported in the returned outcome, not as an error.
    ///
    /// # Errors
    ///
    /// - [`AggregatorError::InvalidEvent`] for an empty key, zero weight, or a
    ///   timestamp outside the configured slack around the clock's now, or one
    ///   whose windows would reach past the `i64` range.
    /// - [`AggregatorError::ShuttingDown`] once `stop()` has begun.
    pub fn ingest(&self, event: Event) -> Result<IngestOutcome> {
        if self.state.load(Ordering::Acquire) >= STOPPING {
            self.metrics.events_rejected.increment();
            return Err(AggregatorError::ShuttingDown);
        }
        let windows = match self.check(&event) {
            Ok(windows) => windows,
            Err(errors) => {
                self.metrics.events_rejected.increment();
                return Err(AggregatorError::InvalidEvent(errors));
            }
        };

        let outcome = self.store.increment_all(windows, &event.key, event.weight);
        self.metrics.events_ingested.increment();
        if outcome.has_late() {
            self.metrics.late_events.increment();
            self.metrics.late_increments.add(outcome.late as u64);
            log::debug!(
                "Late event for key {:?} at {}: {} closed window(s) skipped",
                event.key,
                event.occurred_at,
                outcome.late
            );
        }
        Ok(outcome)
    }

    fn check(&self, event: &Event) -> std::result::Result<SlidingWindows, Vec<ValidationError>> {
        event.validate()?;
        let now = self.clock.now_ms();
        let earliest = now.saturating_sub(self.config.max_past_slack_ms);
        let latest = now.saturating_add(self.config.max_future_slack_ms);
        if event.occurred_at < earliest {
            return Err(vec![
                ValidationError::field(
                    "occurred_at",
                    format!(
                        "{} is more than {}ms before now ({now})",
                        event.occurred_at, self.config.max_past_slack_ms
                    ),
                )
                .with_code("too_old"),
            ]);
        }
        if event.occurred_at > latest {
            return Err(vec![
                ValidationError::field(
                    "occurred_at",
                    format!(
                        "{} is more than {}ms after now ({now})",
                        event.occurred_at, self.config.max_future_slack_ms
                    ),
                )
                .with_code("too_new"),
            ]);
        }
        self.spec.try_assign(event.occurred_at).ok_or_else(|| {
            vec![
                ValidationError::field(
                    "occurred_at",
                    format!(
                        "{} has window bounds outside the timestamp range",
                        event.occurred_at
                    ),
                )
                .with_code("out_of_range"),
            ]
        })
    }

    /// Ingest many events, handling invalid ones according to `mode`.
    ///
    /// With [`ValidationMode::LogAndContinue`] rejections are added to
    /// `collector` when one is given, and logged otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first rejection under [`ValidationMode::FailFast`], and
    /// [`AggregatorError::ShuttingDown`] in every mode.
    pub fn ingest_batch<I>(
        &self,
        events: I,
        mode: ValidationMode,
        mut collector: Option<&mut ErrorCollector>,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut report = BatchReport::default();
        for (idx, event) in events.into_iter().enumerate() {
            let key = event.key.clone();
            match self.ingest(event) {
                Ok(outcome) => {
                    report.accepted += 1;
                    if outcome.has_late() {
                        report.late += 1;
                    }
                }
                Err(AggregatorError::InvalidEvent(errors)) => {
                    report.rejected += 1;
                    match mode {
                        ValidationMode::FailFast => {
                            return Err(AggregatorError::InvalidEvent(errors));
                        }
                        ValidationMode::SkipInvalid => {}
                        ValidationMode::LogAndContinue => {
                            let id = Some(format!("{idx}:{key}"));
                            match collector.as_deref_mut() {
                                Some(c) => c.add_error(id, errors),
                                None => log::warn!(
                                    "Rejected event #{idx} ({key:?}): {}",
                                    AggregatorError::InvalidEvent(errors)
                                ),
                            }
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Ok(report)
    }

    /// Close every window due at the clock's current time.
    ///
    /// The background loop started by [`start`](Self::start) calls this on
    /// every tick; it can also be driven by hand.
    pub fn tick(&self) -> TickReport {
        self.scheduler.tick(self.clock.now_ms())
    }

    /// Spawn the tick loop and the emitter on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::AlreadyStarted`] unless the aggregator is
    /// freshly built.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AggregatorError::AlreadyStarted);
        }

        if let Some(worker) = lifecycle.worker.take() {
            lifecycle.emit_task = Some(tokio::spawn(worker.run()));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.tick_task = Some(tokio::spawn(run_ticks(
            Arc::clone(&self.scheduler),
            Arc::clone(&self.clock),
            self.config.tick_interval(),
            shutdown_rx,
        )));

        log::info!(
            "Aggregator started: window {}ms / slide {}ms, top {}, {} shard(s), tick every {:?}",
            self.spec.size_ms(),
            self.spec.slide_ms(),
            self.config.top_k,
            self.store.shard_count(),
            self.config.tick_interval()
        );
        Ok(())
    }

    /// Stop ticking, close and emit every still-open window, and wait until
    /// the emitter has delivered (or given up on) every queued snapshot.
    ///
    /// Ingest calls racing with `stop` either land before their windows are
    /// sealed and are included, or are rejected. Calling `stop` again is a
    /// no-op that returns an empty report.
    pub async fn stop(&self) -> TickReport {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = self.state.swap(STOPPING, Ordering::AcqRel);
        if previous >= STOPPING {
            self.state.store(STOPPED, Ordering::Release);
            return TickReport::default();
        }

        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(tick_task) = lifecycle.tick_task.take() {
            if let Err(err) = tick_task.await {
                log::warn!("Tick loop ended abnormally: {err}");
            }
        }

        let report = self.scheduler.flush_all();

        if let Some(emit_task) = lifecycle.emit_task.take() {
            if let Err(err) = emit_task.await {
                log::warn!("Emit worker ended abnormally: {err}");
            }
        } else if let Some(worker) = lifecycle.worker.take() {
            // Never started: drain inline.
            worker.run().await;
        }

        self.state.store(STOPPED, Ordering::Release);
        log::info!(
            "Aggregator stopped: flushed {} window(s), {} snapshot(s) emitted in total",
            report.closed,
            self.metrics.snapshots_emitted.get()
        );
        report
    }

    /// Lifecycle state of one window instance.
    #[must_use]
    pub fn window_state(&self, window: &Window) -> WindowState {
        self.scheduler.state(window)
    }

    /// Window instances currently holding state, oldest first.
    #[must_use]
    pub fn open_windows(&self) -> Vec<Window> {
        self.store.windows()
    }

    /// The window instances an event at `ts` is counted in.
    #[must_use]
    pub fn windows_for(&self, ts: TimestampMs) -> Vec<Window> {
        self.spec.try_assign(ts).into_iter().flatten().collect()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    #[must_use]
    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn metrics(&self) -> &AggregatorMetrics {
        &self.metrics
    }

    /// The collector holding this aggregator's metrics, for reporting.
    #[must_use]
    pub fn metrics_collector(&self) -> &MetricsCollector {
        self.metrics.collector()
    }
}

async fn run_ticks(
    scheduler: Arc<WindowScheduler>,
    clock: Arc<dyn Clock>,
    period: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = timer.tick() => {
                // Ranking is CPU-bound (and may fan out to rayon).
                let scheduler = Arc::clone(&scheduler);
                let clock = Arc::clone(&clock);
                let ticked = tokio::task::spawn_blocking(move || scheduler.tick(clock.now_ms()));
                if let Err(err) = ticked.await {
                    log::error!("Tick failed: {err}");
                }
            }
        }
    }
    log::debug!("Tick loop stopped");
}
