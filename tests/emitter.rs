//! Tests for snapshot emission, retry and the built-in sinks.

use ironrank::emitter::emit_channel;
use ironrank::metrics::AggregatorMetrics;
use ironrank::testing::*;
use ironrank::*;
use std::sync::Arc;
use std::time::Duration;

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 4,
        backoff_multiplier: 2.0,
    }
}

fn snapshot(start: TimestampMs, pairs: &[(&str, u64)]) -> TopKSnapshot {
    TopKSnapshot::new(
        Window::new(start, start + 10),
        pairs.iter().map(|&p| RankedEntry::from(p)).collect(),
    )
}

#[tokio::test]
async fn retries_until_sink_recovers() -> anyhow::Result<()> {
    let sink = Arc::new(FlakySink::new(2));
    let metrics = Arc::new(AggregatorMetrics::new());
    let (queue, worker) = emit_channel(8, sink.clone(), fast_retry(3), Arc::clone(&metrics));

    assert!(queue.enqueue(snapshot(0, &[("a", 1)])));
    queue.close();
    worker.run().await;

    assert_eq!(sink.attempts(), 3);
    assert_eq!(sink.inner.len(), 1);
    assert_eq!(metrics.sink_retries.get(), 2);
    assert_eq!(metrics.snapshots_emitted.get(), 1);
    assert_eq!(metrics.sink_failures.get(), 0);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_max_attempts_and_moves_on() -> anyhow::Result<()> {
    let sink = Arc::new(FlakySink::unavailable());
    let metrics = Arc::new(AggregatorMetrics::new());
    let (queue, worker) = emit_channel(8, sink.clone(), fast_retry(2), Arc::clone(&metrics));

    queue.enqueue(snapshot(0, &[("a", 1)]));
    queue.enqueue(snapshot(10, &[("b", 1)]));
    queue.close();
    worker.run().await;

    assert_eq!(sink.attempts(), 4);
    assert!(sink.inner.is_empty());
    assert_eq!(metrics.sink_failures.get(), 2);
    assert_eq!(metrics.snapshots_emitted.get(), 0);
    Ok(())
}

#[tokio::test]
async fn closed_queue_drops_snapshots() {
    let sink = Arc::new(MemorySink::new());
    let metrics = Arc::new(AggregatorMetrics::new());
    let (queue, _worker) = emit_channel(8, sink, RetryConfig::default(), Arc::clone(&metrics));

    assert!(!queue.is_closed());
    queue.close();
    assert!(queue.is_closed());
    assert!(!queue.enqueue(snapshot(0, &[])));
    assert_eq!(metrics.snapshots_dropped.get(), 1);
}

#[tokio::test]
async fn unavailable_sink_does_not_block_window_closing() -> anyhow::Result<()> {
    let sink = Arc::new(FlakySink::unavailable().with_delay(Duration::from_millis(20)));
    let clock = Arc::new(ManualClock::new(0));
    let mut config = AggregatorConfig::sliding(10, 10)
        .with_top_k(1)
        .with_retry(fast_retry(2));
    // Keep the background loop out of the way of the manual tick.
    config.tick_interval_ms = Some(60_000);
    let aggregator = Aggregator::with_clock(config, sink.clone(), clock.clone())?;
    aggregator.start().await?;

    for ts in [1, 11, 21] {
        aggregator.ingest(Event::new("a", ts))?;
    }
    clock.set(30);
    let report = aggregator.tick();
    assert_eq!(report.closed, 3);
    assert!(aggregator.open_windows().is_empty());

    aggregator.stop().await;
    assert_eq!(aggregator.metrics().sink_failures.get(), 3);
    assert_eq!(aggregator.metrics().windows_closed.get(), 3);
    Ok(())
}

#[test]
fn retry_delay_grows_and_caps() {
    let retry = RetryConfig::default();
    assert_eq!(retry.next_delay_ms(100), 200);
    assert_eq!(retry.next_delay_ms(2_000), 4_000);
    assert_eq!(retry.next_delay_ms(4_000), 5_000);
}

#[test]
fn log_sink_renders_one_line() {
    let line = LogSink::render(&snapshot(60_000, &[("a", 3), ("b", 1)]));
    assert_eq!(line, "top-k [60000, 60010): a=3, b=1");
    assert_eq!(
        LogSink::render(&snapshot(0, &[])),
        "top-k [0, 10): <empty>"
    );
}

#[tokio::test]
async fn channel_sink_forwards_snapshots() -> anyhow::Result<()> {
    let (sink, mut rx) = ChannelSink::new(4);
    let snap = snapshot(0, &[("a", 1)]);
    sink.deliver(&snap).await?;
    assert_eq!(rx.recv().await, Some(snap.clone()));

    drop(rx);
    assert!(sink.deliver(&snap).await.is_err());
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[tokio::test]
async fn jsonl_sink_writes_one_object_per_line() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("snapshots.jsonl");

    let sink = Arc::new(JsonlSink::create(&path)?);
    let clock = Arc::new(ManualClock::new(0));
    let aggregator = Aggregator::with_clock(
        AggregatorConfig::sliding(1_000, 1_000).with_top_k(2),
        sink,
        clock,
    )?;
    for key in ["x", "y", "x"] {
        aggregator.ingest(Event::new(key, 500))?;
    }
    aggregator.ingest(Event::new("z", 1_500))?;
    aggregator.stop().await;

    let written = std::fs::read_to_string(&path)?;
    let lines: Vec<TopKSnapshot> = written
        .lines()
        .map(serde_json::from_str)
        .collect::<serde_json::Result<_>>()?;
    assert_eq!(lines.len(), 2);
    assert_ranked(&lines[0], &[("x", 2), ("y", 1)]);
    assert_eq!(lines[1].window(), Window::new(1_000, 2_000));
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[tokio::test]
async fn jsonl_sink_into_inner() -> anyhow::Result<()> {
    let sink = JsonlSink::new(Vec::new());
    sink.deliver(&snapshot(0, &[("a", 1)])).await?;
    let bytes = sink.into_inner();
    let text = String::from_utf8(bytes)?;
    assert_eq!(
        text,
        "{\"window_start\":0,\"window_end\":10,\"entries\":[{\"key\":\"a\",\"count\":1}]}\n"
    );
    Ok(())
}
