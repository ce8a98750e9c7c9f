//! End-to-end tests for the aggregator facade.

use ironrank::testing::*;
use ironrank::validation::ErrorCollector;
use ironrank::*;
use std::sync::Arc;
use std::time::Duration;

fn config(size: i64, slide: i64, k: usize) -> AggregatorConfig {
    AggregatorConfig::sliding(size, slide)
        .with_top_k(k)
        .with_shard_count(4)
}

#[tokio::test]
async fn top_two_with_key_tie_break() -> anyhow::Result<()> {
    // Tumbling 10s windows so every event lands in the same single window.
    let t = TestAggregator::new(config(10_000, 10_000, 2), 0)?;
    for key in ["a", "b", "a", "c", "a"] {
        t.ingest(Event::new(key, 2_000))?;
    }

    let report = t.tick_at(10_000);
    assert_eq!(report.closed, 1);
    t.stop().await;

    let snaps = t.sink.snapshots();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].window(), Window::new(0, 10_000));
    assert_ranked(&snaps[0], &[("a", 3), ("b", 1)]);
    Ok(())
}

#[tokio::test]
async fn stop_flushes_open_window() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(60_000, 60_000, 5), 1_000)?;
    t.ingest(Event::new("x", 1_000))?;
    t.ingest(Event::new("x", 1_500))?;

    let w = Window::new(0, 60_000);
    assert_eq!(t.window_state(&w), WindowState::Open);

    let report = t.stop().await;
    assert_eq!(report.closed, 1);

    // Delivered before stop() returned.
    let emitted = t.sink.for_window(&w);
    assert_eq!(emitted.len(), 1);
    assert_ranked(&emitted[0], &[("x", 2)]);
    assert_eq!(t.window_state(&w), WindowState::Closed);
    Ok(())
}

#[tokio::test]
async fn every_event_counts_in_each_overlapping_window() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(60_000, 5_000, 5), 100_000)?;
    t.ingest(Event::new("item", 100_000))?;

    let windows = t.windows_for(100_000);
    assert_eq!(windows.len(), 12);
    assert_eq!(t.open_windows(), windows);

    t.stop().await;
    let snaps = t.sink.snapshots();
    assert_eq!(snaps.len(), 12);
    for snap in &snaps {
        assert!(windows.contains(&snap.window()));
        assert_ranked(snap, &[("item", 1)]);
    }
    Ok(())
}

#[tokio::test]
async fn fixture_ranking_over_sliding_windows() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 5_000, 5), 20_000)?;
    t.ingest_batch(item_views(20_000), ValidationMode::FailFast, None)?;

    // [15000, 25000) and [20000, 30000) each hold the whole stream.
    t.stop().await;
    let snaps = t.sink.snapshots();
    assert_eq!(snaps.len(), 2);
    for snap in &snaps {
        assert_ranked(snap, &item_views_top5());
    }
    Ok(())
}

#[tokio::test]
async fn weights_are_summed() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(1_000, 1_000, 3), 0)?;
    let events = EventBuilder::at(100)
        .add_weighted("heavy", 10)
        .add_repeated("light", 3)
        .add("single")
        .build();
    for e in events {
        t.ingest(e)?;
    }
    t.stop().await;
    assert_ranked(
        &t.sink.snapshots()[0],
        &[("heavy", 10), ("light", 3), ("single", 1)],
    );
    Ok(())
}

#[tokio::test]
async fn invalid_events_are_rejected_before_the_store() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 5_000, 5).with_slack(1_000, 500), 50_000)?;

    let empty = t.ingest(Event::new("", 50_000)).unwrap_err();
    assert!(matches!(empty, AggregatorError::InvalidEvent(_)));

    let zero = t.ingest(Event::new("a", 50_000).with_weight(0)).unwrap_err();
    assert!(matches!(zero, AggregatorError::InvalidEvent(_)));

    match t.ingest(Event::new("a", 48_999)) {
        Err(AggregatorError::InvalidEvent(errors)) => {
            assert_eq!(errors[0].code.as_deref(), Some("too_old"));
        }
        other => panic!("expected too_old, got {other:?}"),
    }
    match t.ingest(Event::new("a", 50_501)) {
        Err(AggregatorError::InvalidEvent(errors)) => {
            assert_eq!(errors[0].code.as_deref(), Some("too_new"));
        }
        other => panic!("expected too_new, got {other:?}"),
    }

    // Slack bounds are inclusive.
    t.ingest(Event::new("a", 49_000))?;
    t.ingest(Event::new("a", 50_500))?;

    assert_eq!(t.metrics().events_rejected.get(), 4);
    assert_eq!(t.metrics().events_ingested.get(), 2);
    Ok(())
}

#[tokio::test]
async fn timestamps_with_unrepresentable_windows_are_rejected() -> anyhow::Result<()> {
    let t = TestAggregator::new(
        config(10_000, 5_000, 5).with_slack(TimestampMs::MAX, TimestampMs::MAX),
        0,
    )?;

    for ts in [TimestampMs::MAX - 1, TimestampMs::MIN + 1] {
        match t.ingest(Event::new("x", ts)) {
            Err(AggregatorError::InvalidEvent(errors)) => {
                assert_eq!(errors[0].field.as_deref(), Some("occurred_at"));
                assert_eq!(errors[0].code.as_deref(), Some("out_of_range"));
            }
            other => panic!("expected out_of_range for {ts}, got {other:?}"),
        }
        assert!(t.windows_for(ts).is_empty());
    }

    assert!(t.open_windows().is_empty());
    assert_eq!(t.metrics().events_rejected.get(), 2);
    assert_eq!(t.stop().await.closed, 0);
    Ok(())
}

#[tokio::test]
async fn stop_with_small_queue_emits_every_window() -> anyhow::Result<()> {
    let sink = Arc::new(FlakySink::new(0).with_delay(Duration::from_millis(50)));
    let clock = Arc::new(ManualClock::new(1_000));
    let mut config = config(60_000, 5_000, 5).with_emit_queue_capacity(4);
    config.tick_interval_ms = Some(60_000);
    let aggregator = Aggregator::with_clock(config, sink.clone(), clock)?;
    aggregator.start().await?;

    aggregator.ingest(Event::new("x", 1_000))?;
    let report = aggregator.stop().await;
    assert_eq!(report.closed, 12);
    assert_eq!(report.queued, 12);
    assert_eq!(report.dropped, 0);

    assert_eq!(sink.inner.len(), 12);
    for snap in sink.inner.snapshots() {
        assert_ranked(&snap, &[("x", 1)]);
    }
    assert_eq!(aggregator.metrics().snapshots_emitted.get(), 12);
    assert_eq!(aggregator.metrics().snapshots_dropped.get(), 0);
    assert_eq!(aggregator.metrics().emit_backlog.get(), 0);
    Ok(())
}

#[tokio::test]
async fn unstarted_stop_emits_more_windows_than_queue_capacity() -> anyhow::Result<()> {
    let t = TestAggregator::new(
        AggregatorConfig::sliding(10_000, 5_000).with_emit_queue_capacity(1),
        1_000,
    )?;
    t.ingest(Event::new("x", 1_000))?;
    t.ingest(Event::new("x", 1_000))?;

    let report = t.stop().await;
    assert_eq!(report.closed, 2);
    assert_eq!(report.dropped, 0);

    let snaps = t.sink.snapshots();
    assert_eq!(snaps.len(), 2);
    for snap in &snaps {
        assert_ranked(snap, &[("x", 2)]);
    }
    Ok(())
}

#[tokio::test]
async fn late_events_are_counted_not_applied() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 5_000, 5), 0)?;
    t.ingest(Event::new("a", 7_000))?;
    t.tick_at(10_000);

    // 7_000 belongs to [0,10000) (closed) and [5000,15000) (open).
    let outcome = t.ingest(Event::new("a", 7_000))?;
    assert_eq!(outcome, IngestOutcome { applied: 1, late: 1 });
    assert_eq!(t.metrics().late_events.get(), 1);
    assert_eq!(t.metrics().late_increments.get(), 1);

    t.stop().await;
    assert_ranked(&t.sink.for_window(&Window::new(0, 10_000))[0], &[("a", 1)]);
    assert_ranked(&t.sink.for_window(&Window::new(5_000, 15_000))[0], &[("a", 2)]);
    Ok(())
}

#[tokio::test]
async fn ingest_after_stop_is_rejected() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 5_000, 5), 0)?;
    t.stop().await;
    assert_eq!(
        t.ingest(Event::new("a", 0)).unwrap_err(),
        AggregatorError::ShuttingDown
    );
    Ok(())
}

#[tokio::test]
async fn lifecycle_start_stop() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 5_000, 5), 0)?;
    assert!(!t.is_running());

    t.start().await?;
    assert!(t.is_running());
    assert_eq!(t.start().await.unwrap_err(), AggregatorError::AlreadyStarted);

    t.ingest(Event::new("a", 1_000))?;
    let first = t.stop().await;
    assert_eq!(first.closed, 2);
    assert!(!t.is_running());

    // Second stop is a no-op.
    assert_eq!(t.stop().await, TickReport::default());
    assert_eq!(t.sink.len(), 2);

    assert_eq!(t.start().await.unwrap_err(), AggregatorError::AlreadyStarted);
    Ok(())
}

#[tokio::test]
async fn background_ticks_close_windows_off_the_runtime() -> anyhow::Result<()> {
    let mut cfg = config(10_000, 10_000, 5);
    cfg.tick_interval_ms = Some(10);
    let t = TestAggregator::new(cfg, 0)?;
    t.ingest(Event::new("a", 1_000))?;
    t.start().await?;

    // Only the background loop ticks from here.
    t.clock.set(10_000);
    assert!(t.sink.wait_for(1, Duration::from_secs(5)).await);

    assert_eq!(t.stop().await.closed, 0);
    assert_eq!(t.window_state(&Window::new(0, 10_000)), WindowState::Closed);
    assert_ranked(&t.sink.snapshots()[0], &[("a", 1)]);
    Ok(())
}

#[tokio::test]
async fn manual_ticks_before_start_are_delivered_on_start() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 10_000, 5), 0)?;
    t.ingest(Event::new("a", 1_000))?;
    assert_eq!(t.tick_at(10_000).queued, 1);
    assert!(t.sink.is_empty());

    t.start().await?;
    assert!(t.sink.wait_for(1, Duration::from_secs(5)).await);
    t.stop().await;
    assert_eq!(t.sink.len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_producers_lose_no_updates() -> anyhow::Result<()> {
    let t = Arc::new(TestAggregator::new(config(60_000, 60_000, 3), 0)?);
    let producers = 8;
    let per_producer = 500;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let t = Arc::clone(&t);
            tokio::task::spawn_blocking(move || -> Result<()> {
                for i in 0..per_producer {
                    let key = if i % 2 == 0 { "even" } else { "odd" };
                    t.ingest(Event::new(key, 1_000))?;
                }
                t.ingest(Event::new(format!("p{p}"), 1_000))?;
                Ok(())
            })
        })
        .collect();
    for h in handles {
        h.await??;
    }

    t.stop().await;
    let half = (producers * per_producer / 2) as u64;
    assert_ranked(&t.sink.snapshots()[0], &[("even", half), ("odd", half), ("p0", 1)]);
    Ok(())
}

#[tokio::test]
async fn stop_races_with_ingest_without_losing_accepted_events() -> anyhow::Result<()> {
    let t = Arc::new(TestAggregator::new(config(60_000, 60_000, 1), 0)?);
    t.ingest(Event::new("k", 1_000))?;

    let producer = {
        let t = Arc::clone(&t);
        tokio::task::spawn_blocking(move || {
            let mut applied = 0u64;
            let mut late = 0u64;
            loop {
                match t.ingest(Event::new("k", 1_000)) {
                    Ok(outcome) if outcome.has_late() => late += 1,
                    Ok(_) => applied += 1,
                    Err(AggregatorError::ShuttingDown) => break,
                    Err(err) => panic!("unexpected {err}"),
                }
                if applied + late > 1_000_000 {
                    break;
                }
            }
            (applied, late)
        })
    };

    tokio::time::sleep(Duration::from_millis(5)).await;
    t.stop().await;
    let (applied, _late) = producer.await?;

    // Every increment that was applied is in the one snapshot; late ones are not.
    let snaps = t.sink.snapshots();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].entries[0].count, applied + 1);
    Ok(())
}

#[tokio::test]
async fn batch_modes() -> anyhow::Result<()> {
    let t = TestAggregator::new(config(10_000, 10_000, 5), 0)?;
    let batch = || {
        vec![
            Event::new("a", 1_000),
            Event::new("", 1_000),
            Event::new("b", 1_000).with_weight(0),
            Event::new("c", 1_000),
        ]
    };

    let skipped = t.ingest_batch(batch(), ValidationMode::SkipInvalid, None)?;
    assert_eq!(skipped, BatchReport { accepted: 2, rejected: 2, late: 0 });

    let mut collector = ErrorCollector::new();
    let logged = t.ingest_batch(batch(), ValidationMode::LogAndContinue, Some(&mut collector))?;
    assert_eq!(logged.rejected, 2);
    assert_eq!(collector.error_count(), 2);
    assert_eq!(collector.errors()[0].record_id.as_deref(), Some("1:"));
    assert_eq!(collector.errors()[1].record_id.as_deref(), Some("2:b"));

    let failed = t.ingest_batch(batch(), ValidationMode::FailFast, None);
    assert!(matches!(failed, Err(AggregatorError::InvalidEvent(_))));

    t.stop().await;
    // "a" from three batches, "c" from two (fail-fast stopped before it).
    assert_ranked(&t.sink.snapshots()[0], &[("a", 3), ("c", 2)]);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let sink = Arc::new(MemorySink::new());
    let bad = AggregatorConfig::sliding(10_000, 3_000);
    assert!(matches!(
        Aggregator::new(bad, sink.clone()),
        Err(AggregatorError::InvalidConfig(_))
    ));
    let zero_k = AggregatorConfig::default().with_top_k(0);
    assert!(matches!(
        Aggregator::new(zero_k, sink),
        Err(AggregatorError::InvalidConfig(_))
    ));
}

#[mark_flaky_tests::flaky]
#[test]
fn wall_clock_tick_loop_closes_windows() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let sink = Arc::new(MemorySink::new());
        let config = AggregatorConfig::sliding(100, 50)
            .with_top_k(1)
            .with_slack(10_000, 10_000);
        let aggregator = Aggregator::new(config, sink.clone()).expect("valid config");
        aggregator.start().await.expect("first start");

        let now = aggregator.clock().now_ms();
        aggregator.ingest(Event::new("tick", now)).expect("fresh event");

        // Both windows holding `now` end within 100ms; the loop ticks every 50ms.
        assert!(sink.wait_for(2, Duration::from_secs(2)).await);
        assert_eq!(aggregator.stop().await.closed, 0);
        assert_eq!(sink.len(), 2);
    });
}
