// tests/clock.rs
use ironrank::testing::*;
use ironrank::*;

#[test]
fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    assert_eq!(clock.advance(500), 1_500);
    assert_eq!(clock.now_ms(), 1_500);
    clock.set(10);
    assert_eq!(clock.now_ms(), 10);
}

#[test]
fn system_clock_is_close_to_chrono_now() {
    let before = chrono::Utc::now().timestamp_millis();
    let now = SystemClock.now_ms();
    let after = chrono::Utc::now().timestamp_millis();
    assert!(before <= now && now <= after);
}

#[tokio::test]
async fn advancing_the_clock_closes_windows_one_slide_at_a_time() -> anyhow::Result<()> {
    let t = TestAggregator::new(AggregatorConfig::sliding(10_000, 5_000).with_top_k(3), 0)?;
    let events = EventBuilder::at(1_000)
        .add_keys(&["a", "b"])
        .then_at(6_000)
        .add_keys(&["b", "c"])
        .build();
    t.ingest_batch(events, ValidationMode::FailFast, None)?;

    // Windows: [-5000,5000) [0,10000) [5000,15000)
    let mut closed = Vec::new();
    for _ in 0..3 {
        t.clock.advance(5_000);
        closed.push(t.tick().closed);
    }
    assert_eq!(closed, vec![1, 1, 1]);
    assert!(t.open_windows().is_empty());

    t.stop().await;
    let snaps = t.sink.snapshots();
    assert_ranked(&snaps[0], &[("a", 1), ("b", 1)]);
    assert_ranked(&snaps[1], &[("b", 2), ("a", 1), ("c", 1)]);
    assert_ranked(&snaps[2], &[("b", 1), ("c", 1)]);
    Ok(())
}
