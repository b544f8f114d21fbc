//! Integration tests for the interval scheduler.
//!
//! Every async test runs on a paused clock, so sleeps resolve as soon as
//! the runtime has nothing else to do.

use std::time::Duration;

use roomhub_tick::IntervalScheduler;
use tokio::time::Instant;

const SECOND: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_zero_period_is_disabled() {
    let s = IntervalScheduler::new(Duration::ZERO);
    assert!(s.is_disabled());
    assert_eq!(s.period(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_scheduler_never_fires() {
    let mut s = IntervalScheduler::new(Duration::ZERO);
    let result = tokio::time::timeout(Duration::from_secs(30), s.wait_for_tick()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_after_one_period() {
    let start = Instant::now();
    let mut s = IntervalScheduler::new(SECOND);

    assert_eq!(s.wait_for_tick().await, 1);
    assert_eq!(start.elapsed(), SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_keep_a_fixed_cadence() {
    let start = Instant::now();
    let mut s = IntervalScheduler::new(SECOND);
    for expected in 1..=4 {
        assert_eq!(s.wait_for_tick().await, expected);
    }
    assert_eq!(s.tick_count(), 4);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_missed_ticks_are_skipped_not_replayed() {
    let mut s = IntervalScheduler::new(SECOND);

    // Sleep past three deadlines before polling.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(s.wait_for_tick().await, 1);

    let before = Instant::now();
    assert_eq!(s.wait_for_tick().await, 2);
    assert_eq!(before.elapsed(), SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_tick_is_noop() {
    let mut s = IntervalScheduler::new(SECOND);
    s.record_tick_end();
    assert_eq!(s.tick_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_work_does_not_shift_next_tick() {
    let mut s = IntervalScheduler::new(SECOND);
    s.wait_for_tick().await;

    let tick_start = Instant::now();
    tokio::time::advance(Duration::from_millis(700)).await;
    s.record_tick_end();

    s.wait_for_tick().await;
    assert_eq!(tick_start.elapsed(), SECOND);
}

#[tokio::test(start_paused = true)]
async fn test_works_inside_select_loop() {
    let mut s = IntervalScheduler::new(Duration::from_millis(100));
    let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        let _ = tx.send(());
    });

    let mut sweeps = 0;
    loop {
        tokio::select! {
            _ = &mut rx => break,
            _ = s.wait_for_tick() => {
                sweeps += 1;
                s.record_tick_end();
            }
        }
    }
    assert_eq!(sweeps, 3);
}
