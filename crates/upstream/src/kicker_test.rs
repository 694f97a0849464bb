//! Tests for the coalescing kicker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::*;

fn counting_kicker(runs: Arc<AtomicU64>, work: Duration) -> Arc<Kicker> {
    Kicker::new(move || {
        let runs = Arc::clone(&runs);
        async move {
            sleep(work).await;
            runs.fetch_add(1, Ordering::SeqCst);
        }
    })
}

#[tokio::test]
async fn test_burst_of_kicks_coalesces_to_two_runs() {
    let runs = Arc::new(AtomicU64::new(0));
    let kicker = counting_kicker(Arc::clone(&runs), Duration::from_millis(100));

    let mut observed = 0;
    for _ in 0..20 {
        observed = kicker.kick();
    }
    assert_eq!(observed, 0);

    // The in-flight run plus exactly one coalesced follow-up.
    kicker.wait(1).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(kicker.generation(), 2);

    // No third run sneaks in afterwards.
    sleep(Duration::from_millis(250)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(kicker.generation(), 2);
}

#[tokio::test]
async fn test_kick_after_idle_runs_again() {
    let runs = Arc::new(AtomicU64::new(0));
    let kicker = counting_kicker(Arc::clone(&runs), Duration::from_millis(5));

    let observed = kicker.kick();
    kicker.wait(observed).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let observed = kicker.kick();
    kicker.wait(observed).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_wait_with_past_generation_returns_immediately() {
    let runs = Arc::new(AtomicU64::new(0));
    let kicker = counting_kicker(Arc::clone(&runs), Duration::from_millis(5));

    let observed = kicker.kick();
    kicker.wait(observed).await;

    // Generation is already past zero; this must not block.
    tokio::time::timeout(Duration::from_millis(50), kicker.wait(0))
        .await
        .expect("wait(0) should resolve immediately");
}

#[tokio::test]
async fn test_kick_during_run_is_not_lost() {
    let runs = Arc::new(AtomicU64::new(0));
    let kicker = counting_kicker(Arc::clone(&runs), Duration::from_millis(50));

    kicker.kick();
    sleep(Duration::from_millis(10)).await;

    // The worker is mid-run; this kick must schedule a follow-up.
    let observed = kicker.kick();
    assert_eq!(observed, 0);

    kicker.wait(observed).await;
    assert!(kicker.generation() >= 1);

    kicker.wait(1).await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
