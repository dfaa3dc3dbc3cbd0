//! Periodic check timing, driven with paused Tokio time.

use std::time::Duration;

use tokio::time::{self, Instant};
use vigil_safety::{CHECK_INTERVAL, SafetyMonitor, TrustLists};
use vigil_protocol::SafetyConfig;

fn monitor() -> SafetyMonitor {
    SafetyMonitor::new(SafetyConfig::default(), TrustLists::default())
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_check_fires_every_interval() {
    let mut m = monitor();
    let start = Instant::now();
    m.attach(20);

    m.wait_for_check().await;
    assert_eq!(start.elapsed(), CHECK_INTERVAL);

    m.wait_for_check().await;
    assert_eq!(start.elapsed(), CHECK_INTERVAL * 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_check_pends_while_detached() {
    let mut m = monitor();
    let waited =
        time::timeout(Duration::from_secs(60), m.wait_for_check()).await;
    assert!(waited.is_err(), "detached monitor must never fire");
}

#[tokio::test(start_paused = true)]
async fn test_detach_stops_periodic_check() {
    let mut m = monitor();
    m.attach(20);
    m.wait_for_check().await;
    m.detach();

    let waited =
        time::timeout(CHECK_INTERVAL * 3, m.wait_for_check()).await;
    assert!(waited.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_check_is_cancel_safe() {
    let mut m = monitor();
    let start = Instant::now();
    m.attach(20);

    // Abandon a wait halfway; the deadline must not move.
    let _ = time::timeout(CHECK_INTERVAL / 2, m.wait_for_check()).await;
    m.wait_for_check().await;
    assert_eq!(start.elapsed(), CHECK_INTERVAL);
}
