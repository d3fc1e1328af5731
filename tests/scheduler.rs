mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use service_alerter::alerts::Direction;
use service_alerter::scan::{CycleReport, ScanScheduler};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use support::{FakeInventory, FakeMetrics, catalog, harness, rule};

const INTERVAL: Duration = Duration::from_secs(120);

fn scheduler_for(inventory: FakeInventory) -> (ScanScheduler, Arc<FakeInventory>) {
    let metrics = FakeMetrics::default().with_values("cpu", "inst-1", &[90.0]);
    let h = harness(
        0,
        inventory,
        metrics,
        catalog(vec![("postgres", vec![rule("cpu", "cpu", "80", Direction::Above)])]),
    );
    let inventory = h.inventory.clone();
    (
        ScanScheduler::new(Arc::new(h.orchestrator), INTERVAL),
        inventory,
    )
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_runs_after_one_interval() {
    let (scheduler, inventory) = scheduler_for(FakeInventory::new(1).with_instance("inst-1", "postgres"));
    let started = Instant::now();
    let handle = scheduler.start();
    let mut status = handle.status();

    tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(inventory.replica_calls.load(Ordering::SeqCst), 0);
    assert_eq!(status.borrow().cycles_completed, 0);

    status.changed().await.unwrap();
    assert!(started.elapsed() >= INTERVAL);

    let snapshot = status.borrow().clone();
    assert_eq!(snapshot.cycles_completed, 1);
    assert_eq!(snapshot.replica_count, Some(1));
    assert!(snapshot.last_cycle_at.is_some());
    assert!(matches!(
        snapshot.last_cycle,
        Some(CycleReport::Completed { ref stats, .. }) if stats.notifications_sent == 1
    ));

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cycles_repeat_each_interval() {
    let (scheduler, inventory) = scheduler_for(FakeInventory::new(1).with_instance("inst-1", "postgres"));
    let handle = scheduler.start();
    let mut status = handle.status();

    for expected in 1..=3 {
        status.changed().await.unwrap();
        assert_eq!(status.borrow().cycles_completed, expected);
    }
    assert_eq!(inventory.replica_calls.load(Ordering::SeqCst), 3);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_aborted_cycles_are_reported_and_loop_continues() {
    let mut inventory = FakeInventory::new(1).with_instance("inst-1", "postgres");
    inventory.fail_listing = true;
    let (scheduler, inventory) = scheduler_for(inventory);
    let handle = scheduler.start();
    let mut status = handle.status();

    status.changed().await.unwrap();
    status.changed().await.unwrap();

    let snapshot = status.borrow().clone();
    assert_eq!(snapshot.cycles_aborted, 2);
    assert_eq!(snapshot.cycles_completed, 0);
    assert_eq!(snapshot.replica_count, None);
    assert_eq!(inventory.listing_calls.load(Ordering::SeqCst), 2);

    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_further_cycles() {
    let (scheduler, inventory) = scheduler_for(FakeInventory::new(1).with_instance("inst-1", "postgres"));
    let handle = scheduler.start();
    let mut status = handle.status();

    status.changed().await.unwrap();
    handle.stop().await.unwrap();

    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(inventory.replica_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shared_token_stops_scheduler() {
    let (scheduler, inventory) = scheduler_for(FakeInventory::new(1).with_instance("inst-1", "postgres"));
    let shutdown = CancellationToken::new();
    let handle = scheduler.start_with_token(shutdown.clone());

    shutdown.cancel();
    handle.join().await.unwrap();

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(inventory.replica_calls.load(Ordering::SeqCst), 0);
}
