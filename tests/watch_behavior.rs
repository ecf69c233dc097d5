//! Watch-path integration tests: subscription dedup, the change pipeline,
//! degradation, and the background re-subscribe loop.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use planeguard::backend::{ChangePayload, ControlPlaneBackend};
use planeguard::{GovernancePlane, PlaneConfig, WatchKey};

use common::{instance, test_config, MockBackend};

async fn started_plane(config: PlaneConfig) -> (Arc<MockBackend>, GovernancePlane) {
    planeguard::observability::logging::init();
    let backend = Arc::new(MockBackend::new());
    let plane = GovernancePlane::new(Arc::clone(&backend) as Arc<dyn ControlPlaneBackend>);
    plane.initialize(config).expect("initialize");
    (backend, plane)
}

#[tokio::test]
async fn concurrent_watch_calls_share_one_subscription() {
    let (backend, plane) = started_plane(test_config()).await;

    let (first, second) = tokio::join!(plane.watch_service("orders"), plane.watch_service("orders"));
    let first = first.expect("first watch");
    let second = second.expect("second watch");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_running());
    assert_eq!(backend.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn service_change_reaches_cache_and_callback() {
    let (backend, plane) = started_plane(test_config()).await;
    let watcher = plane.watch_service("orders").await.expect("watch");

    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set_on_instances_changed(Box::new(move |instances| {
        let _ = tx.send(instances.to_vec());
    }));

    let key = WatchKey::service("orders");
    backend
        .inject_change(
            &key,
            ChangePayload::Instances(vec![instance("a", true), instance("b", false)]),
        )
        .await;

    let seen = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("callback within deadline")
        .expect("callback delivered");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].id, "a");

    let snapshot = plane.get_metrics().expect("metrics");
    assert!(snapshot.watch_events >= 1);
}

#[tokio::test]
async fn degraded_service_serves_cache_until_clean_change() {
    let (backend, plane) = started_plane(test_config()).await;
    let watcher = plane.watch_service("orders").await.expect("watch");

    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set_on_instances_changed(Box::new(move |instances| {
        let _ = tx.send(instances.to_vec());
    }));

    // Seed the cache through a change event.
    let key = WatchKey::service("orders");
    backend
        .inject_change(&key, ChangePayload::Instances(vec![instance("cached", true)]))
        .await;
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("seed change")
        .expect("seed delivered");

    // Degrade the key; live queries must not be attempted while degraded.
    backend.fail_queries.store(true, Ordering::SeqCst);
    backend.inject_error(&key, "stream broke").await;
    sleep(Duration::from_millis(50)).await;

    let served = plane
        .get_service_instances("orders")
        .await
        .expect("degraded read");
    assert_eq!(served.len(), 1);
    assert_eq!(served[0].id, "cached");
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 0);

    // The retry loop re-subscribes; a clean change clears degradation and
    // later reads go live again.
    sleep(Duration::from_millis(200)).await;
    backend
        .inject_change(&key, ChangePayload::Instances(vec![instance("fresh", true)]))
        .await;
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("clean change")
        .expect("clean change delivered");

    backend.fail_queries.store(false, Ordering::SeqCst);
    backend.set_instances(vec![instance("live", true)]);
    let live = plane
        .get_service_instances("orders")
        .await
        .expect("live read");
    assert_eq!(live[0].id, "live");
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn error_burst_spawns_exactly_one_retry_loop() {
    let (backend, plane) = started_plane(test_config()).await;
    plane.watch_service("orders").await.expect("watch");

    backend.fail_subscribe.store(true, Ordering::SeqCst);
    let key = WatchKey::service("orders");
    backend.inject_error(&key, "first failure").await;
    backend.inject_error(&key, "second failure").await;

    // With two retry attempts at ~10ms base delay the loop exhausts well
    // inside this window.
    sleep(Duration::from_millis(300)).await;

    // One initial subscribe plus the attempts of a single loop.
    assert_eq!(backend.subscribe_calls.load(Ordering::SeqCst), 3);
    let snapshot = plane.get_metrics().expect("metrics");
    assert_eq!(snapshot.retry_loops, 1);
    assert_eq!(snapshot.watch_errors, 2);
}

#[tokio::test]
async fn stop_cancels_pending_retry_loop() {
    let mut config = test_config();
    config.retry_base_delay_ms = 200;
    config.retry_max_delay_ms = 400;
    let (backend, plane) = started_plane(config).await;
    let watcher = plane.watch_service("orders").await.expect("watch");

    backend.fail_subscribe.store(true, Ordering::SeqCst);
    backend
        .inject_error(&WatchKey::service("orders"), "stream broke")
        .await;
    sleep(Duration::from_millis(50)).await;

    // Stop before the first backoff elapses; no re-subscribe may happen.
    watcher.stop();
    sleep(Duration::from_millis(500)).await;

    assert!(!watcher.is_running());
    assert_eq!(backend.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn config_change_and_degraded_read() {
    let (backend, plane) = started_plane(test_config()).await;
    let watcher = plane
        .watch_config("app.yaml", "default-group")
        .await
        .expect("watch config");

    let (tx, mut rx) = mpsc::unbounded_channel();
    watcher.set_on_config_changed(Box::new(move |config| {
        let _ = tx.send(config.clone());
    }));

    let key = WatchKey::config("app.yaml", "default-group", "test-namespace");
    backend
        .inject_change(
            &key,
            ChangePayload::Config(planeguard::ConfigFile {
                file: "app.yaml".to_string(),
                group: "default-group".to_string(),
                content: "threads: 8".to_string(),
            }),
        )
        .await;

    let seen = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("callback within deadline")
        .expect("callback delivered");
    assert_eq!(seen.content, "threads: 8");

    // Degrade and read the cached snapshot without touching the backend.
    backend.fail_queries.store(true, Ordering::SeqCst);
    backend.fail_subscribe.store(true, Ordering::SeqCst);
    backend.inject_error(&key, "stream broke").await;
    sleep(Duration::from_millis(50)).await;

    let content = plane
        .get_config_value("app.yaml", "default-group")
        .await
        .expect("degraded read");
    assert_eq!(content, "threads: 8");
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 0);
}
