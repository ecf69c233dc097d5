//! Plane lifecycle integration tests: initialization gating, the breaker-
//! wrapped query surface, and bounded teardown.

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use planeguard::backend::ControlPlaneBackend;
use planeguard::{GovernancePlane, PlaneConfig, PlaneError};

use common::{instance, test_config, MockBackend};

fn fresh_plane() -> (Arc<MockBackend>, GovernancePlane) {
    planeguard::observability::logging::init();
    let backend = Arc::new(MockBackend::new());
    let plane = GovernancePlane::new(Arc::clone(&backend) as Arc<dyn ControlPlaneBackend>);
    (backend, plane)
}

#[tokio::test]
async fn surface_rejects_calls_before_initialization() {
    let (_backend, plane) = fresh_plane();

    assert!(matches!(
        plane.watch_service("orders").await,
        Err(PlaneError::NotInitialized)
    ));
    assert!(matches!(
        plane.get_service_instances("orders").await,
        Err(PlaneError::NotInitialized)
    ));
    assert!(matches!(
        plane.get_config_value("app.yaml", "default-group").await,
        Err(PlaneError::NotInitialized)
    ));
    assert!(matches!(plane.get_metrics(), Err(PlaneError::NotInitialized)));
    assert!(matches!(plane.check_health(), Err(PlaneError::NotInitialized)));
}

#[tokio::test]
async fn invalid_configuration_blocks_startup() {
    let (_backend, plane) = fresh_plane();
    let config = PlaneConfig {
        namespace: String::new(),
        ..test_config()
    };

    let err = plane.initialize(config).expect_err("must reject");
    match err {
        PlaneError::Configuration { field, .. } => assert_eq!(field, "namespace"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        plane.watch_service("orders").await,
        Err(PlaneError::NotInitialized)
    ));

    // A later valid configuration must still be accepted.
    plane.initialize(test_config()).expect("valid config");
    assert!(plane.check_health().is_ok());
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let (_backend, plane) = fresh_plane();
    plane.initialize(test_config()).expect("first");
    plane.initialize(test_config()).expect("second is a no-op");
    assert_eq!(plane.namespace(), "test-namespace");
}

#[tokio::test]
async fn query_surface_happy_path() {
    let (backend, plane) = fresh_plane();
    plane.initialize(test_config()).expect("initialize");
    backend.set_instances(vec![instance("a", true)]);

    let instances = plane.get_service_instances("orders").await.expect("query");
    assert_eq!(instances.len(), 1);

    let content = plane
        .get_config_value("app.yaml", "default-group")
        .await
        .expect("config");
    assert_eq!(content, "mock-content");

    let allowed = plane
        .check_rate_limit("orders", &HashMap::new())
        .await
        .expect("rate limit");
    assert!(allowed);

    backend.rate_limit_allow.store(false, Ordering::SeqCst);
    let allowed = plane
        .check_rate_limit("orders", &HashMap::new())
        .await
        .expect("rate limit");
    assert!(!allowed);

    let snapshot = plane.get_metrics().expect("metrics");
    assert!(snapshot.operations >= 4);
    assert_eq!(snapshot.operation_failures, 0);
}

#[tokio::test]
async fn open_breaker_rejects_without_calling_backend() {
    let (backend, plane) = fresh_plane();
    plane.initialize(test_config()).expect("initialize");
    backend.fail_queries.store(true, Ordering::SeqCst);

    // First failure trips the breaker at the default 50% threshold.
    assert!(matches!(
        plane.get_service_instances("orders").await,
        Err(PlaneError::Backend(_))
    ));
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 1);

    assert!(matches!(
        plane.get_service_instances("orders").await,
        Err(PlaneError::CircuitOpen)
    ));
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 1);

    assert!(matches!(plane.check_health(), Err(PlaneError::CircuitOpen)));
    assert!(matches!(
        plane.check_rate_limit("orders", &HashMap::new()).await,
        Err(PlaneError::CircuitOpen)
    ));
}

#[tokio::test]
async fn open_breaker_serves_cached_snapshot_when_present() {
    let (backend, plane) = fresh_plane();
    plane.initialize(test_config()).expect("initialize");
    backend.set_instances(vec![instance("cached", true)]);

    // Successful query seeds the cache.
    plane.get_service_instances("orders").await.expect("seed");

    // One failure brings the ratio to 0.5 and opens the breaker.
    backend.fail_queries.store(true, Ordering::SeqCst);
    assert!(matches!(
        plane.get_service_instances("orders").await,
        Err(PlaneError::Backend(_))
    ));
    assert!(matches!(plane.check_health(), Err(PlaneError::CircuitOpen)));

    // Rejected live call falls back to the snapshot without touching the
    // backend.
    let served = plane
        .get_service_instances("orders")
        .await
        .expect("cache fallback");
    assert_eq!(served[0].id, "cached");
    assert_eq!(backend.query_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_is_bounded_with_a_hanging_backend() {
    let (backend, plane) = fresh_plane();
    plane.initialize(test_config()).expect("initialize");
    let watcher = plane.watch_service("orders").await.expect("watch");
    backend.hang_close.store(true, Ordering::SeqCst);

    let started = Instant::now();
    plane.cleanup_tasks().await.expect("cleanup");
    let elapsed = started.elapsed();

    // The 1s configured timeout bounds backend teardown.
    assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(!watcher.is_running());
    assert_eq!(backend.close_calls.load(Ordering::SeqCst), 1);

    // The plane stays dead afterwards.
    assert!(matches!(
        plane.watch_service("orders").await,
        Err(PlaneError::Destroyed)
    ));
    assert!(matches!(
        plane.get_service_instances("orders").await,
        Err(PlaneError::Destroyed)
    ));
    assert!(matches!(
        plane.initialize(test_config()),
        Err(PlaneError::Destroyed)
    ));
    assert_eq!(plane.namespace(), "default");
}

#[tokio::test]
async fn cleanup_is_idempotent_and_skips_uninitialized_planes() {
    let (backend, plane) = fresh_plane();

    // Before initialization, cleanup is a no-op.
    plane.cleanup_tasks().await.expect("noop cleanup");
    assert_eq!(backend.close_calls.load(Ordering::SeqCst), 0);

    plane.initialize(test_config()).expect("initialize");
    plane.cleanup_tasks().await.expect("first cleanup");

    let started = Instant::now();
    plane.cleanup_tasks().await.expect("second cleanup");
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(backend.close_calls.load(Ordering::SeqCst), 1);
}
