//! Integration tests for the connection supervisor (connect, retry, stream, stop).

mod common;

use std::sync::Arc;
use std::time::Duration;

use bindwatch::{
    ConnectionState, Container, ContainerID, ForwarderError, ForwarderOptions, LifecycleEvent,
    WatchForwarder,
};
use common::{FakeConnector, FakeRuntime, RecordingExecutor, eventually};

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn start(connector: &Arc<FakeConnector>) -> WatchForwarder {
    WatchForwarder::start_with(
        ForwarderOptions::default(),
        connector.clone(),
        RecordingExecutor::new(),
    )
    .unwrap()
}

async fn wait_for_state(forwarder: &WatchForwarder, expected: ConnectionState) {
    let mut state = forwarder.subscribe_state();
    tokio::time::timeout(Duration::from_secs(60), state.wait_for(|s| *s == expected))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}

// ============================================================================
// CONNECTING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unreachable_runtime_is_retried_every_three_seconds() {
    let connector = FakeConnector::new();
    let forwarder = start(&connector);

    tokio::time::sleep(Duration::from_millis(9_500)).await;

    let times = connector.attempt_times();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(3));
    }
    assert!(!forwarder.state().is_stopped());

    forwarder.stop().await.unwrap();
    assert_eq!(forwarder.state(), ConnectionState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_connect_is_fatal() {
    let connector = FakeConnector::new();
    connector.push_failure(ForwarderError::Unauthorized("permission denied".into()));
    let forwarder = start(&connector);

    tokio::time::timeout(Duration::from_secs(60), forwarder.stopped())
        .await
        .unwrap();

    let err = forwarder.stop().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_discovery_is_fatal() {
    let runtime = FakeRuntime::new();
    runtime.fail_listing(ForwarderError::Unauthorized("403 forbidden".into()));
    let connector = FakeConnector::new();
    connector.push_runtime(runtime);
    let forwarder = start(&connector);

    forwarder.stopped().await;
    assert!(forwarder.stop().await.unwrap_err().is_unauthorized());
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_backs_off_then_recovers() {
    let flaky = FakeRuntime::new();
    flaky.fail_listing(ForwarderError::Connection("connection reset".into()));
    let healthy = FakeRuntime::new();

    let connector = FakeConnector::new();
    connector.push_runtime(flaky);
    connector.push_runtime(healthy);
    let forwarder = start(&connector);

    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    let times = connector.attempt_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(3));

    forwarder.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_returns_promptly() {
    let connector = FakeConnector::new();
    let forwarder = start(&connector);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let began = tokio::time::Instant::now();
    forwarder.stop().await.unwrap();

    assert!(began.elapsed() < Duration::from_secs(3));
    assert_eq!(connector.attempts(), 1);
}

// ============================================================================
// STREAMING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn lifecycle_events_reach_the_registry() {
    let runtime = FakeRuntime::new();
    let connector = FakeConnector::new();
    connector.push_runtime(runtime.clone());
    let forwarder = start(&connector);
    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    runtime.put_container(Container::new("c2", "worker", vec![]));
    runtime.emit(LifecycleEvent::Started {
        id: ContainerID::new("c2"),
    });

    let inspected = eventually(Duration::from_secs(5), || {
        runtime.inspections() == vec![ContainerID::new("c2")]
    })
    .await;
    assert!(inspected);

    forwarder.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stream_end_triggers_reconnect() {
    let first = FakeRuntime::new();
    let second = FakeRuntime::new();
    let connector = FakeConnector::new();
    connector.push_runtime(first.clone());
    connector.push_runtime(second.clone());
    let forwarder = start(&connector);
    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    first.end_stream();

    let reconnected = eventually(Duration::from_secs(5), || connector.attempts() == 2).await;
    assert!(reconnected);
    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    forwarder.stop().await.unwrap();
    assert!(second.stream_released());
}

#[tokio::test(start_paused = true)]
async fn stream_error_triggers_reconnect() {
    let first = FakeRuntime::new();
    let connector = FakeConnector::new();
    connector.push_runtime(first.clone());
    connector.push_runtime(FakeRuntime::new());
    let forwarder = start(&connector);
    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    first.emit_error(ForwarderError::Connection("EOF".into()));

    let reconnected = eventually(Duration::from_secs(5), || connector.attempts() == 2).await;
    assert!(reconnected);

    forwarder.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_while_streaming_releases_the_stream() {
    let runtime = FakeRuntime::new();
    let connector = FakeConnector::new();
    connector.push_runtime(runtime.clone());
    let forwarder = start(&connector);
    wait_for_state(&forwarder, ConnectionState::Streaming).await;

    forwarder.stop().await.unwrap();

    assert_eq!(forwarder.state(), ConnectionState::Stopped);
    assert!(runtime.stream_released());
    assert_eq!(connector.attempts(), 1);

    // Second stop is a no-op.
    forwarder.stop().await.unwrap();
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let options = ForwarderOptions {
        retry_interval_ms: 0,
        ..Default::default()
    };
    let result = WatchForwarder::start_with(options, FakeConnector::new(), RecordingExecutor::new());
    assert!(matches!(result, Err(ForwarderError::Config(_))));
}
