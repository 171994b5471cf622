//! End-to-end scenarios against the in-process mock gateway.
//!
//! Each test builds a `GatewaySession` over `MockGateway`, so the whole stack
//! runs (writer task, receive loop, transaction registry, state machine,
//! orchestrator) without a socket.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use janus_client::application::ports::{SessionObserver, StatusUpdate};
use janus_client::application::{GatewayError, GatewaySession, SnapshotOrchestrator};
use janus_client::infrastructure::capture_backend::StaticCaptureBackend;
use janus_client::infrastructure::storage::MemorySnapshotStore;
use janus_client::infrastructure::transport::mock::{MockGateway, MockGatewayConfig};
use janus_core::protocol::{EventKind, GatewayEvent};
use janus_core::{ConnectionState, GatewayEndpoint, SessionConfig, SourceId};
use serde_json::json;

// ── Helpers ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    statuses: Mutex<Vec<StatusUpdate>>,
    events: Mutex<Vec<GatewayEvent>>,
}

impl Recorder {
    fn messages(&self) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.message.clone())
            .collect()
    }
}

impl SessionObserver for Recorder {
    fn on_status(&self, update: StatusUpdate) {
        self.statuses.lock().unwrap().push(update);
    }

    fn on_event(&self, event: GatewayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        control_timeout: Duration::from_millis(500),
        capture_timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_millis(500),
        keepalive_interval: None,
        ..SessionConfig::default()
    }
}

fn two_cameras() -> MockGatewayConfig {
    MockGatewayConfig {
        streams: vec![(1, Some("Bow".into())), (2, Some("Stern".into()))],
        ..MockGatewayConfig::default()
    }
}

fn endpoint() -> GatewayEndpoint {
    GatewayEndpoint::new("gw.test", 8188)
}

fn session_with(
    gateway: &MockGateway,
    config: SessionConfig,
) -> (Arc<GatewaySession>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let session = Arc::new(GatewaySession::with_observer(
        config,
        Arc::new(gateway.clone()),
        Some(recorder.clone() as Arc<dyn SessionObserver>),
    ));
    (session, recorder)
}

fn orchestrator(session: &Arc<GatewaySession>) -> (SnapshotOrchestrator, Arc<MemorySnapshotStore>) {
    let store = Arc::new(MemorySnapshotStore::new());
    let orchestrator = SnapshotOrchestrator::new(
        Arc::clone(session),
        Arc::new(StaticCaptureBackend::new(vec![0xFF, 0xD8, 0xFF])),
        store.clone(),
    );
    (orchestrator, store)
}

async fn wait_for_state(session: &GatewaySession, wanted: ConnectionState) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while session.state() != wanted {
        assert!(
            Instant::now() < deadline,
            "still {} while waiting for {wanted}",
            session.state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn watch_count(gateway: &MockGateway) -> usize {
    gateway
        .requests()
        .iter()
        .filter(|r| r["body"]["request"] == "watch")
        .count()
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_discovers_sources_and_reports_progress() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        streams: vec![(1, Some("Bow".into())), (2, None)],
        ..MockGatewayConfig::default()
    });
    let (session, recorder) = session_with(&gateway, fast_config());

    // Act
    let sources = session.connect(&endpoint(), true).await.unwrap();

    // Assert
    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].name, "Camera 2");
    assert!(session.session_id().is_some());
    assert_eq!(
        recorder.messages(),
        vec!["Connecting...", "Session created", "Discovered 2 streams", "Connected"]
    );
    assert_eq!(gateway.verbs(), vec!["create", "attach", "message"]);
}

#[tokio::test]
async fn test_refused_tls_retries_plain_once() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        refuse_secure: true,
        ..two_cameras()
    });
    let (session, recorder) = session_with(&gateway, fast_config());

    // Act
    let result = session.connect(&endpoint(), true).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(gateway.open_attempts(), vec![true, false]);
    assert!(recorder
        .messages()
        .contains(&"Retrying without SSL...".to_string()));
}

#[tokio::test]
async fn test_second_open_failure_is_final() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        refuse_secure: true,
        refuse_plain: true,
        ..two_cameras()
    });
    let (session, recorder) = session_with(&gateway, fast_config());

    // Act
    let err = session.connect(&endpoint(), true).await.unwrap_err();

    // Assert
    assert!(err.is_transport());
    assert_eq!(gateway.open_attempts(), vec![true, false]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    let last = recorder.messages().pop().unwrap();
    assert!(last.starts_with("Connection failed:"), "got {last}");
}

#[tokio::test]
async fn test_plain_connect_never_tries_tls() {
    let gateway = MockGateway::new(MockGatewayConfig {
        refuse_plain: true,
        ..two_cameras()
    });
    let (session, _) = session_with(&gateway, fast_config());

    let err = session.connect(&endpoint(), false).await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(gateway.open_attempts(), vec![false]);
}

#[tokio::test]
async fn test_rejected_create_leaves_nothing_behind() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        reject_create: Some((403, "Unauthorized request".into())),
        ..two_cameras()
    });
    let (session, _) = session_with(&gateway, fast_config());

    // Act
    let err = session.connect(&endpoint(), false).await.unwrap_err();

    // Assert
    assert_eq!(
        err,
        GatewayError::Protocol {
            code: 403,
            reason: "Unauthorized request".into()
        }
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.session_id().is_none());
    assert!(session.sources().is_empty());
}

#[tokio::test]
async fn test_connect_while_ready_is_state_error() {
    let gateway = MockGateway::new(two_cameras());
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();

    let err = session.connect(&endpoint(), false).await.unwrap_err();

    assert!(err.is_state());
    assert_eq!(gateway.open_attempts().len(), 1);
}

// ── Capture ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_capture_skips_unknown_source() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, store) = orchestrator(&session);

    // Act
    let report = orchestrator
        .capture(&[SourceId(1), SourceId(2), SourceId(3)])
        .await
        .unwrap();

    // Assert
    assert_eq!(report.artifacts().count(), 2);
    assert_eq!(report.skipped, vec![SourceId(3)]);
    assert_eq!(watch_count(&gateway), 2);
    assert_eq!(store.saved().len(), 2);
}

#[tokio::test]
async fn test_silent_source_times_out_without_delaying_others() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        silent_sources: vec![2],
        ..two_cameras()
    });
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, store) = orchestrator(&session);

    // Act
    let started = Instant::now();
    let report = orchestrator
        .capture(&[SourceId(1), SourceId(2)])
        .await
        .unwrap();

    // Assert
    assert!(report.outcomes[&SourceId(1)].is_ok());
    assert!(report.outcomes[&SourceId(2)]
        .as_ref()
        .is_err_and(|e| e.is_timeout()));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(store.saved(), vec![(SourceId(1), vec![0xFF, 0xD8, 0xFF])]);
    assert_eq!(session.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn test_captures_run_concurrently() {
    // Arrange – each source answers after 200 ms
    let gateway = MockGateway::new(MockGatewayConfig {
        streams: vec![(1, None), (2, None), (3, None)],
        watch_delays: vec![
            (1, Duration::from_millis(200)),
            (2, Duration::from_millis(200)),
            (3, Duration::from_millis(200)),
        ],
        ..MockGatewayConfig::default()
    });
    let config = SessionConfig {
        capture_timeout: Duration::from_secs(2),
        ..fast_config()
    };
    let (session, _) = session_with(&gateway, config);
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, _) = orchestrator(&session);

    // Act
    let started = Instant::now();
    let report = orchestrator
        .capture(&[SourceId(1), SourceId(2), SourceId(3)])
        .await
        .unwrap();

    // Assert
    assert_eq!(report.artifacts().count(), 3);
    assert!(
        started.elapsed() < Duration::from_millis(550),
        "captures were serialized: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_plugin_rejection_fails_only_that_source() {
    let gateway = MockGateway::new(MockGatewayConfig {
        rejected_sources: vec![1],
        ..two_cameras()
    });
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, _) = orchestrator(&session);

    let report = orchestrator
        .capture(&[SourceId(1), SourceId(2)])
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[&SourceId(1)],
        Err(GatewayError::Protocol { code: 455, .. })
    ));
    assert!(report.outcomes[&SourceId(2)].is_ok());
}

#[tokio::test]
async fn test_empty_or_unknown_capture_sends_nothing() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, _) = orchestrator(&session);
    let sent_before = gateway.requests().len();

    // Act
    let empty = orchestrator.capture(&[]).await.unwrap();
    let unknown = orchestrator.capture(&[SourceId(42)]).await.unwrap();

    // Assert
    assert!(empty.is_empty());
    assert!(empty.skipped.is_empty());
    assert!(unknown.is_empty());
    assert_eq!(unknown.skipped, vec![SourceId(42)]);
    assert_eq!(gateway.requests().len(), sent_before);
}

#[tokio::test]
async fn test_capture_failure_in_backend_is_per_source() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let store = Arc::new(MemorySnapshotStore::new());
    let backend = Arc::new(StaticCaptureBackend::new(vec![1]).failing_for(SourceId(2)));
    let orchestrator = SnapshotOrchestrator::new(Arc::clone(&session), backend.clone(), store.clone());

    // Act
    let report = orchestrator
        .capture(&[SourceId(1), SourceId(2)])
        .await
        .unwrap();

    // Assert
    assert!(matches!(
        report.outcomes[&SourceId(2)],
        Err(GatewayError::Capture(_))
    ));
    assert_eq!(store.saved().len(), 1);
    let mut grabbed = backend.grabbed();
    grabbed.sort();
    assert_eq!(grabbed, vec![SourceId(1), SourceId(2)]);
}

// ── Disconnect and loss ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_destroys_session_and_blocks_captures() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, recorder) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, _) = orchestrator(&session);

    // Act
    session.disconnect().await;
    let err = orchestrator.capture(&[SourceId(1)]).await.unwrap_err();

    // Assert
    assert!(err.is_state());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.session_id().is_none());
    assert_eq!(gateway.verbs().last().map(String::as_str), Some("destroy"));
    assert_eq!(gateway.close_count(), 1);
    let messages = recorder.messages();
    assert_eq!(
        &messages[messages.len() - 2..],
        &["Disconnecting...".to_string(), "Disconnected".to_string()]
    );
}

#[tokio::test]
async fn test_disconnect_fails_pending_capture_with_transport_error() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        silent_sources: vec![2],
        ..two_cameras()
    });
    let config = SessionConfig {
        capture_timeout: Duration::from_secs(10),
        ..fast_config()
    };
    let (session, _) = session_with(&gateway, config);
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, _) = orchestrator(&session);

    // Act
    let pending = tokio::spawn(async move { orchestrator.capture(&[SourceId(2)]).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    session.disconnect().await;
    let report = pending.await.unwrap().unwrap();

    // Assert
    assert!(report.outcomes[&SourceId(2)]
        .as_ref()
        .is_err_and(|e| e.is_transport()));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_disconnect_during_connect_cancels_handshake() {
    // Arrange – the gateway never answers `create`
    let gateway = MockGateway::new(MockGatewayConfig {
        silent_create: true,
        ..two_cameras()
    });
    let config = SessionConfig {
        control_timeout: Duration::from_secs(10),
        ..fast_config()
    };
    let (session, recorder) = session_with(&gateway, config);
    let connecting = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect(&endpoint(), false).await })
    };
    let deadline = Instant::now() + Duration::from_secs(3);
    while gateway.verbs().is_empty() {
        assert!(Instant::now() < deadline, "create was never sent");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Act
    let started = Instant::now();
    session.disconnect().await;
    let result = connecting.await.unwrap();

    // Assert
    assert!(matches!(result, Err(ref e) if e.is_transport()));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    let last = recorder.messages().pop().unwrap();
    assert!(last.starts_with("Connection failed"), "last status was {last:?}");
    assert!(!recorder.messages().contains(&"Disconnecting...".to_string()));
    assert_eq!(gateway.verbs(), vec!["create"]);
}

#[tokio::test]
async fn test_undecodable_frame_fails_pending_capture_and_disconnects() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        silent_sources: vec![2],
        ..two_cameras()
    });
    let config = SessionConfig {
        capture_timeout: Duration::from_secs(10),
        ..fast_config()
    };
    let (session, recorder) = session_with(&gateway, config);
    session.connect(&endpoint(), false).await.unwrap();
    let (orchestrator, store) = orchestrator(&session);
    let pending = tokio::spawn(async move { orchestrator.capture(&[SourceId(2)]).await });
    let deadline = Instant::now() + Duration::from_secs(3);
    while watch_count(&gateway) == 0 {
        assert!(Instant::now() < deadline, "watch was never sent");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Act – valid JSON, but not an object
    gateway.push(json!("not an object"));
    let report = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("capture must finish once the connection is torn down")
        .unwrap()
        .unwrap();

    // Assert
    assert!(report.outcomes[&SourceId(2)]
        .as_ref()
        .is_err_and(|e| e.is_transport()));
    assert!(store.saved().is_empty());
    wait_for_state(&session, ConnectionState::Disconnected).await;
    assert_eq!(recorder.messages().last().map(String::as_str), Some("Disconnected"));
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let gateway = MockGateway::new(two_cameras());
    let (session, recorder) = session_with(&gateway, fast_config());

    session.disconnect().await;

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(recorder.messages().is_empty());
    assert!(gateway.open_attempts().is_empty());
}

#[tokio::test]
async fn test_gateway_hangup_moves_to_disconnected() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, recorder) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();

    // Act
    gateway.hang_up();

    // Assert
    wait_for_state(&session, ConnectionState::Disconnected).await;
    assert_eq!(recorder.messages().last().map(String::as_str), Some("Disconnected"));
    let (orchestrator, _) = orchestrator(&session);
    assert!(orchestrator.capture(&[SourceId(1)]).await.unwrap_err().is_state());
}

#[tokio::test]
async fn test_reconnect_after_loss_starts_fresh() {
    let gateway = MockGateway::new(two_cameras());
    let (session, _) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let first = session.session_id();
    gateway.hang_up();
    wait_for_state(&session, ConnectionState::Disconnected).await;

    session.connect(&endpoint(), false).await.unwrap();

    assert_eq!(session.state(), ConnectionState::Ready);
    assert_ne!(session.session_id(), first);
}

#[tokio::test]
async fn test_refused_keepalive_tears_down() {
    // Arrange
    let gateway = MockGateway::new(MockGatewayConfig {
        reject_keepalive: true,
        ..two_cameras()
    });
    let config = SessionConfig {
        keepalive_interval: Some(Duration::from_millis(50)),
        ..fast_config()
    };
    let (session, _) = session_with(&gateway, config);
    session.connect(&endpoint(), false).await.unwrap();

    // Act / Assert
    wait_for_state(&session, ConnectionState::Disconnected).await;
    assert!(gateway.verbs().contains(&"keepalive".to_string()));
}

#[tokio::test]
async fn test_keepalives_keep_session_ready() {
    let gateway = MockGateway::new(two_cameras());
    let config = SessionConfig {
        keepalive_interval: Some(Duration::from_millis(30)),
        ..fast_config()
    };
    let (session, _) = session_with(&gateway, config);
    session.connect(&endpoint(), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(session.state(), ConnectionState::Ready);
    let keepalives = gateway.verbs().iter().filter(|v| *v == "keepalive").count();
    assert!(keepalives >= 2, "only {keepalives} keepalive(s) sent");
}

#[tokio::test]
async fn test_session_timeout_event_tears_down() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, recorder) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();
    let id = session.session_id().unwrap();

    // Act
    gateway.push(json!({"janus": "timeout", "session_id": id.0}));

    // Assert
    wait_for_state(&session, ConnectionState::Disconnected).await;
    let events = recorder.events.lock().unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Timeout));
}

#[tokio::test]
async fn test_unsolicited_events_reach_observer() {
    // Arrange
    let gateway = MockGateway::new(two_cameras());
    let (session, recorder) = session_with(&gateway, fast_config());
    session.connect(&endpoint(), false).await.unwrap();

    // Act
    gateway.push(json!({"janus": "webrtcup", "session_id": 1, "sender": 2}));
    gateway.push(json!({"janus": "success", "transaction": "999"}));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Assert
    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::WebrtcUp);
    assert_eq!(session.state(), ConnectionState::Ready);
}
