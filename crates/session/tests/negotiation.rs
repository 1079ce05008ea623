//! Integration tests for the session negotiator against mock transports

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

use receptionist_core::{
    ConnectionPhase, DisplayState, InboundEvent, LifecycleKind, SessionError, TransportState,
};

use common::{gated_harness, harness, wait_for};

async fn connect_ready(h: &common::Harness) {
    h.session.connect().await.unwrap();
    wait_for(&h.session, |s| s.is_data_channel_ready).await;
}

/// Connect, open the channel and start listening
#[tokio::test]
async fn test_connect_and_listen() {
    let h = harness("alloy", true);
    let (_sub, mut events) = h.session.events();

    connect_ready(&h).await;
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(snapshot.is_connected);
    assert_eq!(snapshot.display_state(), DisplayState::Connected);

    h.session.start_listening().await.unwrap();
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Listening);
    assert!(snapshot.is_listening);
    assert!(h.session.is_capturing());
    assert!(h.connector.last_peer().attached.lock().is_some());

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let InboundEvent::LifecycleSignal(kind) = event {
            kinds.push(kind);
        }
    }
    assert_eq!(
        kinds,
        vec![
            LifecycleKind::Connecting,
            LifecycleKind::Connected,
            LifecycleKind::Listening
        ]
    );
}

/// The configure message goes out once the channel opens
#[tokio::test]
async fn test_configure_flushed_on_open() {
    let h = harness("alloy", true);
    connect_ready(&h).await;

    let peer = h.connector.last_peer();
    timeout(Duration::from_secs(1), async {
        while peer.channel.sent.lock().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let sent = peer.channel.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    let json: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(json["type"], "configure");
    assert_eq!(json["data"]["voiceId"], "alloy");
    assert!(json["data"]["agentContext"]
        .as_str()
        .unwrap()
        .contains("Greeting: Welcome to Luigi's"));
}

/// N concurrent teardowns release each resource exactly once
#[tokio::test]
async fn test_concurrent_teardown_releases_once() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    h.session.start_listening().await.unwrap();

    let peer = h.connector.last_peer();
    let track = peer.attached.lock().clone().unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = h.session.clone();
        handles.push(tokio::spawn(async move { session.disconnect().await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(peer.closes.load(Ordering::SeqCst), 1);
    assert_eq!(peer.channel.closes.load(Ordering::SeqCst), 1);
    assert_eq!(peer.detaches.load(Ordering::SeqCst), 1);
    assert_eq!(peer.sink.detaches.load(Ordering::SeqCst), 1);
    assert!(track.is_stopped());
    assert!(!h.session.has_resources());

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Closed);
    assert!(!snapshot.is_data_channel_ready);
    assert!(!snapshot.is_listening);
}

/// An answer arriving after disconnect is discarded
#[tokio::test]
async fn test_stale_answer_never_connects() {
    let h = harness("alloy", true);
    let gate = Arc::new(Notify::new());
    *h.signaling.gate.lock() = Some(gate.clone());

    let session = h.session.clone();
    let attempt = tokio::spawn(async move { session.connect().await });

    h.signaling.entered.notified().await;
    assert_eq!(h.session.phase(), ConnectionPhase::AwaitingRemoteAnswer);

    h.session.disconnect().await;
    gate.notify_one();

    let result = attempt.await.unwrap();
    assert_eq!(result, Err(SessionError::StaleConnection));

    let peer = h.connector.last_peer();
    assert_eq!(peer.answers.load(Ordering::SeqCst), 0);
    assert_eq!(peer.closes.load(Ordering::SeqCst), 1);

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Closed);
    assert!(!snapshot.is_connected);
    assert!(!h.session.has_resources());
}

/// A second connect while one is in flight is rejected without side effects
#[tokio::test]
async fn test_duplicate_connect_rejected() {
    let h = harness("alloy", true);
    let gate = Arc::new(Notify::new());
    *h.signaling.gate.lock() = Some(gate.clone());

    let session = h.session.clone();
    let attempt = tokio::spawn(async move { session.connect().await });
    h.signaling.entered.notified().await;

    assert_eq!(h.session.connect().await, Err(SessionError::AlreadyConnecting));
    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.phase(), ConnectionPhase::AwaitingRemoteAnswer);

    gate.notify_one();
    attempt.await.unwrap().unwrap();
    assert_eq!(h.session.phase(), ConnectionPhase::Connected);
}

/// Every successful connect uses exactly one fresh credential
#[tokio::test]
async fn test_one_credential_per_connect() {
    let h = harness("alloy", true);

    connect_ready(&h).await;
    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 1);

    h.session.disconnect().await;
    connect_ready(&h).await;

    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.connector.created(), 2);
    let tokens = h.signaling.tokens.lock().clone();
    assert_eq!(tokens, vec!["ek_1".to_string(), "ek_2".to_string()]);
}

/// Listening before the channel opens fails without touching capture
#[tokio::test]
async fn test_listen_before_channel_ready() {
    let h = harness("alloy", false);
    h.session.connect().await.unwrap();

    assert_eq!(
        h.session.start_listening().await,
        Err(SessionError::ChannelNotReady)
    );
    assert_eq!(h.capture.open_count(), 0);
    assert_eq!(h.session.phase(), ConnectionPhase::Connected);
    assert!(h.session.has_resources());
}

#[tokio::test]
async fn test_listen_when_not_connected() {
    let h = harness("alloy", true);
    assert_eq!(
        h.session.start_listening().await,
        Err(SessionError::NotConnected)
    );
    assert_eq!(h.capture.open_count(), 0);
    assert_eq!(h.session.phase(), ConnectionPhase::Idle);
}

/// Unknown voices never reach the network
#[tokio::test]
async fn test_unknown_voice_rejected() {
    let h = harness("baritone", true);

    let result = h.session.connect().await;
    assert_eq!(result, Err(SessionError::InvalidVoice("baritone".to_string())));
    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.signaling.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.connector.created(), 0);

    let h = harness("alloy", true);
    assert_eq!(
        h.session.change_voice("Alloy").await,
        Err(SessionError::InvalidVoice("Alloy".to_string()))
    );
    assert_eq!(h.session.snapshot().active_voice, "alloy");
}

/// Malformed control messages surface one error and keep the session up
#[tokio::test]
async fn test_malformed_message_keeps_session() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    let (_sub, mut events) = h.session.events();

    h.connector.last_peer().deliver("this is not json");

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, InboundEvent::Error(_)));
    assert!(timeout(Duration::from_millis(50), events.recv()).await.is_err());

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(snapshot.is_data_channel_ready);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_inbound_messages_are_classified() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    let (_sub, mut events) = h.session.events();

    let peer = h.connector.last_peer();
    peer.deliver(r#"{"type":"transcript","data":"table for two"}"#);
    peer.deliver(r#"{"type":"response","data":"Sure, what time?"}"#);
    peer.deliver(r#"{"type":"rate_limits.updated","data":{"remaining":10}}"#);

    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(
            timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    assert_eq!(
        received,
        vec![
            InboundEvent::Transcript("table for two".into()),
            InboundEvent::Response("Sure, what time?".into()),
            InboundEvent::LifecycleSignal(LifecycleKind::Unknown("rate_limits.updated".into())),
        ]
    );
}

/// Stopping releases capture only
#[tokio::test]
async fn test_stop_listening_keeps_connection() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    h.session.start_listening().await.unwrap();

    let peer = h.connector.last_peer();
    let track = peer.attached.lock().clone().unwrap();

    h.session.stop_listening().await.unwrap();

    assert!(track.is_stopped());
    assert!(!h.session.is_capturing());
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(snapshot.is_data_channel_ready);
    assert_eq!(peer.closes.load(Ordering::SeqCst), 0);

    h.session.start_listening().await.unwrap();
    assert_eq!(h.capture.open_count(), 2);
    assert_eq!(h.session.phase(), ConnectionPhase::Listening);
}

#[tokio::test]
async fn test_fatal_transport_state_fails_session() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    let (_sub, mut events) = h.session.events();

    let peer = h.connector.last_peer();
    peer.report_state(TransportState::Disconnected);
    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        InboundEvent::LifecycleSignal(LifecycleKind::TransportDisconnected)
    );
    assert_eq!(h.session.phase(), ConnectionPhase::Connected);

    peer.report_state(TransportState::Failed);
    wait_for(&h.session, |s| s.phase == ConnectionPhase::Failed).await;

    let snapshot = h.session.snapshot();
    assert!(matches!(
        snapshot.last_error,
        Some(SessionError::TransportFailure(_))
    ));
    assert!(matches!(snapshot.display_state(), DisplayState::Error(_)));
    assert_eq!(peer.closes.load(Ordering::SeqCst), 1);
    assert!(!h.session.has_resources());
}

#[tokio::test]
async fn test_credential_failure_fails_session() {
    let h = harness("alloy", true);
    *h.broker.fail_with.lock() = Some(SessionError::Credential {
        status: Some(401),
        body: "invalid api key".into(),
    });
    let (_sub, mut events) = h.session.events();

    let err = h.session.connect().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(h.connector.created(), 0);

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Failed);
    assert_eq!(snapshot.last_error, Some(err));

    let errors = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, InboundEvent::Error(_)))
        .count();
    assert_eq!(errors, 1);
}

/// Changing voice while connected renegotiates with a new credential
#[tokio::test]
async fn test_change_voice_reconnects() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    let first = h.connector.last_peer();

    h.session.change_voice("nova").await.unwrap();
    wait_for(&h.session, |s| s.is_data_channel_ready).await;

    assert_eq!(first.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.connector.created(), 2);

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert_eq!(snapshot.active_voice, "nova");
}

#[tokio::test]
async fn test_change_voice_while_idle_only_records() {
    let h = harness("alloy", true);
    h.session.change_voice("shimmer").await.unwrap();

    assert_eq!(h.broker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.snapshot().active_voice, "shimmer");
    assert_eq!(h.session.phase(), ConnectionPhase::Idle);
}

#[tokio::test]
async fn test_reconnect_after_failure() {
    let h = harness("alloy", true);
    *h.signaling.fail_with.lock() = Some(SessionError::Signaling {
        status: Some(503),
        body: "busy".into(),
    });

    assert!(h.session.connect().await.is_err());
    assert_eq!(h.session.phase(), ConnectionPhase::Failed);

    *h.signaling.fail_with.lock() = None;
    connect_ready(&h).await;

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(snapshot.last_error.is_none());
    assert_eq!(h.connector.created(), 2);
}

/// A second start while the first is still opening the device is rejected
#[tokio::test]
async fn test_second_start_rejected_while_in_flight() {
    let (h, device) = gated_harness("alloy");
    connect_ready(&h).await;

    let session = h.session.clone();
    let first = tokio::spawn(async move { session.start_listening().await });
    timeout(Duration::from_secs(2), device.entered.notified())
        .await
        .unwrap();

    assert_eq!(
        h.session.start_listening().await,
        Err(SessionError::ListenInFlight)
    );
    assert_eq!(h.session.phase(), ConnectionPhase::Connected);

    device.gate.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(h.capture.open_count(), 1);
    assert_eq!(h.session.phase(), ConnectionPhase::Listening);
}

/// Stop cannot slip in while a start is opening the device
#[tokio::test]
async fn test_stop_rejected_while_start_in_flight() {
    let (h, device) = gated_harness("alloy");
    connect_ready(&h).await;

    let session = h.session.clone();
    let start = tokio::spawn(async move { session.start_listening().await });
    timeout(Duration::from_secs(2), device.entered.notified())
        .await
        .unwrap();

    assert_eq!(
        h.session.stop_listening().await,
        Err(SessionError::ListenInFlight)
    );

    device.gate.notify_one();
    start.await.unwrap().unwrap();
    assert_eq!(h.session.phase(), ConnectionPhase::Listening);

    // Once the start has settled the stop goes through
    h.session.stop_listening().await.unwrap();
    assert_eq!(h.session.phase(), ConnectionPhase::Connected);
    assert!(!h.session.is_capturing());
    assert!(h.connector.last_peer().attached.lock().is_none());
}

/// Losing the control channel while listening releases the microphone
#[tokio::test]
async fn test_channel_close_while_listening_releases_capture() {
    let h = harness("alloy", true);
    connect_ready(&h).await;
    h.session.start_listening().await.unwrap();

    let peer = h.connector.last_peer();
    let track = peer.attached.lock().clone().unwrap();

    peer.close_channel();
    wait_for(&h.session, |s| !s.is_data_channel_ready).await;
    timeout(Duration::from_secs(2), async {
        while h.session.is_capturing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("capture still held after channel close");

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.phase, ConnectionPhase::Connected);
    assert!(!snapshot.is_listening);
    assert!(track.is_stopped());
    assert!(peer.attached.lock().is_none());
    assert_eq!(peer.detaches.load(Ordering::SeqCst), 1);
    assert_eq!(peer.closes.load(Ordering::SeqCst), 0);

    assert_eq!(
        h.session.start_listening().await,
        Err(SessionError::ChannelNotReady)
    );

    peer.open_channel();
    wait_for(&h.session, |s| s.is_data_channel_ready).await;
    h.session.start_listening().await.unwrap();
    assert_eq!(h.capture.open_count(), 2);
}
