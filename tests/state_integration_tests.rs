//! Integration tests for StateManager with session events
//!
//! These tests verify that the StateManager correctly:
//! - Emits session events on transitions
//! - Supports multiple subscribers
//! - Lets exactly one of many racing terminal transitions land
//! - Rejects transitions for stale sessions

use locus::models::{AcceptedCode, CodeSource, Symbology};
use locus::{ScanError, ScanState, SessionEvent, SessionId, StateManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, timeout};

fn begin(state: &StateManager) -> SessionId {
    let id = SessionId::new();
    state.update(|s| s.begin(id));
    id
}

#[tokio::test]
async fn test_session_events_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    let id = begin(&state);

    // Should receive StateChanged Idle -> Starting
    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert_eq!(
        event,
        SessionEvent::StateChanged {
            session_id: Some(id),
            from: ScanState::Idle,
            to: ScanState::Starting,
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    begin(&state);

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout waiting for event")
            .expect("Channel closed");
        assert!(matches!(event, SessionEvent::StateChanged { .. }));
    }
}

#[tokio::test]
async fn test_full_session_event_sequence() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();
    let id = begin(&state);

    state
        .try_transition(
            Some(id),
            &[ScanState::Starting],
            |s| s.state = ScanState::Scanning,
            |_| {},
        )
        .unwrap();
    state
        .try_transition(
            Some(id),
            &[ScanState::Scanning],
            |s| s.rejected_count += 1,
            |_| {},
        )
        .unwrap();
    state
        .try_transition(
            Some(id),
            &[ScanState::Scanning],
            |s| {
                s.attempt_count += 1;
                s.state = ScanState::Accepted;
                s.accepted_code = AcceptedCode::parse("4006381333931");
                s.code_source = Some(CodeSource::Camera(Symbology::Ean13));
            },
            |_| {},
        )
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let transitions: Vec<(ScanState, ScanState)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ScanState::Idle, ScanState::Starting),
            (ScanState::Starting, ScanState::Scanning),
            (ScanState::Scanning, ScanState::Accepted),
        ]
    );

    assert!(events.contains(&SessionEvent::AttemptsUpdated {
        accepted: 0,
        rejected: 1
    }));
    assert!(events.contains(&SessionEvent::AttemptsUpdated {
        accepted: 1,
        rejected: 1
    }));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ScanComplete { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_racing_terminal_transitions_land_once() {
    let state = Arc::new(StateManager::new());
    let id = begin(&state);
    state.update(|s| s.state = ScanState::Scanning);

    let committed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for i in 0..16 {
        let state_clone = state.clone();
        let committed_clone = committed.clone();
        let handle = tokio::spawn(async move {
            let result = state_clone.try_transition(
                Some(id),
                &[ScanState::Scanning],
                |s| {
                    s.state = ScanState::Accepted;
                    s.accepted_code = AcceptedCode::parse(&format!("CODE-{i}"));
                    s.code_source = Some(CodeSource::Manual);
                },
                |_| {
                    committed_clone.fetch_add(1, Ordering::SeqCst);
                },
            );
            result.is_some()
        });
        handles.push(handle);
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(committed.load(Ordering::SeqCst), 1);
    assert_eq!(state.snapshot().state, ScanState::Accepted);
}

#[tokio::test]
async fn test_stale_session_cannot_fail_new_one() {
    let state = Arc::new(StateManager::new());
    let old = begin(&state);
    let new = begin(&state);

    let result = state.try_transition(
        Some(old),
        &[ScanState::Starting],
        |s| {
            s.state = ScanState::Failed;
            s.last_error = Some(ScanError::PermissionDenied);
        },
        |_| {},
    );

    assert!(result.is_none());
    let session = state.snapshot();
    assert_eq!(session.session_id, Some(new));
    assert_eq!(session.state, ScanState::Starting);
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn test_capabilities_event() {
    use locus::models::{CameraCapabilities, FacingMode, Resolution, ResolutionRange};

    let state = Arc::new(StateManager::new());
    let id = begin(&state);
    let mut rx = state.subscribe();

    let capabilities = CameraCapabilities {
        facing_mode: FacingMode::Environment,
        resolution_range: ResolutionRange {
            min: Resolution::new(640, 480),
            max: Resolution::new(1920, 1080),
        },
        zoom_range: None,
    };

    state.try_transition(
        Some(id),
        &[ScanState::Starting],
        |s| {
            s.state = ScanState::Scanning;
            s.capabilities = Some(capabilities);
        },
        |_| {},
    );

    let mut seen = false;
    while let Ok(event) = rx.try_recv() {
        seen |= event == SessionEvent::CapabilitiesKnown { capabilities };
    }
    assert!(seen);
}

#[tokio::test]
async fn test_reset_session() {
    let state = Arc::new(StateManager::new());
    let id = begin(&state);
    state.try_transition(
        Some(id),
        &[ScanState::Starting],
        |s| {
            s.state = ScanState::Failed;
            s.last_error = Some(ScanError::DeviceUnavailable);
        },
        |_| {},
    );

    let mut rx = state.subscribe();
    state.reset();

    let session = state.snapshot();
    assert_eq!(session.state, ScanState::Idle);
    assert!(session.session_id.is_none());
    assert!(session.last_error.is_none());

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.last(), Some(&SessionEvent::SessionReset));
}

#[test]
fn test_rejected_transition_publishes_nothing() {
    let state = StateManager::new();
    let mut rx = state.subscribe();
    let mut recv = tokio_test::task::spawn(rx.recv());

    let result = state.try_transition(
        None,
        &[ScanState::Scanning],
        |s| s.state = ScanState::Accepted,
        |_| panic!("on_commit must not run for a rejected transition"),
    );
    assert!(result.is_none());
    tokio_test::assert_pending!(recv.poll());

    state.update(|s| s.begin(SessionId::new()));

    assert!(recv.is_woken());
    let event = tokio_test::assert_ready_ok!(recv.poll());
    assert!(matches!(
        event,
        SessionEvent::StateChanged {
            to: ScanState::Starting,
            ..
        }
    ));
}
