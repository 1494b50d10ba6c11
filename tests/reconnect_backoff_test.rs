//! Reconnection backoff: attempt accounting, delay law, reset on
//! registration, and the terminal failure at the ceiling.

mod common;

use std::time::Duration;

use common::{settle, Harness};
use softphone_core::{ClientEvent, EndpointState, EventPriority, NoticeKind};

/// Five recoverable faults back off and retry; the sixth is terminal.
#[tokio::test(start_paused = true)]
async fn consecutive_faults_back_off_then_become_terminal() {
    let h = Harness::new();
    h.start_registered().await;

    for k in 1..=5u32 {
        h.provider.latest_endpoint().emit_fault(31009);
        settle().await;

        assert_eq!(h.controller.reconnect_attempt(), k, "fault {} misaccounted", k);
        assert!(
            h.controller.stats().await.reconnect_timer_armed,
            "retry {} should be scheduled",
            k
        );

        // Let the scheduled re-initialization fire (delays cap at 16s here)
        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(
            h.provider.created(),
            (k + 1) as usize,
            "retry {} should construct a fresh endpoint",
            k
        );
    }

    h.drain_events();
    h.provider.latest_endpoint().emit_fault(31009);
    settle().await;

    assert_eq!(h.controller.reconnect_attempt(), 5, "attempt never exceeds the ceiling");
    assert!(
        !h.controller.stats().await.reconnect_timer_armed,
        "no sixth retry may be scheduled"
    );
    assert_eq!(h.provider.created(), 6);

    let terminal: Vec<(NoticeKind, bool, EventPriority)> = h
        .drain_events()
        .iter()
        .filter_map(|event| match event {
            ClientEvent::NoticeRaised { notice, priority } => {
                Some((notice.kind, notice.sticky, *priority))
            }
            _ => None,
        })
        .collect();
    assert!(
        terminal.contains(&(NoticeKind::TerminalFailure, true, EventPriority::Critical)),
        "terminal failure must surface as a sticky critical notice, got {:?}",
        terminal
    );

    // Past the ceiling, connect() refuses to kick another initialization
    let err = h
        .controller
        .connect("+12025550123", None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        softphone_core::ClientError::ReconnectCeilingReached { attempts: 5 }
    ));
    assert_eq!(h.provider.created(), 6);
}

/// A successful registration resets the attempt counter, whatever it was.
#[tokio::test(start_paused = true)]
async fn registration_resets_the_attempt_counter() {
    let h = Harness::new();
    h.start_registered().await;

    h.provider.latest_endpoint().emit_fault(31003);
    settle().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    h.provider.latest_endpoint().emit_fault(31003);
    settle().await;
    assert_eq!(h.controller.reconnect_attempt(), 2);
    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;

    h.provider.latest_endpoint().emit_registered();
    settle().await;

    assert!(h.controller.is_ready().await);
    assert_eq!(h.controller.reconnect_attempt(), 0);
    assert!(
        !h.controller.stats().await.reconnect_timer_armed,
        "registration cancels any pending reconnect timer"
    );

    // The next fault starts the backoff ladder from the bottom again
    h.provider.latest_endpoint().emit_fault(31003);
    settle().await;
    assert_eq!(h.controller.reconnect_attempt(), 1);
}

/// Faults during initial endpoint creation feed the same backoff path.
#[tokio::test(start_paused = true)]
async fn failed_initialization_schedules_a_retry() {
    let h = Harness::new();
    h.provider
        .fail_create
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let result = h.controller.start().await;
    assert!(result.is_err());
    assert_eq!(h.controller.endpoint_state().await, EndpointState::Faulted);
    assert_eq!(h.controller.reconnect_attempt(), 1);
    assert!(h.controller.stats().await.reconnect_timer_armed);

    // Repair the provider and let the retry land
    h.provider
        .fail_create
        .store(false, std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;

    assert_eq!(h.provider.created(), 1);
    h.provider.latest_endpoint().emit_registered();
    settle().await;
    assert!(h.controller.is_ready().await);
}
