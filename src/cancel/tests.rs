use super::*;
use std::time::Duration;
use tokio::time::timeout;

#[test]
fn test_new_is_not_cancelled() {
    let cancel = Cancellation::new();
    assert!(!cancel.is_cancelled());
    assert_eq!(cancel.reason(), None);
}

#[test]
fn test_first_trigger_wins() {
    let cancel = Cancellation::new();

    assert!(cancel.trigger(CancelReason::PortClosed));
    assert!(!cancel.trigger(CancelReason::Signal));
    assert!(!cancel.trigger(CancelReason::PortClosed));

    assert!(cancel.is_cancelled());
    assert_eq!(cancel.reason(), Some(CancelReason::PortClosed));
}

#[test]
fn test_clones_share_state() {
    let cancel = Cancellation::new();
    let other = cancel.clone();

    other.trigger(CancelReason::InputClosed);
    assert_eq!(cancel.reason(), Some(CancelReason::InputClosed));
}

#[tokio::test]
async fn test_all_waiters_observe_trigger() {
    let cancel = Cancellation::new();
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.cancelled().await })
        })
        .collect();

    tokio::task::yield_now().await;
    cancel.trigger(CancelReason::Requested);

    for waiter in waiters {
        let reason = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(reason, CancelReason::Requested);
    }
}

#[tokio::test]
async fn test_cancelled_returns_at_once_when_already_fired() {
    let cancel = Cancellation::new();
    cancel.trigger(CancelReason::TransportFault);

    let reason = timeout(Duration::from_millis(100), cancel.cancelled())
        .await
        .unwrap();
    assert_eq!(reason, CancelReason::TransportFault);
}

#[tokio::test]
async fn test_concurrent_triggers_fire_once() {
    let cancel = Cancellation::new();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cancel = cancel.clone();
            tokio::spawn(async move { cancel.trigger(CancelReason::PortClosed) })
        })
        .collect();

    let mut fired = 0;
    for handle in handles {
        if handle.await.unwrap() {
            fired += 1;
        }
    }
    assert_eq!(fired, 1);
}

#[tokio::test]
async fn test_signal_listener_exits_on_other_cancel() {
    let cancel = Cancellation::new();
    let listener = spawn_signal_listener(cancel.clone());

    cancel.trigger(CancelReason::PortClosed);
    timeout(Duration::from_secs(1), listener)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancel.reason(), Some(CancelReason::PortClosed));
}

#[test]
fn test_exit_codes() {
    assert_eq!(CancelReason::Signal.exit_code(), 0);
    assert_eq!(CancelReason::PortClosed.exit_code(), 0);
    assert_eq!(CancelReason::InputClosed.exit_code(), 0);
    assert_eq!(CancelReason::TransportFault.exit_code(), 1);
}
