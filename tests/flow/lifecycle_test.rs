//! Startup barrier and shutdown scenarios.

use std::time::Duration;

use tokio::time::timeout;

use flowport::components::walk::{Walk, DIR_PORT, ERR_PORT, FILE_PORT};
use flowport::config::Settings;
use flowport::transport::TransportContext;
use flowport::{CancelReason, ComponentError};

use crate::common::*;

#[tokio::test]
async fn test_startup_timeout_exits_without_output() {
    let ctx = TransportContext::new();
    let files = sink(&ctx, "inproc://timeout-file").await;

    let settings = Settings {
        connection_timeout_ms: 30,
        ..settings()
    };
    let result = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://timeout-dir"),
            (FILE_PORT, "inproc://timeout-file"),
            (ERR_PORT, "inproc://timeout-err"),
        ]),
        &settings,
    )
    .await;

    match result {
        Err(e @ ComponentError::ConnectionTimeout { .. }) => {
            assert_eq!(e.exit_code(), 1);
            assert!(e.to_string().contains(ERR_PORT));
        }
        other => panic!("expected connection timeout, got {other:?}"),
    }
    assert_silent(&files).await;
}

#[tokio::test]
async fn test_downstream_disconnect_shuts_component_down() {
    let ctx = TransportContext::new();
    let files = sink(&ctx, "inproc://midrun-file").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://midrun-dir"),
            (FILE_PORT, "inproc://midrun-file"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let cancel = component.cancellation().clone();
    let running = run(Walk, component);

    drop(files);

    let reason = timeout(WAIT, cancel.cancelled()).await.unwrap();
    assert_eq!(reason, CancelReason::PortClosed);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_upstream_disconnect_stops_polling_component() {
    let ctx = TransportContext::new();
    let _files = sink(&ctx, "inproc://upstream-file").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://upstream-dir"),
            (FILE_PORT, "inproc://upstream-file"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let cancel = component.cancellation().clone();
    let running = run(Walk, component);

    let dirs = source(&ctx, "inproc://upstream-dir").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    dirs.close();

    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
    assert!(matches!(
        cancel.reason(),
        Some(CancelReason::PortClosed | CancelReason::InputClosed)
    ));
}

#[tokio::test]
async fn test_external_cancel_stops_component() {
    let ctx = TransportContext::new();
    let _files = sink(&ctx, "inproc://cancel-file").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://cancel-dir"),
            (FILE_PORT, "inproc://cancel-file"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let cancel = component.cancellation().clone();
    let running = run(Walk, component);

    cancel.trigger(CancelReason::Signal);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_endpoint_is_configuration_error() {
    let ctx = TransportContext::new();
    let result = start(
        &Walk,
        &ctx,
        &endpoints(&[(DIR_PORT, "inproc://config-dir")]),
        &settings(),
    )
    .await;

    match result {
        Err(e @ ComponentError::Configuration(_)) => {
            assert_eq!(e.exit_code(), 1);
            assert!(e.to_string().contains(FILE_PORT));
        }
        other => panic!("expected configuration error, got {other:?}"),
    }
}
