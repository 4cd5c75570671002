//! Shared utilities for integration tests.
//!
//! Components run in-process on `inproc://` endpoints sharing one
//! [`TransportContext`]; test peers are plain ports on the same context.

#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use flowport::cli;
use flowport::component::{Component, ComponentLoop, Endpoints};
use flowport::config::Settings;
use flowport::error::Result;
use flowport::transport::{LinkOptions, TransportContext};
use flowport::{Cancellation, Packet, Port, PortError, PortRole};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Endpoint map from `(port, endpoint)` pairs.
pub fn endpoints(pairs: &[(&str, &str)]) -> Endpoints {
    pairs
        .iter()
        .map(|(port, endpoint)| (port.to_string(), endpoint.to_string()))
        .collect()
}

/// Fast settings for in-process runs.
pub fn settings() -> Settings {
    Settings::for_test()
}

/// Bind a peer input that a component output can connect to.
pub async fn sink(ctx: &TransportContext, endpoint: &str) -> Port {
    Port::open(ctx, "sink", endpoint, PortRole::Input, &LinkOptions::default())
        .await
        .expect("Failed to bind sink")
}

/// Connect a peer output to a component input.
pub async fn source(ctx: &TransportContext, endpoint: &str) -> Port {
    Port::open(ctx, "source", endpoint, PortRole::Output, &LinkOptions::default())
        .await
        .expect("Failed to connect source")
}

/// Start `component_loop` and return the started component.
pub async fn start<L: ComponentLoop>(
    component_loop: &L,
    ctx: &TransportContext,
    endpoints: &Endpoints,
    settings: &Settings,
) -> Result<Component> {
    Component::start_in(
        &component_loop.spec(),
        endpoints,
        settings,
        ctx,
        Cancellation::new(),
    )
    .await
}

/// Drive a started component on its own task. Resolves to the exit status.
pub fn run<L>(component_loop: L, component: Component) -> JoinHandle<i32>
where
    L: ComponentLoop + 'static,
{
    tokio::spawn(async move {
        let result = component_loop.run(&component).await;
        component.close();
        cli::finish(&component, result)
    })
}

/// Receive the next message as a data packet payload.
pub async fn recv_text(port: &Port) -> String {
    let frames = timeout(WAIT, port.recv())
        .await
        .expect("Timed out waiting for packet")
        .expect("Receive failed");
    let packet = Packet::from_frames(&frames).expect("Not a single IP");
    assert!(packet.is_data(), "Expected a data packet");
    packet.payload_str().into_owned()
}

/// Assert nothing is queued on `port` after a short settle.
pub async fn assert_silent(port: &Port) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        matches!(port.try_recv(), Err(PortError::WouldBlock)),
        "Expected no packet on {}",
        port.name()
    );
}

/// Send a data packet.
pub async fn send_text(port: &Port, text: &str) {
    port.send(Packet::data(Bytes::from(text.to_string())).into_frames())
        .await
        .expect("Send failed");
}
