//! Byte transparency across real sockets.

use bytes::Bytes;
use tokio::time::timeout;

use flowport::transport::{LinkOptions, TransportContext};
use flowport::{is_data_packet, Packet, Port, PortRole};

use crate::common::WAIT;

async fn roundtrip(ctx: &TransportContext, input: &Port, endpoint: &str) {
    let output = Port::open(ctx, "out", endpoint, PortRole::Output, &LinkOptions::default())
        .await
        .unwrap();

    let payloads = vec![
        Bytes::from_static(b"a"),
        Bytes::from_static("∆ unicode ✓".as_bytes()),
        Bytes::from((0..=255u8).collect::<Vec<_>>()),
        Bytes::from(vec![0x5Au8; 2 * 1024 * 1024]),
    ];
    for payload in &payloads {
        output
            .send(Packet::data(payload.clone()).into_frames())
            .await
            .unwrap();
    }
    for payload in &payloads {
        let frames = timeout(WAIT, input.recv()).await.unwrap().unwrap();
        assert!(is_data_packet(&frames));
        assert_eq!(&frames[1], payload);
    }
}

#[tokio::test]
async fn test_tcp_payloads_roundtrip() {
    let ctx = TransportContext::new();
    let input = Port::open(
        &ctx,
        "in",
        "tcp://127.0.0.1:0",
        PortRole::Input,
        &LinkOptions::default(),
    )
    .await
    .unwrap();
    let endpoint = input.local_endpoint().to_string();

    roundtrip(&ctx, &input, &endpoint).await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_ipc_payloads_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let endpoint = format!("ipc://{}", dir.path().join("walk.sock").display());

    let ctx = TransportContext::new();
    let input = Port::open(&ctx, "in", &endpoint, PortRole::Input, &LinkOptions::default())
        .await
        .unwrap();

    roundtrip(&ctx, &input, &endpoint).await;
}

#[tokio::test]
async fn test_separate_contexts_meet_over_tcp() {
    let server_ctx = TransportContext::new();
    let client_ctx = TransportContext::new();
    let input = Port::open(
        &server_ctx,
        "in",
        "tcp://127.0.0.1:0",
        PortRole::Input,
        &LinkOptions::default(),
    )
    .await
    .unwrap();
    let endpoint = input.local_endpoint().to_string();

    roundtrip(&client_ctx, &input, &endpoint).await;
}
