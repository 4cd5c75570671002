//! Ticker component end to end.

use flowport::components::ticker::{Ticker, INTERVAL_PORT, OUT_PORT};
use flowport::transport::TransportContext;

use tokio::time::timeout;

use crate::common::*;

#[tokio::test]
async fn test_ticker_emits_timestamps_after_interval_ip() {
    let ctx = TransportContext::new();
    let ticks = sink(&ctx, "inproc://ticker-out").await;

    let component = start(
        &Ticker,
        &ctx,
        &endpoints(&[
            (INTERVAL_PORT, "inproc://ticker-interval"),
            (OUT_PORT, "inproc://ticker-out"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let running = run(Ticker, component);

    let config = source(&ctx, "inproc://ticker-interval").await;
    send_text(&config, "not a duration").await;
    send_text(&config, "20ms").await;

    let first: u64 = recv_text(&ticks).await.parse().unwrap();
    let second: u64 = recv_text(&ticks).await.parse().unwrap();
    assert!(second >= first);
    assert!(first > 1_577_836_800);

    drop(ticks);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_ticker_ignores_malformed_config() {
    let ctx = TransportContext::new();
    let ticks = sink(&ctx, "inproc://ticker-bad-out").await;

    let component = start(
        &Ticker,
        &ctx,
        &endpoints(&[
            (INTERVAL_PORT, "inproc://ticker-bad-interval"),
            (OUT_PORT, "inproc://ticker-bad-out"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let cancel = component.cancellation().clone();
    let running = run(Ticker, component);

    let config = source(&ctx, "inproc://ticker-bad-interval").await;
    config
        .send(vec![bytes::Bytes::from_static(b"20ms")])
        .await
        .unwrap();
    send_text(&config, "0s").await;

    assert_silent(&ticks).await;

    cancel.trigger(flowport::CancelReason::Requested);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}
