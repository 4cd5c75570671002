//! Walk component end to end.

use std::fs;
use std::path::Path;

use bytes::Bytes;
use tokio::time::timeout;

use flowport::components::walk::{Walk, DIR_PORT, ERR_PORT, FILE_PORT};
use flowport::transport::TransportContext;
use flowport::Packet;

use crate::common::*;

fn populate(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("b.txt"), "b").unwrap();
    fs::write(root.join("a.txt"), "a").unwrap();
    fs::write(root.join("sub/c.txt"), "c").unwrap();
}

fn expected(root: &Path) -> Vec<String> {
    ["a.txt", "b.txt", "sub/c.txt"]
        .iter()
        .map(|name| root.join(name).display().to_string())
        .collect()
}

#[tokio::test]
async fn test_walk_sends_files_and_continues_after_error() {
    let dir = tempfile::TempDir::new().unwrap();
    populate(dir.path());

    let ctx = TransportContext::new();
    let files = sink(&ctx, "inproc://walk-file").await;
    let errors = sink(&ctx, "inproc://walk-err").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://walk-dir"),
            (FILE_PORT, "inproc://walk-file"),
            (ERR_PORT, "inproc://walk-err"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let running = run(Walk, component);
    let dirs = source(&ctx, "inproc://walk-dir").await;

    let root = dir.path().display().to_string();
    send_text(&dirs, &root).await;
    let mut received = Vec::new();
    for _ in 0..3 {
        received.push(recv_text(&files).await);
    }
    assert_eq!(received, expected(dir.path()));

    let missing = dir.path().join("missing").display().to_string();
    send_text(&dirs, &missing).await;
    let error = recv_text(&errors).await;
    assert!(error.contains("missing"));
    assert_silent(&errors).await;

    send_text(&dirs, &root).await;
    let mut again = Vec::new();
    for _ in 0..3 {
        again.push(recv_text(&files).await);
    }
    assert_eq!(again, expected(dir.path()));

    drop(files);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_walk_discards_malformed_input() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("only.txt"), "x").unwrap();

    let ctx = TransportContext::new();
    let files = sink(&ctx, "inproc://malformed-file").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://malformed-dir"),
            (FILE_PORT, "inproc://malformed-file"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let running = run(Walk, component);
    let dirs = source(&ctx, "inproc://malformed-dir").await;

    let root = dir.path().display().to_string();
    dirs.send(vec![Bytes::from(root.clone())]).await.unwrap();
    assert_silent(&files).await;

    dirs.send(Packet::open("batch").into_frames()).await.unwrap();
    assert_silent(&files).await;

    send_text(&dirs, &root).await;
    assert_eq!(
        recv_text(&files).await,
        dir.path().join("only.txt").display().to_string()
    );

    dirs.close();
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}

#[tokio::test]
async fn test_walk_error_without_err_port_keeps_running() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join("f.txt"), "f").unwrap();

    let ctx = TransportContext::new();
    let files = sink(&ctx, "inproc://noerr-file").await;

    let component = start(
        &Walk,
        &ctx,
        &endpoints(&[
            (DIR_PORT, "inproc://noerr-dir"),
            (FILE_PORT, "inproc://noerr-file"),
        ]),
        &settings(),
    )
    .await
    .unwrap();
    let running = run(Walk, component);
    let dirs = source(&ctx, "inproc://noerr-dir").await;

    send_text(&dirs, "/definitely/not/here").await;
    send_text(&dirs, &dir.path().display().to_string()).await;

    assert_eq!(
        recv_text(&files).await,
        dir.path().join("f.txt").display().to_string()
    );

    drop(files);
    assert_eq!(timeout(WAIT, running).await.unwrap().unwrap(), 0);
}
