//! Dial failure handling: retries against other backends, bounded attempts.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

/// Wait for the balancer to close `client`, failing if it hangs.
async fn assert_closed_promptly(mut client: TcpStream) {
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(3), client.read_to_end(&mut buf))
        .await
        .expect("unroutable session closed without hanging");
    // Closed cleanly or reset: either way nothing was forwarded.
    if let Ok(n) = read {
        assert_eq!(n, 0);
    }
}

#[tokio::test]
async fn session_reaches_last_live_backend() {
    let backends = [
        common::refused_addr().await,
        common::refused_addr().await,
        common::start_echo_backend().await,
    ];
    let mut config = common::test_config(&backends);
    config.telemetry.enabled = false;
    config.dial.max_attempts = 3;
    let balancer = common::TestBalancer::start(config).await;

    for _ in 0..5 {
        let mut client = TcpStream::connect(balancer.addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(3), client.read_exact(&mut buf))
            .await
            .expect("session routed to live backend")
            .unwrap();
        assert_eq!(&buf, b"hello");
    }

    balancer.stop().await;
}

#[tokio::test]
async fn attempts_are_bounded() {
    // Round-robin starts at the first backend and skips tried ones, so with
    // two attempts the first session only ever dials refusing backends.
    let backends = [
        common::refused_addr().await,
        common::refused_addr().await,
        common::refused_addr().await,
        common::start_echo_backend().await,
    ];
    let mut config = common::test_config(&backends);
    config.telemetry.enabled = false;
    config.dial.max_attempts = 2;
    let balancer = common::TestBalancer::start(config).await;

    let client = TcpStream::connect(balancer.addr).await.unwrap();
    assert_closed_promptly(client).await;

    balancer.stop().await;
}

#[tokio::test]
async fn zero_live_backends_closes_client() {
    let backends = [common::refused_addr().await, common::refused_addr().await];
    let mut config = common::test_config(&backends);
    config.telemetry.enabled = false;
    config.dial.max_attempts = 5;
    let balancer = common::TestBalancer::start(config).await;

    let client = TcpStream::connect(balancer.addr).await.unwrap();
    assert_closed_promptly(client).await;

    let tracker = balancer.tracker.clone();
    common::eventually(|| tracker.active_count() == 0).await;
    balancer.stop().await;
}
