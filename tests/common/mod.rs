//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use dash_balancer::config::BalancerConfig;
use dash_balancer::lifecycle::Shutdown;
use dash_balancer::load_balancer::BackendRegistry;
use dash_balancer::net::{ConnectionTracker, Listener};
use dash_balancer::proxy::BalancerServer;
use dash_balancer::telemetry::MemoryBroker;

/// Start a backend that echoes every byte back until the client closes.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

/// Start a backend that writes `greeting` and closes straight away.
pub async fn start_closing_backend(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(greeting).await;
            let _ = socket.shutdown().await;
        }
    });
    addr
}

/// Start a backend that answers every connection with its own address, then closes.
pub async fn start_naming_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = socket.write_all(addr.to_string().as_bytes()).await;
                let _ = socket.shutdown().await;
                let mut sink = [0u8; 64];
                let _ = socket.read(&mut sink).await;
            });
        }
    });
    addr
}

/// An address nothing listens on: connections to it are refused.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Configuration tuned for fast tests: short thresholds, no exporters.
pub fn test_config(backends: &[SocketAddr]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backends = backends.iter().map(|a| a.to_string()).collect();
    config.telemetry.sweep_interval_ms = 20;
    config.telemetry.staleness_threshold_ms = 150;
    config.telemetry.unreachable_threshold_ms = 300;
    config.telemetry.reconnect_base_delay_ms = 10;
    config.telemetry.reconnect_max_delay_ms = 50;
    config.dial.connect_timeout_ms = 500;
    config.session.drain_timeout_ms = 200;
    config.session.shutdown_grace_secs = 1;
    config.observability.metrics_enabled = false;
    config
}

/// A balancer running on a loopback port with an in-process broker.
pub struct TestBalancer {
    pub addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub tracker: ConnectionTracker,
    pub broker: MemoryBroker,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestBalancer {
    pub async fn start(config: BalancerConfig) -> Self {
        let broker = MemoryBroker::new();
        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = BalancerServer::new(config);
        let registry = server.registry();
        let tracker = server.tracker();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(listener, broker.clone(), shutdown.subscribe()));

        Self {
            addr,
            registry,
            tracker,
            broker,
            shutdown,
            handle,
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("balancer stops in time")
            .unwrap()
            .unwrap();
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
