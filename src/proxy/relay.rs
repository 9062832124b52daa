//! Bidirectional byte relay between a client and its backend.
//!
//! # Responsibilities
//! - Copy bytes verbatim in both directions concurrently
//! - Propagate EOF as a write shutdown on the opposite socket
//! - End the whole session once either direction finishes and the other drains
//!
//! # Design Decisions
//! - After one direction ends cleanly the other keeps copying for as long as
//!   bytes move; `drain` bounds inactivity, not total time
//! - A backend that goes quiet after the client half-closed ends the session
//!   with `RelayError::Idle` and the client socket is reset, so a cut-off
//!   response never looks like a clean close
//! - A client that lingers after the backend finished is closed cleanly
//! - An I/O error in either direction is terminal; nothing is retried once
//!   bytes have flowed
//! - Byte counts are kept even when the relay fails
//! - Every suspension point also watches the cancel signal

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::lifecycle::ShutdownSignal;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToBackend,
    ToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToBackend => f.write_str("client->backend"),
            Direction::ToClient => f.write_str("backend->client"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay {direction} failed: {source}")]
    Io {
        direction: Direction,
        #[source]
        source: io::Error,
    },

    #[error("relay {direction} idle for {after:?} after the other side finished")]
    Idle { direction: Direction, after: Duration },

    #[error("relay cancelled")]
    Cancelled,
}

/// Bytes moved by a relay, successful or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub to_backend: u64,
    pub to_client: u64,
}

/// Which side finished first.
enum FirstDone {
    ToBackend(Result<(), RelayError>),
    ToClient(Result<(), RelayError>),
    Cancelled,
}

/// Relay until either direction ends, then drain the other until it ends or
/// stays idle for `drain`.
///
/// Both sockets are closed when this returns, whatever the outcome. The stats
/// count every byte written before the relay stopped.
pub async fn relay(
    client: TcpStream,
    backend: TcpStream,
    drain: Duration,
    cancel: &mut ShutdownSignal,
) -> (RelayStats, Result<(), RelayError>) {
    let (mut client_read, mut client_write) = client.into_split();
    let (mut backend_read, mut backend_write) = backend.into_split();
    let to_backend = AtomicU64::new(0);
    let to_client = AtomicU64::new(0);

    let result = {
        let upstream = copy_half(&mut client_read, &mut backend_write, &to_backend, Direction::ToBackend);
        let downstream = copy_half(&mut backend_read, &mut client_write, &to_client, Direction::ToClient);
        tokio::pin!(upstream);
        tokio::pin!(downstream);

        let first = tokio::select! {
            r = &mut upstream => FirstDone::ToBackend(r),
            r = &mut downstream => FirstDone::ToClient(r),
            _ = cancel.recv() => FirstDone::Cancelled,
        };

        match first {
            FirstDone::Cancelled => Err(RelayError::Cancelled),
            FirstDone::ToBackend(Err(e)) | FirstDone::ToClient(Err(e)) => Err(e),
            FirstDone::ToBackend(Ok(())) => {
                tracing::trace!("Client finished sending, draining backend");
                drain_remaining(downstream, &to_client, Direction::ToClient, drain, cancel).await
            }
            FirstDone::ToClient(Ok(())) => {
                tracing::trace!("Backend finished sending, draining client");
                match drain_remaining(upstream, &to_backend, Direction::ToBackend, drain, cancel).await {
                    // The response is complete; a client holding its socket open loses nothing.
                    Err(RelayError::Idle { .. }) => Ok(()),
                    other => other,
                }
            }
        }
    };

    if let Err(RelayError::Idle { .. }) = &result {
        if let Ok(client) = client_read.reunite(client_write) {
            reset_on_close(&client);
        }
    }

    let stats = RelayStats {
        to_backend: to_backend.load(Ordering::Relaxed),
        to_client: to_client.load(Ordering::Relaxed),
    };
    (stats, result)
}

/// Close with RST instead of FIN when `stream` is dropped.
#[allow(deprecated)]
fn reset_on_close(stream: &TcpStream) {
    if let Err(e) = stream.set_linger(Some(Duration::ZERO)) {
        tracing::debug!(error = %e, "Failed to arm reset on close");
    }
}

/// Wait for `remaining` to finish while it keeps moving bytes.
///
/// Fails with `Idle` once a whole `idle` window passes with no progress on `moved`.
async fn drain_remaining<F>(
    remaining: F,
    moved: &AtomicU64,
    direction: Direction,
    idle: Duration,
    cancel: &mut ShutdownSignal,
) -> Result<(), RelayError>
where
    F: std::future::Future<Output = Result<(), RelayError>>,
{
    tokio::pin!(remaining);
    let mut seen = moved.load(Ordering::Relaxed);
    let mut deadline = Instant::now() + idle;
    loop {
        tokio::select! {
            r = &mut remaining => return r,
            _ = tokio::time::sleep_until(deadline) => {
                let now = moved.load(Ordering::Relaxed);
                if now == seen {
                    tracing::trace!(direction = %direction, idle = ?idle, "Drain went idle, closing session");
                    return Err(RelayError::Idle { direction, after: idle });
                }
                seen = now;
                deadline = Instant::now() + idle;
            }
            _ = cancel.recv() => return Err(RelayError::Cancelled),
        }
    }
}

/// Copy `reader` into `writer` until EOF, then shut the writer down.
///
/// `total` grows with every successful write, partial ones included.
async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: &AtomicU64,
    direction: Direction,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let io_err = |source| RelayError::Io { direction, source };
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        let mut written = 0;
        while written < n {
            let w = writer.write(&buf[written..n]).await.map_err(io_err)?;
            if w == 0 {
                return Err(io_err(io::ErrorKind::WriteZero.into()));
            }
            written += w;
            total.fetch_add(w as u64, Ordering::Relaxed);
        }
    }
    match writer.shutdown().await {
        // Peer already gone: nothing left to signal.
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other.map_err(io_err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use tokio::net::TcpListener;

    /// Connected (local, remote) socket pair over loopback.
    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (a, b) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (a.unwrap(), b.unwrap().0)
    }

    #[tokio::test]
    async fn relays_and_counts_both_directions() {
        let (mut client, client_side) = pair().await;
        let (backend_side, mut backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task =
            tokio::spawn(async move { relay(client_side, backend_side, Duration::from_secs(1), &mut cancel).await });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend.write_all(b"pong!").await.unwrap();
        drop(backend);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"pong!");
        drop(client);

        let (stats, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(stats, RelayStats { to_backend: 4, to_client: 5 });
    }

    #[tokio::test]
    async fn closes_client_when_backend_closes_first() {
        let (mut client, client_side) = pair().await;
        let (backend_side, backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task =
            tokio::spawn(async move { relay(client_side, backend_side, Duration::from_millis(50), &mut cancel).await });

        drop(backend);

        // Client keeps its socket open but still observes EOF.
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(n, 0);

        let (_, result) = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn half_closed_client_receives_response_longer_than_drain_window() {
        const CHUNK: usize = 64 * 1024;
        const CHUNKS: usize = 32;

        let (mut client, client_side) = pair().await;
        let (backend_side, mut backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task = tokio::spawn(async move {
            relay(client_side, backend_side, Duration::from_millis(300), &mut cancel).await
        });

        // Backend reads the whole request, then streams its answer slowly.
        let backend_task = tokio::spawn(async move {
            let mut request = Vec::new();
            backend.read_to_end(&mut request).await.unwrap();
            assert_eq!(request, b"GET /segment");
            let chunk = vec![7u8; CHUNK];
            for _ in 0..CHUNKS {
                backend.write_all(&chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(60)).await;
            }
            backend.shutdown().await.unwrap();
        });

        client.write_all(b"GET /segment").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), client.read_to_end(&mut received))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.len(), CHUNK * CHUNKS);
        backend_task.await.unwrap();

        let (stats, result) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(stats, RelayStats { to_backend: 12, to_client: (CHUNK * CHUNKS) as u64 });
    }

    #[tokio::test]
    async fn stalled_backend_after_half_close_is_not_a_clean_close() {
        let (mut client, client_side) = pair().await;
        let (backend_side, mut backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task =
            tokio::spawn(async move { relay(client_side, backend_side, Duration::from_millis(100), &mut cancel).await });

        client.write_all(b"GET /segment").await.unwrap();
        client.shutdown().await.unwrap();
        let mut request = Vec::new();
        backend.read_to_end(&mut request).await.unwrap();
        backend.write_all(b"partial").await.unwrap();

        // Backend never finishes; the relay gives up and resets the client.
        let (stats, result) = tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            Err(RelayError::Idle {
                direction: Direction::ToClient,
                ..
            })
        ));
        assert_eq!(stats.to_client, 7);

        let mut received = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(1), client.read_to_end(&mut received))
            .await
            .unwrap();
        assert!(read.is_err(), "client saw a reset, not a clean EOF");
        drop(backend);
    }

    #[tokio::test]
    async fn counts_bytes_moved_before_a_failure() {
        let (mut client, client_side) = pair().await;
        let (backend_side, mut backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task = tokio::spawn(async move { relay(client_side, backend_side, Duration::from_secs(5), &mut cancel).await });

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        backend.read_exact(&mut buf).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let (stats, result) = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(RelayError::Cancelled)));
        assert_eq!(stats.to_backend, 5);
    }

    #[tokio::test]
    async fn cancel_ends_idle_relay() {
        let (_client, client_side) = pair().await;
        let (backend_side, _backend) = pair().await;
        let shutdown = Shutdown::new();
        let mut cancel = shutdown.subscribe();
        let task = tokio::spawn(async move { relay(client_side, backend_side, Duration::from_secs(5), &mut cancel).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let (_, result) = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(result, Err(RelayError::Cancelled)));
    }
}
