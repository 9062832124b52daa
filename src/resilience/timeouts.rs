//! Timeout enforcement for backend dials.
//!
//! # Responsibilities
//! - Bound every backend connect by the configured connect timeout
//! - Keep timeouts distinct from refusals so metrics can tell them apart

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

use crate::load_balancer::backend::BackendId;

#[derive(Debug, Error)]
pub enum DialError {
    #[error("connect to {backend} timed out after {after:?}")]
    Timeout { backend: BackendId, after: Duration },

    #[error("connect to {backend} failed: {source}")]
    Io {
        backend: BackendId,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            DialError::Timeout { .. } => "timeout",
            DialError::Io { source, .. } if source.kind() == io::ErrorKind::ConnectionRefused => "refused",
            DialError::Io { .. } => "io",
        }
    }

    pub fn backend(&self) -> &BackendId {
        match self {
            DialError::Timeout { backend, .. } | DialError::Io { backend, .. } => backend,
        }
    }
}

/// Open a TCP connection to `backend`, giving up after `timeout`.
pub async fn connect_with_timeout(backend: &BackendId, timeout: Duration) -> Result<TcpStream, DialError> {
    match tokio::time::timeout(timeout, TcpStream::connect(backend.as_str())).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(DialError::Io {
            backend: backend.clone(),
            source,
        }),
        Err(_) => Err(DialError::Timeout {
            backend: backend.clone(),
            after: timeout,
        }),
    }
}
