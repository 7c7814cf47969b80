//! The datagram transport seam and its UDP implementation.
//!
//! The session state machine never touches a socket directly: it talks to
//! the [`Transport`] trait, which models exactly what the protocol needs
//! from the network – best-effort send to a pre-configured remote endpoint,
//! a bounded blocking receive that reports a timeout as an *empty read*
//! rather than an error, and a way to configure that timeout.
//!
//! The trait boundary keeps the state machine testable: unit tests mock it
//! with `mockall`, and integration tests drive the whole session against a
//! scripted in-memory transport.
//!
//! # Receive timeout
//!
//! The background listener re-checks the session status between reads, so
//! the receive call must not block forever.  [`UdpTransport`] bounds each
//! `recv` with [`tokio::time::timeout`]; on expiry it returns an empty
//! buffer, which the listener treats as an expected steady-state event.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Errors that can occur at the socket level.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local UDP socket could not be bound.
    #[error("failed to bind local UDP socket: {0}")]
    Bind(#[source] std::io::Error),

    /// The remote endpoint could not be resolved or associated.
    #[error("failed to set remote endpoint {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A datagram could not be sent.
    #[error("failed to send datagram: {0}")]
    Send(#[source] std::io::Error),
}

/// What the session core needs from the network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Best-effort send of one datagram to the pre-configured remote.
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Receives one datagram of at most `max_size` bytes.
    ///
    /// Returns an empty buffer on timeout; a mere timeout is never an error.
    async fn receive(&self, max_size: usize) -> Vec<u8>;

    /// Configures the receive timeout used by [`Transport::receive`].
    async fn set_receive_timeout(&self, seconds: u64, microseconds: u32)
        -> Result<(), TransportError>;
}

/// [`Transport`] implementation over a `tokio` UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    recv_timeout: Mutex<Duration>,
}

impl UdpTransport {
    /// Default receive timeout until [`Transport::set_receive_timeout`] is
    /// called.
    pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(500);

    /// Binds an ephemeral local socket and associates it with the remote
    /// endpoint, so that plain `send`/`recv` talk to that endpoint only.
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(TransportError::Bind)?;
        let endpoint = format!("{host}:{port}");
        socket
            .connect(endpoint.as_str())
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        info!("UDP transport configured for {endpoint}");
        Ok(Self {
            socket,
            recv_timeout: Mutex::new(Self::DEFAULT_RECV_TIMEOUT),
        })
    }

    fn current_timeout(&self) -> Duration {
        *self.recv_timeout.lock().expect("timeout lock poisoned")
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.socket
            .send(bytes)
            .await
            .map(|_| ())
            .map_err(TransportError::Send)
    }

    async fn receive(&self, max_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; max_size];
        match tokio::time::timeout(self.current_timeout(), self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                buf
            }
            Ok(Err(e)) => {
                // Receive errors surface as empty reads: the listener treats
                // them like timeouts and keeps polling.
                debug!("recv error treated as empty read: {e}");
                Vec::new()
            }
            Err(_elapsed) => Vec::new(),
        }
    }

    async fn set_receive_timeout(
        &self,
        seconds: u64,
        microseconds: u32,
    ) -> Result<(), TransportError> {
        let timeout = Duration::new(seconds, microseconds.saturating_mul(1_000));
        *self.recv_timeout.lock().expect("timeout lock poisoned") = timeout;
        debug!(?timeout, "receive timeout updated");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
