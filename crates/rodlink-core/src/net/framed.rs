//! Framed client connection to the control-box relay.
//!
//! A `FramedConnection` is what the instrumentation and visualization boxes
//! hold: it opens the TCP socket (optionally wrapped in mutual TLS), sends
//! the role handshake line, and then speaks one of the two channel framings
//! — newline-delimited JSON or fixed-size binary frames.  Reads buffer
//! partial data across calls, because a TCP read may return a fraction of a
//! frame or several lines glued together.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::net::backoff::{sleep_cancellable, BackoffPolicy};
use crate::net::stream::{ClientStream, MaybeTls};
use crate::protocol::frame::{StreamFrame, FRAME_LEN};
use crate::role::Role;

/// Errors that can occur while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect to {host}:{port} timed out after {timeout:?}")]
    Timeout {
        host: String,
        port: u16,
        timeout: Duration,
    },
    #[error("connect to {host}:{port} failed: {source}")]
    Io {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connect cancelled by shutdown")]
    Cancelled,
}

/// TLS half of [`ConnectSettings`]: the connector carries this box's client
/// certificate, `server_name` is the SNI/verification name for the relay.
#[derive(Clone)]
pub struct ClientTls {
    pub connector: TlsConnector,
    pub server_name: ServerName<'static>,
}

/// Everything needed to reach one relay listener.
#[derive(Clone)]
pub struct ConnectSettings {
    pub host: String,
    pub port: u16,
    pub role: Role,
    pub connect_timeout: Duration,
    pub tls: Option<ClientTls>,
}

impl ConnectSettings {
    pub fn new(host: impl Into<String>, port: u16, role: Role) -> Self {
        Self {
            host: host.into(),
            port,
            role,
            connect_timeout: Duration::from_secs(5),
            tls: None,
        }
    }
}

/// A connected, handshaken channel to the relay.
pub struct FramedConnection {
    stream: ClientStream,
    role: Role,
    peer: SocketAddr,
    recv_buf: Vec<u8>,
    closed: bool,
}

impl FramedConnection {
    /// Opens the TCP socket, performs the optional TLS handshake, and sends
    /// the role line.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if any step fails; no partially-handshaken
    /// connection is ever returned.
    pub async fn connect(settings: &ConnectSettings) -> Result<Self, ConnectError> {
        let tcp = timeout(
            settings.connect_timeout,
            TcpStream::connect((settings.host.as_str(), settings.port)),
        )
        .await
        .map_err(|_| ConnectError::Timeout {
            host: settings.host.clone(),
            port: settings.port,
            timeout: settings.connect_timeout,
        })?
        .map_err(|source| ConnectError::Io {
            host: settings.host.clone(),
            port: settings.port,
            source,
        })?;
        let peer = tcp.peer_addr().map_err(|source| ConnectError::Io {
            host: settings.host.clone(),
            port: settings.port,
            source,
        })?;

        let mut stream = match &settings.tls {
            Some(tls) => {
                let tls_stream = tls
                    .connector
                    .connect(tls.server_name.clone(), tcp)
                    .await
                    .map_err(|source| ConnectError::Tls {
                        host: settings.host.clone(),
                        source,
                    })?;
                MaybeTls::Tls(Box::new(tls_stream))
            }
            None => MaybeTls::Plain(tcp),
        };

        // Application-level handshake: the role string identifies this
        // connection to the relay's accept loop.
        let mut line = settings.role.as_wire().as_bytes().to_vec();
        line.push(b'\n');
        stream
            .write_all(&line)
            .await
            .map_err(|source| ConnectError::Io {
                host: settings.host.clone(),
                port: settings.port,
                source,
            })?;

        debug!(role = %settings.role, %peer, "connected and handshaken");
        Ok(Self {
            stream,
            role: settings.role,
            peer,
            recv_buf: Vec::with_capacity(1024),
            closed: false,
        })
    }

    /// Retries [`connect`](Self::connect) with exponentially growing delays
    /// (1s, 2s, 4s, … capped at 30s by the default policy).
    ///
    /// `max_attempts = None` retries forever.  The shutdown flag is checked
    /// between attempts and during every sleep, so cancellation takes
    /// effect within one poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Cancelled`] on shutdown, or the last connect
    /// error once `max_attempts` is exhausted.
    pub async fn connect_with_backoff(
        settings: &ConnectSettings,
        policy: BackoffPolicy,
        max_attempts: Option<u32>,
        shutdown: &Arc<AtomicBool>,
    ) -> Result<Self, ConnectError> {
        let mut attempt = 0u32;
        loop {
            if shutdown.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(ConnectError::Cancelled);
            }
            match Self::connect(settings).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(
                        role = %settings.role,
                        attempt = attempt + 1,
                        "connect failed: {e}"
                    );
                    if let Some(max) = max_attempts {
                        if attempt + 1 >= max {
                            return Err(e);
                        }
                    }
                    if !sleep_cancellable(policy.delay(attempt), shutdown).await {
                        return Err(ConnectError::Cancelled);
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one JSON value as a `\n`-terminated line.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_json<T: Serialize>(&mut self, msg: &T) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(msg).map_err(std::io::Error::other)?;
        line.push(b'\n');
        self.stream.write_all(&line).await
    }

    /// Attempts to receive one JSON line, waiting at most `poll` for new
    /// bytes.
    ///
    /// Returns `Ok(None)` when no complete line is available yet — that is
    /// the normal idle case, not an error.  Lines that fail to parse as
    /// JSON are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only for a closed or failed socket.
    pub async fn receive_json(
        &mut self,
        poll: Duration,
    ) -> std::io::Result<Option<serde_json::Value>> {
        let mut read_done = false;
        loop {
            while let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_slice(&line) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        debug!("discarding non-JSON control line: {e}");
                    }
                }
            }
            if read_done {
                return Ok(None);
            }
            let mut tmp = [0u8; 1024];
            match timeout(poll, self.stream.read(&mut tmp)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "control connection closed by peer",
                    ))
                }
                Ok(Ok(n)) => {
                    self.recv_buf.extend_from_slice(&tmp[..n]);
                    read_done = true;
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Sends raw bytes unmodified.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_binary(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Sends one encoded telemetry frame.
    ///
    /// # Errors
    ///
    /// Propagates socket write errors.
    pub async fn send_frame(&mut self, frame: &StreamFrame) -> std::io::Result<()> {
        self.send_binary(&frame.encode()).await
    }

    /// Blocks until exactly `n` bytes are assembled from possibly
    /// fragmented reads, or the deadline passes.
    ///
    /// # Errors
    ///
    /// `TimedOut` if the deadline passes first, `UnexpectedEof` if the peer
    /// closes, or the underlying socket error.
    pub async fn receive_exact(&mut self, n: usize, wait: Duration) -> std::io::Result<Vec<u8>> {
        let deadline = Instant::now() + wait;
        let mut tmp = [0u8; 1024];
        while self.recv_buf.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("timed out waiting for {n} bytes"),
                ));
            }
            match timeout(remaining, self.stream.read(&mut tmp)).await {
                Err(_) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("timed out waiting for {n} bytes"),
                    ))
                }
                Ok(Ok(0)) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "stream connection closed by peer",
                    ))
                }
                Ok(Ok(k)) => self.recv_buf.extend_from_slice(&tmp[..k]),
                Ok(Err(e)) => return Err(e),
            }
        }
        Ok(self.recv_buf.drain(..n).collect())
    }

    /// Receives and decodes one telemetry frame.
    ///
    /// # Errors
    ///
    /// As [`receive_exact`](Self::receive_exact).
    pub async fn receive_frame(&mut self, wait: Duration) -> std::io::Result<StreamFrame> {
        let bytes = self.receive_exact(FRAME_LEN, wait).await?;
        StreamFrame::decode(&bytes).map_err(std::io::Error::other)
    }

    /// Shuts the connection down: flushes and closes the write direction;
    /// the descriptor itself is released on drop.  Safe to call more than
    /// once.
    pub async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.stream.shutdown().await {
                debug!("shutdown on already-dead connection: {e}");
            }
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.recv_buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.recv_buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}
