//! One accepted relay connection.
//!
//! After the accept loop has validated the handshake it wraps the socket in
//! a [`RelayConn`] and hands it to the registry.  The read and write halves
//! live behind separate async mutexes because the two control-forward
//! directions may read from and write to the same socket concurrently; the
//! registry lock is *never* held across any of this I/O — forwarding loops
//! copy `Arc<RelayConn>` handles out first.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use rodlink_core::net::stream::ServerStream;
use rodlink_core::role::Role;

/// An accepted, handshaken, registered (or about-to-be-registered)
/// connection.
pub struct RelayConn {
    id: Uuid,
    role: Role,
    peer: SocketAddr,
    reader: Mutex<ReadHalf<ServerStream>>,
    writer: Mutex<WriteHalf<ServerStream>>,
    closed: AtomicBool,
}

impl RelayConn {
    pub fn new(stream: ServerStream, role: Role, peer: SocketAddr) -> Arc<Self> {
        let (reader, writer) = tokio::io::split(stream);
        Arc::new(Self {
            id: Uuid::new_v4(),
            role,
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        })
    }

    /// Identity used by the registry to match a specific connection on
    /// removal.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Reads into `buf`, waiting at most `wait`.
    ///
    /// Returns `Ok(None)` on timeout (no data yet — the normal idle case)
    /// and `Ok(Some(0))` when the peer has closed.
    ///
    /// # Errors
    ///
    /// Propagates socket read errors.
    pub async fn read_timeout(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> std::io::Result<Option<usize>> {
        if self.is_closed() {
            return Ok(Some(0));
        }
        let mut reader = self.reader.lock().await;
        match timeout(wait, reader.read(buf)).await {
            Err(_) => Ok(None),
            Ok(result) => result.map(Some),
        }
    }

    /// Writes all of `bytes`.
    ///
    /// # Errors
    ///
    /// Fails with `NotConnected` if this connection was already closed, or
    /// with the underlying socket error.
    pub async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        if self.is_closed() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "connection already closed",
            ));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await
    }

    /// Shuts the connection down.  Idempotent: the first caller performs
    /// the write-side shutdown (so the peer observes EOF), later callers
    /// are no-ops.  The descriptor itself is released when the last
    /// `Arc<RelayConn>` drops.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %self.peer, "shutdown on already-dead socket: {e}");
            }
        }
    }
}

impl std::fmt::Debug for RelayConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConn")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodlink_core::net::stream::MaybeTls;
    use tokio::net::{TcpListener, TcpStream};

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async {
                listener.accept().await.unwrap()
            });
        (client.unwrap(), server)
    }

    async fn relay_conn(role: Role) -> (Arc<RelayConn>, TcpStream) {
        let (client, server) = tcp_pair().await;
        let peer = server.peer_addr().unwrap();
        (RelayConn::new(MaybeTls::Plain(server), role, peer), client)
    }

    #[tokio::test]
    async fn test_read_timeout_returns_none_when_idle() {
        let (conn, _client) = relay_conn(Role::StreamInstrument).await;
        let mut buf = [0u8; 64];
        let result = conn
            .read_timeout(&mut buf, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_read_timeout_returns_data() {
        let (conn, mut client) = relay_conn(Role::StreamInstrument).await;
        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 64];
        let n = conn
            .read_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_read_reports_peer_close_as_zero() {
        let (conn, client) = relay_conn(Role::StreamInstrument).await;
        drop(client);
        let mut buf = [0u8; 64];
        let result = conn
            .read_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, Some(0));
    }

    #[tokio::test]
    async fn test_close_makes_peer_observe_eof() {
        let (conn, mut client) = relay_conn(Role::StreamDisplay).await;
        conn.close().await;
        let mut buf = [0u8; 8];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "evicted peer must read EOF");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _client) = relay_conn(Role::StreamDisplay).await;
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_write_after_close_fails_without_panicking() {
        let (conn, _client) = relay_conn(Role::StreamDisplay).await;
        conn.close().await;
        let err = conn.write_all(b"frame").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    }
}
