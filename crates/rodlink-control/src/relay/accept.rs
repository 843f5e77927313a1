//! Accept path: handshake validation and admission gating.
//!
//! Each listener runs one accept loop.  Every accepted socket walks
//!
//! ```text
//! Accepted → HandshakeOk → RoleValidated → AuthorizationChecked → Registered
//! ```
//!
//! and any failure closes the socket *silently*: the stream channel must
//! stay strictly binary and the control channel strictly JSON, so no
//! acknowledgment or rejection text is ever written back.  Rejected peers
//! simply observe the connection close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use rodlink_core::net::stream::{MaybeTls, ServerStream};
use rodlink_core::role::{Channel, Role};
use tokio_rustls::TlsAcceptor;

use crate::conn::RelayConn;
use crate::registry::ConnectionRegistry;
use crate::state::SharedDeviceState;

/// Accept poll interval, so the loop stays responsive to shutdown.
const ACCEPT_POLL: Duration = Duration::from_secs(1);
/// Deadline for the client to deliver its role line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Longest handshake line we will read before giving up.
const MAX_HANDSHAKE_LEN: usize = 128;

/// Runs one listener's accept loop until shutdown.  Closing the listener's
/// socket (dropping it at shutdown) is a normal exit, not an error.
pub async fn run_accept_loop(
    listener: TcpListener,
    channel: Channel,
    tls: Option<TlsAcceptor>,
    registry: Arc<ConnectionRegistry>,
    state: Arc<SharedDeviceState>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!(?channel, "accept loop retiring");
            return;
        }
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Err(_) => {} // poll timeout — re-check the shutdown flag
            Ok(Err(e)) => {
                // Transient accept failure (e.g. fd exhaustion); keep serving.
                error!(?channel, "accept error: {e}");
            }
            Ok(Ok((stream, peer))) => {
                let tls = tls.clone();
                let registry = Arc::clone(&registry);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    admit_connection(stream, peer, channel, tls, registry, state).await;
                });
            }
        }
    }
}

/// Walks one accepted socket through handshake, role validation, and
/// authorization gating.  Every rejection path drops the socket without
/// writing a byte.
async fn admit_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    channel: Channel,
    tls: Option<TlsAcceptor>,
    registry: Arc<ConnectionRegistry>,
    state: Arc<SharedDeviceState>,
) {
    let mut stream: ServerStream = match tls {
        Some(acceptor) => match acceptor.accept(tcp).await {
            Ok(tls_stream) => MaybeTls::Tls(Box::new(tls_stream)),
            Err(e) => {
                warn!(%peer, "TLS handshake failed: {e}");
                return;
            }
        },
        None => MaybeTls::Plain(tcp),
    };

    let role_line = match timeout(HANDSHAKE_TIMEOUT, read_role_line(&mut stream)).await {
        Err(_) => {
            debug!(%peer, "handshake timed out");
            return;
        }
        Ok(None) => {
            debug!(%peer, "connection closed before handshake completed");
            return;
        }
        Ok(Some(line)) => line,
    };

    let Some(role) = Role::from_wire(role_line.trim()) else {
        warn!(%peer, role = %role_line, "unknown handshake role");
        return;
    };
    if role.channel() != channel {
        warn!(%peer, %role, ?channel, "role not valid on this listener");
        return;
    }
    if role.is_display() && !state.display_allowed() {
        warn!(%peer, %role, "display admission denied: not authorized");
        return;
    }

    let conn = RelayConn::new(stream, role, peer);
    if let Some(evicted) = registry.register(conn) {
        info!(%role, evicted_peer = %evicted.peer(), "evicting superseded connection");
        evicted.close().await;
    }
    info!(%role, %peer, "client registered");
}

/// Reads the handshake line one byte at a time, so no bytes beyond the
/// delimiter are consumed from the channel framing that follows.
///
/// Returns `None` on EOF, read error, or an over-long line.
async fn read_role_line<S: AsyncRead + Unpin>(stream: &mut S) -> Option<String> {
    let mut line = Vec::with_capacity(32);
    loop {
        let mut byte = [0u8; 1];
        match stream.read(&mut byte).await {
            Ok(0) => return None,
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if line.len() >= MAX_HANDSHAKE_LEN {
                    return None;
                }
                line.push(byte[0]);
            }
            Err(_) => return None,
        }
    }
    String::from_utf8(line).ok()
}
