//! Forwarding paths.
//!
//! Two kinds of long-lived loops move bytes between registered roles:
//!
//! - **Stream forward** — reads from the singular instrument connection,
//!   reassembles exact 20-byte frames, and broadcasts each frame
//!   byte-identical to every display connection.
//! - **Control forward** — one loop per direction; drains available bytes
//!   from each source socket into that source's own line buffer, validates
//!   each complete line as JSON, and fans it out to the opposite role.
//!
//! Both tolerate missing peers (sleep briefly and retry, never terminate)
//! and isolate per-destination write failures: a dead display is closed
//! and removed without aborting the broadcast to the rest.  Losing the
//! stream source is a pure forget-and-wait — buffer and slot are cleared
//! and the loop idles until the client's own reconnect logic brings it
//! back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use rodlink_core::protocol::buffer::{FrameBuffer, LineBuffer};
use rodlink_core::protocol::control::parse_json_line;
use rodlink_core::role::Role;

use crate::conn::RelayConn;
use crate::registry::ConnectionRegistry;

/// Idle wait when a required peer is absent.
const IDLE_RETRY: Duration = Duration::from_millis(200);
/// Read poll on the stream source.
const STREAM_READ_TIMEOUT: Duration = Duration::from_millis(500);
/// Read poll per control source; short because one loop round-robins all
/// sources of its direction.
const CONTROL_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Runs the instrument → displays frame fan-out until shutdown.
pub async fn run_stream_forward(registry: Arc<ConnectionRegistry>, shutdown: Arc<AtomicBool>) {
    let mut frames = FrameBuffer::new();
    let mut source_id: Option<Uuid> = None;
    let mut tmp = [0u8; 2048];

    while !shutdown.load(Ordering::Relaxed) {
        let Some(source) = registry.singular(Role::StreamInstrument) else {
            frames.clear();
            source_id = None;
            tokio::time::sleep(IDLE_RETRY).await;
            continue;
        };
        if source_id != Some(source.id()) {
            // New instrument: a partial frame from its predecessor must
            // never be glued to the new byte stream.
            frames.clear();
            source_id = Some(source.id());
        }

        match source.read_timeout(&mut tmp, STREAM_READ_TIMEOUT).await {
            Ok(None) => continue, // no telemetry this poll
            Ok(Some(0)) | Err(_) => {
                info!(peer = %source.peer(), "stream source lost; waiting for reconnect");
                registry.remove(&source);
                source.close().await;
                frames.clear();
                source_id = None;
                tokio::time::sleep(IDLE_RETRY).await;
                continue;
            }
            Ok(Some(n)) => frames.extend(&tmp[..n]),
        }

        while let Some(frame) = frames.pop_frame() {
            broadcast(&registry, Role::StreamDisplay, &frame).await;
        }
    }
}

/// Runs one direction of the control relay (`from` → `to`) until shutdown.
pub async fn run_control_forward(
    registry: Arc<ConnectionRegistry>,
    from: Role,
    to: Role,
    shutdown: Arc<AtomicBool>,
) {
    let mut buffers: HashMap<Uuid, LineBuffer> = HashMap::new();
    let mut tmp = [0u8; 2048];

    while !shutdown.load(Ordering::Relaxed) {
        let sources = registry.snapshot(from);
        if sources.is_empty() {
            buffers.clear();
            tokio::time::sleep(IDLE_RETRY).await;
            continue;
        }
        // Drop buffers for sources that are gone so they cannot leak or
        // cross-contaminate a reconnecting client.
        buffers.retain(|id, _| sources.iter().any(|c| c.id() == *id));

        for source in &sources {
            match source.read_timeout(&mut tmp, CONTROL_READ_TIMEOUT).await {
                Ok(None) => continue,
                Ok(Some(0)) | Err(_) => {
                    info!(role = %from, peer = %source.peer(), "control peer disconnected");
                    registry.remove(source);
                    source.close().await;
                    buffers.remove(&source.id());
                    continue;
                }
                Ok(Some(n)) => {
                    let buffer = buffers.entry(source.id()).or_default();
                    buffer.extend(&tmp[..n]);
                    while let Some(line) = buffer.pop_line() {
                        if line.is_empty() {
                            continue;
                        }
                        match parse_json_line(&line) {
                            Err(e) => {
                                warn!(
                                    peer = %source.peer(),
                                    "dropping malformed control line: {e}"
                                );
                            }
                            Ok(_) => {
                                let mut framed = line;
                                framed.push(b'\n');
                                broadcast(&registry, to, &framed).await;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Writes `bytes` to every connection registered under `role`.  A failing
/// destination is closed and removed; the rest still receive the payload.
async fn broadcast(registry: &Arc<ConnectionRegistry>, role: Role, bytes: &[u8]) {
    for dest in registry.snapshot(role) {
        if let Err(e) = dest.write_all(bytes).await {
            debug!(role = %role, peer = %dest.peer(), "dropping destination: {e}");
            registry.remove(&dest);
            dest.close().await;
        }
    }
}
