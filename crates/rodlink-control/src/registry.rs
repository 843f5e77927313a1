//! Thread-safe directory of registered connections, keyed by role.
//!
//! Instrument roles hold at most one connection — registering a newcomer
//! evicts the previous holder (last-writer-wins).  Display roles hold a set
//! that the forwarding loops broadcast to.
//!
//! The whole directory sits behind a single mutex, but no I/O ever happens
//! under it: every accessor copies `Arc<RelayConn>` handles out and
//! releases the lock, and `register` hands the evicted connection back to
//! the caller to close outside the lock.
//!
//! Note on revocation: authorization gates *admission* only.  Display
//! connections already registered stay attached when `display_allowed`
//! later drops to false; the accept loop simply stops admitting new ones.

use std::sync::{Arc, Mutex};

use rodlink_core::role::Role;

use crate::conn::RelayConn;

#[derive(Default)]
struct Slots {
    stream_instrument: Option<Arc<RelayConn>>,
    control_instrument: Option<Arc<RelayConn>>,
    stream_displays: Vec<Arc<RelayConn>>,
    control_displays: Vec<Arc<RelayConn>>,
}

/// Role-keyed connection directory.
#[derive(Default)]
pub struct ConnectionRegistry {
    slots: Mutex<Slots>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `conn` under its role.
    ///
    /// For a singular role the previous holder, if any, is returned so the
    /// caller can close it after the lock is released.  For a set role the
    /// connection is appended and `None` is returned.
    #[must_use = "the evicted connection must be closed by the caller"]
    pub fn register(&self, conn: Arc<RelayConn>) -> Option<Arc<RelayConn>> {
        let mut slots = self.lock();
        match conn.role() {
            Role::StreamInstrument => slots.stream_instrument.replace(conn),
            Role::ControlInstrument => slots.control_instrument.replace(conn),
            Role::StreamDisplay => {
                slots.stream_displays.push(conn);
                None
            }
            Role::ControlDisplay => {
                slots.control_displays.push(conn);
                None
            }
        }
    }

    /// Removes `conn` from its role slot.
    ///
    /// A singular slot is cleared only if it still holds this exact
    /// connection — removing a handle that was already superseded is a
    /// no-op, so a slow forwarding loop cannot knock out its replacement.
    pub fn remove(&self, conn: &Arc<RelayConn>) {
        let mut slots = self.lock();
        match conn.role() {
            Role::StreamInstrument => {
                if slots
                    .stream_instrument
                    .as_ref()
                    .is_some_and(|held| held.id() == conn.id())
                {
                    slots.stream_instrument = None;
                }
            }
            Role::ControlInstrument => {
                if slots
                    .control_instrument
                    .as_ref()
                    .is_some_and(|held| held.id() == conn.id())
                {
                    slots.control_instrument = None;
                }
            }
            Role::StreamDisplay => slots.stream_displays.retain(|c| c.id() != conn.id()),
            Role::ControlDisplay => slots.control_displays.retain(|c| c.id() != conn.id()),
        }
    }

    /// Snapshot of every connection currently registered under `role`.
    /// Singular roles yield zero or one entry.
    pub fn snapshot(&self, role: Role) -> Vec<Arc<RelayConn>> {
        let slots = self.lock();
        match role {
            Role::StreamInstrument => slots.stream_instrument.iter().cloned().collect(),
            Role::ControlInstrument => slots.control_instrument.iter().cloned().collect(),
            Role::StreamDisplay => slots.stream_displays.clone(),
            Role::ControlDisplay => slots.control_displays.clone(),
        }
    }

    /// The single live connection for a singular role.
    pub fn singular(&self, role: Role) -> Option<Arc<RelayConn>> {
        let slots = self.lock();
        match role {
            Role::StreamInstrument => slots.stream_instrument.clone(),
            Role::ControlInstrument => slots.control_instrument.clone(),
            _ => None,
        }
    }

    /// Removes and returns every registered connection.  Used at shutdown
    /// to close them all.
    pub fn drain(&self) -> Vec<Arc<RelayConn>> {
        let mut slots = self.lock();
        let mut all: Vec<Arc<RelayConn>> = Vec::new();
        all.extend(slots.stream_instrument.take());
        all.extend(slots.control_instrument.take());
        all.append(&mut slots.stream_displays);
        all.append(&mut slots.control_displays);
        all
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        // A poisoned registry lock means a panic mid-mutation; the slot
        // data is still plain handles, so continue with it.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodlink_core::net::stream::MaybeTls;
    use tokio::net::{TcpListener, TcpStream};

    async fn conn(role: Role) -> (Arc<RelayConn>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async {
                listener.accept().await.unwrap()
            });
        let peer = server.peer_addr().unwrap();
        (
            RelayConn::new(MaybeTls::Plain(server), role, peer),
            client.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_singular_role_evicts_previous_holder() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::StreamInstrument).await;
        let (b, _cb) = conn(Role::StreamInstrument).await;

        assert!(registry.register(Arc::clone(&a)).is_none());
        let evicted = registry.register(Arc::clone(&b)).expect("must evict A");
        assert_eq!(evicted.id(), a.id());

        let snapshot = registry.snapshot(Role::StreamInstrument);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), b.id());
    }

    #[tokio::test]
    async fn test_set_role_accumulates_connections() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::StreamDisplay).await;
        let (b, _cb) = conn(Role::StreamDisplay).await;
        let (c, _cc) = conn(Role::StreamDisplay).await;

        assert!(registry.register(a).is_none());
        assert!(registry.register(b).is_none());
        assert!(registry.register(c).is_none());
        assert_eq!(registry.snapshot(Role::StreamDisplay).len(), 3);
    }

    #[tokio::test]
    async fn test_remove_takes_out_only_the_matching_connection() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::ControlDisplay).await;
        let (b, _cb) = conn(Role::ControlDisplay).await;
        let _ = registry.register(Arc::clone(&a));
        let _ = registry.register(Arc::clone(&b));

        registry.remove(&a);

        let snapshot = registry.snapshot(Role::ControlDisplay);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), b.id());
    }

    #[tokio::test]
    async fn test_remove_of_superseded_singular_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::ControlInstrument).await;
        let (b, _cb) = conn(Role::ControlInstrument).await;
        let _ = registry.register(Arc::clone(&a));
        let _ = registry.register(Arc::clone(&b));

        // A was already evicted; removing it must not disturb B.
        registry.remove(&a);

        let current = registry.singular(Role::ControlInstrument).unwrap();
        assert_eq!(current.id(), b.id());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy_not_a_view() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::StreamDisplay).await;
        let _ = registry.register(Arc::clone(&a));

        let snapshot = registry.snapshot(Role::StreamDisplay);
        registry.remove(&a);

        // The snapshot taken before removal still holds its handle.
        assert_eq!(snapshot.len(), 1);
        assert!(registry.snapshot(Role::StreamDisplay).is_empty());
    }

    #[tokio::test]
    async fn test_drain_empties_every_slot() {
        let registry = ConnectionRegistry::new();
        let (a, _ca) = conn(Role::StreamInstrument).await;
        let (b, _cb) = conn(Role::StreamDisplay).await;
        let (c, _cc) = conn(Role::ControlDisplay).await;
        let _ = registry.register(a);
        let _ = registry.register(b);
        let _ = registry.register(c);

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        for role in Role::ALL {
            assert!(registry.snapshot(role).is_empty());
        }
    }
}
