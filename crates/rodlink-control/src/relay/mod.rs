//! The relay server: two listeners, five loops.
//!
//! [`RelayServer::start`] spawns the stream and control accept loops, the
//! stream fan-out, and both control-forward directions as Tokio tasks
//! sharing one [`ConnectionRegistry`].  All loops retire cooperatively via
//! the process-wide shutdown flag; [`RelayServer::stop`] then closes every
//! connection still registered.

pub mod accept;
pub mod forward;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use rodlink_core::role::{Channel, Role};

use crate::registry::ConnectionRegistry;
use crate::state::SharedDeviceState;

/// Handle over the running relay loops.
pub struct RelayServer {
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayServer {
    /// Spawns all relay loops on the already-bound listeners.
    pub fn start(
        stream_listener: TcpListener,
        control_listener: TcpListener,
        tls: Option<TlsAcceptor>,
        state: Arc<SharedDeviceState>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::with_capacity(5);

        tasks.push(tokio::spawn(accept::run_accept_loop(
            stream_listener,
            Channel::Stream,
            tls.clone(),
            Arc::clone(&registry),
            Arc::clone(&state),
            Arc::clone(&shutdown),
        )));
        tasks.push(tokio::spawn(accept::run_accept_loop(
            control_listener,
            Channel::Control,
            tls,
            Arc::clone(&registry),
            Arc::clone(&state),
            Arc::clone(&shutdown),
        )));
        tasks.push(tokio::spawn(forward::run_stream_forward(
            Arc::clone(&registry),
            Arc::clone(&shutdown),
        )));
        for from in [Role::ControlInstrument, Role::ControlDisplay] {
            tasks.push(tokio::spawn(forward::run_control_forward(
                Arc::clone(&registry),
                from,
                from.opposite(),
                Arc::clone(&shutdown),
            )));
        }

        Self {
            registry,
            shutdown,
            tasks,
        }
    }

    /// The shared connection directory (exposed for tests and diagnostics).
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sets the shutdown flag, waits for every loop to retire, and closes
    /// all connections that were still registered.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for task in self.tasks {
            let _ = task.await;
        }
        for conn in self.registry.drain() {
            conn.close().await;
        }
        info!("relay stopped");
    }
}
