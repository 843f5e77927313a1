//! # rodlink-core
//!
//! Shared library for the rodlink reactor-rod demonstrator rig, used by the
//! control-box relay service and by the instrumentation/visualization box
//! clients.  It defines:
//!
//! - **`role`** – The four connection roles a TCP client can claim during
//!   handshake, and which listener accepts which.
//!
//! - **`protocol`** – The 20-byte binary telemetry frame, the typed control
//!   message model, and the receive buffers that reassemble frames and
//!   newline-delimited JSON lines from a fragmented TCP byte stream.
//!
//! - **`net`** – The framed client connection (handshake, optional mutual
//!   TLS, reconnect with exponential backoff) and the TLS material loaders.
//!
//! - **`config`** – The TOML configuration schema shared by all three boxes.
//!
//! This crate performs no GPIO, camera, or RFID access; hardware lives
//! behind collaborator traits in the service crates.

pub mod config;
pub mod net;
pub mod protocol;
pub mod role;

pub use config::AppConfig;
pub use net::backoff::BackoffPolicy;
pub use net::framed::{ConnectError, ConnectSettings, FramedConnection};
pub use protocol::buffer::{FrameBuffer, LineBuffer};
pub use protocol::control::ControlMessage;
pub use protocol::frame::{FrameError, StreamFrame, FRAME_LEN};
pub use role::Role;
