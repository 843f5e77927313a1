//! Control-box service for the rodlink reactor-rod demonstrator.
//!
//! The control box sits between the instrumentation box (telemetry producer,
//! actuator host) and any number of visualization boxes.  This crate holds
//! the two engineering cores of the rig:
//!
//! - **The relay** ([`relay`]) — two TCP listeners whose accept loops
//!   classify clients by handshake role, plus the forwarding loops that fan
//!   the binary telemetry stream out one-to-many and shuttle JSON control
//!   lines between the two sides.  Display-role admission is gated on the
//!   live authorization state.
//!
//! - **The authorization machine** ([`auth`]) — a face-scan → RFID →
//!   periodic-re-auth sequence running on its own thread, mutating the
//!   shared device state the relay and the LED/LCD loops read.
//!
//! Hardware (camera, RFID reader, GPIO LEDs, LCD) is reached only through
//! the collaborator traits; this crate contains no register-level drivers.

pub mod auth;
pub mod conn;
pub mod devices;
pub mod registry;
pub mod relay;
pub mod shutdown;
pub mod state;
