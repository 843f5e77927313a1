//! Wire formats for the two relay channels.
//!
//! The stream channel carries fixed-size binary telemetry frames
//! ([`frame::StreamFrame`], 20 bytes, big-endian).  The control channel
//! carries one UTF-8 JSON object per `\n`-terminated line
//! ([`control::ControlMessage`]).  The relay itself treats both as opaque —
//! frames are forwarded byte-for-byte and control lines are only checked
//! for JSON-ness — so the typed codecs here exist for the producing and
//! consuming ends of each channel.
//!
//! [`buffer`] holds the reassembly buffers both the relay and the clients
//! use to recover complete frames/lines from fragmented TCP reads.

pub mod buffer;
pub mod control;
pub mod frame;
