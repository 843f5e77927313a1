//! Client-side connection layer and TLS material loading.
//!
//! [`framed::FramedConnection`] is what the instrumentation and
//! visualization boxes use to reach the control-box relay: TCP connect with
//! timeout, optional mutual-TLS handshake, the role handshake line, then
//! newline-delimited JSON or exact-count binary I/O.  [`backoff`] supplies
//! the shutdown-aware exponential reconnect schedule, and [`stream`] the
//! plain-or-TLS socket wrapper shared with the server side.

pub mod backoff;
pub mod framed;
pub mod stream;
pub mod tls;
