//! Binary telemetry frame codec.
//!
//! Wire format (20 bytes, all fields big-endian):
//!
//! ```text
//! [neutron_density:f32][reactivity:f32][rod_position_cm:f32][timestamp_ms:f64]
//! ```
//!
//! This is the canonical frame.  Earlier revisions of the rig used 12- and
//! 16-byte frames with no version byte on the wire; those are not decoded
//! here, and a future size change remains a flag-day change for all three
//! boxes.

use thiserror::Error;

/// Size of one encoded [`StreamFrame`] in bytes.
pub const FRAME_LEN: usize = 20;

/// Errors that can occur while decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    /// The byte slice is shorter than one complete frame.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

/// One telemetry sample produced by the instrumentation box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamFrame {
    /// Relative neutron population from the point-kinetics solver.
    pub neutron_density: f32,
    /// Net reactivity (dimensionless).
    pub reactivity: f32,
    /// Control rod extension in centimetres.
    pub rod_position_cm: f32,
    /// Sample time, milliseconds since the Unix epoch.
    pub timestamp_ms: f64,
}

impl StreamFrame {
    /// Encodes this frame into its 20-byte wire representation.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..4].copy_from_slice(&self.neutron_density.to_be_bytes());
        buf[4..8].copy_from_slice(&self.reactivity.to_be_bytes());
        buf[8..12].copy_from_slice(&self.rod_position_cm.to_be_bytes());
        buf[12..20].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        buf
    }

    /// Decodes one frame from the beginning of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InsufficientData`] if fewer than [`FRAME_LEN`]
    /// bytes are available.
    pub fn decode(bytes: &[u8]) -> Result<StreamFrame, FrameError> {
        if bytes.len() < FRAME_LEN {
            return Err(FrameError::InsufficientData {
                needed: FRAME_LEN,
                available: bytes.len(),
            });
        }
        Ok(StreamFrame {
            neutron_density: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            reactivity: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            rod_position_cm: f32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            timestamp_ms: f64::from_be_bytes([
                bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18],
                bytes[19],
            ]),
        })
    }
}
