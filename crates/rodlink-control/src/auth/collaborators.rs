//! Hardware collaborator traits consumed by the authorization machine.
//!
//! The camera-based face matcher and the RFID chip driver live outside this
//! crate; deployments inject implementations of these traits.  All calls
//! are blocking — the machine runs on its own thread, like the other
//! hardware loops.

use thiserror::Error;
use tracing::warn;

/// Numeric identifier burned into an RFID tag.
pub type TagId = u64;

/// A failure inside a hardware collaborator.  Always recoverable from the
/// machine's point of view: logged and treated as "not yet authorized".
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device fault: {0}")]
    Device(String),
}

/// Camera-based face identification.
#[cfg_attr(test, mockall::automock)]
pub trait FaceScanner: Send {
    /// Captures one frame and attempts identification.  `Ok(None)` means
    /// no face (or no known face) in view.
    fn scan_face(&mut self) -> Result<Option<String>, CollaboratorError>;
}

/// RFID tag reader/writer.
#[cfg_attr(test, mockall::automock)]
pub trait RfidReader: Send {
    /// Blocks until a tag is in range; returns its id and stored text.
    fn read_tag(&mut self) -> Result<(TagId, String), CollaboratorError>;

    /// Reads the tag in range and checks its stored digest.
    fn auth_tag(&mut self) -> Result<bool, CollaboratorError>;

    /// Writes a provisioning digest onto the tag in range.
    fn write_tag(&mut self, digest: &str) -> Result<(), CollaboratorError>;
}

/// Placeholder face scanner for hosts without the camera attached.  Never
/// identifies anyone.
pub struct UnavailableFaceScanner;

impl UnavailableFaceScanner {
    pub fn new() -> Self {
        warn!("face scanner hardware not attached; face authorization will never succeed");
        Self
    }
}

impl Default for UnavailableFaceScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceScanner for UnavailableFaceScanner {
    fn scan_face(&mut self) -> Result<Option<String>, CollaboratorError> {
        Ok(None)
    }
}

/// Placeholder RFID reader for hosts without the reader attached.  Every
/// read reports the device as missing.
pub struct UnavailableRfidReader;

impl UnavailableRfidReader {
    pub fn new() -> Self {
        warn!("RFID reader hardware not attached; RFID authorization will never succeed");
        Self
    }
}

impl Default for UnavailableRfidReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RfidReader for UnavailableRfidReader {
    fn read_tag(&mut self) -> Result<(TagId, String), CollaboratorError> {
        Err(CollaboratorError::Device("RFID reader not attached".into()))
    }

    fn auth_tag(&mut self) -> Result<bool, CollaboratorError> {
        Err(CollaboratorError::Device("RFID reader not attached".into()))
    }

    fn write_tag(&mut self, _digest: &str) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Device("RFID reader not attached".into()))
    }
}
