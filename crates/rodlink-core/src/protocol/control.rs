//! Typed model for the JSON control channel.
//!
//! The relay never interprets control payloads — it checks that a line
//! parses as JSON and forwards it verbatim ([`parse_json_line`]).  The typed
//! [`ControlMessage`] enum is for the endpoints that *consume* payloads: the
//! instrumentation box acting on settings, and the visualization box
//! reacting to limit-switch reports.  Unknown `"type"` values fail to
//! deserialize into the enum but still relay fine, which is how future
//! variants roll out without touching the control box.

use serde::{Deserialize, Serialize};

/// Limit switch position reported by the instrumentation box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    Pressed,
    Released,
}

/// One control-channel payload, discriminated by the `"type"` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Operator settings from a display client.
    ///
    /// `motor_set` is -1 (retract), 0 (stop), or 1 (extend); `servo_set`
    /// and `source_set` are 0/1 toggles for the rod clutch and the external
    /// neutron source.
    Settings {
        motor_set: i8,
        servo_set: u8,
        source_set: u8,
    },
    /// Limit switch transition from the instrumentation box.
    LimitSwitch { value: SwitchState },
}

impl ControlMessage {
    /// Serializes to the newline-terminated wire form.
    pub fn to_wire(&self) -> String {
        // Serialization of a field-only enum cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

/// Validates that `line` is one well-formed JSON value, as the relay does
/// before forwarding.  The payload semantics are not inspected.
///
/// # Errors
///
/// Returns the `serde_json` error for malformed input so the caller can log
/// it before dropping the line.
pub fn parse_json_line(line: &[u8]) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_slice(line)
}
