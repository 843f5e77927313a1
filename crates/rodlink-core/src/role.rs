//! Connection roles and handshake strings.
//!
//! Every TCP client opens its connection by sending an ASCII role string
//! followed by `\n`.  The role decides three things: which listener will
//! accept the connection (stream vs. control), whether the role is
//! *singular* (at most one live connection; a newcomer evicts the old) or a
//! *set* (any number of concurrent connections, used for broadcast fan-out),
//! and whether admission is gated on the authorization state (display roles
//! only).

use std::fmt;

/// Which of the two relay listeners a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Binary telemetry stream (fixed-size frames, instrument → displays).
    Stream,
    /// Newline-delimited JSON control channel (bidirectional).
    Control,
}

/// The logical identity a TCP client claims during handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Telemetry producer on the stream channel.  Singular.
    StreamInstrument,
    /// Telemetry consumer on the stream channel.  Set, authorization-gated.
    StreamDisplay,
    /// Actuator/sensor box on the control channel.  Singular.
    ControlInstrument,
    /// Operator UI on the control channel.  Set, authorization-gated.
    ControlDisplay,
}

impl Role {
    /// All roles, in a fixed order.
    pub const ALL: [Role; 4] = [
        Role::StreamInstrument,
        Role::StreamDisplay,
        Role::ControlInstrument,
        Role::ControlDisplay,
    ];

    /// The ASCII string sent on the wire during handshake.
    pub fn as_wire(self) -> &'static str {
        match self {
            Role::StreamInstrument => "stream_instr",
            Role::StreamDisplay => "stream_display",
            Role::ControlInstrument => "ctrl_instr",
            Role::ControlDisplay => "ctrl_display",
        }
    }

    /// Parses a trimmed handshake string.  Returns `None` for anything that
    /// is not one of the four known role strings.
    pub fn from_wire(s: &str) -> Option<Role> {
        match s {
            "stream_instr" => Some(Role::StreamInstrument),
            "stream_display" => Some(Role::StreamDisplay),
            "ctrl_instr" => Some(Role::ControlInstrument),
            "ctrl_display" => Some(Role::ControlDisplay),
            _ => None,
        }
    }

    /// The listener this role is valid on.
    pub fn channel(self) -> Channel {
        match self {
            Role::StreamInstrument | Role::StreamDisplay => Channel::Stream,
            Role::ControlInstrument | Role::ControlDisplay => Channel::Control,
        }
    }

    /// Singular roles admit at most one live connection; registering a new
    /// one evicts the previous holder.
    pub fn is_singular(self) -> bool {
        matches!(self, Role::StreamInstrument | Role::ControlInstrument)
    }

    /// Display roles are admission-gated on the authorization state.
    pub fn is_display(self) -> bool {
        matches!(self, Role::StreamDisplay | Role::ControlDisplay)
    }

    /// The role on the opposite side of the same channel, i.e. where this
    /// role's control messages are forwarded to.
    pub fn opposite(self) -> Role {
        match self {
            Role::StreamInstrument => Role::StreamDisplay,
            Role::StreamDisplay => Role::StreamInstrument,
            Role::ControlInstrument => Role::ControlDisplay,
            Role::ControlDisplay => Role::ControlInstrument,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
