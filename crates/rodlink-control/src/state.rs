//! Shared device state for the control box.
//!
//! This is the cross-cutting state the relay's accept loop, the
//! authorization thread, and the LED/LCD threads all touch.  Each logical
//! section (authorization, LED pattern, pending message) has its own mutex
//! so unrelated threads never serialize on one another, and no holder of
//! any of these locks performs I/O or awaits.
//!
//! Authorization invariants enforced here rather than at call sites:
//! `display_allowed` implies an RFID token is present, clearing either
//! factor clears `display_allowed`, and multi-field transitions (grant,
//! revoke) happen inside a single critical section so the relay can never
//! observe a half-cleared state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rodlink_core::config::RefreshConfig;

use crate::auth::collaborators::TagId;

/// Index of the power/heartbeat LED.
pub const LED_POWER: usize = 0;
/// Index of the LED indicating operator authorization progress.
pub const LED_AUTH: usize = 1;
/// Index of the LED indicating a pending re-authorization.
pub const LED_REAUTH: usize = 2;

/// Commanded state of one panel LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Off,
    On,
    /// Toggled by the LED loop on every refresh tick.
    Flash,
}

/// A message queued for the LCD, shown for `hold` before the sensor page
/// returns.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub text: String,
    pub hold: Duration,
}

/// Authorization fields, mutated only as whole transitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub face: Option<String>,
    pub rfid: Option<TagId>,
    pub display_allowed: bool,
    pub reauth_deadline: Option<Instant>,
}

/// The control box's shared mutable state.
pub struct SharedDeviceState {
    auth: Mutex<AuthSnapshot>,
    leds: Mutex<[LedState; 3]>,
    message: Mutex<Option<PendingMessage>>,
    refresh: RefreshConfig,
}

impl SharedDeviceState {
    /// Fresh startup state: unauthorized, all LEDs flashing, no message.
    pub fn new(refresh: RefreshConfig) -> Arc<Self> {
        Arc::new(Self {
            auth: Mutex::new(AuthSnapshot::default()),
            leds: Mutex::new([LedState::Flash; 3]),
            message: Mutex::new(None),
            refresh,
        })
    }

    pub fn refresh(&self) -> &RefreshConfig {
        &self.refresh
    }

    // ── Authorization section ─────────────────────────────────────────────────

    /// Read by the relay on every display-role admission check.
    pub fn display_allowed(&self) -> bool {
        self.lock_auth().display_allowed
    }

    pub fn auth_snapshot(&self) -> AuthSnapshot {
        self.lock_auth().clone()
    }

    /// Records a successful face authorization.
    pub fn set_face(&self, name: &str) {
        self.lock_auth().face = Some(name.to_string());
    }

    /// Records a successful RFID authorization: stores the token, opens
    /// display admission, and arms the re-auth deadline — one transition.
    pub fn grant_rfid(&self, tag: TagId, validity: Duration) {
        let mut auth = self.lock_auth();
        auth.rfid = Some(tag);
        auth.display_allowed = true;
        auth.reauth_deadline = Some(Instant::now() + validity);
    }

    /// Re-arms the deadline after a successful re-authorization.  No-op if
    /// no RFID token is held (nothing to extend).
    pub fn extend_rfid(&self, validity: Duration) {
        let mut auth = self.lock_auth();
        if auth.rfid.is_some() {
            auth.reauth_deadline = Some(Instant::now() + validity);
        }
    }

    /// Drops the face factor.  Display admission closes with it.
    pub fn clear_face(&self) {
        let mut auth = self.lock_auth();
        auth.face = None;
        auth.display_allowed = false;
    }

    /// Drops the RFID factor.  Display admission closes with it.
    pub fn clear_rfid(&self) {
        let mut auth = self.lock_auth();
        auth.rfid = None;
        auth.display_allowed = false;
        auth.reauth_deadline = None;
    }

    /// Full revocation: face, RFID, and display admission clear together
    /// inside one critical section.
    pub fn revoke_all(&self) {
        let mut auth = self.lock_auth();
        *auth = AuthSnapshot::default();
    }

    /// Bench mode (authorization disabled in config): opens display
    /// admission under a reserved token with no re-auth deadline.
    pub fn open_admission(&self) {
        let mut auth = self.lock_auth();
        auth.rfid = Some(0);
        auth.display_allowed = true;
        auth.reauth_deadline = None;
    }

    // ── LED section ───────────────────────────────────────────────────────────

    pub fn set_led(&self, index: usize, value: LedState) {
        if let Some(slot) = self.lock_leds().get_mut(index) {
            *slot = value;
        }
    }

    pub fn led_pattern(&self) -> [LedState; 3] {
        *self.lock_leds()
    }

    // ── Message section ───────────────────────────────────────────────────────

    /// Queues a message for the LCD, replacing any not-yet-shown one.
    pub fn post_message(&self, text: impl Into<String>, hold: Duration) {
        *self.lock_message() = Some(PendingMessage {
            text: text.into(),
            hold,
        });
    }

    /// Claims the pending message, if any.  Called by the LCD loop.
    pub fn take_message(&self) -> Option<PendingMessage> {
        self.lock_message().take()
    }

    fn lock_auth(&self) -> MutexGuard<'_, AuthSnapshot> {
        self.auth.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_leds(&self) -> MutexGuard<'_, [LedState; 3]> {
        self.leds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_message(&self) -> MutexGuard<'_, Option<PendingMessage>> {
        self.message.lock().unwrap_or_else(|e| e.into_inner())
    }
}
