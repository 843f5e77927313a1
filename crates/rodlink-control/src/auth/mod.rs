//! Authorization state machine.
//!
//! Runs on a dedicated thread and walks the two-factor sequence
//!
//! ```text
//! Unauthenticated ─face─► FaceOk ─rfid─► RfidOk(display_allowed) ─deadline─►
//!     ReauthWindow ─success─► RfidOk   ─exhausted─► Unauthenticated
//! ```
//!
//! mutating [`SharedDeviceState`] as it goes.  The relay's accept loop
//! reads `display_allowed` on every display-role admission; the LED/LCD
//! loops pick up the pattern and message changes.
//!
//! Collaborator failures (camera gone, reader unplugged) are logged and
//! treated as "not yet authorized" — nothing here can take the process
//! down.  Every wait is interruptible by the process-wide shutdown flag.

pub mod collaborators;
pub mod digest;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use rodlink_core::config::AuthConfig;

use crate::auth::collaborators::{FaceScanner, RfidReader, TagId};
use crate::shutdown::{is_shutdown, sleep_interruptible};
use crate::state::{LedState, SharedDeviceState, LED_AUTH, LED_REAUTH};

/// How long authorization notices stay on the LCD.
const NOTICE_HOLD: Duration = Duration::from_secs(5);

/// Timing knobs for the sequence, injectable for tests.
#[derive(Debug, Clone, Copy)]
pub struct AuthTimings {
    /// Delay between face scan polls.
    pub face_poll: Duration,
    /// Delay between RFID attempts (initial and re-auth).
    pub rfid_retry: Duration,
    /// Lifetime of one RFID authorization.
    pub rfid_validity: Duration,
    /// Attempts granted inside the re-auth window.
    pub reauth_attempts: u32,
}

impl From<&AuthConfig> for AuthTimings {
    fn from(cfg: &AuthConfig) -> Self {
        Self {
            face_poll: cfg.face_poll(),
            rfid_retry: cfg.rfid_retry(),
            rfid_validity: cfg.rfid_validity(),
            reauth_attempts: cfg.reauth_attempts,
        }
    }
}

/// Result of one pass through the re-auth window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthOutcome {
    /// A poll succeeded; the deadline was re-armed.
    Renewed,
    /// All attempts failed; authorization was revoked.
    Revoked,
    /// Shutdown was requested mid-window.
    Shutdown,
}

/// The authorization machine.  Owns its collaborators; shares the device
/// state with the relay and hardware loops.
pub struct AuthMachine<F: FaceScanner, R: RfidReader> {
    state: Arc<SharedDeviceState>,
    face: F,
    rfid: R,
    approved_users: Vec<String>,
    timings: AuthTimings,
    shutdown: Arc<AtomicBool>,
}

impl<F: FaceScanner, R: RfidReader> AuthMachine<F, R> {
    pub fn new(
        state: Arc<SharedDeviceState>,
        face: F,
        rfid: R,
        approved_users: Vec<String>,
        timings: AuthTimings,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state,
            face,
            rfid,
            approved_users,
            timings,
            shutdown,
        }
    }

    /// Drives the cycle until shutdown.  Blocking; call from a dedicated
    /// thread.
    pub fn run(mut self) {
        info!("authorization thread initialized");
        loop {
            if !self.acquire_face() {
                return;
            }
            if !self.acquire_rfid() {
                return;
            }
            loop {
                if !self.wait_for_deadline() {
                    return;
                }
                match self.reauth_window() {
                    ReauthOutcome::Renewed => continue,
                    ReauthOutcome::Revoked => break,
                    ReauthOutcome::Shutdown => return,
                }
            }
        }
    }

    /// Polls the face scanner until an approved identity appears.  Returns
    /// `false` on shutdown.
    fn acquire_face(&mut self) -> bool {
        loop {
            if is_shutdown(&self.shutdown) {
                return false;
            }
            match self.face.scan_face() {
                Ok(Some(name)) if self.approved_users.iter().any(|u| *u == name) => {
                    self.state.set_face(&name);
                    self.state
                        .post_message(format!("Authorized user\n{name}"), NOTICE_HOLD);
                    self.state.set_led(LED_AUTH, LedState::On);
                    info!(user = %name, "face authorization granted");
                    return true;
                }
                Ok(Some(name)) => debug!(user = %name, "face identified but not approved"),
                Ok(None) => {}
                Err(e) => warn!("face scan failed: {e}"),
            }
            if !sleep_interruptible(&self.shutdown, self.timings.face_poll) {
                return false;
            }
        }
    }

    /// Polls the RFID reader until an authorized tag validates.  Returns
    /// `false` on shutdown.
    fn acquire_rfid(&mut self) -> bool {
        loop {
            if is_shutdown(&self.shutdown) {
                return false;
            }
            match self.try_rfid() {
                Ok(Some(tag_id)) => {
                    self.state.grant_rfid(tag_id, self.timings.rfid_validity);
                    let minutes = self.timings.rfid_validity.as_secs() / 60;
                    self.state.post_message(
                        format!("RFID authorized\nOK for {minutes} mins!"),
                        NOTICE_HOLD,
                    );
                    self.state.set_led(LED_AUTH, LedState::Off);
                    info!(tag_id, minutes, "RFID token authorized");
                    return true;
                }
                Ok(None) => info!("RFID authorization failed"),
                Err(e) => warn!("RFID read failed: {e}"),
            }
            if !sleep_interruptible(&self.shutdown, self.timings.rfid_retry) {
                return false;
            }
        }
    }

    fn try_rfid(&mut self) -> Result<Option<TagId>, collaborators::CollaboratorError> {
        let (tag_id, _text) = self.rfid.read_tag()?;
        debug!(tag_id, "tag presented");
        if self.rfid.auth_tag()? {
            Ok(Some(tag_id))
        } else {
            Ok(None)
        }
    }

    /// Sleeps until the armed re-auth deadline (interruptibly).  Returns
    /// `false` on shutdown.
    fn wait_for_deadline(&self) -> bool {
        let Some(deadline) = self.state.auth_snapshot().reauth_deadline else {
            // No deadline armed — treat as already due.
            return !is_shutdown(&self.shutdown);
        };
        let now = Instant::now();
        if deadline <= now {
            return !is_shutdown(&self.shutdown);
        }
        sleep_interruptible(&self.shutdown, deadline - now)
    }

    /// One pass through the bounded re-auth window.
    ///
    /// Public so the revocation transition is testable in isolation with
    /// scripted collaborators.
    pub fn reauth_window(&mut self) -> ReauthOutcome {
        self.state.set_led(LED_REAUTH, LedState::On);
        for attempt in 0..self.timings.reauth_attempts {
            if is_shutdown(&self.shutdown) {
                return ReauthOutcome::Shutdown;
            }
            match self.rfid.auth_tag() {
                Ok(true) => {
                    self.state.extend_rfid(self.timings.rfid_validity);
                    self.state.set_led(LED_REAUTH, LedState::Off);
                    info!("RFID re-authorization succeeded");
                    return ReauthOutcome::Renewed;
                }
                Ok(false) => debug!(attempt, "re-auth attempt failed"),
                Err(e) => warn!(attempt, "re-auth read failed: {e}"),
            }
            if attempt + 1 < self.timings.reauth_attempts
                && !sleep_interruptible(&self.shutdown, self.timings.rfid_retry)
            {
                return ReauthOutcome::Shutdown;
            }
        }
        self.state.set_led(LED_REAUTH, LedState::Flash);
        self.state.revoke_all();
        info!("RFID re-authorization failed, reverting to unauthorized");
        ReauthOutcome::Revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::collaborators::{MockFaceScanner, MockRfidReader};
    use rodlink_core::config::RefreshConfig;

    fn fast_timings() -> AuthTimings {
        AuthTimings {
            face_poll: Duration::from_millis(1),
            rfid_retry: Duration::from_millis(1),
            rfid_validity: Duration::from_secs(900),
            reauth_attempts: 5,
        }
    }

    fn machine(
        face: MockFaceScanner,
        rfid: MockRfidReader,
    ) -> (
        AuthMachine<MockFaceScanner, MockRfidReader>,
        Arc<SharedDeviceState>,
        Arc<AtomicBool>,
    ) {
        let state = SharedDeviceState::new(RefreshConfig::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let m = AuthMachine::new(
            Arc::clone(&state),
            face,
            rfid,
            vec!["Jane Operator".to_string()],
            fast_timings(),
            Arc::clone(&shutdown),
        );
        (m, state, shutdown)
    }

    #[test]
    fn test_face_step_rejects_unknown_then_accepts_approved() {
        let mut face = MockFaceScanner::new();
        let mut seq = mockall::Sequence::new();
        face.expect_scan_face()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("Stranger".to_string())));
        face.expect_scan_face()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(None));
        face.expect_scan_face()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("Jane Operator".to_string())));

        let (mut m, state, _) = machine(face, MockRfidReader::new());
        assert!(m.acquire_face());

        let auth = state.auth_snapshot();
        assert_eq!(auth.face.as_deref(), Some("Jane Operator"));
        assert!(!auth.display_allowed, "face alone must not open admission");
        assert_eq!(state.led_pattern()[LED_AUTH], LedState::On);
        assert!(state
            .take_message()
            .unwrap()
            .text
            .contains("Jane Operator"));
    }

    #[test]
    fn test_face_step_survives_collaborator_errors() {
        let mut face = MockFaceScanner::new();
        let mut seq = mockall::Sequence::new();
        face.expect_scan_face()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(collaborators::CollaboratorError::Device(
                    "camera disconnected".into(),
                ))
            });
        face.expect_scan_face()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some("Jane Operator".to_string())));

        let (mut m, _, _) = machine(face, MockRfidReader::new());
        assert!(m.acquire_face());
    }

    #[test]
    fn test_rfid_step_grants_admission_and_arms_deadline() {
        let mut rfid = MockRfidReader::new();
        let mut seq = mockall::Sequence::new();
        // First tag fails validation, second succeeds.
        rfid.expect_read_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok((111, "garbage".to_string())));
        rfid.expect_auth_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        rfid.expect_read_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok((222, "digest".to_string())));
        rfid.expect_auth_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));

        let (mut m, state, _) = machine(MockFaceScanner::new(), rfid);
        assert!(m.acquire_rfid());

        let auth = state.auth_snapshot();
        assert_eq!(auth.rfid, Some(222));
        assert!(auth.display_allowed);
        assert!(auth.reauth_deadline.is_some());
        assert_eq!(state.led_pattern()[LED_AUTH], LedState::Off);
        assert!(state.take_message().unwrap().text.contains("15 mins"));
    }

    #[test]
    fn test_reauth_success_renews_without_revoking() {
        let mut rfid = MockRfidReader::new();
        let mut seq = mockall::Sequence::new();
        rfid.expect_auth_tag()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        rfid.expect_auth_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));

        let (mut m, state, _) = machine(MockFaceScanner::new(), rfid);
        state.set_face("Jane Operator");
        state.grant_rfid(42, Duration::from_secs(900));

        assert_eq!(m.reauth_window(), ReauthOutcome::Renewed);
        let auth = state.auth_snapshot();
        assert_eq!(auth.rfid, Some(42));
        assert!(auth.display_allowed);
        assert_eq!(state.led_pattern()[LED_REAUTH], LedState::Off);
    }

    #[test]
    fn test_reauth_exhaustion_revokes_everything_at_once() {
        let mut rfid = MockRfidReader::new();
        rfid.expect_auth_tag().times(5).returning(|| Ok(false));

        let (mut m, state, _) = machine(MockFaceScanner::new(), rfid);
        state.set_face("Jane Operator");
        state.grant_rfid(42, Duration::from_secs(900));

        assert_eq!(m.reauth_window(), ReauthOutcome::Revoked);

        let auth = state.auth_snapshot();
        assert_eq!(auth.face, None);
        assert_eq!(auth.rfid, None);
        assert!(!auth.display_allowed);
        assert_eq!(auth.reauth_deadline, None);
        assert_eq!(state.led_pattern()[LED_REAUTH], LedState::Flash);
    }

    #[test]
    fn test_reauth_counts_errors_as_failed_attempts() {
        let mut rfid = MockRfidReader::new();
        rfid.expect_auth_tag().times(5).returning(|| {
            Err(collaborators::CollaboratorError::Device(
                "reader unplugged".into(),
            ))
        });

        let (mut m, state, _) = machine(MockFaceScanner::new(), rfid);
        state.grant_rfid(42, Duration::from_secs(900));

        assert_eq!(m.reauth_window(), ReauthOutcome::Revoked);
        assert!(!state.display_allowed());
    }

    #[test]
    fn test_shutdown_interrupts_the_face_poll() {
        let mut face = MockFaceScanner::new();
        face.expect_scan_face().returning(|| Ok(None));

        let (mut m, _, shutdown) = machine(face, MockRfidReader::new());
        let flag = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            flag.store(true, std::sync::atomic::Ordering::Relaxed);
        });

        let start = Instant::now();
        assert!(!m.acquire_face(), "shutdown must abort the poll");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_full_cycle_face_rfid_then_revocation() {
        let mut face = MockFaceScanner::new();
        face.expect_scan_face()
            .times(1)
            .returning(|| Ok(Some("Jane Operator".to_string())));

        let mut rfid = MockRfidReader::new();
        let mut seq = mockall::Sequence::new();
        rfid.expect_read_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok((9, "digest".to_string())));
        rfid.expect_auth_tag()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));
        // Re-auth window: all five attempts fail.
        rfid.expect_auth_tag()
            .times(5)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));

        let (mut m, state, _) = machine(face, rfid);
        assert!(m.acquire_face());
        assert!(m.acquire_rfid());
        assert!(state.display_allowed());
        assert_eq!(m.reauth_window(), ReauthOutcome::Revoked);
        assert_eq!(state.auth_snapshot(), Default::default());
    }
}
