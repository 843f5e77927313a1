//! Panel LED and LCD loops.
//!
//! Both run on dedicated threads, polling the shared state at the
//! configured refresh interval and driving the hardware through the
//! [`LedBank`] / [`Lcd`] traits.  The GPIO/I²C drivers themselves live
//! outside this crate.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, trace};

use crate::shutdown::sleep_interruptible;
use crate::state::{LedState, SharedDeviceState};

/// The three panel indicator LEDs.  `i` is the LED index (0..3).
pub trait LedBank: Send {
    fn turn_on(&mut self, i: usize);
    fn turn_off(&mut self, i: usize);
}

/// The two-line character LCD.
pub trait Lcd: Send {
    /// Shows a notice (may contain one `\n`).
    fn show_message(&mut self, text: &str);
    /// Shows the default sensor readout page.
    fn show_sensors(&mut self);
}

/// Log-only LED driver for hosts without GPIO.
#[derive(Default)]
pub struct LogLedBank;

impl LedBank for LogLedBank {
    fn turn_on(&mut self, i: usize) {
        trace!(led = i, "on");
    }

    fn turn_off(&mut self, i: usize) {
        trace!(led = i, "off");
    }
}

/// Log-only LCD driver for hosts without the display.
#[derive(Default)]
pub struct LogLcd;

impl Lcd for LogLcd {
    fn show_message(&mut self, text: &str) {
        trace!(text, "lcd message");
    }

    fn show_sensors(&mut self) {
        trace!("lcd sensor page");
    }
}

/// Drives the LED bank from the shared pattern until shutdown.
///
/// `On`/`Off` are re-asserted every tick (the driver is idempotent);
/// `Flash` toggles each tick.
pub fn run_led_loop(
    state: Arc<SharedDeviceState>,
    mut bank: impl LedBank,
    shutdown: Arc<AtomicBool>,
) {
    info!("LED thread initialized");
    let mut lit = [false; 3];
    let refresh = state.refresh().leds();
    while sleep_interruptible(&shutdown, refresh) {
        for (i, setting) in state.led_pattern().into_iter().enumerate() {
            match setting {
                LedState::On => {
                    bank.turn_on(i);
                    lit[i] = true;
                }
                LedState::Off => {
                    bank.turn_off(i);
                    lit[i] = false;
                }
                LedState::Flash => {
                    if lit[i] {
                        bank.turn_off(i);
                    } else {
                        bank.turn_on(i);
                    }
                    lit[i] = !lit[i];
                }
            }
        }
    }
}

/// Drives the LCD from the shared message slot until shutdown.
///
/// A pending message is shown for its hold duration, then the sensor page
/// returns on the next tick.
pub fn run_lcd_loop(state: Arc<SharedDeviceState>, mut lcd: impl Lcd, shutdown: Arc<AtomicBool>) {
    info!("LCD display thread initialized");
    let refresh = state.refresh().display();
    while sleep_interruptible(&shutdown, refresh) {
        if let Some(message) = state.take_message() {
            lcd.show_message(&message.text);
            info!(
                text = %message.text.replace('\n', " \\\\ "),
                hold_secs = message.hold.as_secs(),
                "LCD message shown"
            );
            if !sleep_interruptible(&shutdown, message.hold.saturating_sub(refresh)) {
                return;
            }
        } else {
            lcd.show_sensors();
        }
    }
}
