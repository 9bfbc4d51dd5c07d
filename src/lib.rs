//! A resettable one-shot interval timer.
//!
//! A raw one-shot alarm that gets reset while its previous fire is still
//! sitting in the channel hands the next waiter a stale signal. [`Timer`]
//! wraps the alarm with a reset protocol that keeps exactly one fire signal
//! per interval:
//!
//!  1. The first `reset` creates the alarm armed for the given duration.
//!  2. Every following `reset` stops the alarm first. If the stop was too
//!     late (the alarm already fired) and nobody read that fire, the stale
//!     signal is drained from the channel.
//!  3. The read flag is cleared and the alarm is rearmed.
//!
//! The alarm itself is supplied by a [`Clock`]. [`ThreadClock`] drives
//! alarms from a background thread, [`SimClock`] only moves forward when it
//! is ticked, which makes every interleaving reproducible.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use reset_timer::{ThreadClock, Timer};
//!
//! let clock = ThreadClock::new().unwrap();
//! let mut timer = Timer::new(clock);
//!
//! for _ in 0..5 {
//!     timer.reset(Duration::from_millis(10));
//!     timer.recv().unwrap();
//! }
//! ```

use std::time::{Duration, Instant};

use thiserror::Error;

pub mod clock;
pub mod driver;
pub mod sim;
pub mod timer;

pub use {
    clock::{Alarm, Clock, Signal},
    driver::{ClockError, ThreadAlarm, ThreadClock},
    sim::{SimAlarm, SimClock},
    timer::{Timer, TimerError, TimerState},
};

const DEFAULT_THREAD_NAME: &str = "reset-timer-driver";
const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// Options to start a [`ThreadClock`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClockOptions {
    /// Name given to the driver thread.
    pub thread_name: String,
}

impl ClockOptions {
    pub(crate) fn parse(&self) -> Result<ClockConfig, InputError> {
        if self.thread_name.is_empty() {
            return Err(InputError::EmptyThreadName);
        }

        if self.thread_name.contains('\0') {
            return Err(InputError::InvalidThreadName(self.thread_name.clone()));
        }

        Ok(ClockConfig {
            thread_name: self.thread_name.clone(),
        })
    }
}

impl Default for ClockOptions {
    fn default() -> Self {
        ClockOptions {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClockConfig {
    pub(crate) thread_name: String,
}

/// Options to create a [`SimClock`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimClockOptions {
    /// Virtual time that passes on every tick.
    pub tick: Duration,
}

impl SimClockOptions {
    pub(crate) fn parse(&self) -> Result<SimClockConfig, InputError> {
        if self.tick.is_zero() {
            return Err(InputError::ZeroTick);
        }

        if Instant::now().checked_add(self.tick).is_none() {
            return Err(InputError::TickTooLarge(self.tick));
        }

        Ok(SimClockConfig { tick: self.tick })
    }
}

impl Default for SimClockOptions {
    fn default() -> Self {
        SimClockOptions { tick: DEFAULT_TICK }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimClockConfig {
    pub(crate) tick: Duration,
}

#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("Driver thread name must not be empty")]
    EmptyThreadName,
    #[error("Driver thread name contains a NUL byte: {0:?}")]
    InvalidThreadName(String),
    #[error("Simulated clock tick must be bigger than zero")]
    ZeroTick,
    #[error("Simulated clock tick of {0:?} overflows the clock")]
    TickTooLarge(Duration),
}
