use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;

/// Value delivered on the channel when an alarm fires: the instant the
/// fire was committed, as seen by the clock that drove it.
pub type Signal = Instant;

/// Source of one-shot alarms.
///
/// An alarm created by a clock delivers at most one [`Signal`] per armed
/// interval on the receiver returned next to it. The receiver has room for a
/// single signal.
pub trait Clock {
    type Alarm: Alarm;

    /// Create a new alarm armed to fire once `duration` has elapsed.
    fn alarm(&self, duration: Duration) -> (Receiver<Signal>, Self::Alarm);
}

/// Handle of a one-shot alarm.
///
/// Firing and stopping are serialized by the clock: once `stop` returns
/// `false` for an armed alarm, its signal is already in the channel.
pub trait Alarm {
    /// Disarm the alarm. Returns `true` only if a pending fire was prevented.
    fn stop(&mut self) -> bool;

    /// Arm the alarm again to fire once `duration` has elapsed.
    ///
    /// Replaces any pending deadline. The previous fire, if any, must have
    /// been taken out of the channel already, otherwise the new one is
    /// dropped.
    fn rearm(&mut self, duration: Duration);
}
