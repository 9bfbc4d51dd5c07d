use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, never};
use thiserror::Error;

use crate::clock::{Alarm, Clock, Signal};

/// Snapshot of a timer's interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Never reset, or the last interval was stopped in time.
    Idle,
    /// Counting down towards a fire.
    Armed,
    /// Fired, the signal is waiting in the channel.
    FiredUnread,
    /// Fired, and the signal has been consumed.
    FiredRead,
}

/// A one-shot timer that can be reset safely, at any point of its interval.
///
/// Each call to [`Timer::reset`] starts a new interval that delivers exactly
/// one signal on [`Timer::channel`], no earlier than the given duration. A
/// signal left over from a previous interval is never observed after a reset.
///
/// The timer expects a single owner: `reset`, `stop` and the reads are not
/// synchronized with each other. Signals received through the timer
/// (`recv`, `try_recv`, `recv_timeout`) are tracked automatically. Callers
/// selecting on the raw channel must call [`Timer::mark_read`] after taking
/// the signal out, before the next `reset`.
pub struct Timer<C: Clock> {
    clock: C,

    /// Underlying one-shot alarm, created on the first reset.
    alarm: Option<C::Alarm>,

    /// Fire signals of `alarm`. Never fires until the alarm exists.
    signal: Receiver<Signal>,

    /// An interval was started and not stopped in time.
    armed: bool,

    /// The signal of the current interval has been consumed.
    read: bool,
}

impl<C: Clock> Timer<C> {
    pub fn new(clock: C) -> Self {
        Timer {
            clock,
            alarm: None,
            signal: never(),
            armed: false,
            read: false,
        }
    }

    /// Start a new interval of `duration`, discarding the current one.
    ///
    /// If the current interval already fired and its signal was not read,
    /// the signal is drained so the channel only ever carries the fire of the
    /// new interval. A zero duration fires as soon as the clock gets to it.
    pub fn reset(&mut self, duration: Duration) {
        let Some(alarm) = self.alarm.as_mut() else {
            let (signal, alarm) = self.clock.alarm(duration);
            self.signal = signal;
            self.alarm = Some(alarm);
            self.armed = true;
            self.read = false;
            return;
        };

        // A failed stop on a live interval means the fire has been committed.
        // Drain it, unless it was read already and the channel is empty.
        if !alarm.stop() && self.armed && !self.read {
            if self.signal.try_recv().is_err() {
                tracing::warn!("Timer signal was consumed without being marked as read");
            } else {
                tracing::trace!("Drained stale timer signal");
            }
        }

        self.armed = true;
        self.read = false;
        alarm.rearm(duration);
    }

    /// Stop the current interval.
    ///
    /// Returns `true` if a pending fire was prevented. Returns `false` if the
    /// timer was never reset, was already stopped, or has already fired. A
    /// signal that was fired stays in the channel.
    pub fn stop(&mut self) -> bool {
        let Some(alarm) = self.alarm.as_mut() else {
            return false;
        };

        let stopped = alarm.stop();
        if stopped {
            self.armed = false;
        }

        tracing::debug!("Timer stopped (prevented fire: {})", stopped);

        stopped
    }

    /// The channel the fire signal is delivered on.
    pub fn channel(&self) -> &Receiver<Signal> {
        &self.signal
    }

    /// Declare that the signal of the current interval has been consumed
    /// from [`Timer::channel`].
    pub fn mark_read(&mut self) {
        self.read = true;
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    /// Block until the current interval fires.
    pub fn recv(&mut self) -> Result<Signal, TimerError> {
        self.expect_fire()?;

        let signal = self
            .signal
            .recv()
            .map_err(|_| TimerError::Disconnected)?;
        self.read = true;

        Ok(signal)
    }

    /// Take the fire signal if it is already in the channel.
    pub fn try_recv(&mut self) -> Option<Signal> {
        let signal = self.signal.try_recv().ok()?;
        self.read = true;

        Some(signal)
    }

    /// Wait up to `timeout` for the current interval to fire.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Signal>, TimerError> {
        self.expect_fire()?;

        match self.signal.recv_timeout(timeout) {
            Ok(signal) => {
                self.read = true;
                Ok(Some(signal))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TimerError::Disconnected),
        }
    }

    pub fn state(&self) -> TimerState {
        if !self.armed {
            TimerState::Idle
        } else if self.read {
            TimerState::FiredRead
        } else if self.signal.is_empty() {
            TimerState::Armed
        } else {
            TimerState::FiredUnread
        }
    }

    /// Waiting is only bounded while an interval is live and unread.
    fn expect_fire(&self) -> Result<(), TimerError> {
        if !self.armed || self.read {
            return Err(TimerError::NoPendingFire);
        }

        Ok(())
    }
}

impl<C: Clock> std::fmt::Debug for Timer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("state", &self.state())
            .field("armed", &self.armed)
            .field("read", &self.read)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum TimerError {
    #[error("Timer has no pending fire to wait for")]
    NoPendingFire,
    #[error("Timer clock is gone")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        SimClockOptions,
        sim::SimClock,
        timer::{Timer, TimerError, TimerState},
    };

    const STEP: Duration = Duration::from_millis(10);

    fn timer() -> (SimClock, Timer<SimClock>) {
        let clock = SimClock::new(&SimClockOptions { tick: STEP }).unwrap();
        let timer = Timer::new(clock.clone());

        (clock, timer)
    }

    #[test]
    fn starts_idle() {
        // given
        let (clock, mut timer) = timer();

        // when
        let stopped = timer.stop();

        // then
        assert!(!stopped);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(clock.pending(), 0);
        assert!(timer.try_recv().is_none());
        assert_eq!(timer.recv(), Err(TimerError::NoPendingFire));
    }

    #[test]
    fn first_reset_arms() {
        // given
        let (clock, mut timer) = timer();

        // when
        timer.reset(STEP);

        // then
        assert_eq!(timer.state(), TimerState::Armed);
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn fires_once_per_reset() {
        // given
        let (clock, mut timer) = timer();
        let reset_at = clock.now();
        timer.reset(STEP);

        // when
        clock.tick();

        // then
        assert_eq!(timer.state(), TimerState::FiredUnread);
        assert_eq!(timer.recv().unwrap(), reset_at + STEP);
        assert_eq!(timer.state(), TimerState::FiredRead);

        clock.advance(5 * STEP);
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn stop_before_fire() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);

        // when
        let stopped = timer.stop();
        clock.advance(5 * STEP);

        // then
        assert!(stopped);
        assert_eq!(timer.state(), TimerState::Idle);
        assert!(timer.channel().is_empty());
        assert_eq!(timer.recv(), Err(TimerError::NoPendingFire));
    }

    #[test]
    fn stop_after_fire_keeps_signal() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.tick();

        // when
        let stopped = timer.stop();

        // then
        assert!(!stopped);
        assert_eq!(timer.state(), TimerState::FiredUnread);
        assert!(timer.try_recv().is_some());
        assert!(!timer.stop());
    }

    #[test]
    fn reset_before_fire() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.tick();
        timer.recv().unwrap();
        timer.reset(2 * STEP);

        // when
        clock.tick();
        let early = timer.try_recv();
        timer.reset(STEP);
        clock.advance(5 * STEP);

        // then
        assert!(early.is_none());
        assert!(timer.try_recv().is_some());
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn reset_after_fire_without_read_drains_stale_signal() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.advance(2 * STEP);
        assert_eq!(timer.state(), TimerState::FiredUnread);

        // when
        let reset_at = clock.now();
        timer.reset(STEP);

        // then
        assert_eq!(timer.state(), TimerState::Armed);
        assert!(timer.channel().is_empty());

        clock.tick();
        assert_eq!(timer.recv().unwrap(), reset_at + STEP);
        clock.advance(5 * STEP);
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn reset_after_fire_and_read_does_not_drain() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.tick();
        timer.channel().recv().unwrap();
        timer.mark_read();

        // when
        timer.reset(STEP);
        clock.tick();

        // then
        assert_eq!(timer.state(), TimerState::FiredUnread);
        assert!(timer.channel().try_recv().is_ok());
        assert!(timer.channel().is_empty());
    }

    #[test]
    fn reset_after_successful_stop_does_not_drain() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        assert!(timer.stop());

        // when
        timer.reset(STEP);
        clock.tick();

        // then
        assert_eq!(timer.recv().unwrap(), clock.now());
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn reset_after_late_stop_drains() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.tick();
        assert!(!timer.stop());

        // when
        timer.reset(STEP);

        // then
        assert!(timer.channel().is_empty());
        clock.tick();
        assert!(timer.try_recv().is_some());
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn reset_tolerates_unmarked_external_read() {
        // given
        let (clock, mut timer) = timer();
        timer.reset(STEP);
        clock.tick();
        timer.channel().try_recv().unwrap();

        // when
        timer.reset(STEP);
        clock.tick();

        // then
        assert!(timer.try_recv().is_some());
        assert!(timer.try_recv().is_none());
    }

    #[test]
    fn recv_timeout_reports_quiet_interval() {
        // given
        let (_clock, mut timer) = timer();
        timer.reset(STEP);

        // when
        let received = timer.recv_timeout(Duration::from_millis(1));

        // then
        assert_eq!(received, Ok(None));
        assert!(!timer.is_read());
    }

    #[test]
    fn makes_progress_in_loop() {
        // given
        let (clock, mut timer) = timer();

        for _ in 0..5 {
            // when
            timer.reset(STEP);
            clock.tick();

            // then
            assert!(timer.recv().is_ok());
            assert_eq!(timer.state(), TimerState::FiredRead);
        }

        assert!(!timer.stop());
    }
}
