use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};

use crate::{
    InputError, SimClockOptions,
    clock::{Alarm, Clock, Signal},
};

/// A clock whose time only moves when it is ticked.
///
/// The simulated clock uses tick counts instead of actual time. A duration is
/// rounded up to whole ticks, and an alarm fires on the first tick at or past
/// its deadline. The signal carries the virtual instant of that tick.
#[derive(Clone, Debug)]
pub struct SimClock {
    inner: Arc<Mutex<SimState>>,
}

impl SimClock {
    pub fn new(options: &SimClockOptions) -> Result<Self, InputError> {
        let config = options.parse()?;

        let state = SimState {
            tick: config.tick,
            ticks: 0,
            now: Instant::now(),
            dropped: 0,
            alarms: HashMap::new(),
            next_id: 0,
        };

        Ok(SimClock {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// Execute a new tick iteration. Returns the amount of alarms fired.
    pub fn tick(&self) -> usize {
        let mut state = lock(&self.inner);
        state.advance();
        state.fire_due()
    }

    /// Tick as many times as needed for `duration` to pass.
    pub fn advance(&self, duration: Duration) -> usize {
        let ticks = lock(&self.inner).ticks_for(duration);

        (0..ticks).map(|_| self.tick()).sum()
    }

    /// Amount of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        lock(&self.inner).ticks
    }

    /// Virtual instant of the current tick.
    pub fn now(&self) -> Instant {
        lock(&self.inner).now
    }

    /// Amount of fires dropped because the previous signal of the alarm was
    /// still in its channel.
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped
    }

    /// Amount of alarms currently armed on this clock.
    pub fn pending(&self) -> usize {
        lock(&self.inner)
            .alarms
            .values()
            .filter(|entry| entry.deadline.is_some())
            .count()
    }
}

impl Clock for SimClock {
    type Alarm = SimAlarm;

    fn alarm(&self, duration: Duration) -> (Receiver<Signal>, SimAlarm) {
        let (sender, receiver) = bounded(1);

        let mut state = lock(&self.inner);
        let id = state.next_id;
        state.next_id += 1;

        let deadline = state.deadline_after(duration);
        state.alarms.insert(
            id,
            SimEntry {
                deadline: Some(deadline),
                signal: sender,
            },
        );

        let alarm = SimAlarm {
            id,
            inner: self.inner.clone(),
        };

        (receiver, alarm)
    }
}

/// Alarm registered on a [`SimClock`].
#[derive(Debug)]
pub struct SimAlarm {
    id: u64,
    inner: Arc<Mutex<SimState>>,
}

impl Alarm for SimAlarm {
    fn stop(&mut self) -> bool {
        lock(&self.inner)
            .alarms
            .get_mut(&self.id)
            .and_then(|entry| entry.deadline.take())
            .is_some()
    }

    fn rearm(&mut self, duration: Duration) {
        let mut state = lock(&self.inner);
        let deadline = state.deadline_after(duration);

        if let Some(entry) = state.alarms.get_mut(&self.id) {
            entry.deadline = Some(deadline);
        }
    }
}

impl Drop for SimAlarm {
    fn drop(&mut self) {
        lock(&self.inner).alarms.remove(&self.id);
    }
}

#[derive(Debug)]
struct SimState {
    /// Virtual time that passes on every tick.
    tick: Duration,

    /// Amount of ticks the clock has been running for.
    ticks: u64,

    /// Virtual instant of the current tick.
    now: Instant,

    dropped: u64,

    alarms: HashMap<u64, SimEntry>,
    next_id: u64,
}

impl SimState {
    fn advance(&mut self) {
        self.ticks += 1;

        match self.now.checked_add(self.tick) {
            Some(now) => self.now = now,
            None => tracing::warn!("Simulated clock reached the last representable instant"),
        }
    }

    fn ticks_for(&self, duration: Duration) -> u64 {
        let ticks = duration.as_nanos().div_ceil(self.tick.as_nanos());
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn deadline_after(&self, duration: Duration) -> u64 {
        self.ticks.saturating_add(self.ticks_for(duration))
    }

    fn fire_due(&mut self) -> usize {
        let now = self.now;
        let ticks = self.ticks;
        let mut fired = 0;

        for (id, entry) in self.alarms.iter_mut() {
            if !entry.deadline.is_some_and(|deadline| deadline <= ticks) {
                continue;
            }

            entry.deadline = None;
            fired += 1;

            if let Err(TrySendError::Full(_)) = entry.signal.try_send(now) {
                self.dropped += 1;
                tracing::warn!(
                    "Simulated alarm {} fired while its previous signal was unread. Signal dropped",
                    id
                );
            }
        }

        fired
    }
}

#[derive(Debug)]
struct SimEntry {
    /// Tick at which the alarm fires, `None` while disarmed.
    deadline: Option<u64>,
    signal: Sender<Signal>,
}

fn lock(inner: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    inner.lock().unwrap_or_else(|err| err.into_inner())
}
