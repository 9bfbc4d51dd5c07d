//! One-shot alarms driven by a background thread.
//!
//! Every [`ThreadClock`] owns a single driver thread. The thread sleeps on a
//! condition variable until the earliest armed deadline, then fires every
//! alarm that is due. Deadlines live in the state guarded by the same mutex
//! that `stop` and `rearm` take, so a fire is either fully committed (deadline
//! cleared and signal sent) or not started when a stop looks at it.

use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use thiserror::Error;

use crate::{
    ClockConfig, ClockOptions, InputError,
    clock::{Alarm, Clock, Signal},
};

/// Deadlines that overflow `Instant` are clamped to this distance from now.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Handle to a driver thread. Cloning shares the same thread.
#[derive(Clone, Debug)]
pub struct ThreadClock {
    handle: Arc<Handle>,
}

impl ThreadClock {
    /// Start a clock with the default options.
    pub fn new() -> Result<Self, ClockError> {
        ThreadClock::with_options(&ClockOptions::default())
    }

    pub fn with_options(options: &ClockOptions) -> Result<Self, ClockError> {
        let config = options.parse()?;
        let handle = Handle::spawn(&config)?;

        Ok(ThreadClock {
            handle: Arc::new(handle),
        })
    }

    /// Amount of fires dropped because the previous signal of the alarm was
    /// still in its channel.
    pub fn dropped(&self) -> u64 {
        self.handle.shared.lock().dropped
    }

    /// Amount of alarms currently armed on this clock.
    pub fn pending(&self) -> usize {
        self.handle
            .shared
            .lock()
            .alarms
            .values()
            .filter(|entry| entry.deadline.is_some())
            .count()
    }
}

impl Clock for ThreadClock {
    type Alarm = ThreadAlarm;

    fn alarm(&self, duration: Duration) -> (Receiver<Signal>, ThreadAlarm) {
        let (sender, receiver) = bounded(1);

        let mut state = self.handle.shared.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.alarms.insert(
            id,
            Entry {
                deadline: Some(deadline_after(duration)),
                signal: sender,
            },
        );
        drop(state);

        self.handle.shared.condvar.notify_one();
        tracing::trace!("Alarm {} armed for {:?}", id, duration);

        let alarm = ThreadAlarm {
            id,
            handle: self.handle.clone(),
        };

        (receiver, alarm)
    }
}

/// Alarm registered on a [`ThreadClock`]. Dropping it deregisters the alarm.
#[derive(Debug)]
pub struct ThreadAlarm {
    id: u64,
    handle: Arc<Handle>,
}

impl Alarm for ThreadAlarm {
    fn stop(&mut self) -> bool {
        let mut state = self.handle.shared.lock();

        state
            .alarms
            .get_mut(&self.id)
            .and_then(|entry| entry.deadline.take())
            .is_some()
    }

    fn rearm(&mut self, duration: Duration) {
        let mut state = self.handle.shared.lock();

        let Some(entry) = state.alarms.get_mut(&self.id) else {
            tracing::warn!("Alarm {} is not registered and cannot be rearmed", self.id);
            return;
        };

        entry.deadline = Some(deadline_after(duration));
        drop(state);

        self.handle.shared.condvar.notify_one();
        tracing::trace!("Alarm {} rearmed for {:?}", self.id, duration);
    }
}

impl Drop for ThreadAlarm {
    fn drop(&mut self) {
        self.handle.shared.lock().alarms.remove(&self.id);
    }
}

/// Owns the driver thread. The thread is stopped and joined once the last
/// clock or alarm referencing it is dropped.
#[derive(Debug)]
struct Handle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Handle {
    fn spawn(config: &ClockConfig) -> Result<Self, ClockError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(DriverState::default()),
            condvar: Condvar::new(),
        });

        let driver = shared.clone();
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(&driver))?;

        tracing::debug!("Driver thread {} started", config.thread_name);

        Ok(Handle {
            shared,
            thread: Some(thread),
        })
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.condvar.notify_one();

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Driver thread panicked");
            }
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<DriverState>,
    condvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[derive(Debug, Default)]
struct DriverState {
    alarms: HashMap<u64, Entry>,
    next_id: u64,
    dropped: u64,
    shutdown: bool,
}

impl DriverState {
    /// Fire every alarm whose deadline is not after `now`. Returns the
    /// amount of alarms fired.
    fn fire_due(&mut self, now: Instant) -> usize {
        let mut fired = 0;

        for (id, entry) in self.alarms.iter_mut() {
            if !entry.deadline.is_some_and(|deadline| deadline <= now) {
                continue;
            }

            entry.deadline = None;
            fired += 1;

            match entry.signal.try_send(now) {
                Ok(()) => tracing::trace!("Alarm {} fired", id),
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    tracing::warn!(
                        "Alarm {} fired while its previous signal was unread. Signal dropped",
                        id
                    );
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::trace!("Alarm {} fired without a receiver", id);
                }
            }
        }

        fired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.alarms
            .values()
            .filter_map(|entry| entry.deadline)
            .min()
    }
}

#[derive(Debug)]
struct Entry {
    deadline: Option<Instant>,
    signal: Sender<Signal>,
}

fn run(shared: &Shared) {
    let mut state = shared.lock();

    while !state.shutdown {
        let now = Instant::now();
        state.fire_due(now);

        state = match state.next_deadline() {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(now);
                shared
                    .condvar
                    .wait_timeout(state, timeout)
                    .map(|(state, _)| state)
                    .unwrap_or_else(|err| err.into_inner().0)
            }
            None => shared
                .condvar
                .wait(state)
                .unwrap_or_else(|err| err.into_inner()),
        };
    }

    tracing::debug!("Driver thread stopped");
}

fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();

    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Error, Debug)]
pub enum ClockError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Driver thread could not be spawned")]
    Spawn(#[from] std::io::Error),
}
