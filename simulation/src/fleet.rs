use std::time::{Duration, Instant};

use reset_timer::{InputError, SimClock, SimClockOptions, Timer, TimerState};
use thiserror::Error;

use crate::env::Env;

const TICK: Duration = Duration::from_millis(1);

pub(crate) struct FleetOptions {
    pub(crate) timer_count: usize,
    pub(crate) max_ticks: u32,
}

#[derive(Debug)]
enum Action {
    Reset(Duration),
    Stop,
    Recv,
    RecvRaw,
    Idle,
}

/// What a timer is expected to deliver.
#[derive(Debug, Default)]
struct Model {
    /// Earliest instant the signal of the live interval may carry.
    earliest: Option<Instant>,
    resets: u64,
    fires: u64,
    stops: u64,
}

/// A set of timers driven by the same simulated clock.
pub(crate) struct Fleet {
    env: Env,
    clock: SimClock,
    timers: Vec<(Timer<SimClock>, Model)>,
    max_ticks: u32,
}

impl Fleet {
    pub(crate) fn new(env: Env, options: FleetOptions) -> Result<Self, InputError> {
        let clock = SimClock::new(&SimClockOptions { tick: TICK })?;

        let timers = (0..options.timer_count)
            .map(|_| (Timer::new(clock.clone()), Model::default()))
            .collect();

        Ok(Fleet {
            env,
            clock,
            timers,
            max_ticks: options.max_ticks,
        })
    }

    pub(crate) fn step(&mut self, step: usize) -> Result<(), Violation> {
        let index = self.env.pick(0..self.timers.len());
        let action = self.action();
        tracing::trace!("Step {}: timer {} {:?}", step, index, action);

        let now = self.clock.now();
        let (timer, model) = &mut self.timers[index];

        match action {
            Action::Reset(duration) => {
                timer.reset(duration);
                model.earliest = Some(now + duration);
                model.resets += 1;
            }
            Action::Stop => {
                if timer.stop() {
                    model.earliest = None;
                    model.stops += 1;
                }
            }
            Action::Recv => {
                if let Some(signal) = timer.try_recv() {
                    model.observe(index, step, signal)?;
                }
            }
            Action::RecvRaw => {
                if let Ok(signal) = timer.channel().try_recv() {
                    timer.mark_read();
                    model.observe(index, step, signal)?;
                }
            }
            Action::Idle => {}
        }

        if self.env.flip_coin(0.5) {
            self.clock.tick();
        }

        self.check(step)
    }

    pub(crate) fn report(&self) {
        for (index, (_, model)) in self.timers.iter().enumerate() {
            tracing::info!(
                "Timer {}: {} resets, {} fires, {} stops",
                index,
                model.resets,
                model.fires,
                model.stops
            );
        }
    }

    fn action(&self) -> Action {
        match self.env.pick(0..5) {
            0 => {
                let ticks = self.env.pick(0..self.max_ticks as usize + 1);
                Action::Reset(TICK * ticks as u32)
            }
            1 => Action::Stop,
            2 => Action::Recv,
            3 => Action::RecvRaw,
            _ => Action::Idle,
        }
    }

    /// Invariants that hold for every timer after every step.
    fn check(&self, step: usize) -> Result<(), Violation> {
        if self.clock.dropped() > 0 {
            return Err(Violation::Duplicate { step });
        }

        let now = self.clock.now();

        for (index, (timer, model)) in self.timers.iter().enumerate() {
            let Some(earliest) = model.earliest else {
                if !timer.channel().is_empty() {
                    return Err(Violation::Stale { timer: index, step });
                }
                continue;
            };

            if now > earliest && timer.state() != TimerState::FiredUnread {
                return Err(Violation::Missing { timer: index, step });
            }
        }

        Ok(())
    }
}

impl Model {
    fn observe(&mut self, timer: usize, step: usize, signal: Instant) -> Result<(), Violation> {
        let Some(earliest) = self.earliest.take() else {
            return Err(Violation::Stale { timer, step });
        };

        if signal < earliest {
            return Err(Violation::Early { timer, step });
        }

        self.fires += 1;

        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum Violation {
    #[error("A fire was dropped into a channel holding an unread signal (step: {step})")]
    Duplicate { step: usize },
    #[error("Timer {timer} delivered a signal of a finished interval (step: {step})")]
    Stale { timer: usize, step: usize },
    #[error("Timer {timer} fired before its interval elapsed (step: {step})")]
    Early { timer: usize, step: usize },
    #[error("Timer {timer} did not fire after its interval elapsed (step: {step})")]
    Missing { timer: usize, step: usize },
}
