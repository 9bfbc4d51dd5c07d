use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reset_timer::{SimClock, SimClockOptions, Timer, TimerState};

mod common;

const TICK: Duration = Duration::from_millis(1);
const STEPS: usize = 5_000;
const SEEDS: [u64; 4] = [1, 42, 1234, 98_765];

/// Runs random sequences of resets, stops, ticks and reads against a single
/// timer and checks every received signal belongs to the latest interval.
fn run(seed: u64) {
    common::init_tracing();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let clock = SimClock::new(&SimClockOptions { tick: TICK }).unwrap();
    let mut timer = Timer::new(clock.clone());

    // Earliest instant the signal of the current interval may carry, while
    // that interval can still fire.
    let mut expected: Option<Instant> = None;

    for step in 0..STEPS {
        match rng.random_range(0..6) {
            0 => {
                let duration = TICK * rng.random_range(0..8);
                expected = Some(clock.now() + duration);
                timer.reset(duration);
            }
            1 => {
                if timer.stop() {
                    expected = None;
                }
            }
            2 | 3 => {
                clock.tick();
            }
            4 => {
                if let Some(signal) = timer.try_recv() {
                    let earliest = expected
                        .take()
                        .unwrap_or_else(|| panic!("unexpected signal (seed: {seed}, step: {step})"));
                    assert!(
                        signal >= earliest,
                        "early signal (seed: {seed}, step: {step})"
                    );
                }
            }
            _ => {
                if let Ok(signal) = timer.channel().try_recv() {
                    timer.mark_read();
                    let earliest = expected
                        .take()
                        .unwrap_or_else(|| panic!("unexpected signal (seed: {seed}, step: {step})"));
                    assert!(
                        signal >= earliest,
                        "early signal (seed: {seed}, step: {step})"
                    );
                }
            }
        }

        assert_eq!(
            clock.dropped(),
            0,
            "fire dropped into an occupied channel (seed: {seed}, step: {step})"
        );

        if let Some(earliest) = expected {
            if clock.now() > earliest {
                assert_eq!(
                    timer.state(),
                    TimerState::FiredUnread,
                    "missing signal (seed: {seed}, step: {step})"
                );
            }
        }
    }
}

#[test]
fn random_interleavings_keep_one_signal_per_interval() {
    for seed in SEEDS {
        run(seed);
    }
}
