use std::{process::ExitCode, time::Instant};

use clap::Parser;
use reset_timer::InputError;

use crate::{
    env::Env,
    fleet::{Fleet, FleetOptions},
};

pub(crate) mod env;
mod fleet;

struct Runner {
    fleet: Fleet,
    steps: usize,
    start_time: Instant,
}

impl Runner {
    fn new(env: Env, options: FleetOptions, steps: usize) -> Result<Self, InputError> {
        Ok(Runner {
            fleet: Fleet::new(env, options)?,
            steps,
            start_time: Instant::now(),
        })
    }

    fn run(&mut self) -> Result<(), fleet::Violation> {
        for step in 0..self.steps {
            self.fleet.step(step)?;
        }

        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Seed of the random schedule. A random one is picked if missing.
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 100_000)]
    steps: usize,

    #[arg(short, long, default_value_t = 8)]
    timers: usize,

    /// Longest interval in ticks.
    #[arg(short, long, default_value_t = 16)]
    max_ticks: u32,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if args.timers == 0 {
        tracing::error!("At least one timer is required");
        return ExitCode::FAILURE;
    }

    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::info!("Seed: {}", seed);
    let env = Env::new(seed);

    let options = FleetOptions {
        timer_count: args.timers,
        max_ticks: args.max_ticks,
    };

    let mut runner = match Runner::new(env, options, args.steps) {
        Ok(runner) => runner,
        Err(err) => {
            tracing::error!("Simulation could not be set up: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runner.run() {
        Ok(()) => {
            runner.fleet.report();
            tracing::info!(
                "Simulation passed {} steps in {:?}",
                runner.steps,
                runner.start_time.elapsed()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Simulation failed (seed: {}): {}", seed, err);
            ExitCode::FAILURE
        }
    }
}
