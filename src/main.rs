// phasegrid binary - run the sequencer array and serve the router protocol
// over stdin/stdout, one JSON request per line. The real session transport
// stays external; this surface is enough to drive every operation.

use clap::Parser;
use phasegrid::grid::{GridConfig, PhaseGrid};
use phasegrid::messaging::MessageRouter;
use phasegrid::output::ConsoleSink;
use std::io::{self, BufRead};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "phasegrid")]
#[command(about = "Array of independently clocked binary step sequencers")]
#[command(version)]
struct Cli {
    /// Number of channels (one register bit each)
    #[arg(short, long, default_value_t = 8)]
    channels: u32,

    /// Register refresh rate in Hz
    #[arg(long, default_value_t = 240.0)]
    refresh_hz: f64,

    /// Pattern length in steps
    #[arg(short, long, default_value_t = 32)]
    length: u32,

    /// Base interval for every channel, in seconds
    #[arg(short = 't', long, default_value_t = 1.0)]
    interval: f64,

    /// Fill every channel with a random pattern before starting
    #[arg(long)]
    randomize: bool,

    /// Start the array immediately instead of waiting for start_all
    #[arg(long)]
    autostart: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config = GridConfig {
        channels: cli.channels,
        refresh_rate: 1.0 / cli.refresh_hz,
        pattern_length: cli.length,
        base_interval: cli.interval,
    };

    let sink = ConsoleSink::new(cli.channels);
    let grid = match PhaseGrid::new(config, Some(Box::new(sink))) {
        Ok(grid) => grid,
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            std::process::exit(1);
        }
    };

    if cli.randomize {
        grid.randomize_all();
    }
    if cli.autostart {
        grid.start();
    }
    tracing::info!(
        channels = cli.channels,
        refresh_hz = cli.refresh_hz,
        "phasegrid ready"
    );

    let router = MessageRouter::new(Arc::clone(&grid));
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(%err, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = router.handle(&line) {
            match serde_json::to_string(&response) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(%err, "response serialization failed"),
            }
        }
    }

    // EOF: stop cleanly; in-flight pulses may trail briefly
    grid.stop();
}
