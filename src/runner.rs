//! # Control Loop
//!
//! Drives a [`Pipeline`] from a tokio poll interval, routes operator
//! commands read line by line, and stops on a shutdown signal.
//!
//! The loop is cooperative: every branch of the `select!` runs to
//! completion on the current thread, so the pipeline never sees concurrent
//! calls.
//!
//! ## Commands
//!
//! | Line | Command |
//! |------|---------|
//! | `r`, `record` | [`Command::ToggleRecording`] |
//! | `d`, `redraw` | [`Command::ForceRedraw`] |

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::adc::Adc;
use crate::pipeline::{Pipeline, TickOutcome};
use crate::scheduler::Clock;
use crate::sink::Command;

/// Default poll interval of the control loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Parses one operator command line.
#[must_use]
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "record" => Some(Command::ToggleRecording),
        "d" | "redraw" => Some(Command::ForceRedraw),
        _ => None,
    }
}

/// Loop settings.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub poll_interval: Duration,
    /// A status line is logged every this many sample sets.
    pub status_interval_samples: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            status_interval_samples: 1000,
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sampled: u64,
    pub skipped: u64,
    pub missed_periods: u64,
    pub commands: u64,
}

/// One-line summary of the pipeline and its sinks.
pub fn status_line<A: Adc>(pipeline: &Pipeline<A>) -> String {
    let mut line = format!(
        "sampled={} skipped={} missed={}",
        pipeline.sampled(),
        pipeline.skipped(),
        pipeline.missed_periods()
    );
    for (name, status) in pipeline.statuses() {
        line.push_str(&format!(" {}={}", name, status.detail));
    }
    line
}

/// Runs the control loop until `shutdown` completes.
///
/// The pipeline must already be started. The command stream may end at any
/// time; the loop keeps sampling without it.
pub async fn run<A, C, R, F>(
    pipeline: &mut Pipeline<A>,
    clock: &C,
    commands: R,
    shutdown: F,
    settings: RunSettings,
) -> RunSummary
where
    A: Adc,
    C: Clock,
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    let mut ticker = interval(settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut lines = commands.lines();
    let mut commands_open = true;
    let mut handled: u64 = 0;
    let status_every = settings.status_interval_samples.max(1);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let TickOutcome::Sampled(seq) = pipeline.tick(clock.now()) {
                    if (seq + 1) % status_every == 0 {
                        info!("{}", status_line(pipeline));
                    }
                }
            }

            line = lines.next_line(), if commands_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(command) => {
                            pipeline.command(command, clock.now());
                            handled += 1;
                        }
                        None if line.trim().is_empty() => {}
                        None => warn!("Unknown command: {:?} (use r or d)", line.trim()),
                    },
                    Ok(None) => commands_open = false,
                    Err(e) => {
                        warn!("Command input closed: {}", e);
                        commands_open = false;
                    }
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    let summary = RunSummary {
        sampled: pipeline.sampled(),
        skipped: pipeline.skipped(),
        missed_periods: pipeline.missed_periods(),
        commands: handled,
    };
    info!("{}", status_line(pipeline));
    summary
}
