//! # Volt Monitor
//!
//! Samples a two-channel ADC at a fixed rate, draws the waveforms, records
//! them to CSV on demand and publishes every sample set as telemetry.

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use volt_monitor::adc::serial::SerialAdc;
use volt_monitor::config::Config;
use volt_monitor::display::renderer::WaveformRenderer;
use volt_monitor::display::FrameBuffer;
use volt_monitor::pipeline::{Pipeline, PipelineSettings};
use volt_monitor::runner::{run, RunSettings, POLL_INTERVAL};
use volt_monitor::scheduler::{Clock, MonotonicClock};
use volt_monitor::sink::FanOut;
use volt_monitor::storage::recorder::PersistenceSink;
use volt_monitor::storage::FsStorage;
use volt_monitor::telemetry::net::{TcpLink, UdpSession};
use volt_monitor::telemetry::TelemetrySink;

/// Configuration used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Directory for the rolling application log
const LOG_DIR: &str = "logs";

/// Builds the sink set from configuration, in dispatch order.
fn build_sinks(config: &Config) -> FanOut {
    let mut fan_out = FanOut::new();

    fan_out.register(Box::new(WaveformRenderer::new(
        FrameBuffer::default(),
        config.history_capacity(),
        config.adc.channels,
        config.display.min_volts,
        config.display.max_volts,
    )));

    if config.storage.enabled {
        fan_out.register(Box::new(PersistenceSink::new(
            FsStorage::new(&config.storage.log_dir),
            config.storage.file_prefix.clone(),
            config.adc.channels,
        )));
    } else {
        info!("Recording disabled in configuration");
    }

    if config.telemetry.enabled {
        fan_out.register(Box::new(TelemetrySink::new(
            TcpLink::new(config.telemetry.broker.clone()),
            UdpSession::new(
                config.telemetry.broker.clone(),
                std::time::Duration::from_millis(config.telemetry.keepalive_ms),
            ),
            config.telemetry_settings(),
        )));
    } else {
        info!("Telemetry disabled in configuration");
    }

    fan_out
}

/// Main entry point for Volt Monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Console and daily rolling file logging
///    - Load configuration (first argument, or `config/default.toml`)
///    - Open the ADC bridge and probe it; a missing ADC is fatal
///
/// 2. **Main Loop**
///    - Poll the pipeline every millisecond; samples are taken on the
///      configured cadence
///    - Read commands from stdin: `r` toggles recording, `d` redraws
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the loop and logs the final counters
///
/// # Errors
///
/// Returns error if the configuration is invalid, the ADC bridge cannot be
/// opened, or the ADC does not answer at startup.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "volt-monitor.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    info!("Volt Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    info!("Loaded configuration from {}", config_path);

    let adc = SerialAdc::open(
        &config.adc.port,
        config.adc.baud_rate,
        std::time::Duration::from_millis(config.adc.timeout_ms),
    )?;

    let mut pipeline = Pipeline::new(
        adc,
        build_sinks(&config),
        PipelineSettings {
            channels: config.adc.channels,
            rate_hz: config.sampling.rate_hz,
            history_capacity: config.history_capacity(),
            reference_voltage: config.calibration.reference_voltage,
            divider: config.divider(),
        },
    );

    let clock = MonotonicClock::start();
    if let Err(e) = pipeline.start(clock.now()) {
        // The sinks now show the fault; hold it until the operator exits.
        error!("Startup failed: {}", e);
        error!("Monitor halted. Press Ctrl+C to exit");
        if let Err(signal_err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", signal_err);
        }
        return Err(e.into());
    }

    info!(
        "Sampling {} channel(s) at {}Hz",
        config.adc.channels, config.sampling.rate_hz
    );
    info!("Commands: r = toggle recording, d = redraw. Press Ctrl+C to exit");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
    };

    let summary = run(
        &mut pipeline,
        &clock,
        BufReader::new(tokio::io::stdin()),
        shutdown,
        RunSettings {
            poll_interval: POLL_INTERVAL,
            status_interval_samples: config.sampling.status_interval_samples,
        },
    )
    .await;

    info!(
        "Total samples: {} ({} skipped, {} periods missed, {} commands)",
        summary.sampled, summary.skipped, summary.missed_periods, summary.commands
    );

    Ok(())
}
