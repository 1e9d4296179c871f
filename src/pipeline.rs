//! # Acquisition Pipeline
//!
//! One iteration of the monitor: scheduler check, ADC read, conversion,
//! history insert and sink dispatch.
//!
//! ## Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | ADC absent at startup | [`Pipeline::start`] returns `Err` |
//! | Read error or not-ready status | slot skipped, cadence unchanged |
//! | Sink error | absorbed by [`FanOut`], other sinks unaffected |
//!
//! A slot is all-or-nothing: if any channel fails, no channel is stored and
//! nothing is dispatched, so every stored sequence index has a value on every
//! channel.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::adc::calibration::{config_bits, convert, ChannelCalibration, DataRate, Divider};
use crate::adc::{Adc, AdcReading};
use crate::error::Result;
use crate::sample::SampleSet;
use crate::scheduler::{period_from_rate, Scheduler};
use crate::sink::{Command, FanOut, SinkStatus};
use crate::store::SampleStore;

/// Why a due slot produced no sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ADC did not answer.
    NotReady,
    /// The ADC answered with a conversion it had already reported.
    Stale,
}

/// Result of one [`Pipeline::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No sample was due.
    Idle,
    /// A sample set with this sequence index was stored and dispatched.
    Sampled(u64),
    /// A sample was due but could not be acquired.
    Skipped(SkipReason),
}

/// Acquisition settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub channels: usize,
    pub rate_hz: u32,
    pub history_capacity: usize,
    pub reference_voltage: f64,
    pub divider: Divider,
}

/// The acquisition loop body.
pub struct Pipeline<A: Adc> {
    adc: A,
    settings: PipelineSettings,
    scheduler: Scheduler,
    calibrations: Vec<ChannelCalibration>,
    config_bits: Vec<u8>,
    store: SampleStore,
    fan_out: FanOut,
    next_sequence: u64,
    skipped: u64,
}

impl<A: Adc> std::fmt::Debug for Pipeline<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("scheduler", &self.scheduler)
            .field("fan_out", &self.fan_out)
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

impl<A: Adc> Pipeline<A> {
    pub fn new(adc: A, fan_out: FanOut, settings: PipelineSettings) -> Self {
        Self {
            scheduler: Scheduler::new(period_from_rate(settings.rate_hz), Duration::ZERO),
            store: SampleStore::new(settings.channels, settings.history_capacity),
            calibrations: Vec::new(),
            config_bits: Vec::new(),
            adc,
            settings,
            fan_out,
            next_sequence: 0,
            skipped: 0,
        }
    }

    /// Probes the ADC, resolves calibration and starts every sink.
    ///
    /// The first sample is due at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::MonitorError::SensorNotDetected`] (or the
    /// underlying serial error) if the ADC does not answer. The sinks are
    /// not started; they are told about the fault instead.
    pub fn start(&mut self, now: Duration) -> Result<()> {
        let status = match self.adc.probe() {
            Ok(status) => status,
            Err(e) => {
                self.fan_out.fault(&e.to_string());
                return Err(e);
            }
        };
        let calibration = self.calibration_for(status);
        self.calibrations = vec![calibration; self.settings.channels];
        self.config_bits = vec![config_bits(status); self.settings.channels];
        info!(
            "ADC detected (config 0x{:02X}), {:.6} mV/count",
            status,
            self.calibrations
                .first()
                .map(|c| c.volts_per_count() * 1000.0)
                .unwrap_or_default()
        );

        let conversion_rate = DataRate::from_status(status).samples_per_second();
        if f64::from(self.settings.rate_hz) > conversion_rate {
            warn!(
                "Sampling at {} Hz but the ADC converts at {} SPS; expect stale slots",
                self.settings.rate_hz, conversion_rate
            );
        }

        self.scheduler = Scheduler::new(self.scheduler.period(), now);
        self.fan_out.start(now);
        info!(
            "Pipeline started: {} channel(s) at {} Hz, {} sinks",
            self.settings.channels,
            self.settings.rate_hz,
            self.fan_out.len()
        );
        Ok(())
    }

    fn calibration_for(&self, status: u8) -> ChannelCalibration {
        ChannelCalibration::from_status(status, self.settings.reference_voltage, self.settings.divider)
    }

    /// Runs one loop iteration at `now`.
    pub fn tick(&mut self, now: Duration) -> TickOutcome {
        let outcome = if self.scheduler.due(now) {
            self.acquire(now)
        } else {
            TickOutcome::Idle
        };
        self.fan_out.tick(now);
        outcome
    }

    fn acquire(&mut self, now: Duration) -> TickOutcome {
        if self.calibrations.len() < self.settings.channels {
            return self.skip(SkipReason::NotReady, 0, "pipeline not started");
        }

        let mut readings = Vec::with_capacity(self.settings.channels);
        for channel in 0..self.settings.channels as u8 {
            let reading = match self.adc.read(channel) {
                Ok(reading) => reading,
                Err(e) => return self.skip(SkipReason::NotReady, channel, &e.to_string()),
            };
            if reading.is_stale() {
                return self.skip(SkipReason::Stale, channel, "stale conversion");
            }
            readings.push(reading);
        }

        let values = self.convert_all(&readings);
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;

        let set = SampleSet::new(sequence_index, now.as_millis() as u64, &values);
        for sample in set.samples() {
            self.store.insert(*sample);
        }
        self.fan_out.dispatch(&set);
        TickOutcome::Sampled(sequence_index)
    }

    /// Converts each code with the configuration reported alongside it.
    fn convert_all(&mut self, readings: &[AdcReading]) -> Vec<f64> {
        let mut values = Vec::with_capacity(readings.len());
        for (channel, reading) in readings.iter().enumerate() {
            let bits = reading.config_bits();
            if self.config_bits[channel] != bits {
                debug!(
                    "CH{} config changed 0x{:02X} -> 0x{:02X}, recalibrating",
                    channel, self.config_bits[channel], bits
                );
                self.calibrations[channel] = self.calibration_for(reading.status);
                self.config_bits[channel] = bits;
            }
            values.push(convert(reading.raw_code, &self.calibrations[channel]));
        }
        values
    }

    fn skip(&mut self, reason: SkipReason, channel: u8, detail: &str) -> TickOutcome {
        self.skipped += 1;
        trace!("Skipped sample slot on CH{}: {}", channel, detail);
        TickOutcome::Skipped(reason)
    }

    /// Routes an external command to the sinks.
    pub fn command(&mut self, command: Command, now: Duration) {
        debug!("Command {:?}", command);
        self.fan_out.broadcast(command, &self.store, now);
    }

    /// Sample history.
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Status of every sink, in registration order.
    pub fn statuses(&self) -> Vec<(&'static str, SinkStatus)> {
        self.fan_out.statuses()
    }

    /// Sink fan-out.
    pub fn fan_out(&self) -> &FanOut {
        &self.fan_out
    }

    /// Sample sets acquired so far.
    pub fn sampled(&self) -> u64 {
        self.next_sequence
    }

    /// Due slots that produced no sample.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Periods dropped because the loop polled late.
    pub fn missed_periods(&self) -> u64 {
        self.scheduler.missed_periods()
    }

    /// Current per-channel calibration.
    pub fn calibrations(&self) -> &[ChannelCalibration] {
        &self.calibrations
    }
}
