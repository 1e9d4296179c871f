//! # Waveform Renderer
//!
//! Sink that draws each sample set as one column of a sweeping waveform.
//!
//! ## Screen layout (320×240)
//!
//! ```text
//!  y=10   CH0
//!  y=20   ┌──────────────── 280 × 80 ────────────────┐  12V
//!         │  channel 0 trace (green)                 │
//!  y=99   └──────────────────────────────────────────┘  0V
//!  y=110  CH1
//!  y=120  ┌──────────────────────────────────────────┐
//!         │  channel 1 trace (cyan)                  │
//!  y=199  └──────────────────────────────────────────┘
//!  y=210  CH0: 12.49V, CH1: 0.00V
//! ```
//!
//! The trace sweeps left to right: the column for a sample is derived from
//! its buffer slot, so after one full history the sweep wraps and overwrites
//! the oldest column. Values are clamped to the display range before they
//! are mapped to pixels; the sample itself is never modified.

use std::time::Duration;

use super::{Color, Display};
use crate::error::Result;
use crate::sample::SampleSet;
use crate::sink::{Command, Sink};
use crate::store::{clamp_for_display, SampleStore};

/// Left edge of the plot frames.
pub const PLOT_X: i32 = 30;

/// Outer width of a plot frame.
pub const PLOT_WIDTH: i32 = 280;

/// Outer height of a plot frame.
pub const PLOT_HEIGHT: i32 = 80;

/// Top edge of each channel's plot frame.
pub const PLOT_TOPS: [i32; 2] = [20, 120];

/// Trace color of each channel.
pub const TRACE_COLORS: [Color; 2] = [Color::Green, Color::Cyan];

/// Anchor of the numeric readout.
pub const READOUT_POS: (i32, i32) = (30, 210);

/// Anchor of the fault banner text.
pub const FAULT_POS: (i32, i32) = (34, 104);

/// Minimum change, in volts, before the readout is redrawn.
pub const READOUT_HYSTERESIS: f64 = 0.01;

/// Number of scale ticks on each plot.
const SCALE_TICKS: i32 = 5;

const INNER_X: i32 = PLOT_X + 1;
const INNER_WIDTH: i32 = PLOT_WIDTH - 2;
const INNER_HEIGHT: i32 = PLOT_HEIGHT - 2;

/// Number of plots the layout has room for.
pub const MAX_PLOTS: usize = PLOT_TOPS.len();

/// Scrolling two-plot waveform view.
pub struct WaveformRenderer<D: Display> {
    display: D,
    capacity: usize,
    channels: usize,
    min_volts: f64,
    max_volts: f64,
    last_readout: Option<Vec<f64>>,
}

impl<D: Display> std::fmt::Debug for WaveformRenderer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformRenderer")
            .field("capacity", &self.capacity)
            .field("channels", &self.channels)
            .field("range", &(self.min_volts, self.max_volts))
            .finish_non_exhaustive()
    }
}

impl<D: Display> WaveformRenderer<D> {
    /// Creates a renderer for a store of `capacity` samples per channel.
    ///
    /// Channels beyond [`MAX_PLOTS`] are not drawn.
    pub fn new(display: D, capacity: usize, channels: usize, min_volts: f64, max_volts: f64) -> Self {
        Self {
            display,
            capacity: capacity.max(1),
            channels: channels.min(MAX_PLOTS),
            min_volts,
            max_volts,
            last_readout: None,
        }
    }

    /// X coordinate of the column for `sequence_index`.
    pub fn column_x(&self, sequence_index: u64) -> i32 {
        let slot = (sequence_index % self.capacity as u64) as i64;
        INNER_X + (slot * i64::from(INNER_WIDTH) / self.capacity as i64) as i32
    }

    /// Y coordinate of `value` inside the plot whose frame starts at `top`.
    pub fn value_y(&self, top: i32, value: f64) -> i32 {
        let clamped = clamp_for_display(value, self.min_volts, self.max_volts);
        let span = self.max_volts - self.min_volts;
        let fraction = if span > 0.0 {
            (clamped - self.min_volts) / span
        } else {
            0.0
        };
        let inner_top = top + 1;
        inner_top + (INNER_HEIGHT - 1) - (fraction * f64::from(INNER_HEIGHT - 1)).round() as i32
    }

    /// Draws channel labels, plot frames and scale ticks.
    pub fn draw_static(&mut self) {
        for (channel, &top) in PLOT_TOPS.iter().enumerate().take(self.channels) {
            self.display
                .print_at(PLOT_X, top - 10, &format!("CH{}", channel), Color::White);
            self.display
                .draw_rect(PLOT_X, top, PLOT_WIDTH, PLOT_HEIGHT, Color::White);

            for tick in 0..SCALE_TICKS {
                let volts = self.min_volts
                    + f64::from(tick) * (self.max_volts - self.min_volts) / f64::from(SCALE_TICKS - 1);
                let y = self.value_y(top, volts);
                self.display.draw_line(PLOT_X - 2, y, PLOT_X, y, Color::White);
                self.display
                    .print_at(8, y - 3, &format!("{:.0}V", volts), Color::Gray);
            }
        }
    }

    fn plot(&mut self, sequence_index: u64, values: &[f64]) {
        let x = self.column_x(sequence_index);
        for (channel, &value) in values.iter().enumerate().take(self.channels) {
            let top = PLOT_TOPS[channel];
            self.display.fill_rect(x, top + 1, 1, INNER_HEIGHT, Color::Black);
            let y = self.value_y(top, value);
            self.display.draw_pixel(x, y, TRACE_COLORS[channel]);
        }
    }

    fn readout(&mut self, values: &[f64]) {
        let changed = match &self.last_readout {
            Some(last) if last.len() == values.len() => last
                .iter()
                .zip(values)
                .any(|(old, new)| (old - new).abs() > READOUT_HYSTERESIS),
            _ => true,
        };
        if !changed {
            return;
        }

        let text = values
            .iter()
            .enumerate()
            .map(|(channel, value)| format!("CH{}: {:.2}V", channel, value))
            .collect::<Vec<_>>()
            .join(", ");

        let (x, y) = READOUT_POS;
        self.display.fill_rect(x, y, PLOT_WIDTH, 20, Color::Black);
        self.display.print_at(x, y, &text, Color::White);
        self.last_readout = Some(values.to_vec());
    }

    /// Repaints the whole screen from the stored history.
    pub fn redraw(&mut self, store: &SampleStore) {
        let (width, height) = (self.display.width(), self.display.height());
        self.display.fill_rect(0, 0, width, height, Color::Black);
        self.draw_static();

        for channel in 0..self.channels {
            let top = PLOT_TOPS[channel];
            for sample in store.snapshot(channel as u8) {
                let x = self.column_x(sample.sequence_index);
                let y = self.value_y(top, sample.value);
                self.display.draw_pixel(x, y, TRACE_COLORS[channel]);
            }
        }

        self.last_readout = None;
        let latest: Vec<f64> = (0..store.channel_count())
            .filter_map(|channel| store.latest(channel as u8).map(|s| s.value))
            .collect();
        if !latest.is_empty() {
            self.readout(&latest);
        }
    }

    /// Clears the screen and shows a fault banner.
    pub fn draw_fault(&mut self, message: &str) {
        let (width, height) = (self.display.width(), self.display.height());
        self.display.fill_rect(0, 0, width, height, Color::Black);
        self.display.draw_rect(FAULT_POS.0 - 4, FAULT_POS.1 - 4, PLOT_WIDTH, 40, Color::Red);
        self.display.print_at(FAULT_POS.0, FAULT_POS.1, "SENSOR ERROR", Color::Red);
        self.display.print_at(FAULT_POS.0, FAULT_POS.1 + 16, message, Color::White);
        self.last_readout = None;
    }

    /// Underlying display.
    pub fn display(&self) -> &D {
        &self.display
    }
}

impl<D: Display> Sink for WaveformRenderer<D> {
    fn name(&self) -> &'static str {
        "render"
    }

    fn start(&mut self, _now: Duration) {
        self.draw_static();
    }

    fn consume(&mut self, set: &SampleSet) -> Result<()> {
        let values: Vec<f64> = set.values().collect();
        self.plot(set.sequence_index(), &values);
        self.readout(&values);
        Ok(())
    }

    fn handle(&mut self, command: Command, store: &SampleStore, _now: Duration) {
        if command == Command::ForceRedraw {
            self.redraw(store);
        }
    }

    fn fault(&mut self, message: &str) {
        self.draw_fault(message);
    }
}
