//! # Calibration Module
//!
//! Converts raw ADC codes into calibrated input voltages.
//!
//! ## Configuration register
//!
//! The converter reports its configuration in a status byte next to every
//! conversion result:
//!
//! | Bits | Field | Values |
//! |------|-------|--------|
//! | 7 | Not ready | 1 = no new conversion since last read (stale) |
//! | 6-5 | Channel | 0-3 |
//! | 4 | Mode | 1 = continuous conversion |
//! | 3-2 | Data rate | 240 / 60 / 15 / 3.75 SPS |
//! | 1-0 | PGA gain | x1 / x2 / x4 / x8 |
//!
//! ## Conversion
//!
//! ```text
//! v_input  = raw_code * reference_voltage / (gain * full_scale_counts)
//! v_output = v_input * (r_top + r_bottom) / r_bottom
//! ```
//!
//! The second step undoes the resistive divider in front of the ADC input.
//!
//! ## Usage
//!
//! ```
//! use volt_monitor::adc::calibration::{convert, ChannelCalibration, Divider};
//!
//! // 240 SPS, gain x1, 2.048 V reference, 510k/100k divider
//! let cal = ChannelCalibration::from_status(0b0000_0000, 2.048, Divider::new(510_000.0, 100_000.0));
//! let volts = convert(2048, &cal);
//! assert!((volts - 12.4928).abs() < 1e-6);
//! ```

/// Status bit set while the ADC has no new conversion result.
pub const STATUS_NOT_READY: u8 = 0b1000_0000;

/// Continuous conversion mode bit.
pub const STATUS_CONTINUOUS: u8 = 0b0001_0000;

/// Data rate selector field mask.
pub const STATUS_RATE_MASK: u8 = 0b0000_1100;

/// PGA gain selector field mask.
pub const STATUS_GAIN_MASK: u8 = 0b0000_0011;

/// Internal reference voltage of the converter.
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 2.048;

/// Conversion data rate, which also fixes the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    /// 240 samples/s, 12-bit
    Sps240,
    /// 60 samples/s, 14-bit
    Sps60,
    /// 15 samples/s, 16-bit
    Sps15,
    /// 3.75 samples/s, 18-bit
    Sps3_75,
}

impl DataRate {
    /// Decodes the rate selector from a status byte.
    #[must_use]
    pub fn from_status(status: u8) -> Self {
        match (status & STATUS_RATE_MASK) >> 2 {
            0 => DataRate::Sps240,
            1 => DataRate::Sps60,
            2 => DataRate::Sps15,
            _ => DataRate::Sps3_75,
        }
    }

    /// Positive full-scale code count for this rate.
    #[must_use]
    pub fn full_scale_counts(self) -> u32 {
        match self {
            DataRate::Sps240 => 2048,
            DataRate::Sps60 => 8192,
            DataRate::Sps15 => 32768,
            DataRate::Sps3_75 => 131_072,
        }
    }

    /// Nominal conversion rate in samples per second.
    #[must_use]
    pub fn samples_per_second(self) -> f64 {
        match self {
            DataRate::Sps240 => 240.0,
            DataRate::Sps60 => 60.0,
            DataRate::Sps15 => 15.0,
            DataRate::Sps3_75 => 3.75,
        }
    }
}

/// Programmable gain amplifier setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    X1,
    X2,
    X4,
    X8,
}

impl Gain {
    /// Decodes the gain selector from a status byte.
    #[must_use]
    pub fn from_status(status: u8) -> Self {
        match status & STATUS_GAIN_MASK {
            0 => Gain::X1,
            1 => Gain::X2,
            2 => Gain::X4,
            _ => Gain::X8,
        }
    }

    /// Gain as a multiplier.
    #[must_use]
    pub fn multiplier(self) -> u32 {
        match self {
            Gain::X1 => 1,
            Gain::X2 => 2,
            Gain::X4 => 4,
            Gain::X8 => 8,
        }
    }
}

/// Returns `true` if the status byte marks the result as stale.
#[must_use]
pub fn is_stale(status: u8) -> bool {
    status & STATUS_NOT_READY != 0
}

/// Configuration bits of a status byte, without ready/channel flags.
#[must_use]
pub fn config_bits(status: u8) -> u8 {
    status & (STATUS_RATE_MASK | STATUS_GAIN_MASK)
}

/// Resistive divider in front of the ADC input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divider {
    /// Resistor between the measured voltage and the ADC input, in ohms.
    pub r_top: f64,
    /// Resistor between the ADC input and ground, in ohms.
    pub r_bottom: f64,
}

impl Divider {
    /// Creates a divider from its two resistor values in ohms.
    #[must_use]
    pub fn new(r_top: f64, r_bottom: f64) -> Self {
        Self { r_top, r_bottom }
    }

    /// Divider with no attenuation.
    #[must_use]
    pub fn none() -> Self {
        Self {
            r_top: 0.0,
            r_bottom: 1.0,
        }
    }

    /// Factor that maps ADC input voltage back to measured voltage.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        (self.r_top + self.r_bottom) / self.r_bottom
    }
}

/// Fixed conversion parameters for one ADC channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub gain: u32,
    pub full_scale_counts: u32,
    pub reference_voltage: f64,
    pub divider_ratio: f64,
}

impl ChannelCalibration {
    /// Resolves calibration from a configuration readback and circuit constants.
    #[must_use]
    pub fn from_status(status: u8, reference_voltage: f64, divider: Divider) -> Self {
        Self {
            gain: Gain::from_status(status).multiplier(),
            full_scale_counts: DataRate::from_status(status).full_scale_counts(),
            reference_voltage,
            divider_ratio: divider.ratio(),
        }
    }

    /// Volts per ADC code at the measured input (after the divider).
    #[must_use]
    pub fn volts_per_count(&self) -> f64 {
        self.reference_voltage / (f64::from(self.gain) * f64::from(self.full_scale_counts))
            * self.divider_ratio
    }
}

/// Converts a raw code to the measured voltage.
///
/// Every `i16` code is in range; the result is not clamped.
#[must_use]
pub fn convert(raw_code: i16, calibration: &ChannelCalibration) -> f64 {
    let v_input = f64::from(raw_code) * calibration.reference_voltage
        / (f64::from(calibration.gain) * f64::from(calibration.full_scale_counts));
    v_input * calibration.divider_ratio
}
