//! # ADC Module
//!
//! Access to the analog-to-digital converter and raw code calibration.
//!
//! This module handles:
//! - The [`Adc`] collaborator interface (configuration readback, per-channel read)
//! - Decoding 3-byte conversion frames (code + status byte)
//! - Calibration of raw codes to volts ([`calibration`])
//! - A serial-bridge implementation for host use ([`serial`])

pub mod calibration;
pub mod serial;

use bytes::Buf;

use crate::error::{MonitorError, Result};
use calibration::{config_bits, is_stale};

/// Size of one conversion frame: i16 code (big-endian) + status byte.
pub const ADC_FRAME_LEN: usize = 3;

/// One conversion result as reported by the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcReading {
    /// Signed conversion code.
    pub raw_code: i16,
    /// Configuration/status byte read alongside the code.
    pub status: u8,
}

impl AdcReading {
    /// Creates a reading from its parts.
    #[must_use]
    pub fn new(raw_code: i16, status: u8) -> Self {
        Self { raw_code, status }
    }

    /// Decodes a conversion frame.
    ///
    /// # Errors
    ///
    /// Returns `AdcFrame` if fewer than [`ADC_FRAME_LEN`] bytes are available.
    ///
    /// # Examples
    ///
    /// ```
    /// use volt_monitor::adc::AdcReading;
    ///
    /// let reading = AdcReading::decode(&[0x08, 0x00, 0x10]).unwrap();
    /// assert_eq!(reading.raw_code, 2048);
    /// assert_eq!(reading.status, 0x10);
    /// assert!(AdcReading::decode(&[0x08, 0x00]).is_err());
    /// ```
    pub fn decode(mut frame: &[u8]) -> Result<Self> {
        if frame.remaining() < ADC_FRAME_LEN {
            return Err(MonitorError::AdcFrame(format!(
                "insufficient bytes: expected {}, got {}",
                ADC_FRAME_LEN,
                frame.remaining()
            )));
        }

        let raw_code = frame.get_i16();
        let status = frame.get_u8();
        Ok(Self { raw_code, status })
    }

    /// `true` if the ADC had no new conversion since the last read.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        is_stale(self.status)
    }

    /// Rate and gain bits of the status byte.
    #[must_use]
    pub fn config_bits(&self) -> u8 {
        config_bits(self.status)
    }
}

/// ADC collaborator.
///
/// Implementations must not block longer than a sample period.
#[cfg_attr(test, mockall::automock)]
pub trait Adc {
    /// Reads back the configuration register.
    ///
    /// Called once at startup; an error means the device is absent.
    fn probe(&mut self) -> Result<u8>;

    /// Reads the latest conversion of `channel`.
    ///
    /// An error means "no sample this tick".
    fn read(&mut self, channel: u8) -> Result<AdcReading>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame() {
        let reading = AdcReading::decode(&[0xF8, 0x00, 0x8C]).unwrap();
        assert_eq!(reading.raw_code, -2048);
        assert_eq!(reading.status, 0x8C);
        assert!(reading.is_stale());
        assert_eq!(reading.config_bits(), 0x0C);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let reading = AdcReading::decode(&[0x00, 0x01, 0x10, 0xFF]).unwrap();
        assert_eq!(reading, AdcReading::new(1, 0x10));
    }

    #[test]
    fn test_decode_short_frame_is_error() {
        for frame in [&[][..], &[0x01][..], &[0x01, 0x02][..]] {
            match AdcReading::decode(frame) {
                Err(MonitorError::AdcFrame(msg)) => assert!(msg.contains("insufficient")),
                other => panic!("Expected AdcFrame error, got: {:?}", other),
            }
        }
    }

    #[test]
    fn test_mock_adc_probe() {
        let mut adc = MockAdc::new();
        adc.expect_probe().times(1).returning(|| Ok(0x10));
        assert_eq!(adc.probe().unwrap(), 0x10);
    }
}
