//! # Serial ADC Bridge
//!
//! [`Adc`] implementation for a converter behind a USB serial bridge.
//!
//! ## Wire exchange
//!
//! | Request | Response |
//! |---------|----------|
//! | `0xC0` (config readback) | 3-byte frame, status byte carries the config |
//! | `0xA0 \| channel` (read) | 3-byte frame: i16 code (BE) + status byte |
//!
//! The port is opened in blocking mode. Each exchange gets one read budget
//! for the whole frame: before every partial read the port timeout is set to
//! whatever is left of it, so a slow or silent bridge costs at most
//! `timeout` per channel.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

use super::{Adc, AdcReading, ADC_FRAME_LEN};
use crate::error::{MonitorError, Result};

/// Request byte for a configuration readback.
pub const REQUEST_CONFIG: u8 = 0xC0;

/// Request byte for a channel read; the low nibble carries the channel.
pub const REQUEST_READ: u8 = 0xA0;

/// Builds the request byte for reading `channel`.
#[must_use]
pub fn read_request(channel: u8) -> u8 {
    REQUEST_READ | (channel & 0x0F)
}

/// Byte source whose read timeout can be changed between reads.
trait FrameSource: Read {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

impl FrameSource for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_timeout(timeout).map_err(std::io::Error::from)
    }
}

/// Reads one response frame, spending at most `budget` waiting for it.
fn read_frame<S: FrameSource>(source: &mut S, budget: Duration) -> Result<AdcReading> {
    let deadline = Instant::now() + budget;
    let mut frame = [0u8; ADC_FRAME_LEN];
    let mut filled = 0;

    while filled < ADC_FRAME_LEN {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        source
            .set_read_timeout(remaining)
            .map_err(|e| MonitorError::Serial(format!("Failed to set read timeout: {}", e)))?;

        match source.read(&mut frame[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
            Err(e) => {
                return Err(MonitorError::Serial(format!("Failed to read frame: {}", e)));
            }
        }
    }

    AdcReading::decode(&frame[..filled])
}

/// ADC reached through a serial bridge.
pub struct SerialAdc {
    port: Box<dyn SerialPort>,
    device_path: String,
    timeout: Duration,
}

impl std::fmt::Debug for SerialAdc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialAdc")
            .field("device_path", &self.device_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SerialAdc {
    /// Opens the bridge at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Bridge baud rate
    /// * `timeout` - Budget for one whole response frame
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        debug!("Opening ADC bridge at {} ({} baud)", path, baud_rate);

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| MonitorError::Serial(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened ADC bridge at {}", path);
        Ok(Self {
            port,
            device_path: path.to_string(),
            timeout,
        })
    }

    /// Device path of the opened port.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn exchange(&mut self, request: u8) -> Result<AdcReading> {
        self.port
            .write_all(&[request])
            .map_err(|e| MonitorError::Serial(format!("Failed to write request: {}", e)))?;

        read_frame(&mut self.port, self.timeout)
    }
}

impl Adc for SerialAdc {
    fn probe(&mut self) -> Result<u8> {
        let reading = self
            .exchange(REQUEST_CONFIG)
            .map_err(|e| MonitorError::SensorNotDetected(format!("{}: {}", self.device_path, e)))?;
        Ok(reading.status)
    }

    fn read(&mut self, channel: u8) -> Result<AdcReading> {
        self.exchange(read_request(channel)).map_err(|e| {
            warn!("ADC read on channel {} failed: {}", channel, e);
            e
        })
    }
}
