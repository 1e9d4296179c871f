//! # Volt Monitor Library
//!
//! Sample two analog voltage channels at a fixed rate and fan every sample
//! set out to a waveform display, a CSV recorder and a telemetry publisher.
//!
//! Data flows one way:
//!
//! ```text
//! Scheduler -> ADC -> calibration -> SampleStore -> FanOut -> { render, persist, publish }
//! ```

pub mod adc;
pub mod config;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod sample;
pub mod scheduler;
pub mod sink;
pub mod storage;
pub mod store;
pub mod telemetry;
