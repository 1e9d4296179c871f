//! # Telemetry Message
//!
//! JSON payload published for each sample set:
//!
//! ```json
//! {"timestamp":1500,"device":"volt-monitor-01","ch0":12.493,"ch1":0.002}
//! ```

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::sample::SampleSet;

/// Rounds `value` to 3 decimal places.
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Serialized form of one sample set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryMessage<'a> {
    /// Milliseconds since the pipeline started.
    pub timestamp: u64,
    /// Device identifier.
    pub device: &'a str,
    /// `ch<N>` → volts, rounded to 3 decimals.
    #[serde(flatten)]
    pub channels: BTreeMap<String, f64>,
}

impl<'a> TelemetryMessage<'a> {
    /// Builds the message for `set`.
    #[must_use]
    pub fn from_set(device: &'a str, set: &SampleSet) -> Self {
        let channels = set
            .samples()
            .iter()
            .map(|s| (format!("ch{}", s.channel_id), round3(s.value)))
            .collect();

        Self {
            timestamp: set.timestamp_ms(),
            device,
            channels,
        }
    }

    /// Encodes the message as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails. Non-finite values are written
    /// as `null`.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_round3() {
        assert_eq!(round3(12.4928), 12.493);
        assert_eq!(round3(-1.23449), -1.234);
        assert_eq!(round3(0.0), 0.0);
    }

    #[test]
    fn test_message_schema() {
        let set = SampleSet::new(3, 1500, &[12.4928, 0.0021]);
        let json = TelemetryMessage::from_set("scope-01", &set).to_json().unwrap();

        let value: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["timestamp"], 1500);
        assert_eq!(value["device"], "scope-01");
        assert_eq!(value["ch0"].as_f64(), Some(12.493));
        assert_eq!(value["ch1"].as_f64(), Some(0.002));
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_message_field_order() {
        let set = SampleSet::new(0, 7, &[1.0, 2.0]);
        let json = TelemetryMessage::from_set("d", &set).to_json().unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"timestamp":7,"device":"d","ch0":1.0,"ch1":2.0}"#
        );
    }

    #[test]
    fn test_non_finite_value_becomes_null() {
        let set = SampleSet::new(0, 0, &[f64::NAN]);
        let json = TelemetryMessage::from_set("d", &set).to_json().unwrap();
        let value: Value = serde_json::from_slice(&json).unwrap();
        assert!(value["ch0"].is_null());
    }
}
