//! # Sample Types
//!
//! Immutable records produced by the acquisition loop.

/// One calibrated reading of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// ADC channel the value was read from.
    pub channel_id: u8,
    /// Calibrated value in volts (never clamped).
    pub value: f64,
    /// Acquisition slot counter, strictly increasing.
    pub sequence_index: u64,
    /// Milliseconds since the pipeline started.
    pub timestamp_ms: u64,
}

/// All channel samples taken in one loop iteration.
///
/// Every sample in a set shares `sequence_index` and `timestamp_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    sequence_index: u64,
    timestamp_ms: u64,
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Builds a set from per-channel values, in channel order.
    #[must_use]
    pub fn new(sequence_index: u64, timestamp_ms: u64, values: &[f64]) -> Self {
        let samples = values
            .iter()
            .enumerate()
            .map(|(channel, &value)| Sample {
                channel_id: channel as u8,
                value,
                sequence_index,
                timestamp_ms,
            })
            .collect();

        Self {
            sequence_index,
            timestamp_ms,
            samples,
        }
    }

    #[must_use]
    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Value of `channel`, if it was sampled.
    #[must_use]
    pub fn value(&self, channel: u8) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.channel_id == channel)
            .map(|s| s.value)
    }

    /// Iterator over the values in channel order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_set_shares_index_and_time() {
        let set = SampleSet::new(7, 70, &[1.5, 2.5]);
        assert_eq!(set.samples().len(), 2);
        for (channel, sample) in set.samples().iter().enumerate() {
            assert_eq!(sample.channel_id as usize, channel);
            assert_eq!(sample.sequence_index, 7);
            assert_eq!(sample.timestamp_ms, 70);
        }
    }

    #[test]
    fn test_value_lookup() {
        let set = SampleSet::new(0, 0, &[1.0, 2.0]);
        assert_eq!(set.value(1), Some(2.0));
        assert_eq!(set.value(2), None);
        assert_eq!(set.values().collect::<Vec<_>>(), vec![1.0, 2.0]);
    }
}
