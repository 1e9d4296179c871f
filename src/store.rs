//! # Circular Sample Store
//!
//! Fixed-capacity history of the most recent samples per channel.
//!
//! Inserts never fail and never allocate: the slot at the write index is
//! overwritten and the index wraps. Readers get ordered copies via
//! [`CircularBuffer::snapshot`], so a reader never sees a half-written entry.

use crate::sample::Sample;

/// Ring buffer that always holds the last `min(written, capacity)` items.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    slots: Vec<Option<T>>,
    write_index: usize,
    written: u64,
}

impl<T: Clone> CircularBuffer<T> {
    /// Creates a buffer with room for `capacity` items (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            write_index: 0,
            written: 0,
        }
    }

    /// Writes `item` at the write index, overwriting the oldest entry.
    pub fn insert(&mut self, item: T) {
        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.slots.len();
        self.written += 1;
    }

    /// Items ordered oldest to newest.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let (newer, older) = self.slots.split_at(self.write_index);
        older.iter().chain(newer).flatten().cloned().collect()
    }

    /// Most recently inserted item.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        let index = (self.write_index + self.slots.len() - 1) % self.slots.len();
        self.slots[index].as_ref()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.written.min(self.slots.len() as u64) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Slot the next insert will overwrite.
    #[must_use]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Total inserts since construction.
    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.written
    }
}

/// Per-channel sample history.
#[derive(Debug, Clone)]
pub struct SampleStore {
    channels: Vec<CircularBuffer<Sample>>,
}

impl SampleStore {
    /// Creates one buffer of `capacity` per channel.
    #[must_use]
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| CircularBuffer::new(capacity)).collect(),
        }
    }

    /// Creates a store holding `history_seconds` of samples at `rate_hz`.
    #[must_use]
    pub fn with_history(channels: usize, history_seconds: u32, rate_hz: u32) -> Self {
        Self::new(channels, (history_seconds as usize) * (rate_hz as usize))
    }

    /// Inserts `sample` into its channel's buffer.
    ///
    /// Samples for unknown channels are ignored.
    pub fn insert(&mut self, sample: Sample) {
        if let Some(buffer) = self.channels.get_mut(sample.channel_id as usize) {
            buffer.insert(sample);
        }
    }

    /// Samples of `channel`, oldest to newest.
    #[must_use]
    pub fn snapshot(&self, channel: u8) -> Vec<Sample> {
        self.channels
            .get(channel as usize)
            .map(CircularBuffer::snapshot)
            .unwrap_or_default()
    }

    /// Most recent sample of `channel`.
    #[must_use]
    pub fn latest(&self, channel: u8) -> Option<&Sample> {
        self.channels.get(channel as usize).and_then(CircularBuffer::latest)
    }

    /// Per-channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, CircularBuffer::capacity)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total samples inserted into `channel`.
    #[must_use]
    pub fn total_written(&self, channel: u8) -> u64 {
        self.channels
            .get(channel as usize)
            .map_or(0, CircularBuffer::total_written)
    }
}

/// Bounds `value` into `[min, max]` for drawing.
///
/// Works on a copy; stored, logged and published values stay unclamped.
#[must_use]
pub fn clamp_for_display(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channel_id: u8, sequence_index: u64) -> Sample {
        Sample {
            channel_id,
            value: sequence_index as f64 * 0.1,
            sequence_index,
            timestamp_ms: sequence_index * 10,
        }
    }

    // ==================== CircularBuffer Tests ====================

    #[test]
    fn test_empty_buffer() {
        let buffer: CircularBuffer<u32> = CircularBuffer::new(4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.snapshot().is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_partial_fill_keeps_order() {
        let mut buffer = CircularBuffer::new(5);
        for i in 0..3 {
            buffer.insert(i);
        }
        assert_eq!(buffer.snapshot(), vec![0, 1, 2]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.write_index(), 3);
        assert_eq!(buffer.latest(), Some(&2));
    }

    #[test]
    fn test_overwrite_keeps_last_n() {
        let n = 5;
        for k in [0usize, 1, 4, 5, 12] {
            let mut buffer = CircularBuffer::new(n);
            for i in 0..(n + k) {
                buffer.insert(i);
            }
            let expected: Vec<usize> = (k..n + k).collect();
            assert_eq!(buffer.snapshot(), expected, "n={} k={}", n, k);
            assert_eq!(buffer.len(), n);
            assert_eq!(buffer.write_index(), (n + k) % n);
        }
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let mut buffer = CircularBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.insert(1);
        buffer.insert(2);
        assert_eq!(buffer.snapshot(), vec![2]);
    }

    // ==================== SampleStore Tests ====================

    #[test]
    fn test_store_with_history_capacity() {
        let store = SampleStore::with_history(2, 20, 100);
        assert_eq!(store.capacity(), 2000);
        assert_eq!(store.channel_count(), 2);
    }

    #[test]
    fn test_store_snapshot_after_wrap() {
        let mut store = SampleStore::new(2, 4);
        for seq in 0..10 {
            store.insert(sample(0, seq));
            store.insert(sample(1, seq));
        }

        let snapshot = store.snapshot(0);
        let indices: Vec<u64> = snapshot.iter().map(|s| s.sequence_index).collect();
        assert_eq!(indices, vec![6, 7, 8, 9]);
        assert!(snapshot.iter().all(|s| s.channel_id == 0));
        assert_eq!(store.latest(1).map(|s| s.sequence_index), Some(9));
        assert_eq!(store.total_written(1), 10);
    }

    #[test]
    fn test_store_routes_by_channel() {
        let mut store = SampleStore::new(2, 4);
        store.insert(sample(1, 0));
        assert!(store.snapshot(0).is_empty());
        assert_eq!(store.snapshot(1).len(), 1);
    }

    #[test]
    fn test_store_ignores_unknown_channel() {
        let mut store = SampleStore::new(2, 4);
        store.insert(sample(5, 0));
        assert!(store.snapshot(5).is_empty());
        assert_eq!(store.total_written(0) + store.total_written(1), 0);
    }

    // ==================== Display Clamp Tests ====================

    #[test]
    fn test_clamp_for_display() {
        assert_eq!(clamp_for_display(13.7, 0.0, 12.0), 12.0);
        assert_eq!(clamp_for_display(-0.4, 0.0, 12.0), 0.0);
        assert_eq!(clamp_for_display(5.25, 0.0, 12.0), 5.25);
        assert_eq!(clamp_for_display(f64::NAN, 0.0, 12.0), 0.0);
    }

    #[test]
    fn test_clamp_does_not_touch_stored_value() {
        let mut store = SampleStore::new(1, 2);
        let mut s = sample(0, 1);
        s.value = 15.0;
        store.insert(s);

        let shown = clamp_for_display(store.latest(0).unwrap().value, 0.0, 12.0);
        assert_eq!(shown, 12.0);
        assert_eq!(store.latest(0).unwrap().value, 15.0);
    }
}
