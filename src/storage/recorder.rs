//! # Recording Sink
//!
//! Persists sample sets as CSV rows while a recording session is active.
//!
//! ## Lifecycle
//!
//! ```text
//!            toggle (storage available, header written)
//!   Idle ─────────────────────────────────────────────▶ Recording
//!    ▲                                                      │
//!    └──────────────────────── toggle ──────────────────────┘
//! ```
//!
//! Storage availability is probed once in [`Sink::start`]. Without storage,
//! toggles are ignored for the lifetime of the process.
//!
//! ## File format
//!
//! One file per session, named `<prefix>_<session id>.csv`, where the id is the
//! boot-elapsed milliseconds at the toggle:
//!
//! ```text
//! Timestamp(ms),CH0(V),CH1(V)
//! 0,12.493,0.000
//! 10,12.481,0.002
//! ```
//!
//! A failed row append is logged and counted, and only that row is lost.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{OpenMode, Storage};
use crate::error::Result;
use crate::sample::SampleSet;
use crate::sink::{Command, Sink, SinkStatus};
use crate::store::SampleStore;

/// An active recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSession {
    /// Unique id, boot-elapsed milliseconds at start.
    pub id: u64,
    /// Pipeline time at start, in milliseconds.
    pub start_time_ms: u64,
    /// File the session appends to.
    pub path: String,
}

/// Recorder state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording(RecordingSession),
}

/// CSV header for `channels` channels.
#[must_use]
pub fn header_line(channels: usize) -> String {
    let mut header = String::from("Timestamp(ms)");
    for channel in 0..channels {
        header.push_str(&format!(",CH{}(V)", channel));
    }
    header
}

/// CSV row: elapsed ms, then one value per channel with 3 decimals.
#[must_use]
pub fn row_line(elapsed_ms: u64, set: &SampleSet) -> String {
    let mut row = elapsed_ms.to_string();
    for value in set.values() {
        row.push_str(&format!(",{:.3}", value));
    }
    row
}

/// Sink that appends every sample set to the active session file.
pub struct PersistenceSink<S: Storage> {
    storage: S,
    file_prefix: String,
    channels: usize,
    available: bool,
    state: RecorderState,
    last_session_id: Option<u64>,
    rows_written: u64,
    failed_writes: u64,
}

impl<S: Storage> std::fmt::Debug for PersistenceSink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSink")
            .field("available", &self.available)
            .field("state", &self.state)
            .field("rows_written", &self.rows_written)
            .field("failed_writes", &self.failed_writes)
            .finish_non_exhaustive()
    }
}

impl<S: Storage> PersistenceSink<S> {
    /// Creates an idle recorder. Storage is probed in [`Sink::start`].
    pub fn new(storage: S, file_prefix: impl Into<String>, channels: usize) -> Self {
        Self {
            storage,
            file_prefix: file_prefix.into(),
            channels,
            available: false,
            state: RecorderState::Idle,
            last_session_id: None,
            rows_written: 0,
            failed_writes: 0,
        }
    }

    /// Mounts storage and records whether recording is possible.
    pub fn probe(&mut self) -> bool {
        self.available = self.storage.mount() && self.storage.card_present();
        if self.available {
            info!("Storage available, recording enabled");
        } else {
            warn!("Storage unavailable, recording disabled");
        }
        self.available
    }

    /// Flips between idle and recording.
    pub fn toggle(&mut self, now: Duration) {
        if !self.available {
            debug!("Ignoring record toggle: no storage");
            return;
        }

        match std::mem::replace(&mut self.state, RecorderState::Idle) {
            RecorderState::Idle => self.start_session(now),
            RecorderState::Recording(session) => {
                info!("Stopped recording {}", session.path);
            }
        }
    }

    fn start_session(&mut self, now: Duration) {
        let now_ms = now.as_millis() as u64;
        let mut id = match self.last_session_id {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        // Files from earlier runs are never reused
        while self.storage.exists(&self.session_path(id)) {
            id += 1;
        }
        let path = self.session_path(id);

        if let Err(e) = self.write_header(&path) {
            warn!("Failed to start recording {}: {}", path, e);
            return;
        }

        info!("Recording to {}", path);
        self.last_session_id = Some(id);
        self.state = RecorderState::Recording(RecordingSession {
            id,
            start_time_ms: now_ms,
            path,
        });
    }

    fn session_path(&self, id: u64) -> String {
        format!("{}_{}.csv", self.file_prefix, id)
    }

    fn write_header(&mut self, path: &str) -> Result<()> {
        let mut handle = self.storage.open(path, OpenMode::CreateNew)?;
        let written = self.storage.write_line(&mut handle, &header_line(self.channels));
        let closed = self.storage.close(handle);
        written.and(closed)
    }

    fn append(&mut self, path: &str, line: &str) -> Result<()> {
        let mut handle = self.storage.open(path, OpenMode::Append)?;
        let written = self.storage.write_line(&mut handle, line);
        let closed = self.storage.close(handle);
        written.and(closed)
    }

    /// Current state.
    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    /// `true` if the startup probe found usable storage.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: Storage> Sink for PersistenceSink<S> {
    fn name(&self) -> &'static str {
        "persist"
    }

    fn start(&mut self, _now: Duration) {
        self.probe();
    }

    fn consume(&mut self, set: &SampleSet) -> Result<()> {
        let (path, start_time_ms) = match &self.state {
            RecorderState::Recording(session) => (session.path.clone(), session.start_time_ms),
            RecorderState::Idle => return Ok(()),
        };

        let line = row_line(set.timestamp_ms().saturating_sub(start_time_ms), set);
        match self.append(&path, &line) {
            Ok(()) => self.rows_written += 1,
            Err(e) => {
                // The row is dropped; the session stays open.
                self.failed_writes += 1;
                warn!("Dropped row {} for {}: {}", set.sequence_index(), path, e);
            }
        }
        Ok(())
    }

    fn handle(&mut self, command: Command, _store: &SampleStore, now: Duration) {
        if command == Command::ToggleRecording {
            self.toggle(now);
        }
    }

    fn status(&self) -> SinkStatus {
        match (&self.state, self.available) {
            (_, false) => SinkStatus::new(false, "NO SD"),
            (RecorderState::Idle, true) => SinkStatus::new(false, "IDLE"),
            (RecorderState::Recording(_), true) if self.failed_writes > 0 => {
                SinkStatus::new(true, format!("REC ({} dropped)", self.failed_writes))
            }
            (RecorderState::Recording(_), true) => SinkStatus::new(true, "REC"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mocks::SimulatedStorage;
    use crate::storage::FsStorage;
    use tempfile::TempDir;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn set(seq: u64, t: u64, v0: f64, v1: f64) -> SampleSet {
        SampleSet::new(seq, t, &[v0, v1])
    }

    fn recorder(storage: SimulatedStorage) -> PersistenceSink<SimulatedStorage> {
        let mut sink = PersistenceSink::new(storage, "voltage", 2);
        sink.start(Duration::ZERO);
        sink
    }

    // ==================== Format Tests ====================

    #[test]
    fn test_header_line() {
        assert_eq!(header_line(2), "Timestamp(ms),CH0(V),CH1(V)");
        assert_eq!(header_line(0), "Timestamp(ms)");
    }

    #[test]
    fn test_row_line_three_decimals() {
        assert_eq!(row_line(20, &set(2, 120, 12.49284, -0.0004)), "20,12.493,-0.000");
        assert_eq!(row_line(0, &set(0, 0, 1.0, 2.5)), "0,1.000,2.500");
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_idle_writes_nothing() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());

        sink.consume(&set(0, 0, 1.0, 2.0)).unwrap();

        assert!(storage.file_names().is_empty());
        assert_eq!(sink.status().detail, "IDLE");
    }

    #[test]
    fn test_recording_writes_header_and_rows() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());

        sink.toggle(ms(1500));
        assert!(sink.is_recording());
        sink.consume(&set(0, 1500, 12.5, 0.25)).unwrap();
        sink.consume(&set(1, 1510, 12.25, 0.5)).unwrap();

        let lines = storage.file("voltage_1500.csv").unwrap();
        assert_eq!(
            lines,
            vec!["Timestamp(ms),CH0(V),CH1(V)", "0,12.500,0.250", "10,12.250,0.500"]
        );
        assert_eq!(sink.rows_written(), 2);
        assert!(sink.status().active);
    }

    #[test]
    fn test_toggle_twice_gives_disjoint_sessions() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());

        sink.toggle(ms(100));
        sink.consume(&set(0, 100, 1.0, 1.0)).unwrap();
        sink.consume(&set(1, 110, 1.0, 1.0)).unwrap();
        sink.toggle(ms(115));
        sink.consume(&set(2, 120, 9.0, 9.0)).unwrap(); // idle: not recorded
        sink.toggle(ms(130));
        sink.consume(&set(3, 130, 2.0, 2.0)).unwrap();

        assert_eq!(storage.file_names(), vec!["voltage_100.csv", "voltage_130.csv"]);

        let first = storage.file("voltage_100.csv").unwrap();
        let second = storage.file("voltage_130.csv").unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        for file in [&first, &second] {
            let headers = file.iter().filter(|l| l.starts_with("Timestamp")).count();
            assert_eq!(headers, 1);
        }
        assert_eq!(second[1], "0,2.000,2.000");
    }

    #[test]
    fn test_session_ids_strictly_increase() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());

        sink.toggle(ms(50));
        sink.toggle(ms(50));
        sink.toggle(ms(50));

        match sink.state() {
            RecorderState::Recording(session) => assert_eq!(session.id, 51),
            other => panic!("Expected Recording, got: {:?}", other),
        }
        assert_eq!(storage.file_names(), vec!["voltage_50.csv", "voltage_51.csv"]);
    }

    #[test]
    fn test_missing_card_disables_recording() {
        let storage = SimulatedStorage::missing_card();
        let mut sink = recorder(storage.clone());

        sink.toggle(ms(10));
        sink.consume(&set(0, 10, 1.0, 1.0)).unwrap();

        assert!(!sink.is_available());
        assert!(!sink.is_recording());
        assert_eq!(storage.open_count(), 0);
        assert_eq!(sink.status().detail, "NO SD");
    }

    #[test]
    fn test_header_failure_stays_idle() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());

        storage.set_fail_open(true);
        sink.toggle(ms(10));
        assert!(!sink.is_recording());

        storage.set_fail_open(false);
        sink.toggle(ms(20));
        assert!(sink.is_recording());
    }

    #[test]
    fn test_failed_append_keeps_session() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());
        sink.toggle(ms(0));

        storage.set_fail_write(true);
        assert!(sink.consume(&set(0, 0, 1.0, 1.0)).is_ok());
        assert!(sink.consume(&set(1, 10, 1.0, 1.0)).is_ok());
        storage.set_fail_write(false);
        sink.consume(&set(2, 20, 3.0, 3.0)).unwrap();

        assert!(sink.is_recording());
        assert_eq!(sink.failed_writes(), 2);
        assert_eq!(sink.rows_written(), 1);
        assert_eq!(
            storage.file("voltage_0.csv").unwrap(),
            vec!["Timestamp(ms),CH0(V),CH1(V)", "20,3.000,3.000"]
        );
        assert_eq!(sink.status().detail, "REC (2 dropped)");
    }

    #[test]
    fn test_each_row_reopens_file() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage.clone());
        sink.toggle(ms(0));
        let after_header = storage.open_count();

        for seq in 0..4 {
            sink.consume(&set(seq, seq * 10, 1.0, 1.0)).unwrap();
        }

        assert_eq!(storage.open_count() - after_header, 4);
    }

    #[test]
    fn test_toggle_command_routing() {
        let storage = SimulatedStorage::new();
        let mut sink = recorder(storage);
        let store = SampleStore::new(2, 4);

        sink.handle(Command::ForceRedraw, &store, ms(5));
        assert!(!sink.is_recording());
        sink.handle(Command::ToggleRecording, &store, ms(5));
        assert!(sink.is_recording());
    }

    #[test]
    fn test_existing_session_file_is_kept() {
        let storage = SimulatedStorage::new();
        storage
            .files
            .lock()
            .unwrap()
            .insert("voltage_42.csv".to_string(), vec!["old".to_string()]);
        let mut sink = recorder(storage.clone());

        sink.toggle(ms(42));

        assert_eq!(storage.file("voltage_42.csv").unwrap(), vec!["old"]);
        assert_eq!(
            storage.file("voltage_43.csv").unwrap(),
            vec!["Timestamp(ms),CH0(V),CH1(V)"]
        );
    }

    #[test]
    fn test_fs_restart_does_not_overwrite_earlier_run() {
        let dir = TempDir::new().unwrap();
        let earlier = "Timestamp(ms),CH0(V),CH1(V)\n0,1.000,1.000\n";
        std::fs::write(dir.path().join("voltage_42.csv"), earlier).unwrap();

        let mut sink = PersistenceSink::new(FsStorage::new(dir.path()), "voltage", 2);
        sink.start(Duration::ZERO);
        sink.toggle(ms(42));
        sink.consume(&set(0, 42, 2.0, 2.0)).unwrap();

        let kept = std::fs::read_to_string(dir.path().join("voltage_42.csv")).unwrap();
        assert_eq!(kept, earlier);
        let fresh = std::fs::read_to_string(dir.path().join("voltage_43.csv")).unwrap();
        assert_eq!(fresh, "Timestamp(ms),CH0(V),CH1(V)\n0,2.000,2.000\n");
    }

    #[test]
    fn test_fs_recording_session() {
        let dir = TempDir::new().unwrap();
        let mut sink = PersistenceSink::new(FsStorage::new(dir.path()), "scope", 2);
        sink.start(Duration::ZERO);

        sink.toggle(ms(42));
        sink.consume(&set(0, 42, 12.4928, 0.0)).unwrap();
        sink.consume(&set(1, 52, 12.5, 0.001)).unwrap();
        sink.toggle(ms(60));

        let contents = std::fs::read_to_string(dir.path().join("scope_42.csv")).unwrap();
        assert_eq!(
            contents,
            "Timestamp(ms),CH0(V),CH1(V)\n0,12.493,0.000\n10,12.500,0.001\n"
        );
    }
}
