//! # Sink Fan-out
//!
//! Distributes every acquired [`SampleSet`] to the registered sinks.
//!
//! Sinks run in registration order (render, persist, publish). A sink that
//! returns an error is logged and counted; the sinks after it still run, and
//! it keeps receiving later sets.

use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::sample::SampleSet;
use crate::store::SampleStore;

/// External command from the UI/button collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start recording if idle, stop if recording.
    ToggleRecording,
    /// Repaint the whole screen from the stored history.
    ForceRedraw,
}

/// Observable state of a sink, used for status indicators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SinkStatus {
    /// Sink is ready to do useful work (recording, connected, ...).
    pub active: bool,
    /// Short human-readable state.
    pub detail: String,
}

impl SinkStatus {
    #[must_use]
    pub fn new(active: bool, detail: impl Into<String>) -> Self {
        Self {
            active,
            detail: detail.into(),
        }
    }
}

/// Consumer of acquired samples.
#[cfg_attr(test, mockall::automock)]
pub trait Sink {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called once before the control loop starts.
    fn start(&mut self, _now: Duration) {}

    /// Handles one sample set. Must not block beyond a bounded budget.
    fn consume(&mut self, set: &SampleSet) -> Result<()>;

    /// Called once per loop tick, whether or not a sample was due.
    fn on_tick(&mut self, _now: Duration) {}

    /// Handles an external command; sinks ignore commands they don't own.
    ///
    /// `store` is a read-only view of the sample history.
    fn handle(&mut self, _command: Command, _store: &SampleStore, _now: Duration) {}

    /// Called instead of `start` when the monitor cannot run; the sink
    /// should show `message` and keep showing it.
    fn fault(&mut self, _message: &str) {}

    /// Current status.
    fn status(&self) -> SinkStatus {
        SinkStatus::default()
    }
}

struct Slot {
    sink: Box<dyn Sink>,
    failures: u64,
}

/// Ordered set of sinks with per-sink failure isolation.
#[derive(Default)]
pub struct FanOut {
    slots: Vec<Slot>,
    dispatched: u64,
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("sinks", &self.names())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl FanOut {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink; dispatch order is registration order.
    pub fn register(&mut self, sink: Box<dyn Sink>) {
        self.slots.push(Slot { sink, failures: 0 });
    }

    /// Builder form of [`FanOut::register`].
    #[must_use]
    pub fn with(mut self, sink: Box<dyn Sink>) -> Self {
        self.register(sink);
        self
    }

    /// Sends `set` to every sink in order, isolating failures.
    pub fn dispatch(&mut self, set: &SampleSet) {
        self.dispatched += 1;
        for slot in &mut self.slots {
            if let Err(e) = slot.sink.consume(set) {
                slot.failures += 1;
                warn!(
                    "Sink {} failed on sample {}: {}",
                    slot.sink.name(),
                    set.sequence_index(),
                    e
                );
            }
        }
    }

    /// Runs the startup hook of every sink, in order.
    pub fn start(&mut self, now: Duration) {
        for slot in &mut self.slots {
            slot.sink.start(now);
        }
    }

    /// Reports a startup failure to every sink, in order.
    pub fn fault(&mut self, message: &str) {
        for slot in &mut self.slots {
            slot.sink.fault(message);
        }
    }

    /// Drives per-tick maintenance of every sink.
    pub fn tick(&mut self, now: Duration) {
        for slot in &mut self.slots {
            slot.sink.on_tick(now);
        }
    }

    /// Routes `command` to every sink.
    pub fn broadcast(&mut self, command: Command, store: &SampleStore, now: Duration) {
        for slot in &mut self.slots {
            slot.sink.handle(command, store, now);
        }
    }

    /// Number of sets dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Failure count of the sink called `name`.
    #[must_use]
    pub fn failures(&self, name: &str) -> Option<u64> {
        self.slots
            .iter()
            .find(|slot| slot.sink.name() == name)
            .map(|slot| slot.failures)
    }

    /// `(name, status)` for every sink, in dispatch order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(&'static str, SinkStatus)> {
        self.slots
            .iter()
            .map(|slot| (slot.sink.name(), slot.sink.status()))
            .collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.sink.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that records every call into a shared journal.
    #[derive(Clone)]
    pub struct RecordingSink {
        pub name: &'static str,
        pub journal: Arc<Mutex<Vec<String>>>,
        pub seen: Arc<Mutex<Vec<u64>>>,
    }

    impl RecordingSink {
        pub fn new(name: &'static str, journal: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                journal,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn seen(&self) -> Vec<u64> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &'static str {
            self.name
        }

        fn consume(&mut self, set: &SampleSet) -> Result<()> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, set.sequence_index()));
            self.seen.lock().unwrap().push(set.sequence_index());
            Ok(())
        }

        fn handle(&mut self, command: Command, _store: &SampleStore, _now: Duration) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{:?}", self.name, command));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::RecordingSink;
    use super::*;
    use crate::error::MonitorError;
    use std::sync::{Arc, Mutex};

    fn set(seq: u64) -> SampleSet {
        SampleSet::new(seq, seq * 10, &[1.0, 2.0])
    }

    fn failing_sink(name: &'static str) -> MockSink {
        let mut sink = MockSink::new();
        sink.expect_name().return_const(name);
        sink.expect_consume()
            .returning(|_| Err(MonitorError::Storage("card removed".to_string())));
        sink
    }

    #[test]
    fn test_dispatch_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut fan_out = FanOut::new()
            .with(Box::new(RecordingSink::new("render", journal.clone())))
            .with(Box::new(RecordingSink::new("persist", journal.clone())))
            .with(Box::new(RecordingSink::new("publish", journal.clone())));

        fan_out.dispatch(&set(1));

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["render:1", "persist:1", "publish:1"]
        );
        assert_eq!(fan_out.names(), vec!["render", "persist", "publish"]);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let render = RecordingSink::new("render", journal.clone());
        let publish = RecordingSink::new("publish", journal.clone());

        let mut fan_out = FanOut::new()
            .with(Box::new(render.clone()))
            .with(Box::new(failing_sink("persist")))
            .with(Box::new(publish.clone()));

        for seq in 0..5 {
            fan_out.dispatch(&set(seq));
        }

        assert_eq!(render.seen(), vec![0, 1, 2, 3, 4]);
        assert_eq!(publish.seen(), vec![0, 1, 2, 3, 4]);
        assert_eq!(fan_out.failures("persist"), Some(5));
        assert_eq!(fan_out.failures("publish"), Some(0));
        assert_eq!(fan_out.dispatched(), 5);
    }

    #[test]
    fn test_every_sink_sees_same_set() {
        let mut first = MockSink::new();
        first.expect_name().return_const("first");
        first
            .expect_consume()
            .withf(|s| s.sequence_index() == 42 && s.value(1) == Some(2.0))
            .times(1)
            .returning(|_| Ok(()));

        let mut second = MockSink::new();
        second.expect_name().return_const("second");
        second
            .expect_consume()
            .withf(|s| s.sequence_index() == 42 && s.value(0) == Some(1.0))
            .times(1)
            .returning(|_| Ok(()));

        let mut fan_out = FanOut::new().with(Box::new(first)).with(Box::new(second));
        fan_out.dispatch(&set(42));
    }

    #[test]
    fn test_tick_reaches_every_sink() {
        let mut sink = MockSink::new();
        sink.expect_on_tick()
            .withf(|now| *now == Duration::from_millis(3))
            .times(2)
            .return_const(());

        let mut fan_out = FanOut::new().with(Box::new(sink));
        fan_out.tick(Duration::from_millis(3));
        fan_out.tick(Duration::from_millis(3));
    }

    #[test]
    fn test_broadcast_command() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut fan_out = FanOut::new()
            .with(Box::new(RecordingSink::new("a", journal.clone())))
            .with(Box::new(RecordingSink::new("b", journal.clone())));
        let store = SampleStore::new(2, 4);

        fan_out.broadcast(Command::ForceRedraw, &store, Duration::ZERO);

        assert_eq!(*journal.lock().unwrap(), vec!["a:ForceRedraw", "b:ForceRedraw"]);
    }

    #[test]
    fn test_fault_reaches_every_sink() {
        let mut fan_out = FanOut::new();
        for name in ["a", "b"] {
            let mut sink = MockSink::new();
            sink.expect_name().return_const(name);
            sink.expect_fault()
                .withf(|message| message.contains("no ADC"))
                .times(1)
                .return_const(());
            fan_out.register(Box::new(sink));
        }

        fan_out.fault("no ADC");
    }

    #[test]
    fn test_empty_fan_out() {
        let mut fan_out = FanOut::new();
        assert!(fan_out.is_empty());
        fan_out.dispatch(&set(0));
        assert_eq!(fan_out.dispatched(), 1);
        assert_eq!(fan_out.failures("missing"), None);
    }
}
