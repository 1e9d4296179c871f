//! # Telemetry Module
//!
//! Best-effort publishing of every sample set to a remote broker.
//!
//! This module handles:
//! - Link and publish-session state tracking ([`connectivity`])
//! - JSON message encoding ([`message`])
//! - Network collaborator interfaces and host adapters ([`net`])
//! - The [`TelemetrySink`] that ties them together
//!
//! ## Connection policy
//!
//! | Layer | Attempted | Retry |
//! |-------|-----------|-------|
//! | Link | once, in `start`, bounded by `link_timeout` | never (until restart) |
//! | Session | in `start`, then from `on_tick` | every `retry_interval` at most |
//!
//! Delivery is at-most-once: a failed publish drops the message and marks the
//! session disconnected. Nothing is queued.

pub mod connectivity;
pub mod message;
pub mod net;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sample::SampleSet;
use crate::sink::{Sink, SinkStatus};
use connectivity::{Connectivity, ConnectivityState};
use message::TelemetryMessage;
use net::{Credentials, LinkStatus, NetworkLink, PublishSession};

/// Static telemetry settings.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub credentials: Credentials,
    /// Device identifier, also used as the session client id.
    pub device: String,
    pub topic: String,
    pub link_timeout: Duration,
    pub retry_interval: Duration,
}

/// Counters exposed for status display and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryCounters {
    pub session_attempts: u64,
    pub published: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Sink that publishes each sample set while the session is up.
pub struct TelemetrySink<L: NetworkLink, P: PublishSession> {
    link: L,
    session: P,
    settings: TelemetrySettings,
    connectivity: Connectivity,
    last_attempt: Option<Duration>,
    counters: TelemetryCounters,
}

impl<L: NetworkLink, P: PublishSession> std::fmt::Debug for TelemetrySink<L, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySink")
            .field("device", &self.settings.device)
            .field("connectivity", &self.connectivity)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<L: NetworkLink, P: PublishSession> TelemetrySink<L, P> {
    /// Creates a disconnected sink. Nothing happens until [`Sink::start`].
    pub fn new(link: L, session: P, settings: TelemetrySettings) -> Self {
        Self {
            link,
            session,
            settings,
            connectivity: Connectivity::new(),
            last_attempt: None,
            counters: TelemetryCounters::default(),
        }
    }

    /// Brings the link up once, then tries a first session.
    pub fn connect_link(&mut self, now: Duration) {
        self.connectivity.set_link(ConnectivityState::Connecting);
        let up = self
            .link
            .connect(&self.settings.credentials, self.settings.link_timeout);

        if up {
            self.connectivity.set_link(ConnectivityState::Connected);
            self.attempt_session(now);
        } else {
            self.connectivity.set_link(ConnectivityState::Disconnected);
            warn!("Link not established, telemetry disabled until restart");
        }
    }

    fn attempt_session(&mut self, now: Duration) {
        self.last_attempt = Some(now);
        self.counters.session_attempts += 1;
        self.connectivity.set_session(ConnectivityState::Connecting);

        if self.session.connect(&self.settings.device) {
            self.connectivity.set_session(ConnectivityState::Connected);
            info!("Telemetry session connected as {}", self.settings.device);
        } else {
            self.connectivity.set_session(ConnectivityState::Disconnected);
            debug!(
                "Telemetry session attempt {} failed",
                self.counters.session_attempts
            );
        }
    }

    fn retry_due(&self, now: Duration) -> bool {
        self.last_attempt
            .map_or(true, |last| now.saturating_sub(last) >= self.settings.retry_interval)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn counters(&self) -> TelemetryCounters {
        self.counters
    }

    /// Time of the last session attempt.
    pub fn last_attempt(&self) -> Option<Duration> {
        self.last_attempt
    }
}

impl<L: NetworkLink, P: PublishSession> Sink for TelemetrySink<L, P> {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn start(&mut self, now: Duration) {
        self.connect_link(now);
    }

    fn consume(&mut self, set: &SampleSet) -> Result<()> {
        if !self.connectivity.can_publish() {
            self.counters.skipped += 1;
            return Ok(());
        }

        let payload = TelemetryMessage::from_set(&self.settings.device, set).to_json()?;
        if self.session.publish(&self.settings.topic, &payload) {
            self.counters.published += 1;
        } else {
            self.counters.failed += 1;
            self.connectivity.set_session(ConnectivityState::Disconnected);
            self.session.disconnect();
            debug!("Publish of sample {} failed, session dropped", set.sequence_index());
        }
        Ok(())
    }

    fn on_tick(&mut self, now: Duration) {
        if !self.connectivity.link().is_connected() {
            return;
        }

        if self.link.status() == LinkStatus::Disconnected {
            warn!("Link lost, telemetry disabled until restart");
            self.connectivity.set_link(ConnectivityState::Disconnected);
            self.session.disconnect();
            return;
        }

        match self.connectivity.session() {
            ConnectivityState::Connected => self.session.maintain(),
            _ if self.retry_due(now) => self.attempt_session(now),
            _ => {}
        }
    }

    fn status(&self) -> SinkStatus {
        let detail = match (self.connectivity.link(), self.connectivity.session()) {
            (ConnectivityState::Connected, ConnectivityState::Connected) => "ONLINE",
            (ConnectivityState::Connected, _) => "LINK",
            _ => "OFFLINE",
        };
        SinkStatus::new(self.connectivity.can_publish(), detail)
    }
}
