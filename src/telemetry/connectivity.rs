//! # Connectivity State
//!
//! Link and publish-session states of the telemetry sink.
//!
//! The two layers evolve independently, but the pair never reaches a state
//! where the session is up while the link is not: every setter goes through
//! [`Connectivity`], which drops the session whenever the link leaves
//! `Connected`.

/// State of one connectivity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectivityState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

/// Link layer and publish-session layer, composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
    link: ConnectivityState,
    session: ConnectivityState,
}

impl Connectivity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn link(&self) -> ConnectivityState {
        self.link
    }

    #[must_use]
    pub fn session(&self) -> ConnectivityState {
        self.session
    }

    /// Sets the link state; anything but `Connected` also drops the session.
    pub fn set_link(&mut self, state: ConnectivityState) {
        self.link = state;
        if !state.is_connected() {
            self.session = ConnectivityState::Disconnected;
        }
    }

    /// Sets the session state.
    ///
    /// Returns `false` and leaves the session untouched if the link is not
    /// connected and `state` is anything other than `Disconnected`.
    pub fn set_session(&mut self, state: ConnectivityState) -> bool {
        if state != ConnectivityState::Disconnected && !self.link.is_connected() {
            return false;
        }
        self.session = state;
        true
    }

    /// `true` when samples can be published.
    #[must_use]
    pub fn can_publish(&self) -> bool {
        self.link.is_connected() && self.session.is_connected()
    }
}
