//! # Network Collaborators
//!
//! Interfaces of the two connectivity layers used by the telemetry sink, and
//! host implementations of both:
//!
//! - [`TcpLink`]: reachability of the broker host, probed with a bounded
//!   `connect_timeout`
//! - [`UdpSession`]: fire-and-forget datagram publisher. Each datagram is
//!   `<topic> <payload>`; idle sessions send `$ping <client id>` every
//!   keep-alive interval
//!
//! Both are non-blocking after startup: a send that would block counts as a
//! failed publish.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Network credentials for the link layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub passphrase: String,
}

/// Link layer status as reported by the network collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected,
}

/// Link layer collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkLink {
    /// Brings the link up, giving up after `timeout`.
    fn connect(&mut self, credentials: &Credentials, timeout: Duration) -> bool;

    /// Current link status.
    fn status(&self) -> LinkStatus;
}

/// Publish-session collaborator.
#[cfg_attr(test, mockall::automock)]
pub trait PublishSession {
    /// Opens a session identified by `client_id`.
    fn connect(&mut self, client_id: &str) -> bool;

    /// Sends one message; `false` if it could not be handed to the network.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool;

    /// Protocol keep-alive; called every loop tick.
    fn maintain(&mut self);

    /// Drops the session.
    fn disconnect(&mut self);
}

fn resolve(address: &str) -> Option<SocketAddr> {
    match address.to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            warn!("Failed to resolve {}: {}", address, e);
            None
        }
    }
}

/// Link that is up when the broker host accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpLink {
    broker: String,
    connected: bool,
}

impl TcpLink {
    /// Creates a link probe for `broker` (`host:port`).
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            connected: false,
        }
    }
}

impl NetworkLink for TcpLink {
    fn connect(&mut self, credentials: &Credentials, timeout: Duration) -> bool {
        debug!(
            "Bringing up link for network '{}' (broker {})",
            credentials.ssid, self.broker
        );

        self.connected = match resolve(&self.broker) {
            Some(addr) => match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Broker {} unreachable: {}", self.broker, e);
                    false
                }
            },
            None => false,
        };

        if self.connected {
            info!("Link up, broker {} reachable", self.broker);
        }
        self.connected
    }

    fn status(&self) -> LinkStatus {
        if self.connected {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }
}

/// Datagram publisher.
#[derive(Debug)]
pub struct UdpSession {
    broker: String,
    keepalive: Duration,
    client_id: String,
    socket: Option<UdpSocket>,
    last_send: Option<Instant>,
}

impl UdpSession {
    /// Creates a disconnected session towards `broker` (`host:port`).
    pub fn new(broker: impl Into<String>, keepalive: Duration) -> Self {
        Self {
            broker: broker.into(),
            keepalive,
            client_id: String::new(),
            socket: None,
            last_send: None,
        }
    }

    fn open_socket(&self) -> std::io::Result<UdpSocket> {
        let addr = resolve(&self.broker)
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "broker not resolvable"))?;
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        socket.connect(addr)?;
        Ok(socket)
    }

    fn send(&mut self, datagram: &[u8]) -> bool {
        let Some(socket) = &self.socket else {
            return false;
        };
        match socket.send(datagram) {
            Ok(_) => {
                self.last_send = Some(Instant::now());
                true
            }
            Err(e) => {
                debug!("Datagram send failed: {}", e);
                false
            }
        }
    }
}

impl PublishSession for UdpSession {
    fn connect(&mut self, client_id: &str) -> bool {
        match self.open_socket() {
            Ok(socket) => {
                info!("Publish session open as {} to {}", client_id, self.broker);
                self.client_id = client_id.to_string();
                self.socket = Some(socket);
                self.last_send = Some(Instant::now());
                true
            }
            Err(e) => {
                warn!("Failed to open publish session to {}: {}", self.broker, e);
                self.socket = None;
                false
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        let mut datagram = Vec::with_capacity(topic.len() + 1 + payload.len());
        datagram.extend_from_slice(topic.as_bytes());
        datagram.push(b' ');
        datagram.extend_from_slice(payload);
        self.send(&datagram)
    }

    fn maintain(&mut self) {
        let idle = self
            .last_send
            .map_or(true, |last| last.elapsed() >= self.keepalive);
        if self.socket.is_some() && idle {
            let ping = format!("$ping {}", self.client_id);
            self.send(ping.as_bytes());
        }
    }

    fn disconnect(&mut self) {
        self.socket = None;
        self.last_send = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_link_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut link = TcpLink::new(addr.to_string());

        assert_eq!(link.status(), LinkStatus::Disconnected);
        assert!(link.connect(&Credentials::default(), Duration::from_millis(500)));
        assert_eq!(link.status(), LinkStatus::Connected);
    }

    #[test]
    fn test_tcp_link_unresolvable_broker() {
        let mut link = TcpLink::new("not a host name");
        assert!(!link.connect(&Credentials::default(), Duration::from_millis(50)));
        assert_eq!(link.status(), LinkStatus::Disconnected);
    }

    #[test]
    fn test_udp_session_publishes_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut session = UdpSession::new(
            receiver.local_addr().unwrap().to_string(),
            Duration::from_secs(60),
        );

        assert!(!session.publish("volts", b"{}"), "not connected yet");
        assert!(session.connect("scope-01"));
        assert!(session.publish("volts", br#"{"ch0":1.0}"#));

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], br#"volts {"ch0":1.0}"#);

        session.disconnect();
        assert!(!session.publish("volts", b"{}"));
    }

    #[test]
    fn test_udp_session_keepalive() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut session = UdpSession::new(receiver.local_addr().unwrap().to_string(), Duration::ZERO);

        assert!(session.connect("scope-01"));
        session.maintain();

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"$ping scope-01");
    }
}
