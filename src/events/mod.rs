//! Fan-in of connection events from many ports.
//!
//! [`EventFanIn`] merges every port's [`ConnectionEvents`] into one stream of
//! [`PortEvent`]s. Consumers drive it with a [`ReleasePolicy`] that decides
//! which event ends the wait: the barrier counts distinct connected ports,
//! the shutdown coordinator stops at the first disconnect.

use std::collections::HashSet;

use futures::stream::{BoxStream, SelectAll};
use futures::StreamExt;
use tracing::debug;

use crate::port::ConnectionEvents;

/// A connection event tagged with the port it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEvent {
    pub port: String,
    pub connected: bool,
}

impl PortEvent {
    pub fn connected(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            connected: true,
        }
    }

    pub fn disconnected(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            connected: false,
        }
    }
}

/// Decides when a stream of port events has produced what the caller waits for.
pub trait ReleasePolicy {
    /// Feed one event. Returns true once the wait is over.
    fn observe(&mut self, event: &PortEvent) -> bool;

    /// True if the policy is satisfied before any event arrives.
    fn is_released(&self) -> bool {
        false
    }
}

/// Releases once every required port has reported its first connection.
#[derive(Debug, Clone)]
pub struct AllConnected {
    required: HashSet<String>,
    connected: HashSet<String>,
}

impl AllConnected {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            connected: HashSet::new(),
        }
    }

    /// Number of distinct required ports seen connecting.
    pub fn count(&self) -> usize {
        self.connected.len()
    }

    /// Required ports that have not connected yet, sorted.
    pub fn missing(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .required
            .difference(&self.connected)
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

impl ReleasePolicy for AllConnected {
    fn observe(&mut self, event: &PortEvent) -> bool {
        if event.connected && self.required.contains(&event.port) {
            self.connected.insert(event.port.clone());
        }
        self.is_released()
    }

    fn is_released(&self) -> bool {
        self.connected.len() == self.required.len()
    }
}

/// Releases on the first disconnect from any port.
#[derive(Debug, Clone, Default)]
pub struct FirstDisconnect {
    port: Option<String>,
}

impl FirstDisconnect {
    /// The port whose disconnect released the policy.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}

impl ReleasePolicy for FirstDisconnect {
    fn observe(&mut self, event: &PortEvent) -> bool {
        if !event.connected && self.port.is_none() {
            self.port = Some(event.port.clone());
        }
        self.is_released()
    }

    fn is_released(&self) -> bool {
        self.port.is_some()
    }
}

/// Merged connection-event stream over any number of ports.
pub struct EventFanIn {
    streams: SelectAll<BoxStream<'static, PortEvent>>,
    ports: Vec<String>,
    disconnected: Vec<String>,
}

impl EventFanIn {
    pub fn new() -> Self {
        Self {
            streams: SelectAll::new(),
            ports: Vec::new(),
            disconnected: Vec::new(),
        }
    }

    /// Add one port's events under its name.
    pub fn add(&mut self, port: impl Into<String>, events: ConnectionEvents) {
        let port = port.into();
        self.ports.push(port.clone());
        self.streams.push(
            events
                .map(move |connected| PortEvent {
                    port: port.clone(),
                    connected,
                })
                .boxed(),
        );
    }

    /// Add an arbitrary event source. Used for sources that are not ports.
    pub fn add_stream(
        &mut self,
        port: impl Into<String>,
        events: impl futures::Stream<Item = PortEvent> + Send + 'static,
    ) {
        self.ports.push(port.into());
        self.streams.push(events.boxed());
    }

    /// Names of every port feeding this fan-in.
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Ports seen disconnecting so far, in arrival order.
    pub fn disconnected(&self) -> &[String] {
        &self.disconnected
    }

    /// Next event from any port, `None` once every source has ended.
    pub async fn next(&mut self) -> Option<PortEvent> {
        let event = self.streams.next().await?;
        debug!(port = %event.port, connected = event.connected, "Connection event");
        if !event.connected && !self.disconnected.contains(&event.port) {
            self.disconnected.push(event.port.clone());
        }
        Some(event)
    }

    /// Consume events until `policy` releases.
    ///
    /// Returns the releasing event, or `None` if every source ended first.
    /// A policy that is already released returns immediately with `None`.
    pub async fn until<P: ReleasePolicy>(&mut self, policy: &mut P) -> Option<PortEvent> {
        if policy.is_released() {
            return None;
        }
        while let Some(event) = self.next().await {
            if policy.observe(&event) {
                return Some(event);
            }
        }
        None
    }
}

impl Default for EventFanIn {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventFanIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFanIn")
            .field("ports", &self.ports)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}
