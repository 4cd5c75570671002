//! Per-component runtime context.
//!
//! A [`Component`] owns every open [`Port`], the [`Cancellation`] token and
//! the background tasks watching them. It is created once at startup by
//! [`Component::start`], handed to the component loop by reference, and
//! closes all of its ports exactly once when the loop is done.
//!
//! Startup order:
//! 1. validate endpoints against the declared [`ComponentSpec`]
//! 2. open ports (inputs bind, outputs connect)
//! 3. wait on the connection barrier, aborting on timeout or cancellation
//! 4. hand the merged connection events to the shutdown coordinator

pub mod descriptor;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::barrier::{BarrierOutcome, BarrierStrategy, ConnectionBarrier};
use crate::cancel::{spawn_signal_listener, CancelReason, Cancellation};
use crate::config::Settings;
use crate::error::{ComponentError, Result};
use crate::events::EventFanIn;
use crate::packet::{is_valid_packet, Frames, Packet};
use crate::port::{Port, PortError, PortRole};
use crate::shutdown::ShutdownCoordinator;
use crate::transport::{TransportContext, TransportError};
use crate::utils::retry::{PollBackoff, PollDelays};

pub use descriptor::{Descriptor, PortDescriptor};

/// Endpoint strings keyed by port name.
pub type Endpoints = BTreeMap<String, String>;

/// Declaration of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub role: PortRole,
    pub description: String,
    /// Payload type advertised in the self-description.
    pub type_name: String,
    /// An endpoint must be given for this port.
    pub required: bool,
    /// Connection events feed the barrier and shutdown coordinator.
    pub monitored: bool,
}

impl PortSpec {
    fn new(name: &str, role: PortRole, description: &str) -> Self {
        Self {
            name: name.to_string(),
            role,
            description: description.to_string(),
            type_name: "string".to_string(),
            required: true,
            monitored: true,
        }
    }

    pub fn input(name: &str, description: &str) -> Self {
        Self::new(name, PortRole::Input, description)
    }

    pub fn output(name: &str, description: &str) -> Self {
        Self::new(name, PortRole::Output, description)
    }

    pub fn error_output(name: &str, description: &str) -> Self {
        Self::new(name, PortRole::ErrorOutput, description)
    }

    /// The port may be left unconfigured.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Keep the port out of the barrier and shutdown coordinator.
    pub fn unmonitored(mut self) -> Self {
        self.monitored = false;
        self
    }

    pub fn with_type(mut self, type_name: &str) -> Self {
        self.type_name = type_name.to_string();
        self
    }
}

/// Declared shape of a component.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    name: String,
    description: String,
    ports: Vec<PortSpec>,
    barrier: BarrierStrategy,
}

impl ComponentSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ports: Vec::new(),
            barrier: BarrierStrategy::default(),
        }
    }

    pub fn port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }

    pub fn barrier(mut self, strategy: BarrierStrategy) -> Self {
        self.barrier = strategy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    pub fn barrier_strategy(&self) -> BarrierStrategy {
        self.barrier
    }

    pub fn find_port(&self, name: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor::from_spec(self)
    }

    /// Check `endpoints` before anything is opened.
    ///
    /// Port names must be unique. Every required port needs a non-empty
    /// endpoint; names that match no declared port are rejected.
    pub fn validate(&self, endpoints: &Endpoints) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.ports.iter().find(|p| !seen.insert(p.name.as_str())) {
            return Err(ComponentError::Configuration(format!(
                "port '{}' declared more than once on component '{}'",
                dup.name, self.name
            )));
        }

        if let Some(unknown) = endpoints.keys().find(|name| self.find_port(name).is_none()) {
            return Err(ComponentError::Configuration(format!(
                "no port named '{}' on component '{}'",
                unknown, self.name
            )));
        }

        let missing: Vec<&str> = self
            .ports
            .iter()
            .filter(|port| port.required)
            .filter(|port| endpoint_for(endpoints, &port.name).is_none())
            .map(|port| port.name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ComponentError::Configuration(format!(
                "missing endpoint for port(s): {}",
                missing.join(", ")
            )))
        }
    }
}

fn endpoint_for<'a>(endpoints: &'a Endpoints, port: &str) -> Option<&'a str> {
    endpoints
        .get(port)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Domain logic driven by a [`Component`].
#[async_trait]
pub trait ComponentLoop: Send + Sync {
    /// Ports and barrier this loop needs.
    fn spec(&self) -> ComponentSpec;

    /// Run until done or cancelled. Ports are closed by the caller.
    async fn run(&self, component: &Component) -> Result<()>;
}

/// A running component.
pub struct Component {
    name: String,
    ports: Vec<Port>,
    cancel: Cancellation,
    poll_backoff: PollBackoff,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    coordinator: Mutex<Option<JoinHandle<Option<String>>>>,
    closed: AtomicBool,
}

impl Component {
    /// Start with a fresh transport context and an OS signal listener.
    pub async fn start(spec: &ComponentSpec, endpoints: &Endpoints, settings: &Settings) -> Result<Self> {
        let cancel = Cancellation::new();
        let signals = spawn_signal_listener(cancel.clone());

        match Self::start_in(spec, endpoints, settings, &TransportContext::new(), cancel).await {
            Ok(component) => {
                component.track(signals);
                Ok(component)
            }
            Err(e) => {
                signals.abort();
                Err(e)
            }
        }
    }

    /// Start inside an existing transport context, fired by `cancel`.
    ///
    /// No signal listener is installed; callers own `cancel`.
    pub async fn start_in(
        spec: &ComponentSpec,
        endpoints: &Endpoints,
        settings: &Settings,
        context: &TransportContext,
        cancel: Cancellation,
    ) -> Result<Self> {
        spec.validate(endpoints)?;
        let strategy = settings.barrier.unwrap_or(spec.barrier);
        let options = settings.link_options();

        let mut ports = Vec::new();
        for port_spec in &spec.ports {
            let Some(endpoint) = endpoint_for(endpoints, &port_spec.name) else {
                debug!(port = %port_spec.name, "Optional port not configured");
                continue;
            };
            let port = Port::open(context, &port_spec.name, endpoint, port_spec.role, &options).await;
            match port {
                Ok(port) => {
                    debug!(port = %port.name(), endpoint = %port.local_endpoint(), role = %port.role(), "Port opened");
                    ports.push(port);
                }
                Err(e) => {
                    close_all(&ports);
                    return Err(e.into());
                }
            }
        }

        let mut fan_in = EventFanIn::new();
        let mut required = Vec::new();
        for port in &ports {
            let monitored = spec.find_port(port.name()).is_some_and(|p| p.monitored);
            if !monitored {
                continue;
            }
            if let Some(events) = port.connection_events() {
                fan_in.add(port.name(), events);
            }
            if strategy.requires(port.role()) {
                required.push(port.name().to_string());
            }
        }

        let timeout = settings.connection_timeout();
        let outcome = tokio::select! {
            outcome = ConnectionBarrier::await_all(&mut fan_in, &required, timeout) => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        match outcome {
            Some(BarrierOutcome::Connected) => {}
            Some(BarrierOutcome::TimedOut { missing }) => {
                close_all(&ports);
                return Err(ComponentError::ConnectionTimeout { timeout, missing });
            }
            None => {
                close_all(&ports);
                return Err(ComponentError::Cancelled);
            }
        }

        let coordinator = ShutdownCoordinator::spawn(fan_in, cancel.clone());
        info!(component = %spec.name, ports = ports.len(), barrier = ?strategy, "Component started");

        Ok(Self {
            name: spec.name.clone(),
            ports,
            cancel,
            poll_backoff: settings.poll_backoff(),
            tasks: Mutex::new(Vec::new()),
            coordinator: Mutex::new(Some(coordinator)),
            closed: AtomicBool::new(false),
        })
    }

    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Look up an open port.
    pub fn port(&self, name: &str) -> Result<&Port> {
        self.ports
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ComponentError::UnknownPort(name.to_string()))
    }

    /// Whether an (optional) port was configured and opened.
    pub fn has_port(&self, name: &str) -> bool {
        self.ports.iter().any(|p| p.name() == name)
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fresh delay sequence for [`Component::poll_packet`].
    pub fn poll_delays(&self) -> PollDelays {
        self.poll_backoff.delays()
    }

    /// Block for the next data IP on an input port.
    ///
    /// Malformed messages and bracket IPs are dropped. Returns `Ok(None)` once the component
    /// is cancelled or the port is closed.
    pub async fn recv_packet(&self, name: &str) -> Result<Option<Packet>> {
        let port = self.port(name)?;
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                received = port.recv() => received,
            };
            match received {
                Ok(frames) => {
                    if let Some(packet) = accept(port, frames) {
                        return Ok(Some(packet));
                    }
                }
                Err(e) => return self.receive_failed(port, e),
            }
        }
    }

    /// Poll an input port for the next data IP.
    ///
    /// Sleeps per `delays` while nothing is queued. If the port's upstream
    /// has disconnected and nothing is left, requests cancellation with
    /// [`CancelReason::InputClosed`] and returns `Ok(None)`.
    pub async fn poll_packet(&self, name: &str, delays: &mut PollDelays) -> Result<Option<Packet>> {
        let port = self.port(name)?;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            match port.try_recv() {
                Ok(frames) => {
                    delays.reset();
                    if let Some(packet) = accept(port, frames) {
                        return Ok(Some(packet));
                    }
                }
                Err(PortError::WouldBlock) => {
                    if self.input_closed(name) {
                        return Ok(None);
                    }
                    let delay = delays.next_delay();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Ok(None),
                    }
                }
                Err(e) => return self.receive_failed(port, e),
            }
        }
    }

    /// True if the input port's upstream is gone; requests cancellation if so.
    pub fn input_closed(&self, name: &str) -> bool {
        match self.port(name) {
            Ok(port) if port.is_disconnected() => {
                if self.cancel.trigger(CancelReason::InputClosed) {
                    info!(port = %name, "Input disconnected, stopping");
                }
                true
            }
            Ok(port) => port.is_closed(),
            Err(_) => false,
        }
    }

    /// Send one IP.
    ///
    /// A peer that has gone away cancels the component with
    /// [`CancelReason::PortClosed`]; any other transport failure fires
    /// [`CancelReason::TransportFault`] and is returned.
    pub async fn send_packet(&self, name: &str, packet: Packet) -> Result<()> {
        let port = self.port(name)?;
        let sent = tokio::select! {
            sent = port.send(packet.into_frames()) => sent,
            _ = self.cancel.cancelled() => return Err(ComponentError::Cancelled),
        };
        match sent {
            Ok(()) => Ok(()),
            Err(PortError::Transport {
                source: TransportError::Disconnected,
                ..
            }) => {
                self.cancel.trigger(CancelReason::PortClosed);
                Err(ComponentError::Cancelled)
            }
            Err(PortError::Transport { port, source }) => {
                warn!(port = %port, error = %source, "Send failed");
                self.cancel.trigger(CancelReason::TransportFault);
                Err(ComponentError::Transport { port, source })
            }
            Err(PortError::Closed { .. }) => Err(ComponentError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    /// Close one port ahead of the rest.
    pub fn close_port(&self, name: &str) -> Result<()> {
        self.port(name)?.close();
        Ok(())
    }

    /// Close every port and stop background tasks. Only the first call acts.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut coordinator) = self.coordinator.lock() {
            if let Some(task) = coordinator.take() {
                task.abort();
            }
        }
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        close_all(&self.ports);
        info!(component = %self.name, reason = ?self.cancel.reason(), "Component closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Exit status for a run whose loop returned normally.
    pub fn exit_code(&self) -> i32 {
        self.cancel.reason().map_or(0, CancelReason::exit_code)
    }

    fn receive_failed(&self, port: &Port, err: PortError) -> Result<Option<Packet>> {
        match err {
            PortError::Closed { .. } => Ok(None),
            PortError::Transport {
                source: TransportError::Disconnected,
                ..
            } => {
                self.cancel.trigger(CancelReason::InputClosed);
                Ok(None)
            }
            PortError::Transport { port: name, source } => {
                warn!(port = %port.name(), error = %source, "Receive failed");
                self.cancel.trigger(CancelReason::TransportFault);
                Err(ComponentError::Transport { port: name, source })
            }
            e => Err(e.into()),
        }
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("ports", &self.ports)
            .field("cancel", &self.cancel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Turn a received message into a data IP, or drop it.
///
/// Malformed messages, bracket IPs and grouped messages are all discarded.
fn accept(port: &Port, frames: Frames) -> Option<Packet> {
    if !is_valid_packet(&frames) {
        debug!(port = %port.name(), frames = frames.len(), "Discarding malformed packet");
        return None;
    }
    match Packet::from_frames(&frames) {
        Some(packet) if packet.is_data() => Some(packet),
        Some(packet) => {
            debug!(port = %port.name(), kind = ?packet.kind(), "Discarding bracket packet");
            None
        }
        None => {
            debug!(port = %port.name(), frames = frames.len(), "Discarding grouped message");
            None
        }
    }
}

fn close_all(ports: &[Port]) {
    for port in ports {
        port.close();
    }
}
