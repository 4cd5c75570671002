//! Message transport underneath ports.
//!
//! Supports:
//! - TCP: `tcp://host:port` (network)
//! - IPC: `ipc:///path/to.sock` (Unix domain sockets)
//! - In-process: `inproc://name` (scoped to a [`TransportContext`])
//!
//! Every transport carries the same length-prefixed multi-frame messages
//! (see [`codec`]) and reports peer connect/disconnect as connection events.
//! Input ports bind their endpoint, output ports connect to it.

mod acceptor;
pub mod codec;
mod link;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::sync::mpsc;

pub use link::{Link, LinkState};

/// Errors raised by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inproc endpoint '{0}' is already bound")]
    AlreadyBound(String),

    #[error("inproc endpoint '{0}' is not bound")]
    NotBound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("message of {0} frames exceeds the maximum frame count")]
    TooManyFrames(usize),

    #[error("peer disconnected")]
    Disconnected,

    #[error("transport closed")]
    Closed,

    #[error("no message available")]
    WouldBlock,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Parsed endpoint descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp(String),
    /// `ipc:///path`
    Ipc(PathBuf),
    /// `inproc://name`
    Inproc(String),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        let (scheme, rest) = s.split_once("://").ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }

        match scheme {
            "tcp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                if host.is_empty() || port.parse::<u16>().is_err() {
                    return Err(invalid());
                }
                Ok(Self::Tcp(rest.to_string()))
            }
            "ipc" => {
                let path = PathBuf::from(rest);
                if !path.is_absolute() {
                    return Err(invalid());
                }
                Ok(Self::Ipc(path))
            }
            "inproc" => Ok(Self::Inproc(rest.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Self::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Which side of the connection a link plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Listen on the endpoint and accept peers.
    Bind,
    /// Dial the endpoint, retrying until a peer is listening.
    Connect,
}

/// Tuning knobs for a link.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Messages buffered per direction before senders wait.
    pub high_water_mark: usize,
    /// First reconnect delay.
    pub reconnect_min: Duration,
    /// Reconnect delay ceiling.
    pub reconnect_max: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            high_water_mark: 1000,
            reconnect_min: Duration::from_millis(10),
            reconnect_max: Duration::from_secs(1),
        }
    }
}

type InprocRegistry = HashMap<String, mpsc::UnboundedSender<DuplexStream>>;

/// Shared transport state for one component.
///
/// Owns the `inproc://` namespace, so two ports can only meet in-process if
/// they were opened from the same (or a cloned) context.
#[derive(Clone, Default)]
pub struct TransportContext {
    inproc: Arc<Mutex<InprocRegistry>>,
}

impl TransportContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a link on an endpoint.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        mode: LinkMode,
        options: &LinkOptions,
    ) -> Result<Link> {
        match mode {
            LinkMode::Bind => Link::bind(self, endpoint, options).await,
            LinkMode::Connect => Ok(Link::connect(self, endpoint, options)),
        }
    }

    pub(crate) fn register_inproc(
        &self,
        name: &str,
    ) -> Result<mpsc::UnboundedReceiver<DuplexStream>> {
        let mut registry = self.inproc.lock().map_err(|_| TransportError::Closed)?;
        if let Some(existing) = registry.get(name) {
            if !existing.is_closed() {
                return Err(TransportError::AlreadyBound(name.to_string()));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(name.to_string(), tx);
        Ok(rx)
    }

    /// Drop the binding for `name` now, so it can be bound again at once.
    pub(crate) fn release_inproc(&self, name: &str) {
        if let Ok(mut registry) = self.inproc.lock() {
            registry.remove(name);
        }
    }

    /// Drop the binding for `name` if its listener is gone.
    pub(crate) fn unregister_inproc(&self, name: &str) {
        if let Ok(mut registry) = self.inproc.lock() {
            if registry.get(name).is_some_and(|tx| tx.is_closed()) {
                registry.remove(name);
            }
        }
    }

    /// Hand one half of a fresh in-memory stream to the listener bound at `name`.
    pub(crate) fn dial_inproc(&self, name: &str, buffer: usize) -> Result<DuplexStream> {
        let registry = self.inproc.lock().map_err(|_| TransportError::Closed)?;
        let listener = registry
            .get(name)
            .ok_or_else(|| TransportError::NotBound(name.to_string()))?;
        let (local, remote) = tokio::io::duplex(buffer);
        listener
            .send(remote)
            .map_err(|_| TransportError::NotBound(name.to_string()))?;
        Ok(local)
    }
}
