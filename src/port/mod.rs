//! Named, directional message channel endpoints.
//!
//! A [`Port`] wraps one transport [`Link`] and gives it a name and a role.
//! Input ports bind their endpoint and only receive; output and error-output
//! ports connect and only send.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

use crate::packet::Frames;
use crate::transport::{
    Endpoint, Link, LinkMode, LinkOptions, LinkState, TransportContext, TransportError,
};

/// Errors raised by port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("cannot open port '{port}': {source}")]
    Connection {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("transport failure on port '{port}': {source}")]
    Transport {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("no message available")]
    WouldBlock,

    #[error("port '{port}' is closed")]
    Closed { port: String },

    #[error("port '{port}' does not support this direction")]
    WrongDirection { port: String },
}

/// What a port is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Input,
    Output,
    /// Optional output carrying domain error text.
    ErrorOutput,
}

impl PortRole {
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input)
    }

    /// Output and error-output ports both send.
    pub fn is_output(self) -> bool {
        !self.is_input()
    }

    fn link_mode(self) -> LinkMode {
        match self {
            Self::Input => LinkMode::Bind,
            Self::Output | Self::ErrorOutput => LinkMode::Connect,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::ErrorOutput => "error-output",
        }
    }
}

impl std::fmt::Display for PortRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection events of one port: `true` per peer connect, `false` per
/// peer disconnect. Ends when the port is closed.
pub struct ConnectionEvents {
    inner: UnboundedReceiverStream<bool>,
}

impl Stream for ConnectionEvents {
    type Item = bool;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<bool>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A named port owning its transport link.
pub struct Port {
    name: String,
    role: PortRole,
    link: Link,
}

impl Port {
    /// Open a port on `endpoint`.
    ///
    /// Input ports bind, so an occupied or invalid address fails here. Output
    /// ports connect in the background and only fail on a malformed endpoint.
    pub async fn open(
        context: &TransportContext,
        name: &str,
        endpoint: &str,
        role: PortRole,
        options: &LinkOptions,
    ) -> Result<Self, PortError> {
        let connection_err = |source| PortError::Connection {
            port: name.to_string(),
            source,
        };

        let parsed: Endpoint = endpoint.trim().parse().map_err(connection_err)?;
        let link = context
            .open(&parsed, role.link_mode(), options)
            .await
            .map_err(connection_err)?;

        info!(port = %name, role = %role, endpoint = %link.endpoint(), "Port opened");
        Ok(Self {
            name: name.to_string(),
            role,
            link,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> PortRole {
        self.role
    }

    /// The endpoint actually in use. For `tcp://host:0` binds this carries
    /// the assigned port.
    pub fn local_endpoint(&self) -> &Endpoint {
        self.link.endpoint()
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// True once every peer that connected has gone away.
    pub fn is_disconnected(&self) -> bool {
        self.state() == LinkState::Disconnected
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    /// Take this port's connection events. Only the first call returns them.
    pub fn connection_events(&self) -> Option<ConnectionEvents> {
        self.link
            .take_events()
            .map(|rx| ConnectionEvents {
                inner: UnboundedReceiverStream::new(rx),
            })
    }

    /// Block until a message arrives.
    pub async fn recv(&self) -> Result<Frames, PortError> {
        self.check_input()?;
        self.link.recv().await.map_err(|e| self.map_err(e))
    }

    /// Take a message if one is ready, `PortError::WouldBlock` otherwise.
    pub fn try_recv(&self) -> Result<Frames, PortError> {
        self.check_input()?;
        self.link.try_recv().map_err(|e| self.map_err(e))
    }

    /// Send one message to the peer.
    pub async fn send(&self, frames: Frames) -> Result<(), PortError> {
        if !self.role.is_output() {
            return Err(PortError::WrongDirection {
                port: self.name.clone(),
            });
        }
        self.link.send(frames).await.map_err(|e| self.map_err(e))
    }

    /// Release the transport. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.link.is_closed() {
            self.link.close();
            debug!(port = %self.name, "Port closed");
        }
    }

    fn check_input(&self) -> Result<(), PortError> {
        if self.role.is_input() {
            Ok(())
        } else {
            Err(PortError::WrongDirection {
                port: self.name.clone(),
            })
        }
    }

    fn map_err(&self, err: TransportError) -> PortError {
        match err {
            TransportError::WouldBlock => PortError::WouldBlock,
            TransportError::Closed => PortError::Closed {
                port: self.name.clone(),
            },
            source => PortError::Transport {
                port: self.name.clone(),
                source,
            },
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("endpoint", self.link.endpoint())
            .field("state", &self.link.state())
            .finish()
    }
}
