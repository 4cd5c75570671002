//! Component-level errors.

use std::time::Duration;

use crate::port::PortError;
use crate::transport::TransportError;

/// Errors that end a component run.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error("timed out after {timeout:?} waiting for ports to connect: {}", missing.join(", "))]
    ConnectionTimeout {
        timeout: Duration,
        missing: Vec<String>,
    },

    #[error("transport failure on port '{port}': {source}")]
    Transport {
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("unknown port '{0}'")]
    UnknownPort(String),

    #[error("component cancelled")]
    Cancelled,
}

impl ComponentError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ComponentError>;
