//! Process-wide, single-fire cancellation.
//!
//! A [`Cancellation`] is fired at most once and stays fired. Any number of
//! sources may try to fire it (OS signals, the shutdown coordinator, the
//! component loop itself); only the first one wins and its
//! [`CancelReason`] is what every observer sees.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why the component was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// SIGINT, SIGTERM, SIGHUP or Ctrl-C.
    Signal,
    /// A peer disconnected from one of the ports.
    PortClosed,
    /// The input port's upstream went away.
    InputClosed,
    /// A send or receive failed at the transport.
    TransportFault,
    /// Cancelled from code.
    Requested,
}

impl CancelReason {
    /// Process exit status for a run that ended with this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::TransportFault => 1,
            Self::Signal | Self::PortClosed | Self::InputClosed | Self::Requested => 0,
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Signal => "signal",
            Self::PortClosed => "port closed",
            Self::InputClosed => "input closed",
            Self::TransportFault => "transport fault",
            Self::Requested => "requested",
        };
        f.write_str(text)
    }
}

/// Cloneable single-fire cancellation token.
#[derive(Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire with `reason`. Returns true only for the call that fired it.
    pub fn trigger(&self, reason: CancelReason) -> bool {
        let fired = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if fired {
            info!(reason = %reason, "Cancellation fired");
        }
        fired
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    /// Wait until fired and return the reason.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(CancelReason::Requested),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => CancelReason::Requested,
        };
        reason
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Fire `cancel` on SIGINT, SIGTERM or SIGHUP (Ctrl-C off Unix).
///
/// The listener exits once `cancel` fires for any other reason.
pub fn spawn_signal_listener(cancel: Cancellation) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => match received {
                Ok(name) => {
                    info!(signal = name, "Received signal, shutting down");
                    cancel.trigger(CancelReason::Signal);
                }
                Err(e) => warn!(error = %e, "Cannot listen for signals"),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

#[cfg(test)]
mod tests;
