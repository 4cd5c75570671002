//! Shutdown coordinator.
//!
//! Watches the merged connection events of every open port after the barrier
//! has released. The first disconnect on any port fires the cancellation with
//! [`CancelReason::PortClosed`]; later disconnects change nothing.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cancel::{CancelReason, Cancellation};
use crate::events::{EventFanIn, FirstDisconnect};

pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    /// Run the coordinator on its own task.
    pub fn spawn(fan_in: EventFanIn, cancel: Cancellation) -> JoinHandle<Option<String>> {
        tokio::spawn(Self::watch(fan_in, cancel))
    }

    /// Watch until a port disconnects or `cancel` fires elsewhere.
    ///
    /// Returns the name of the port whose disconnect fired the cancellation.
    /// A disconnect already seen by the fan-in (during the barrier) fires
    /// right away.
    pub async fn watch(mut fan_in: EventFanIn, cancel: Cancellation) -> Option<String> {
        if let Some(port) = fan_in.disconnected().first().cloned() {
            return Self::fire(&cancel, port);
        }
        if fan_in.is_empty() {
            debug!("No monitored ports, nothing to watch");
            return None;
        }
        debug!(ports = ?fan_in.ports(), "Watching for disconnects");

        let mut policy = FirstDisconnect::default();
        tokio::select! {
            event = fan_in.until(&mut policy) => match event {
                Some(event) => Self::fire(&cancel, event.port),
                None => {
                    debug!("Every watched port closed locally");
                    None
                }
            },
            _ = cancel.cancelled() => None,
        }
    }

    fn fire(cancel: &Cancellation, port: String) -> Option<String> {
        if cancel.trigger(CancelReason::PortClosed) {
            info!(port = %port, "Peer disconnected, shutting down component");
            Some(port)
        } else {
            None
        }
    }
}
