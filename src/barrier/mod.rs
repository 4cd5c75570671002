//! Startup gate: wait for every required port to see a peer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{AllConnected, EventFanIn};
use crate::port::PortRole;

/// Which ports must report a connection before processing starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierStrategy {
    /// Output and error-output ports. Inputs may connect later.
    #[default]
    Outputs,
    /// Every monitored port, inputs included.
    AllPorts,
    /// Start immediately.
    Nothing,
}

impl BarrierStrategy {
    /// Whether a port with this role takes part in the barrier.
    pub fn requires(self, role: PortRole) -> bool {
        match self {
            Self::Outputs => role.is_output(),
            Self::AllPorts => true,
            Self::Nothing => false,
        }
    }
}

impl std::str::FromStr for BarrierStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "outputs" => Ok(Self::Outputs),
            "all_ports" | "all" => Ok(Self::AllPorts),
            "nothing" | "none" => Ok(Self::Nothing),
            other => Err(format!("unknown barrier strategy '{other}'")),
        }
    }
}

/// Result of waiting on the barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    Connected,
    TimedOut { missing: Vec<String> },
}

/// Counts distinct connected ports over a fan-in.
pub struct ConnectionBarrier;

impl ConnectionBarrier {
    /// Wait until every port in `required` has emitted its first `true`.
    ///
    /// Event order across ports does not matter. If the fan-in runs dry before
    /// the count is reached the wait continues until `timeout`.
    pub async fn await_all(
        fan_in: &mut EventFanIn,
        required: &[String],
        timeout: Duration,
    ) -> BarrierOutcome {
        let mut policy = AllConnected::new(required.iter().cloned());
        if required.is_empty() {
            return BarrierOutcome::Connected;
        }

        info!(required = ?required, timeout = ?timeout, "Waiting for port connections");
        let wait = async {
            if fan_in.until(&mut policy).await.is_none() {
                std::future::pending::<()>().await;
            }
        };

        let waited = tokio::time::timeout(timeout, wait).await;
        match waited {
            Ok(()) => {
                info!(ports = required.len(), "All required ports connected");
                BarrierOutcome::Connected
            }
            Err(_) => {
                let missing = policy.missing();
                warn!(missing = ?missing, timeout = ?timeout, "Timed out waiting for port connections");
                BarrierOutcome::TimedOut { missing }
            }
        }
    }
}
