//! Timer component.
//!
//! Waits for one interval IP (`1s`, `500ms`, `1m 30s`), closes the
//! `interval` port and then sends the current Unix time in seconds on `out`
//! every interval until cancelled.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::component::{Component, ComponentLoop, ComponentSpec, PortSpec};
use crate::error::Result;
use crate::packet::Packet;

pub const NAME: &str = "core/ticker";
pub const DESCRIPTION: &str = "Sends ticks (current unix timestamps) with a given interval";

pub const INTERVAL_PORT: &str = "interval";
pub const OUT_PORT: &str = "out";

/// Errors parsing the configured interval.
#[derive(Debug, thiserror::Error)]
pub enum IntervalError {
    #[error("invalid interval '{input}': {source}")]
    Parse {
        input: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("interval must be greater than zero")]
    Zero,
}

/// Parse a human-readable duration. Zero is rejected.
pub fn parse_interval(text: &str) -> std::result::Result<Duration, IntervalError> {
    let input = text.trim();
    let interval = humantime::parse_duration(input).map_err(|source| IntervalError::Parse {
        input: input.to_string(),
        source,
    })?;
    if interval.is_zero() {
        return Err(IntervalError::Zero);
    }
    Ok(interval)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct Ticker;

impl Ticker {
    /// Block until a usable interval arrives. `None` when cancelled first.
    async fn await_interval(&self, component: &Component) -> Result<Option<Duration>> {
        info!("Waiting for configuration IP");
        while let Some(packet) = component.recv_packet(INTERVAL_PORT).await? {
            match parse_interval(&packet.payload_str()) {
                Ok(interval) => return Ok(Some(interval)),
                Err(e) => warn!(error = %e, "Ignoring interval IP"),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ComponentLoop for Ticker {
    fn spec(&self) -> ComponentSpec {
        ComponentSpec::new(NAME, DESCRIPTION)
            .port(PortSpec::input(INTERVAL_PORT, "Configure ticker interval (e.g. 5s)").unmonitored())
            .port(PortSpec::output(OUT_PORT, "Timestamps (unix seconds) on every tick"))
    }

    async fn run(&self, component: &Component) -> Result<()> {
        let Some(interval) = self.await_interval(component).await? else {
            return Ok(());
        };
        component.close_port(INTERVAL_PORT)?;
        info!(interval = %humantime::format_duration(interval), "Ticking");

        let mut ticks = interval_at(Instant::now() + interval, interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancel = component.cancellation();

        loop {
            tokio::select! {
                _ = ticks.tick() => {}
                _ = cancel.cancelled() => return Ok(()),
            }
            component
                .send_packet(OUT_PORT, Packet::data(unix_seconds().to_string()))
                .await?;
        }
    }
}
