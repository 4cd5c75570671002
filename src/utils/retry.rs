//! Backoff policies: transport reconnects and empty-poll delays.
//!
//! Both are built on `backon` builders so reconnects and polling share one
//! notion of delay sequences.

use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};

use crate::transport::LinkOptions;

/// Backoff for dialing a peer that is not listening yet.
///
/// Exponential between the link's reconnect bounds, jittered, never gives up.
pub fn reconnect_backoff(options: &LinkOptions) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(options.reconnect_min)
        .with_max_delay(options.reconnect_max)
        .with_max_times(usize::MAX)
        .with_jitter()
}

/// Delay policy between non-blocking receives that found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBackoff {
    /// Sleep the same interval after every empty poll.
    Fixed(Duration),
    /// Double the delay per empty poll up to `max`; a received message resets it.
    Exponential { min: Duration, max: Duration },
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(2))
    }
}

impl PollBackoff {
    /// Start a fresh delay sequence.
    pub fn delays(&self) -> PollDelays {
        PollDelays {
            policy: *self,
            current: self.build(),
        }
    }

    fn build(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match *self {
            Self::Fixed(interval) => Box::new(
                ConstantBuilder::default()
                    .with_delay(interval)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
            Self::Exponential { min, max } => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(min)
                    .with_max_delay(max)
                    .with_max_times(usize::MAX)
                    .build(),
            ),
        }
    }

    fn ceiling(&self) -> Duration {
        match *self {
            Self::Fixed(interval) => interval,
            Self::Exponential { max, .. } => max,
        }
    }
}

/// A running sequence of poll delays.
pub struct PollDelays {
    policy: PollBackoff,
    current: Box<dyn Iterator<Item = Duration> + Send>,
}

impl PollDelays {
    /// Delay to sleep after the next empty poll.
    pub fn next_delay(&mut self) -> Duration {
        self.current
            .next()
            .unwrap_or_else(|| self.policy.ceiling())
    }

    /// Go back to the first delay after a message arrived.
    pub fn reset(&mut self) {
        self.current = self.policy.build();
    }
}

impl std::fmt::Debug for PollDelays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollDelays")
            .field("policy", &self.policy)
            .finish()
    }
}
