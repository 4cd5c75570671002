//! Runtime settings shared by every component.
//!
//! Loaded from built-in defaults, an optional YAML file and `FLOWPORT__*`
//! environment variables, later sources overriding earlier ones.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::barrier::BarrierStrategy;
use crate::transport::LinkOptions;
use crate::utils::retry::PollBackoff;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "FLOWPORT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "FLOWPORT";
/// Environment variable holding the log filter used with `--debug`.
pub const LOG_ENV_VAR: &str = "FLOWPORT_LOG";

/// Errors raised while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Poll backoff selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollBackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Component runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How long the connection barrier waits.
    pub connection_timeout_ms: u64,
    /// Delay after an empty poll (first delay when exponential).
    pub poll_interval_ms: u64,
    pub poll_backoff: PollBackoffKind,
    /// Ceiling for exponential poll backoff.
    pub poll_max_interval_ms: u64,
    /// Messages buffered per port direction.
    pub high_water_mark: usize,
    pub reconnect_min_ms: u64,
    pub reconnect_max_ms: u64,
    /// Overrides the component's own barrier strategy.
    pub barrier: Option<BarrierStrategy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 30_000,
            poll_interval_ms: 2_000,
            poll_backoff: PollBackoffKind::Fixed,
            poll_max_interval_ms: 30_000,
            high_water_mark: 1000,
            reconnect_min_ms: 10,
            reconnect_max_ms: 1000,
            barrier: None,
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// Sources, later overriding earlier:
    /// 1. Defaults
    /// 2. File given by `path` (if provided)
    /// 3. File named by `CONFIG_ENV_VAR` (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot drive a component.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection_timeout_ms must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.high_water_mark == 0 {
            return Err(ConfigError::Invalid(
                "high_water_mark must be positive".to_string(),
            ));
        }
        if self.reconnect_min_ms > self.reconnect_max_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect_min_ms ({}) exceeds reconnect_max_ms ({})",
                self.reconnect_min_ms, self.reconnect_max_ms
            )));
        }
        if self.poll_backoff == PollBackoffKind::Exponential
            && self.poll_interval_ms > self.poll_max_interval_ms
        {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_ms ({}) exceeds poll_max_interval_ms ({})",
                self.poll_interval_ms, self.poll_max_interval_ms
            )));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn poll_backoff(&self) -> PollBackoff {
        let interval = Duration::from_millis(self.poll_interval_ms);
        match self.poll_backoff {
            PollBackoffKind::Fixed => PollBackoff::Fixed(interval),
            PollBackoffKind::Exponential => PollBackoff::Exponential {
                min: interval,
                max: Duration::from_millis(self.poll_max_interval_ms),
            },
        }
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            high_water_mark: self.high_water_mark,
            reconnect_min: Duration::from_millis(self.reconnect_min_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
        }
    }

    /// Settings for tests: short timeouts and polls.
    pub fn for_test() -> Self {
        Self {
            connection_timeout_ms: 2_000,
            poll_interval_ms: 10,
            ..Self::default()
        }
    }
}
