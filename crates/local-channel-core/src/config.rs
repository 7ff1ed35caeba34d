//! Local channel driver configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LocalChannelError, Result};

/// Local channel driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalChannelConfig {
    /// Context used when the dial string has no `@context`
    pub default_context: String,

    /// Jitter buffer template copied into every new pair
    pub jitterbuffer: JitterBufferConfig,

    /// Deadlock avoidance backoff settings
    pub locking: LockingConfig,

    /// Maximum number of live channels in the directory (None = unlimited)
    pub max_channels: Option<usize>,

    /// Capacity of the driver event broadcast channel
    pub event_capacity: usize,
}

impl Default for LocalChannelConfig {
    fn default() -> Self {
        Self {
            default_context: "default".to_string(),
            jitterbuffer: JitterBufferConfig::default(),
            locking: LockingConfig::default(),
            max_channels: None,
            event_capacity: 256,
        }
    }
}

impl LocalChannelConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LocalChannelError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Check invariants that serde can not express
    pub fn validate(&self) -> Result<()> {
        if self.default_context.is_empty() {
            return Err(LocalChannelError::config("default_context must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(LocalChannelError::config("event_capacity must be greater than zero"));
        }
        if self.locking.backoff_micros == 0 {
            return Err(LocalChannelError::config("locking.backoff_micros must be greater than zero"));
        }
        if self.locking.max_attempts == Some(0) {
            return Err(LocalChannelError::config("locking.max_attempts must be greater than zero"));
        }
        Ok(())
    }
}

/// Jitter buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBufferConfig {
    /// Whether the jitter buffer is enabled
    pub enabled: bool,
    /// Force the jitter buffer even if the peer can not jitter
    pub force: bool,
    /// Maximum size in milliseconds (-1 = implementation default)
    pub max_size: i64,
    /// Resynchronization threshold in milliseconds (-1 = implementation default)
    pub resync_threshold: i64,
    /// Jitter buffer implementation name
    pub implementation: String,
    /// Extra target delay in milliseconds (-1 = implementation default)
    pub target_extra: i64,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            force: false,
            max_size: -1,
            resync_threshold: -1,
            implementation: String::new(),
            target_extra: -1,
        }
    }
}

/// Retry-backoff settings for the multi-object lock acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Sleep between attempts, in microseconds
    pub backoff_micros: u64,
    /// Give up after this many attempts (None = retry forever)
    pub max_attempts: Option<u32>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            backoff_micros: 1,
            max_attempts: if cfg!(test) { Some(1_000_000) } else { None },
        }
    }
}

impl LockingConfig {
    /// Backoff as a duration
    pub fn backoff(&self) -> Duration {
        Duration::from_micros(self.backoff_micros)
    }
}
