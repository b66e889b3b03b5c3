//! Runtime Configuration
//!
//! Sizes of the fixed node/page universe and the timing knobs of the simulation.
//! Values come from `Default`, then environment variables, then CLI flags (see `main.rs`).

use crate::error::{IvyError, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_NODE_COUNT: u32 = 10;
pub const DEFAULT_PAGE_COUNT: u32 = 10;
const DEFAULT_MAX_NETWORK_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct IvyConfig {
    /// Nodes are numbered `1..=node_count`.
    pub node_count: u32,
    /// Pages are numbered `1..=page_count`.
    pub page_count: u32,
    /// Upper bound (exclusive) of the random delay injected before each delivery.
    pub max_network_delay: Duration,
    /// How often the incumbent manager pushes a snapshot to its peer.
    pub sync_interval: Duration,
    /// Pause between killing a manager and restarting it.
    pub settle_delay: Duration,
    /// How long a node waits for the grant of a read/write request.
    pub reply_timeout: Duration,
    /// How long a manager waits for each acknowledgement inside an exchange.
    pub ack_timeout: Duration,
}

impl Default for IvyConfig {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            page_count: DEFAULT_PAGE_COUNT,
            max_network_delay: DEFAULT_MAX_NETWORK_DELAY,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl IvyConfig {
    /// Defaults overlaid with `IVY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(nodes) = env_value::<u32>("IVY_NODES")? {
            config.node_count = nodes;
        }
        if let Some(pages) = env_value::<u32>("IVY_PAGES")? {
            config.page_count = pages;
        }
        if let Some(ms) = env_value::<u64>("IVY_MAX_NETWORK_DELAY_MS")? {
            config.max_network_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("IVY_SYNC_INTERVAL_MS")? {
            config.sync_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("IVY_SETTLE_DELAY_MS")? {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("IVY_REPLY_TIMEOUT_MS")? {
            config.reply_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("IVY_ACK_TIMEOUT_MS")? {
            config.ack_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(IvyError::InvalidConfig("node_count must be > 0".into()));
        }
        if self.page_count == 0 {
            return Err(IvyError::InvalidConfig("page_count must be > 0".into()));
        }
        if self.sync_interval.is_zero() {
            return Err(IvyError::InvalidConfig("sync_interval must be > 0".into()));
        }
        if self.reply_timeout.is_zero() || self.ack_timeout.is_zero() {
            return Err(IvyError::InvalidConfig("timeouts must be > 0".into()));
        }
        Ok(())
    }
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| IvyError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IvyConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.node_count, 10);
        assert_eq!(config.page_count, 10);
        assert_eq!(config.max_network_delay, Duration::from_millis(50));
        assert_eq!(config.sync_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_zero_pages_rejected() {
        let config = IvyConfig {
            page_count: 0,
            ..IvyConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("page_count"));
    }

    #[test]
    fn test_zero_sync_interval_rejected() {
        let config = IvyConfig {
            sync_interval: Duration::ZERO,
            ..IvyConfig::default()
        };

        assert!(matches!(config.validate(), Err(IvyError::InvalidConfig(_))));
    }
}
