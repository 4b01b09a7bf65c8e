//! Client configuration and builder validation errors.

use std::time::Duration;

/// Default number of dispatches that may run at once.
pub const DEFAULT_POOL_SIZE: usize = 50;
/// Default number of dispatches that may wait for a worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 1_000;
/// Default period of the rate-limit bucket purge.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Build-time settings for a [`SlashClient`](crate::SlashClient).
///
/// Not mutable at runtime; build a new client to change them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ClientConfig {
    /// Maximum concurrently running dispatches.
    pub pool_size: usize,
    /// Dispatches allowed to wait for a free worker.
    pub queue_depth: usize,
    /// Period of the expired-bucket purge.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub purge_interval: Duration,
    /// Upper bound on a handler body's run time; `None` disables it.
    #[cfg_attr(feature = "serde", serde(with = "opt_millis"))]
    pub command_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            command_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Largest accepted pool size.
    pub const MAX_POOL_SIZE: usize = 1 << 16;
    /// Largest accepted queue depth.
    pub const MAX_QUEUE_DEPTH: usize = 1 << 20;

    /// Reject settings the pool or purge task cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 || self.pool_size > Self::MAX_POOL_SIZE {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.queue_depth > Self::MAX_QUEUE_DEPTH {
            return Err(ConfigError::QueueTooDeep {
                depth: self.queue_depth,
                max: Self::MAX_QUEUE_DEPTH,
            });
        }
        if self.purge_interval.is_zero() {
            return Err(ConfigError::InvalidPurgeInterval);
        }
        if matches!(self.command_timeout, Some(t) if t.is_zero()) {
            return Err(ConfigError::InvalidCommandTimeout);
        }
        Ok(())
    }
}

/// Configuration and registration errors raised while building a client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Pool size was zero or too large.
    #[error("pool size must be between 1 and {}", ClientConfig::MAX_POOL_SIZE)]
    InvalidPoolSize,
    /// Queue depth exceeds what the admission semaphore supports.
    #[error("queue depth {depth} exceeds maximum {max}")]
    QueueTooDeep {
        /// Requested depth.
        depth: usize,
        /// Accepted maximum.
        max: usize,
    },
    /// Purge interval was zero.
    #[error("purge interval must be non-zero")]
    InvalidPurgeInterval,
    /// Command timeout was zero.
    #[error("command timeout must be non-zero")]
    InvalidCommandTimeout,
    /// Rate-limit quota was zero.
    #[error("rate-limit quota must be at least 1")]
    InvalidRateLimitQuota,
    /// Rate-limit window was zero.
    #[error("rate-limit window must be non-zero")]
    InvalidRateLimitWindow,
    /// Two handlers registered under the same command path.
    #[error("handler already registered for `{path}`")]
    DuplicateHandler {
        /// Conflicting command path.
        path: String,
    },
    /// Two global checks registered under the same name.
    #[error("check `{name}` already registered")]
    DuplicateCheck {
        /// Conflicting check name.
        name: String,
    },
    /// The client was built outside a tokio runtime.
    #[error("no tokio runtime available; build the client inside a runtime")]
    NoRuntime,
}

#[cfg(feature = "serde")]
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(feature = "serde")]
mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.pool_size, 50);
        assert_eq!(config.queue_depth, 1_000);
        assert_eq!(config.purge_interval, Duration::from_secs(600));
        assert_eq!(config.command_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let zero_pool = ClientConfig {
            pool_size: 0,
            ..ClientConfig::default()
        };
        assert_eq!(zero_pool.validate(), Err(ConfigError::InvalidPoolSize));

        let no_purge = ClientConfig {
            purge_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert_eq!(no_purge.validate(), Err(ConfigError::InvalidPurgeInterval));

        let zero_timeout = ClientConfig {
            command_timeout: Some(Duration::ZERO),
            ..ClientConfig::default()
        };
        assert_eq!(zero_timeout.validate(), Err(ConfigError::InvalidCommandTimeout));

        let deep = ClientConfig {
            queue_depth: usize::MAX,
            ..ClientConfig::default()
        };
        assert!(matches!(deep.validate(), Err(ConfigError::QueueTooDeep { .. })));
    }

    #[test]
    fn zero_queue_depth_is_allowed() {
        let config = ClientConfig {
            queue_depth: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_partial_config_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"pool_size": 8, "command_timeout": 1500}"#).unwrap();
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.command_timeout, Some(Duration::from_millis(1500)));
    }
}
