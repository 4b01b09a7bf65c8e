//! Per-command rate limiting.
//!
//! - [`RateLimitPolicy`]: declared on a handler; scope, quota and window.
//! - [`RateLimitRegistry`]: process-local bucket map consulted on every dispatch.
//! - [`PurgeTask`]: background task dropping expired buckets.
//! - [`RateLimitHit`]: callback run when a dispatch is limited.
//!
//! Buckets are keyed by scope and command path, so two commands never share a
//! bucket and a per-user limit never collides with a per-channel one.

use crate::config::ConfigError;
use crate::context::SlashContext;
use crate::event::{InteractionEvent, Reply};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::warn;

pub mod purge;
pub mod registry;

pub use purge::PurgeTask;
pub use registry::{BucketSnapshot, RateLimitRegistry};

/// Dimension a bucket is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RateLimitScope {
    /// One bucket per invoking user.
    User,
    /// One bucket per channel.
    Channel,
    /// One bucket per guild; direct messages share a single bucket.
    Guild,
}

impl RateLimitScope {
    /// Key prefix for this scope.
    pub fn prefix(self) -> char {
        match self {
            RateLimitScope::User => 'U',
            RateLimitScope::Channel => 'C',
            RateLimitScope::Guild => 'G',
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::User => f.write_str("user"),
            RateLimitScope::Channel => f.write_str("channel"),
            RateLimitScope::Guild => f.write_str("guild"),
        }
    }
}

/// Placeholder id for events without a guild or channel.
const NO_ID: &str = "***";

/// Rate limit declared on a handler: `quota` calls per `window` per scope key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawRateLimitPolicy"))]
pub struct RateLimitPolicy {
    scope: RateLimitScope,
    quota: u32,
    window: Duration,
}

/// Unvalidated wire form; loaded policies go through [`RateLimitPolicy::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRateLimitPolicy {
    scope: RateLimitScope,
    quota: u32,
    window: Duration,
}

#[cfg(feature = "serde")]
impl TryFrom<RawRateLimitPolicy> for RateLimitPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawRateLimitPolicy) -> Result<Self, Self::Error> {
        Self::new(raw.scope, raw.quota, raw.window)
    }
}

impl RateLimitPolicy {
    /// Build a policy; quota and window must be non-zero.
    pub fn new(scope: RateLimitScope, quota: u32, window: Duration) -> Result<Self, ConfigError> {
        if quota == 0 {
            return Err(ConfigError::InvalidRateLimitQuota);
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidRateLimitWindow);
        }
        Ok(Self {
            scope,
            quota,
            window,
        })
    }

    /// Per-user policy.
    pub fn per_user(quota: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::new(RateLimitScope::User, quota, window)
    }

    /// Per-channel policy.
    pub fn per_channel(quota: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::new(RateLimitScope::Channel, quota, window)
    }

    /// Per-guild policy.
    pub fn per_guild(quota: u32, window: Duration) -> Result<Self, ConfigError> {
        Self::new(RateLimitScope::Guild, quota, window)
    }

    /// Scope of the bucket key.
    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    /// Calls admitted per window.
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Bucket key for an event: `{prefix}:{scope id}:{command path}`.
    pub fn key(&self, event: &InteractionEvent) -> String {
        let id = match self.scope {
            RateLimitScope::User => Some(event.user_id()),
            RateLimitScope::Channel => event.channel_id(),
            RateLimitScope::Guild => event.guild_id(),
        };
        match id {
            Some(id) => format!("{}:{}:{}", self.scope.prefix(), id, event.command_path()),
            None => format!("{}:{}:{}", self.scope.prefix(), NO_ID, event.command_path()),
        }
    }
}

/// Callback run when a dispatch hits its rate limit.
///
/// Responsible for telling the user; the executor only records the outcome.
#[async_trait]
pub trait RateLimitHit: Send + Sync {
    /// `remaining` is the time left until the bucket resets.
    async fn on_rate_limit_hit(
        &self,
        ctx: &SlashContext,
        policy: &RateLimitPolicy,
        remaining: Duration,
    );
}

/// Replies with [`rate_limit_message`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRateLimitNotifier;

#[async_trait]
impl RateLimitHit for DefaultRateLimitNotifier {
    async fn on_rate_limit_hit(
        &self,
        ctx: &SlashContext,
        policy: &RateLimitPolicy,
        remaining: Duration,
    ) {
        if let Err(err) = ctx.respond(rate_limit_message(policy, remaining)).await {
            warn!(
                target: "slashgate::rate_limit",
                command = ctx.command_path(),
                error = %err,
                "failed to send rate-limit notice"
            );
        }
    }
}

/// User-facing notice for a limited dispatch.
///
/// The wait is rounded up to whole seconds. Per-user notices are ephemeral.
pub fn rate_limit_message(policy: &RateLimitPolicy, remaining: Duration) -> Reply {
    let secs = wait_seconds(remaining);
    let unit = if secs == 1 { "second" } else { "seconds" };
    let body = match policy.scope() {
        RateLimitScope::User => format!("You can't use this command for **{secs} {unit}**."),
        RateLimitScope::Channel => {
            format!("You can't use this command in this channel for **{secs} {unit}**.")
        }
        RateLimitScope::Guild => {
            format!("You can't use this command in this guild for **{secs} {unit}**.")
        }
    };
    let content = format!("**Rate Limited**\n\n{body}");
    match policy.scope() {
        RateLimitScope::User => Reply::ephemeral(content),
        _ => Reply::new(content),
    }
}

fn wait_seconds(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}
