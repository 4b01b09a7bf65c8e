//! Error types for the dispatch pipeline.
use crate::event::ResponseError;
use crate::executor::ExecutionOutcome;
use crate::permissions::Permissions;
use crate::rate_limit::RateLimitScope;
use std::fmt;
use std::time::Duration;

/// Boxed error returned by handler bodies and checks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which party is missing permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionTarget {
    /// The bot's own member in the guild.
    Bot,
    /// The member invoking the command.
    User,
}

impl fmt::Display for PermissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionTarget::Bot => f.write_str("bot"),
            PermissionTarget::User => f.write_str("user"),
        }
    }
}

/// Structured permission failure: who lacks what.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{target} is missing permissions: {}", .missing.to_human())]
pub struct PermissionsLack {
    /// Party that lacks the permissions.
    pub target: PermissionTarget,
    /// Exactly the permissions that were required but not held.
    pub missing: Permissions,
}

impl PermissionsLack {
    /// Build a lack for the bot member.
    pub fn bot(missing: Permissions) -> Self {
        Self {
            target: PermissionTarget::Bot,
            missing,
        }
    }

    /// Build a lack for the invoking member.
    pub fn user(missing: Permissions) -> Self {
        Self {
            target: PermissionTarget::User,
            missing,
        }
    }
}

/// Unified error type for everything that can end a dispatch early.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    /// A global or command-local check returned `false`.
    #[error("check `{check}` rejected the interaction")]
    CheckRejected {
        /// Name of the rejecting check.
        check: String,
    },
    /// The invoking member or the bot lacks required permissions.
    #[error(transparent)]
    PermissionsLack(#[from] PermissionsLack),
    /// The command's rate-limit bucket is exhausted.
    #[error("rate limited per {scope}; retry in {remaining:?}")]
    RateLimited {
        /// Scope of the exhausted bucket.
        scope: RateLimitScope,
        /// Time until the bucket resets.
        remaining: Duration,
    },
    /// The handler body (or a check, or context construction) failed.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),
    /// The handler body ran past the configured command timeout.
    #[error("command exceeded its {timeout:?} time limit")]
    Timeout {
        /// The limit that was exceeded.
        timeout: Duration,
    },
    /// A guild-only accessor or factory was used outside a guild.
    #[error("interaction is not guild scoped")]
    NotGuildScoped,
    /// Replying to the interaction failed.
    #[error("response failed: {0}")]
    Response(#[from] ResponseError),
    /// No handler is registered under the event's command path.
    #[error("no handler registered for `{0}`")]
    UnknownCommand(String),
    /// The worker pool has no room left for another dispatch.
    #[error("worker pool saturated ({in_flight} admitted, max {max})")]
    Saturated {
        /// Dispatches admitted (running or queued).
        in_flight: usize,
        /// Pool size plus queue depth.
        max: usize,
    },
    /// The handler panicked; the panic was contained to its dispatch.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Convert an error raised by a handler body or a check.
    ///
    /// Errors that already are a `DispatchError` (or a bare `PermissionsLack`) keep their
    /// classification; anything else becomes [`DispatchError::Handler`].
    pub fn from_handler(err: BoxError) -> Self {
        let err = match err.downcast::<DispatchError>() {
            Ok(dispatch) => return *dispatch,
            Err(other) => other,
        };
        match err.downcast::<PermissionsLack>() {
            Ok(lack) => DispatchError::PermissionsLack(*lack),
            Err(other) => DispatchError::Handler(other),
        }
    }

    /// Terminal outcome this error maps to.
    pub fn outcome(&self) -> ExecutionOutcome {
        match self {
            DispatchError::CheckRejected { .. } => ExecutionOutcome::CheckRejected,
            DispatchError::PermissionsLack(_) => ExecutionOutcome::PermissionDenied,
            DispatchError::RateLimited { .. } => ExecutionOutcome::RateLimited,
            _ => ExecutionOutcome::Exception,
        }
    }

    /// Check if a check rejected the interaction.
    pub fn is_check_rejected(&self) -> bool {
        matches!(self, Self::CheckRejected { .. })
    }

    /// Check if this is a permission failure.
    pub fn is_permissions_lack(&self) -> bool {
        matches!(self, Self::PermissionsLack(_))
    }

    /// Check if the command was rate limited.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if the handler timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the pool rejected the dispatch.
    pub fn is_saturated(&self) -> bool {
        matches!(self, Self::Saturated { .. })
    }

    /// Borrow the permission failure if present.
    pub fn permissions_lack(&self) -> Option<&PermissionsLack> {
        match self {
            Self::PermissionsLack(lack) => Some(lack),
            _ => None,
        }
    }

    /// Access rate-limit details as (scope, remaining).
    pub fn rate_limit_details(&self) -> Option<(RateLimitScope, Duration)> {
        match self {
            Self::RateLimited { scope, remaining } => Some((*scope, *remaining)),
            _ => None,
        }
    }
}
