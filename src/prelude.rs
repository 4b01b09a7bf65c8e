//! Convenient re-exports for common slashgate types.
pub use crate::{
    check::{check_fn, Check},
    client::{SlashClient, SlashClientBuilder},
    context::{AutocompleteContext, InteractionTarget, SlashContext},
    error::{BoxError, DispatchError, PermissionsLack},
    event::{Choice, GuildInfo, InteractionEvent, MemoryResponder, OptionValue, Reply, Responder},
    executor::ExecutionOutcome,
    handler::{CommandBody, SlashHandler},
    metrics::MetricsStrategy,
    permissions::Permissions,
    rate_limit::{RateLimitHit, RateLimitPolicy, RateLimitScope},
    ClientConfig,
};
