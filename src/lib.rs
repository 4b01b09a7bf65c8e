#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # slashgate
//!
//! Dispatch and admission control for slash-style chat commands: handler
//! resolution, permission and custom checks, per-scope rate limiting, and
//! isolated execution on a bounded worker pool.
//!
//! ## Features
//!
//! - **Explicit registration** of handlers with permissions, rate limits and checks
//! - **Check chain**: global checks, command checks, then permission checks
//! - **Rate limiting** per user, channel or guild with background purge
//! - **Bounded worker pool**: the gateway never waits on a command
//! - **Failure containment**: errors and panics end one dispatch, nothing more
//! - **Metrics** through a pluggable [`MetricsStrategy`]
//!
//! ## Quick Start
//!
//! ```rust
//! use slashgate::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SlashClient::builder()
//!         .handler(
//!             SlashHandler::builder("ping")
//!                 .rate_limit(RateLimitPolicy::per_user(3, Duration::from_secs(10))?)
//!                 .build_fn(|ctx| async move {
//!                     ctx.reply("pong").await?;
//!                     Ok::<(), BoxError>(())
//!                 }),
//!         )
//!         .build()?;
//!
//!     let responder = Arc::new(MemoryResponder::new());
//!     let event = InteractionEvent::builder("ping", 42, responder.clone()).build();
//!     let outcome = client.dispatch(event).await?;
//!
//!     assert_eq!(outcome, ExecutionOutcome::Success);
//!     assert_eq!(responder.contents(), vec!["pong".to_owned()]);
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod exception;
pub mod executor;
pub mod handler;
pub mod metrics;
pub mod permissions;
pub mod pool;
pub mod prelude;
pub mod rate_limit;

// Re-exports
pub use check::{check_fn, check_permissions, Check, CheckChain, FnCheck};
pub use client::{SlashClient, SlashClientBuilder};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ClientConfig, ConfigError};
pub use context::{
    AutocompleteContext, ContextFactory, ContextScope, DefaultContextFactory, InteractionTarget,
    SlashContext,
};
pub use error::{BoxError, DispatchError, PermissionTarget, PermissionsLack};
pub use event::{
    Choice, GuildInfo, InteractionEvent, InteractionEventBuilder, MemoryResponder, OptionValue,
    Reply, Responder, Response, ResponseError, Snowflake,
};
pub use exception::{DefaultExceptionHandler, ExceptionHandler};
pub use executor::{CommandExecutor, DispatchStage, ExecutionOutcome};
pub use handler::{
    AutocompleteBody, CommandBody, HandlerRegistry, SlashHandler, SlashHandlerBuilder,
};
pub use metrics::{LogMetrics, MemoryMetrics, MetricsSnapshot, MetricsStrategy, NullMetrics};
pub use permissions::{Permissions, RequiredPermissions};
pub use pool::WorkerPool;
pub use rate_limit::{
    DefaultRateLimitNotifier, RateLimitHit, RateLimitPolicy, RateLimitRegistry, RateLimitScope,
};
