//! The dispatch pipeline.
//!
//! One dispatch walks these stages in order, each at most once:
//!
//! ```text
//! Resolved -> Context -> Checks -> RateLimit -> Execute -> Succeeded | Failed
//! ```
//!
//! Whatever happens, a dispatch reports `inc_handled` once and then exactly one
//! of `inc_succeeded` / `inc_failed`. Errors and panics never leave the worker
//! task that runs the dispatch.

use crate::check::{run_checks, CheckChain};
use crate::context::{AutocompleteContext, ContextFactory, InteractionTarget, SlashContext};
use crate::error::DispatchError;
use crate::event::InteractionEvent;
use crate::exception::ExceptionHandler;
use crate::handler::SlashHandler;
use crate::metrics::{report_best_effort, MetricsStrategy};
use crate::pool::WorkerPool;
use crate::rate_limit::purge::panic_message;
use crate::rate_limit::{RateLimitHit, RateLimitPolicy, RateLimitRegistry};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, field, info_span, Instrument, Span};

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionOutcome {
    /// The body returned normally.
    Success,
    /// A global or local check returned `false`.
    CheckRejected,
    /// The rate-limit bucket was exhausted.
    RateLimited,
    /// The invoking member or the bot lacked permissions.
    PermissionDenied,
    /// Anything else: body error, panic, timeout, context failure.
    Exception,
}

impl ExecutionOutcome {
    /// Whether the body ran to completion.
    pub fn is_success(self) -> bool {
        self == ExecutionOutcome::Success
    }
}

/// Pipeline stage, recorded on the dispatch span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Building the execution context.
    Context,
    /// Running global, local and permission checks.
    Checks,
    /// Consulting the rate-limit registry.
    RateLimit,
    /// Running the body.
    Execute,
}

impl DispatchStage {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStage::Context => "context",
            DispatchStage::Checks => "checks",
            DispatchStage::RateLimit => "rate_limit",
            DispatchStage::Execute => "execute",
        }
    }
}

/// Runs dispatches on the worker pool.
///
/// Built by [`SlashClientBuilder`](crate::SlashClientBuilder).
pub struct CommandExecutor {
    pub(crate) checks: CheckChain,
    pub(crate) contexts: Arc<dyn ContextFactory>,
    pub(crate) rate_limits: Arc<RateLimitRegistry>,
    pub(crate) on_rate_limit_hit: Arc<dyn RateLimitHit>,
    pub(crate) exceptions: Arc<dyn ExceptionHandler>,
    pub(crate) metrics: Option<Arc<dyn MetricsStrategy>>,
    pub(crate) pool: WorkerPool,
    pub(crate) command_timeout: Option<Duration>,
}

impl CommandExecutor {
    /// Submit a dispatch and return without waiting for it.
    ///
    /// Only fails when the pool is saturated; in that case nothing is reported.
    pub fn execute(
        self: &Arc<Self>,
        event: Arc<InteractionEvent>,
        handler: Arc<SlashHandler>,
    ) -> Result<(), DispatchError> {
        let this = Arc::clone(self);
        self.pool.submit(async move {
            this.run(event, handler).await;
        })
    }

    /// Run one dispatch to completion on the current task.
    pub async fn run(
        &self,
        event: Arc<InteractionEvent>,
        handler: Arc<SlashHandler>,
    ) -> ExecutionOutcome {
        let span = info_span!(
            target: "slashgate::executor",
            "dispatch",
            command = handler.path(),
            user = event.user_id(),
            guild = ?event.guild_id(),
            stage = field::Empty,
        );
        self.pipeline(&event, &handler).instrument(span).await
    }

    async fn pipeline(
        &self,
        event: &Arc<InteractionEvent>,
        handler: &SlashHandler,
    ) -> ExecutionOutcome {
        self.report("handled", |m| m.inc_handled(event));

        let result = AssertUnwindSafe(self.admit_and_execute(event, handler))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DispatchError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(elapsed_ms) => {
                debug!(target: "slashgate::executor", elapsed_ms, "command succeeded");
                self.report("succeeded", |m| m.inc_succeeded(event, elapsed_ms));
                ExecutionOutcome::Success
            }
            Err(err) => {
                let outcome = err.outcome();
                match outcome {
                    ExecutionOutcome::CheckRejected | ExecutionOutcome::RateLimited => {
                        debug!(target: "slashgate::executor", error = %err, "command not admitted");
                    }
                    _ => self.wrap_exception(err, handler, event).await,
                }
                self.report("failed", |m| m.inc_failed(event));
                outcome
            }
        }
    }

    /// Walk the stages; returns the body's elapsed whole milliseconds.
    async fn admit_and_execute(
        &self,
        event: &Arc<InteractionEvent>,
        handler: &SlashHandler,
    ) -> Result<u64, DispatchError> {
        enter(DispatchStage::Context);
        let ctx = match handler.target() {
            InteractionTarget::Guild => {
                self.contexts.create_guild_context(Arc::clone(event)).await?
            }
            InteractionTarget::Any => self.contexts.create_context(Arc::clone(event)).await?,
        };

        enter(DispatchStage::Checks);
        run_checks(&self.checks, handler.checks(), handler.permissions(), &ctx).await?;

        if let Some(policy) = handler.rate_limit() {
            enter(DispatchStage::RateLimit);
            if let Some(remaining) = self.rate_limits.acquire(policy, event) {
                self.notify_rate_limited(&ctx, policy, remaining).await;
                return Err(DispatchError::RateLimited {
                    scope: policy.scope(),
                    remaining,
                });
            }
        }

        enter(DispatchStage::Execute);
        let started = Instant::now();
        let body = handler.body().execute(ctx);
        let result = match self.command_timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(result) => result,
                Err(_) => return Err(DispatchError::Timeout { timeout: limit }),
            },
            None => body.await,
        };
        result.map_err(DispatchError::from_handler)?;
        Ok(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    async fn notify_rate_limited(
        &self,
        ctx: &SlashContext,
        policy: &RateLimitPolicy,
        remaining: Duration,
    ) {
        let notify = self.on_rate_limit_hit.on_rate_limit_hit(ctx, policy, remaining);
        if let Err(panic) = AssertUnwindSafe(notify).catch_unwind().await {
            error!(
                target: "slashgate::executor",
                panic = %panic_message(panic.as_ref()),
                "rate-limit callback panicked"
            );
        }
    }

    async fn wrap_exception(
        &self,
        err: DispatchError,
        handler: &SlashHandler,
        event: &InteractionEvent,
    ) {
        let wrap = self.exceptions.wrap(err, handler, event);
        if let Err(panic) = AssertUnwindSafe(wrap).catch_unwind().await {
            error!(
                target: "slashgate::executor",
                panic = %panic_message(panic.as_ref()),
                "exception handler panicked"
            );
        }
    }

    fn report(&self, signal: &'static str, f: impl FnOnce(&dyn MetricsStrategy)) {
        if let Some(metrics) = &self.metrics {
            report_best_effort(signal, || f(metrics.as_ref()));
        }
    }

    /// Submit an autocomplete dispatch and return without waiting for it.
    pub fn execute_autocomplete(
        self: &Arc<Self>,
        event: Arc<InteractionEvent>,
        handler: Arc<SlashHandler>,
    ) -> Result<(), DispatchError> {
        let this = Arc::clone(self);
        self.pool.submit(async move {
            this.run_autocomplete(event, handler).await;
        })
    }

    /// Run an autocomplete dispatch on the current task.
    ///
    /// Failures go to the exception handler. Autocomplete is not counted in
    /// metrics.
    pub async fn run_autocomplete(
        &self,
        event: Arc<InteractionEvent>,
        handler: Arc<SlashHandler>,
    ) -> ExecutionOutcome {
        let span = info_span!(
            target: "slashgate::executor",
            "autocomplete",
            command = handler.path(),
            user = event.user_id(),
            focused = event.focused_option().unwrap_or_default(),
        );
        async {
            let result = AssertUnwindSafe(self.complete(&event, &handler))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(DispatchError::Panicked(panic_message(panic.as_ref())))
                });
            match result {
                Ok(()) => ExecutionOutcome::Success,
                Err(err) => {
                    let outcome = err.outcome();
                    self.wrap_exception(err, &handler, &event).await;
                    outcome
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn complete(
        &self,
        event: &Arc<InteractionEvent>,
        handler: &SlashHandler,
    ) -> Result<(), DispatchError> {
        let Some(body) = handler.autocomplete() else {
            debug!(target: "slashgate::executor", "handler has no autocomplete body");
            return Ok(());
        };
        let ctx = AutocompleteContext::new(Arc::clone(event)).ok_or_else(|| {
            DispatchError::Handler("autocomplete event has no focused option".into())
        })?;
        let choices = body.complete(&ctx).await.map_err(DispatchError::from_handler)?;
        ctx.suggest(choices).await?;
        Ok(())
    }

    /// The rate-limit registry shared with the purge task.
    pub fn rate_limits(&self) -> &Arc<RateLimitRegistry> {
        &self.rate_limits
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("checks", &self.checks)
            .field("rate_limits", &self.rate_limits.len())
            .field("metrics", &self.metrics.is_some())
            .field("pool", &self.pool)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

fn enter(stage: DispatchStage) {
    Span::current().record("stage", stage.as_str());
}
