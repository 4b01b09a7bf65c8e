//! Entry point the gateway hands raw events to.

use crate::check::{Check, CheckChain};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ClientConfig, ConfigError};
use crate::context::{ContextFactory, DefaultContextFactory};
use crate::error::DispatchError;
use crate::event::InteractionEvent;
use crate::exception::{DefaultExceptionHandler, ExceptionHandler};
use crate::executor::{CommandExecutor, ExecutionOutcome};
use crate::handler::{HandlerRegistry, SlashHandler};
use crate::metrics::MetricsStrategy;
use crate::pool::WorkerPool;
use crate::rate_limit::{DefaultRateLimitNotifier, PurgeTask, RateLimitHit, RateLimitRegistry};
use futures::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Command client: resolves handlers and submits dispatches.
///
/// Cheap to clone; clones share the pool, registry and purge task. The purge
/// task stops when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct SlashClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    handlers: HandlerRegistry,
    executor: Arc<CommandExecutor>,
    config: ClientConfig,
    _purge: PurgeTask,
}

impl SlashClient {
    /// Start configuring a client.
    pub fn builder() -> SlashClientBuilder {
        SlashClientBuilder::default()
    }

    /// Dispatch a command event without waiting for it.
    ///
    /// Returns once the dispatch is queued. Fails only for unknown commands or
    /// a saturated pool; everything after that is handled on the worker.
    pub fn on_command(&self, event: InteractionEvent) -> Result<(), DispatchError> {
        let handler = self.resolve(&event)?;
        info!(
            target: "slashgate::client",
            command = event.command_path(),
            user = event.user_id(),
            guild = ?event.guild_id(),
            "command used"
        );
        self.inner.executor.execute(Arc::new(event), handler)
    }

    /// Dispatch a command event on the current task and wait for its outcome.
    pub async fn dispatch(
        &self,
        event: InteractionEvent,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let handler = self.resolve(&event)?;
        Ok(self.inner.executor.run(Arc::new(event), handler).await)
    }

    /// Dispatch an autocomplete event without waiting for it.
    pub fn on_autocomplete(&self, event: InteractionEvent) -> Result<(), DispatchError> {
        let handler = self.resolve(&event)?;
        self.inner.executor.execute_autocomplete(Arc::new(event), handler)
    }

    /// Run an autocomplete event on the current task.
    pub async fn autocomplete(
        &self,
        event: InteractionEvent,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let handler = self.resolve(&event)?;
        Ok(self.inner.executor.run_autocomplete(Arc::new(event), handler).await)
    }

    fn resolve(&self, event: &InteractionEvent) -> Result<Arc<SlashHandler>, DispatchError> {
        self.inner.handlers.resolve(event.command_path()).ok_or_else(|| {
            warn!(
                target: "slashgate::client",
                command = event.command_path(),
                "no handler registered"
            );
            DispatchError::UnknownCommand(event.command_path().to_owned())
        })
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// Rate-limit bucket registry.
    pub fn rate_limits(&self) -> &Arc<RateLimitRegistry> {
        self.inner.executor.rate_limits()
    }

    /// Worker pool.
    pub fn pool(&self) -> &WorkerPool {
        self.inner.executor.pool()
    }

    /// Effective configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

impl tower_service::Service<InteractionEvent> for SlashClient {
    type Response = ();
    type Error = DispatchError;
    type Future = Ready<Result<(), DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: InteractionEvent) -> Self::Future {
        ready(self.on_command(event))
    }
}

/// Configuration surface for [`SlashClient`].
pub struct SlashClientBuilder {
    config: ClientConfig,
    handlers: Vec<SlashHandler>,
    checks: Vec<Arc<dyn Check>>,
    contexts: Arc<dyn ContextFactory>,
    exceptions: Arc<dyn ExceptionHandler>,
    metrics: Option<Arc<dyn MetricsStrategy>>,
    on_rate_limit_hit: Arc<dyn RateLimitHit>,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl Default for SlashClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            handlers: Vec::new(),
            checks: Vec::new(),
            contexts: Arc::new(DefaultContextFactory),
            exceptions: Arc::new(DefaultExceptionHandler::new()),
            metrics: None,
            on_rate_limit_hit: Arc::new(DefaultRateLimitNotifier),
            clock: Arc::new(MonotonicClock::default()),
            runtime: None,
        }
    }
}

impl SlashClientBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Concurrent dispatches.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Dispatches allowed to wait for a worker.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.config.queue_depth = depth;
        self
    }

    /// Expired-bucket purge period.
    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.config.purge_interval = interval;
        self
    }

    /// Limit on a handler body's run time.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = Some(timeout);
        self
    }

    /// Register a handler.
    pub fn handler(mut self, handler: SlashHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register several handlers.
    pub fn handlers(mut self, handlers: impl IntoIterator<Item = SlashHandler>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Add a global check, evaluated for every command in registration order.
    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Replace the context factory.
    pub fn context_factory(mut self, factory: impl ContextFactory + 'static) -> Self {
        self.contexts = Arc::new(factory);
        self
    }

    /// Replace the exception handler.
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exceptions = Arc::new(handler);
        self
    }

    /// Report counters to `metrics`.
    pub fn metrics(mut self, metrics: impl MetricsStrategy + 'static) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    /// Replace the rate-limit callback.
    pub fn on_rate_limit_hit(mut self, callback: impl RateLimitHit + 'static) -> Self {
        self.on_rate_limit_hit = Arc::new(callback);
        self
    }

    /// Clock timing rate-limit buckets.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runtime dispatches and the purge task run on; defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate and start the client.
    ///
    /// Spawns the purge task, so a runtime must be given or current.
    pub fn build(self) -> Result<SlashClient, ConfigError> {
        self.config.validate()?;

        let mut checks = CheckChain::new();
        for check in self.checks {
            if checks.contains(check.name()) {
                return Err(ConfigError::DuplicateCheck {
                    name: check.name().to_owned(),
                });
            }
            checks.push(check);
        }
        let handlers = HandlerRegistry::from_handlers(self.handlers)?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };

        let rate_limits = Arc::new(RateLimitRegistry::with_clock(self.clock));
        let purge = PurgeTask::spawn(&runtime, &rate_limits, self.config.purge_interval);
        let pool = WorkerPool::new(runtime, self.config.pool_size, self.config.queue_depth);

        let executor = Arc::new(CommandExecutor {
            checks,
            contexts: self.contexts,
            rate_limits,
            on_rate_limit_hit: self.on_rate_limit_hit,
            exceptions: self.exceptions,
            metrics: self.metrics,
            pool,
            command_timeout: self.config.command_timeout,
        });

        debug!(
            target: "slashgate::client",
            handlers = handlers.len(),
            pool_size = self.config.pool_size,
            queue_depth = self.config.queue_depth,
            "slash client built"
        );
        Ok(SlashClient {
            inner: Arc::new(ClientInner {
                handlers,
                executor,
                config: self.config,
                _purge: purge,
            }),
        })
    }
}
