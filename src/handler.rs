//! Handler descriptors and the immutable path → handler registry.
//!
//! Handlers are registered explicitly at startup through [`SlashHandler::builder`]
//! and never change afterwards.
//!
//! ```
//! use slashgate::prelude::*;
//! use std::time::Duration;
//!
//! let handler = SlashHandler::builder("ban")
//!     .guild_only()
//!     .user_permissions(Permissions::BAN_MEMBERS)
//!     .bot_permissions(Permissions::BAN_MEMBERS)
//!     .rate_limit(RateLimitPolicy::per_user(1, Duration::from_secs(5)).unwrap())
//!     .build_fn(|ctx| async move {
//!         ctx.reply("banned").await?;
//!         Ok::<(), BoxError>(())
//!     });
//! assert_eq!(handler.path(), "ban");
//! ```

use crate::check::{Check, CheckChain};
use crate::config::ConfigError;
use crate::context::{AutocompleteContext, InteractionTarget, SlashContext};
use crate::error::BoxError;
use crate::event::Choice;
use crate::permissions::{Permissions, RequiredPermissions};
use crate::rate_limit::RateLimitPolicy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Executable body of a command.
#[async_trait]
pub trait CommandBody: Send + Sync {
    /// Run the command. Errors are routed to the exception handler.
    async fn execute(&self, ctx: SlashContext) -> Result<(), BoxError>;
}

/// [`CommandBody`] backed by an async closure.
pub struct FnBody<F>(pub F);

#[async_trait]
impl<F, Fut> CommandBody for FnBody<F>
where
    F: Fn(SlashContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn execute(&self, ctx: SlashContext) -> Result<(), BoxError> {
        (self.0)(ctx).await
    }
}

/// Produces suggestions for an option the user is typing.
#[async_trait]
pub trait AutocompleteBody: Send + Sync {
    /// Suggestions for `ctx.focused()`.
    async fn complete(&self, ctx: &AutocompleteContext) -> Result<Vec<Choice>, BoxError>;
}

/// [`AutocompleteBody`] backed by a synchronous closure.
pub struct FnAutocomplete<F>(pub F);

#[async_trait]
impl<F> AutocompleteBody for FnAutocomplete<F>
where
    F: Fn(&AutocompleteContext) -> Vec<Choice> + Send + Sync,
{
    async fn complete(&self, ctx: &AutocompleteContext) -> Result<Vec<Choice>, BoxError> {
        Ok((self.0)(ctx))
    }
}

/// Registered command: identity, admission rules and body.
pub struct SlashHandler {
    path: String,
    target: InteractionTarget,
    permissions: RequiredPermissions,
    rate_limit: Option<RateLimitPolicy>,
    checks: CheckChain,
    body: Arc<dyn CommandBody>,
    autocomplete: Option<Arc<dyn AutocompleteBody>>,
}

impl SlashHandler {
    /// Start describing the command at `path` (`name`, `name/sub`, or `name/group/sub`).
    pub fn builder(path: impl Into<String>) -> SlashHandlerBuilder {
        SlashHandlerBuilder {
            path: path.into(),
            target: InteractionTarget::Any,
            permissions: RequiredPermissions::default(),
            rate_limit: None,
            checks: CheckChain::new(),
            autocomplete: None,
        }
    }

    /// Full command path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Where the handler may run.
    pub fn target(&self) -> InteractionTarget {
        self.target
    }

    /// Required permissions.
    pub fn permissions(&self) -> &RequiredPermissions {
        &self.permissions
    }

    /// Rate-limit policy, if any.
    pub fn rate_limit(&self) -> Option<&RateLimitPolicy> {
        self.rate_limit.as_ref()
    }

    /// Command-local checks.
    pub fn checks(&self) -> &CheckChain {
        &self.checks
    }

    /// Body.
    pub fn body(&self) -> &Arc<dyn CommandBody> {
        &self.body
    }

    /// Autocomplete body, if any.
    pub fn autocomplete(&self) -> Option<&Arc<dyn AutocompleteBody>> {
        self.autocomplete.as_ref()
    }
}

impl fmt::Debug for SlashHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashHandler")
            .field("path", &self.path)
            .field("target", &self.target)
            .field("permissions", &self.permissions)
            .field("rate_limit", &self.rate_limit)
            .field("checks", &self.checks)
            .field("autocomplete", &self.autocomplete.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SlashHandler`].
pub struct SlashHandlerBuilder {
    path: String,
    target: InteractionTarget,
    permissions: RequiredPermissions,
    rate_limit: Option<RateLimitPolicy>,
    checks: CheckChain,
    autocomplete: Option<Arc<dyn AutocompleteBody>>,
}

impl SlashHandlerBuilder {
    /// Only run inside guilds; the body receives a guild-scoped context.
    pub fn guild_only(self) -> Self {
        self.target(InteractionTarget::Guild)
    }

    /// Set the target scope.
    pub fn target(mut self, target: InteractionTarget) -> Self {
        self.target = target;
        self
    }

    /// Permissions the invoking member must hold.
    pub fn user_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions.user |= permissions;
        self
    }

    /// Permissions the bot's own member must hold.
    pub fn bot_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions.bot |= permissions;
        self
    }

    /// Attach a rate-limit policy.
    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Append a command-local check.
    pub fn check(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Attach an autocomplete body.
    pub fn autocomplete(mut self, body: impl AutocompleteBody + 'static) -> Self {
        self.autocomplete = Some(Arc::new(body));
        self
    }

    /// Attach a closure as autocomplete body.
    pub fn autocomplete_fn<F>(self, f: F) -> Self
    where
        F: Fn(&AutocompleteContext) -> Vec<Choice> + Send + Sync + 'static,
    {
        self.autocomplete(FnAutocomplete(f))
    }

    /// Finish with a body.
    pub fn build(self, body: impl CommandBody + 'static) -> SlashHandler {
        SlashHandler {
            path: self.path,
            target: self.target,
            permissions: self.permissions,
            rate_limit: self.rate_limit,
            checks: self.checks,
            body: Arc::new(body),
            autocomplete: self.autocomplete,
        }
    }

    /// Finish with an async closure as body.
    pub fn build_fn<F, Fut>(self, f: F) -> SlashHandler
    where
        F: Fn(SlashContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.build(FnBody(f))
    }
}

/// Immutable map from command path to handler.
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<SlashHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting duplicate paths.
    pub fn from_handlers(
        handlers: impl IntoIterator<Item = SlashHandler>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Add one handler; a path may only be registered once.
    pub fn register(&mut self, handler: SlashHandler) -> Result<(), ConfigError> {
        if self.handlers.contains_key(handler.path()) {
            return Err(ConfigError::DuplicateHandler {
                path: handler.path().to_owned(),
            });
        }
        self.handlers.insert(handler.path().to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Look up a handler by full command path.
    pub fn resolve(&self, path: &str) -> Option<Arc<SlashHandler>> {
        self.handlers.get(path).cloned()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
