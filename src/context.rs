//! Execution contexts handed to checks and handler bodies.

use crate::error::DispatchError;
use crate::event::{
    Choice, GuildInfo, InteractionEvent, OptionValue, Reply, ResponseError, Snowflake,
};
use crate::permissions::Permissions;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Where a handler may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InteractionTarget {
    /// Anywhere; the handler receives a generic context.
    #[default]
    Any,
    /// Guilds only; the handler receives a guild context.
    Guild,
}

/// Scope tag of a built context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    /// Built by [`ContextFactory::create_context`].
    Generic,
    /// Built by [`ContextFactory::create_guild_context`]; guild accessors succeed.
    Guild,
}

type ExtraSlot = Mutex<Option<Box<dyn Any + Send + Sync>>>;

/// Context for one in-flight dispatch.
///
/// Created fresh per event and dropped when the handler body returns. The
/// `extra` slot carries one value from checks to the body; the last writer wins.
pub struct SlashContext {
    event: Arc<InteractionEvent>,
    scope: ContextScope,
    extra: ExtraSlot,
}

impl SlashContext {
    /// Generic context; guild accessors return [`DispatchError::NotGuildScoped`].
    pub fn generic(event: Arc<InteractionEvent>) -> Self {
        Self {
            event,
            scope: ContextScope::Generic,
            extra: Mutex::new(None),
        }
    }

    /// Guild context; fails fast when the event carries no guild.
    pub fn guild_scoped(event: Arc<InteractionEvent>) -> Result<Self, DispatchError> {
        if !event.is_from_guild() {
            return Err(DispatchError::NotGuildScoped);
        }
        Ok(Self {
            event,
            scope: ContextScope::Guild,
            extra: Mutex::new(None),
        })
    }

    /// The raw event.
    pub fn event(&self) -> &Arc<InteractionEvent> {
        &self.event
    }

    /// Scope tag.
    pub fn scope(&self) -> ContextScope {
        self.scope
    }

    /// Whether guild accessors are available.
    pub fn is_guild(&self) -> bool {
        self.scope == ContextScope::Guild
    }

    /// Full command path.
    pub fn command_path(&self) -> &str {
        self.event.command_path()
    }

    /// Invoking user.
    pub fn user_id(&self) -> Snowflake {
        self.event.user_id()
    }

    /// Channel the command was invoked in.
    pub fn channel_id(&self) -> Option<Snowflake> {
        self.event.channel_id()
    }

    /// Guild id if the event came from a guild, regardless of scope.
    pub fn guild_id(&self) -> Option<Snowflake> {
        self.event.guild_id()
    }

    /// Guild data; only for guild-scoped contexts.
    pub fn guild(&self) -> Result<&GuildInfo, DispatchError> {
        match (self.scope, self.event.guild()) {
            (ContextScope::Guild, Some(guild)) => Ok(guild),
            _ => Err(DispatchError::NotGuildScoped),
        }
    }

    /// Invoking member's permissions; only for guild-scoped contexts.
    pub fn member_permissions(&self) -> Result<Permissions, DispatchError> {
        self.guild().map(|g| g.member_permissions)
    }

    /// Bot member's permissions; only for guild-scoped contexts.
    pub fn bot_permissions(&self) -> Result<Permissions, DispatchError> {
        self.guild().map(|g| g.bot_permissions)
    }

    /// Option value by name.
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.event.option(name)
    }

    /// User locale.
    pub fn locale(&self) -> &str {
        self.event.locale()
    }

    /// Whether an initial response was already sent.
    pub fn is_acknowledged(&self) -> bool {
        self.event.is_acknowledged()
    }

    /// Defer unless already acknowledged.
    pub async fn acknowledge(&self, ephemeral: bool) -> Result<(), ResponseError> {
        self.event.acknowledge(ephemeral).await
    }

    /// Defer; fails if the interaction was already acknowledged.
    pub async fn try_acknowledge(&self, ephemeral: bool) -> Result<(), ResponseError> {
        if self.is_acknowledged() {
            return Err(ResponseError::AlreadyAcknowledged);
        }
        self.event.acknowledge(ephemeral).await
    }

    /// Public message; replies or follows up depending on acknowledgment state.
    pub async fn reply(&self, content: impl Into<String>) -> Result<(), ResponseError> {
        self.event.respond(Reply::new(content)).await
    }

    /// Ephemeral message; replies or follows up depending on acknowledgment state.
    pub async fn reply_ephemeral(&self, content: impl Into<String>) -> Result<(), ResponseError> {
        self.event.respond(Reply::ephemeral(content)).await
    }

    /// Send a prepared reply.
    pub async fn respond(&self, reply: Reply) -> Result<(), ResponseError> {
        self.event.respond(reply).await
    }

    /// Follow-up message.
    pub async fn follow_up(&self, reply: Reply) -> Result<(), ResponseError> {
        self.event.follow_up(reply).await
    }

    /// Store a value in the extra slot, replacing any previous value.
    pub fn set_extra<T: Any + Send + Sync>(&self, value: T) {
        *self.extra.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(value));
    }

    /// Clone the extra value out if it holds a `T`.
    pub fn extra<T: Any + Clone>(&self) -> Option<T> {
        let guard = self.extra.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(|v| v.downcast_ref::<T>()).cloned()
    }

    /// Take the extra value if it holds a `T`; other types stay in place.
    pub fn take_extra<T: Any>(&self) -> Option<T> {
        let mut guard = self.extra.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(boxed) if boxed.is::<T>() => boxed.downcast::<T>().ok().map(|v| *v),
            other => {
                *guard = other;
                None
            }
        }
    }

    /// Whether the extra slot holds anything.
    pub fn has_extra(&self) -> bool {
        self.extra.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl fmt::Debug for SlashContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashContext")
            .field("event", &self.event)
            .field("scope", &self.scope)
            .field("has_extra", &self.has_extra())
            .finish()
    }
}

/// Context for an autocomplete interaction.
#[derive(Debug)]
pub struct AutocompleteContext {
    event: Arc<InteractionEvent>,
    focused: String,
}

impl AutocompleteContext {
    /// Build from an event that names its focused option.
    pub fn new(event: Arc<InteractionEvent>) -> Option<Self> {
        let focused = event.focused_option()?.to_owned();
        Some(Self { event, focused })
    }

    /// The raw event.
    pub fn event(&self) -> &Arc<InteractionEvent> {
        &self.event
    }

    /// Name of the option being typed.
    pub fn focused(&self) -> &str {
        &self.focused
    }

    /// Partial text typed so far for the focused option.
    pub fn partial(&self) -> &str {
        self.event.option(&self.focused).and_then(OptionValue::as_str).unwrap_or_default()
    }

    /// Send suggestions.
    pub async fn suggest(&self, choices: Vec<Choice>) -> Result<(), ResponseError> {
        self.event.suggest(choices).await
    }
}

/// Builds execution contexts from raw events.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Context for handlers that run anywhere.
    async fn create_context(
        &self,
        event: Arc<InteractionEvent>,
    ) -> Result<SlashContext, DispatchError>;

    /// Context for guild-only handlers.
    async fn create_guild_context(
        &self,
        event: Arc<InteractionEvent>,
    ) -> Result<SlashContext, DispatchError>;
}

/// Factory that wraps the event as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContextFactory;

#[async_trait]
impl ContextFactory for DefaultContextFactory {
    async fn create_context(
        &self,
        event: Arc<InteractionEvent>,
    ) -> Result<SlashContext, DispatchError> {
        Ok(SlashContext::generic(event))
    }

    async fn create_guild_context(
        &self,
        event: Arc<InteractionEvent>,
    ) -> Result<SlashContext, DispatchError> {
        SlashContext::guild_scoped(event)
    }
}
