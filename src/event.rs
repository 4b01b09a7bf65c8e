//! Inbound interaction events and the responder seam back to the platform.
//!
//! The gateway adapter turns whatever its platform client delivers into an
//! [`InteractionEvent`] and hands it to the client. Answers go back through the
//! [`Responder`] the adapter attached to the event; this crate never talks to
//! the platform directly.

use crate::permissions::Permissions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Platform identifier (user, guild, channel, role).
pub type Snowflake = u64;

/// A typed option value supplied with the command.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Free text.
    String(String),
    /// Whole number.
    Integer(i64),
    /// Floating point number.
    Number(f64),
    /// Boolean flag.
    Boolean(bool),
    /// A user mention.
    User(Snowflake),
    /// A channel mention.
    Channel(Snowflake),
    /// A role mention.
    Role(Snowflake),
}

impl OptionValue {
    /// Borrow as text if this is a string option.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value if this is an integer option.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value for integer and number options.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(v) => Some(*v),
            OptionValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean value if this is a boolean option.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Identifier carried by user, channel and role options.
    pub fn as_snowflake(&self) -> Option<Snowflake> {
        match self {
            OptionValue::User(id) | OptionValue::Channel(id) | OptionValue::Role(id) => Some(*id),
            _ => None,
        }
    }
}

/// Guild data delivered with a guild interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    /// Guild id.
    pub id: Snowflake,
    /// Guild display name.
    pub name: String,
    /// Effective permissions of the invoking member.
    pub member_permissions: Permissions,
    /// Effective permissions of the bot's own member.
    pub bot_permissions: Permissions,
}

/// Message sent back to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Message text.
    pub content: String,
    /// Visible only to the invoking actor.
    pub ephemeral: bool,
}

impl Reply {
    /// Public reply.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    /// Reply visible only to the invoking actor.
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

/// One autocomplete suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Label shown to the user.
    pub name: String,
    /// Value submitted when picked.
    pub value: OptionValue,
}

impl Choice {
    /// Suggestion whose value is the same text as its label.
    pub fn text(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: OptionValue::String(name.clone()),
            name,
        }
    }
}

/// Errors produced while answering an interaction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResponseError {
    /// The interaction already received its initial response.
    #[error("interaction already acknowledged")]
    AlreadyAcknowledged,
    /// The responder does not support this kind of answer.
    #[error("unsupported response: {0}")]
    Unsupported(&'static str),
    /// The platform request failed.
    #[error("transport: {0}")]
    Transport(String),
}

/// Platform-side answer channel for one interaction.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Acknowledge now, answer later.
    async fn defer(&self, ephemeral: bool) -> Result<(), ResponseError>;

    /// Initial response to an unacknowledged interaction.
    async fn reply(&self, reply: Reply) -> Result<(), ResponseError>;

    /// Additional message after the interaction was acknowledged.
    async fn follow_up(&self, reply: Reply) -> Result<(), ResponseError>;

    /// Answer an autocomplete interaction.
    async fn suggest(&self, _choices: Vec<Choice>) -> Result<(), ResponseError> {
        Err(ResponseError::Unsupported("autocomplete"))
    }
}

/// One inbound command invocation.
pub struct InteractionEvent {
    id: String,
    name: String,
    path: String,
    user_id: Snowflake,
    channel_id: Option<Snowflake>,
    guild: Option<GuildInfo>,
    options: HashMap<String, OptionValue>,
    focused: Option<String>,
    locale: String,
    acknowledged: AtomicBool,
    responder: Arc<dyn Responder>,
}

impl InteractionEvent {
    /// Start building an event for top-level command `name` invoked by `user_id`.
    pub fn builder(
        name: impl Into<String>,
        user_id: Snowflake,
        responder: Arc<dyn Responder>,
    ) -> InteractionEventBuilder {
        InteractionEventBuilder {
            id: String::new(),
            name: name.into(),
            group: None,
            subcommand: None,
            user_id,
            channel_id: None,
            guild: None,
            options: HashMap::new(),
            focused: None,
            locale: "en-US".into(),
            responder,
        }
    }

    /// Interaction id assigned by the platform.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Top-level command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full command path: name, then group and subcommand when present, joined by `/`.
    pub fn command_path(&self) -> &str {
        &self.path
    }

    /// Invoking user.
    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    /// Channel the command was invoked in.
    pub fn channel_id(&self) -> Option<Snowflake> {
        self.channel_id
    }

    /// Guild data when invoked inside a guild.
    pub fn guild(&self) -> Option<&GuildInfo> {
        self.guild.as_ref()
    }

    /// Guild id when invoked inside a guild.
    pub fn guild_id(&self) -> Option<Snowflake> {
        self.guild.as_ref().map(|g| g.id)
    }

    /// Whether the interaction came from a guild.
    pub fn is_from_guild(&self) -> bool {
        self.guild.is_some()
    }

    /// Option value by name.
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// All option values.
    pub fn options(&self) -> &HashMap<String, OptionValue> {
        &self.options
    }

    /// Option currently being typed, for autocomplete interactions.
    pub fn focused_option(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Locale of the invoking user.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Whether an initial response (reply or defer) was already sent.
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Defer the response unless already acknowledged. Idempotent.
    pub async fn acknowledge(&self, ephemeral: bool) -> Result<(), ResponseError> {
        if !self.claim_initial_response() {
            return Ok(());
        }
        let sent = self.responder.defer(ephemeral).await;
        self.release_on_error(sent)
    }

    /// Send the initial response; fails if one was already sent.
    pub async fn reply(&self, reply: Reply) -> Result<(), ResponseError> {
        if !self.claim_initial_response() {
            return Err(ResponseError::AlreadyAcknowledged);
        }
        let sent = self.responder.reply(reply).await;
        self.release_on_error(sent)
    }

    /// Take the single initial-response slot; false if another caller holds it.
    fn claim_initial_response(&self) -> bool {
        self.acknowledged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release_on_error(&self, sent: Result<(), ResponseError>) -> Result<(), ResponseError> {
        if sent.is_err() {
            self.acknowledged.store(false, Ordering::Release);
        }
        sent
    }

    /// Send a follow-up message.
    pub async fn follow_up(&self, reply: Reply) -> Result<(), ResponseError> {
        self.responder.follow_up(reply).await
    }

    /// Reply if unacknowledged, follow up otherwise.
    pub async fn respond(&self, reply: Reply) -> Result<(), ResponseError> {
        if self.is_acknowledged() {
            return self.follow_up(reply).await;
        }
        match self.reply(reply.clone()).await {
            Err(ResponseError::AlreadyAcknowledged) => self.follow_up(reply).await,
            other => other,
        }
    }

    /// Answer an autocomplete interaction.
    pub async fn suggest(&self, choices: Vec<Choice>) -> Result<(), ResponseError> {
        self.responder.suggest(choices).await
    }
}

impl fmt::Debug for InteractionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionEvent")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("user_id", &self.user_id)
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id())
            .field("acknowledged", &self.is_acknowledged())
            .finish_non_exhaustive()
    }
}

/// Builder for [`InteractionEvent`], used by gateway adapters and tests.
pub struct InteractionEventBuilder {
    id: String,
    name: String,
    group: Option<String>,
    subcommand: Option<String>,
    user_id: Snowflake,
    channel_id: Option<Snowflake>,
    guild: Option<GuildInfo>,
    options: HashMap<String, OptionValue>,
    focused: Option<String>,
    locale: String,
    responder: Arc<dyn Responder>,
}

impl InteractionEventBuilder {
    /// Platform interaction id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Subcommand group between the name and the subcommand.
    pub fn subcommand_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Subcommand name.
    pub fn subcommand(mut self, subcommand: impl Into<String>) -> Self {
        self.subcommand = Some(subcommand.into());
        self
    }

    /// Channel the command was invoked in.
    pub fn channel(mut self, channel_id: Snowflake) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    /// Guild the command was invoked in.
    pub fn guild(mut self, guild: GuildInfo) -> Self {
        self.guild = Some(guild);
        self
    }

    /// Add an option value.
    pub fn option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    /// Mark the option being typed (autocomplete interactions).
    pub fn focused(mut self, name: impl Into<String>) -> Self {
        self.focused = Some(name.into());
        self
    }

    /// Locale of the invoking user.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Finish the event.
    pub fn build(self) -> InteractionEvent {
        let mut path = self.name.clone();
        for segment in [self.group.as_deref(), self.subcommand.as_deref()].into_iter().flatten() {
            path.push('/');
            path.push_str(segment);
        }
        InteractionEvent {
            id: self.id,
            name: self.name,
            path,
            user_id: self.user_id,
            channel_id: self.channel_id,
            guild: self.guild,
            options: self.options,
            focused: self.focused,
            locale: self.locale,
            acknowledged: AtomicBool::new(false),
            responder: self.responder,
        }
    }
}

/// What a [`MemoryResponder`] was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `defer` was called.
    Deferred {
        /// Ephemeral flag passed to `defer`.
        ephemeral: bool,
    },
    /// Initial reply.
    Reply(Reply),
    /// Follow-up message.
    FollowUp(Reply),
    /// Autocomplete suggestions.
    Suggestions(Vec<Choice>),
}

impl Response {
    /// Message text for replies and follow-ups.
    pub fn content(&self) -> Option<&str> {
        match self {
            Response::Reply(r) | Response::FollowUp(r) => Some(&r.content),
            _ => None,
        }
    }

    /// Ephemeral flag for replies, follow-ups and defers.
    pub fn is_ephemeral(&self) -> bool {
        match self {
            Response::Reply(r) | Response::FollowUp(r) => r.ephemeral,
            Response::Deferred { ephemeral } => *ephemeral,
            Response::Suggestions(_) => false,
        }
    }
}

/// Responder that records everything in memory (tests/diagnostics).
#[derive(Debug, Clone, Default)]
pub struct MemoryResponder {
    responses: Arc<Mutex<Vec<Response>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryResponder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a transport error.
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything recorded so far.
    pub fn responses(&self) -> Vec<Response> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Text of every reply and follow-up, in order.
    pub fn contents(&self) -> Vec<String> {
        self.responses().iter().filter_map(|r| r.content().map(str::to_owned)).collect()
    }

    /// Number of recorded responses.
    pub fn len(&self) -> usize {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, response: Response) -> Result<(), ResponseError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ResponseError::Transport("memory responder set to fail".into()));
        }
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).push(response);
        Ok(())
    }
}

#[async_trait]
impl Responder for MemoryResponder {
    async fn defer(&self, ephemeral: bool) -> Result<(), ResponseError> {
        self.record(Response::Deferred { ephemeral })
    }

    async fn reply(&self, reply: Reply) -> Result<(), ResponseError> {
        self.record(Response::Reply(reply))
    }

    async fn follow_up(&self, reply: Reply) -> Result<(), ResponseError> {
        self.record(Response::FollowUp(reply))
    }

    async fn suggest(&self, choices: Vec<Choice>) -> Result<(), ResponseError> {
        self.record(Response::Suggestions(choices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(responder: &MemoryResponder) -> InteractionEvent {
        InteractionEvent::builder("config", 7, Arc::new(responder.clone()))
            .subcommand_group("roles")
            .subcommand("add")
            .channel(11)
            .option("role", OptionValue::Role(99))
            .build()
    }

    #[test]
    fn command_path_joins_group_and_subcommand() {
        let responder = MemoryResponder::new();
        let ev = event(&responder);
        assert_eq!(ev.command_path(), "config/roles/add");
        assert_eq!(ev.name(), "config");
        assert_eq!(ev.option("role").and_then(OptionValue::as_snowflake), Some(99));
        assert!(!ev.is_from_guild());
    }

    #[tokio::test]
    async fn respond_switches_to_follow_up_after_ack() {
        let responder = MemoryResponder::new();
        let ev = event(&responder);
        ev.respond(Reply::new("first")).await.unwrap();
        assert!(ev.is_acknowledged());
        ev.respond(Reply::ephemeral("second")).await.unwrap();

        let recorded = responder.responses();
        assert_eq!(recorded[0], Response::Reply(Reply::new("first")));
        assert_eq!(recorded[1], Response::FollowUp(Reply::ephemeral("second")));
    }

    #[tokio::test]
    async fn strict_reply_rejects_second_initial_response() {
        let responder = MemoryResponder::new();
        let ev = event(&responder);
        ev.acknowledge(true).await.unwrap();
        ev.acknowledge(true).await.unwrap();
        assert_eq!(responder.len(), 1, "acknowledge is idempotent");
        assert_eq!(ev.reply(Reply::new("late")).await, Err(ResponseError::AlreadyAcknowledged));
    }

    struct SlowResponder {
        inner: MemoryResponder,
    }

    #[async_trait]
    impl Responder for SlowResponder {
        async fn defer(&self, ephemeral: bool) -> Result<(), ResponseError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.defer(ephemeral).await
        }

        async fn reply(&self, reply: Reply) -> Result<(), ResponseError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.reply(reply).await
        }

        async fn follow_up(&self, reply: Reply) -> Result<(), ResponseError> {
            self.inner.follow_up(reply).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_replies_send_one_initial_response() {
        let recorder = MemoryResponder::new();
        let slow = Arc::new(SlowResponder {
            inner: recorder.clone(),
        });
        let ev = InteractionEvent::builder("config", 7, slow).build();

        let (a, b) = tokio::join!(ev.reply(Reply::new("a")), ev.reply(Reply::new("b")));
        assert_eq!(a, Ok(()));
        assert_eq!(b, Err(ResponseError::AlreadyAcknowledged));

        let (c, d) = tokio::join!(ev.acknowledge(true), ev.respond(Reply::new("c")));
        assert_eq!((c, d), (Ok(()), Ok(())));
        assert_eq!(
            recorder.responses(),
            vec![Response::Reply(Reply::new("a")), Response::FollowUp(Reply::new("c"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn respond_during_pending_reply_follows_up() {
        let recorder = MemoryResponder::new();
        let slow = Arc::new(SlowResponder {
            inner: recorder.clone(),
        });
        let ev = InteractionEvent::builder("config", 7, slow).build();

        let (a, b) = tokio::join!(ev.respond(Reply::new("a")), ev.respond(Reply::new("b")));
        assert_eq!((a, b), (Ok(()), Ok(())));
        assert_eq!(
            recorder.responses(),
            vec![Response::FollowUp(Reply::new("b")), Response::Reply(Reply::new("a"))]
        );
    }

    #[tokio::test]
    async fn failed_reply_leaves_event_unacknowledged() {
        let responder = MemoryResponder::new();
        responder.fail_all(true);
        let ev = event(&responder);
        assert!(matches!(ev.reply(Reply::new("x")).await, Err(ResponseError::Transport(_))));
        assert!(!ev.is_acknowledged());
    }
}
