//! Admission checks evaluated before a handler body runs.
//!
//! Order is fixed: global checks, then the handler's own checks, then the
//! permission check. The first rejection stops the chain.

use crate::context::SlashContext;
use crate::error::{BoxError, DispatchError, PermissionsLack};
use crate::permissions::RequiredPermissions;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named admission predicate.
///
/// Checks read the context and may write its `extra` slot; they must not mutate
/// state shared across commands.
#[async_trait]
pub trait Check: Send + Sync {
    /// Stable name used in logs and rejection errors.
    fn name(&self) -> &str;

    /// `Ok(false)` rejects the interaction; `Err` fails the dispatch.
    async fn check(&self, ctx: &SlashContext) -> Result<bool, BoxError>;
}

/// Check backed by a synchronous closure.
pub struct FnCheck<F> {
    name: String,
    predicate: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&SlashContext) -> Result<bool, BoxError> + Send + Sync,
{
    /// Wrap a fallible predicate.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

#[async_trait]
impl<F> Check for FnCheck<F>
where
    F: Fn(&SlashContext) -> Result<bool, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &SlashContext) -> Result<bool, BoxError> {
        (self.predicate)(ctx)
    }
}

/// Build a check from an infallible predicate.
pub fn check_fn<F>(name: impl Into<String>, predicate: F) -> impl Check
where
    F: Fn(&SlashContext) -> bool + Send + Sync,
{
    FnCheck::new(name, move |ctx: &SlashContext| Ok(predicate(ctx)))
}

/// Ordered list of checks with short-circuit evaluation.
#[derive(Clone, Default)]
pub struct CheckChain {
    checks: Vec<Arc<dyn Check>>,
}

impl CheckChain {
    /// Empty chain; passes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a check.
    pub fn push(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    /// Whether a check with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.name() == name)
    }

    /// Check names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Number of checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluate in order; stop at the first `false` or error.
    pub async fn evaluate(&self, ctx: &SlashContext) -> Result<(), DispatchError> {
        for check in &self.checks {
            match check.check(ctx).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        target: "slashgate::check",
                        check = check.name(),
                        command = ctx.command_path(),
                        "check rejected interaction"
                    );
                    return Err(DispatchError::CheckRejected {
                        check: check.name().to_owned(),
                    });
                }
                Err(err) => return Err(DispatchError::from_handler(err)),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CheckChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckChain").field("checks", &self.names()).finish()
    }
}

/// Verify the invoking member, then the bot, hold the required permissions.
///
/// Only events raised inside a guild are checked, whatever the handler's
/// target; direct messages pass.
pub fn check_permissions(
    ctx: &SlashContext,
    required: &RequiredPermissions,
) -> Result<(), PermissionsLack> {
    if required.is_empty() {
        return Ok(());
    }
    let Some(guild) = ctx.event().guild() else {
        return Ok(());
    };

    let missing = required.user.missing_from(guild.member_permissions);
    if !missing.is_empty() {
        return Err(PermissionsLack::user(missing));
    }
    let missing = required.bot.missing_from(guild.bot_permissions);
    if !missing.is_empty() {
        return Err(PermissionsLack::bot(missing));
    }
    Ok(())
}

/// Run the full admission chain: global, then local, then permissions.
pub async fn run_checks(
    global: &CheckChain,
    local: &CheckChain,
    required: &RequiredPermissions,
    ctx: &SlashContext,
) -> Result<(), DispatchError> {
    global.evaluate(ctx).await?;
    local.evaluate(ctx).await?;
    check_permissions(ctx, required)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{GuildInfo, InteractionEvent, MemoryResponder};
    use crate::permissions::Permissions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn guild_ctx(member: Permissions, bot: Permissions) -> SlashContext {
        let event = InteractionEvent::builder("purge", 3, Arc::new(MemoryResponder::new()))
            .guild(GuildInfo {
                id: 9,
                name: "g".into(),
                member_permissions: member,
                bot_permissions: bot,
            })
            .build();
        SlashContext::guild_scoped(Arc::new(event)).unwrap()
    }

    fn any_target_guild_ctx(member: Permissions, bot: Permissions) -> SlashContext {
        let event = InteractionEvent::builder("purge", 3, Arc::new(MemoryResponder::new()))
            .guild(GuildInfo {
                id: 9,
                name: "g".into(),
                member_permissions: member,
                bot_permissions: bot,
            })
            .build();
        SlashContext::generic(Arc::new(event))
    }

    fn dm_ctx() -> SlashContext {
        let event = InteractionEvent::builder("purge", 3, Arc::new(MemoryResponder::new())).build();
        SlashContext::generic(Arc::new(event))
    }

    struct SpyCheck {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Check for SpyCheck {
        fn name(&self) -> &str {
            "spy"
        }

        async fn check(&self, _ctx: &SlashContext) -> Result<bool, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn chain_short_circuits_on_first_false() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut chain = CheckChain::new();
        chain.push(Arc::new(check_fn("pass", |_| true)));
        chain.push(Arc::new(check_fn("deny", |_| false)));
        chain.push(Arc::new(SpyCheck {
            calls: calls.clone(),
        }));

        let err = chain.evaluate(&dm_ctx()).await.unwrap_err();
        match err {
            DispatchError::CheckRejected { check } => assert_eq!(check, "deny"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0, "spy must never run");
    }

    #[tokio::test]
    async fn erroring_check_is_an_exception_not_a_rejection() {
        let mut chain = CheckChain::new();
        chain.push(Arc::new(FnCheck::new("db", |_: &SlashContext| Err("db down".into()))));
        let err = chain.evaluate(&dm_ctx()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }

    #[tokio::test]
    async fn empty_chain_passes() {
        assert!(CheckChain::new().evaluate(&dm_ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn checks_can_pass_data_through_extra() {
        let mut chain = CheckChain::new();
        chain.push(Arc::new(check_fn("stash", |ctx| {
            ctx.set_extra(ctx.user_id() * 2);
            true
        })));
        let ctx = dm_ctx();
        chain.evaluate(&ctx).await.unwrap();
        assert_eq!(ctx.extra::<u64>(), Some(6));
    }

    #[test]
    fn permission_check_skipped_outside_guild_scope() {
        let required = RequiredPermissions::new(Permissions::BAN_MEMBERS, Permissions::BAN_MEMBERS);
        assert!(check_permissions(&dm_ctx(), &required).is_ok());
    }

    #[test]
    fn permission_check_applies_to_any_target_handlers_in_guilds() {
        let required = RequiredPermissions::new(Permissions::empty(), Permissions::MANAGE_CHANNELS);
        let lack = check_permissions(
            &any_target_guild_ctx(Permissions::all(), Permissions::SEND_MESSAGES),
            &required,
        )
        .unwrap_err();
        assert_eq!(lack, PermissionsLack::bot(Permissions::MANAGE_CHANNELS));
    }

    #[test]
    fn permission_check_reports_user_before_bot() {
        let required =
            RequiredPermissions::new(Permissions::MANAGE_MESSAGES, Permissions::MANAGE_CHANNELS);
        let ctx = guild_ctx(Permissions::empty(), Permissions::empty());
        let lack = check_permissions(&ctx, &required).unwrap_err();
        assert_eq!(lack, PermissionsLack::user(Permissions::MANAGE_MESSAGES));

        let ctx = guild_ctx(Permissions::MANAGE_MESSAGES, Permissions::empty());
        let lack = check_permissions(&ctx, &required).unwrap_err();
        assert_eq!(lack, PermissionsLack::bot(Permissions::MANAGE_CHANNELS));
    }

    #[tokio::test]
    async fn run_checks_orders_global_before_local() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut global = CheckChain::new();
        let o = order.clone();
        global.push(Arc::new(check_fn("global", move |_| {
            o.lock().unwrap().push("global");
            true
        })));
        let mut local = CheckChain::new();
        let o = order.clone();
        local.push(Arc::new(check_fn("local", move |_| {
            o.lock().unwrap().push("local");
            false
        })));

        let err = run_checks(&global, &local, &RequiredPermissions::default(), &dm_ctx())
            .await
            .unwrap_err();
        assert!(err.is_check_rejected());
        assert_eq!(*order.lock().unwrap(), vec!["global", "local"]);
    }
}
