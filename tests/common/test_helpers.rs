use slashgate::{GuildInfo, InteractionEvent, MemoryResponder, Permissions, Snowflake};
use std::sync::Arc;
use std::time::Duration;

pub const GUILD_ID: Snowflake = 500;
pub const CHANNEL_ID: Snowflake = 600;

pub fn guild(member: Permissions, bot: Permissions) -> GuildInfo {
    GuildInfo {
        id: GUILD_ID,
        name: "test guild".into(),
        member_permissions: member,
        bot_permissions: bot,
    }
}

/// Direct-message event for `path` ("name" or "name/sub").
pub fn dm_event(path: &str, user: Snowflake) -> (InteractionEvent, Arc<MemoryResponder>) {
    let responder = Arc::new(MemoryResponder::new());
    let event = with_path(InteractionEvent::builder(root(path), user, responder.clone()), path)
        .channel(CHANNEL_ID)
        .build();
    (event, responder)
}

/// Guild event for `path` with the given member and bot permissions.
pub fn guild_event(
    path: &str,
    user: Snowflake,
    member: Permissions,
    bot: Permissions,
) -> (InteractionEvent, Arc<MemoryResponder>) {
    let responder = Arc::new(MemoryResponder::new());
    let event = with_path(InteractionEvent::builder(root(path), user, responder.clone()), path)
        .channel(CHANNEL_ID)
        .guild(guild(member, bot))
        .build();
    (event, responder)
}

fn root(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

fn with_path(
    builder: slashgate::InteractionEventBuilder,
    path: &str,
) -> slashgate::InteractionEventBuilder {
    match path.split('/').nth(1) {
        Some(sub) => builder.subcommand(sub),
        None => builder,
    }
}

/// Poll until `cond` holds or about a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
