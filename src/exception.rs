//! Failure reporting for dispatches that end in an error.

use crate::error::{DispatchError, PermissionTarget, PermissionsLack};
use crate::event::{InteractionEvent, Reply};
use crate::handler::SlashHandler;
use async_trait::async_trait;
use tracing::{error, warn};

/// Reports a failed dispatch.
///
/// Implementations must not panic or propagate; the executor still contains a
/// panic, but the failure report is lost.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    /// Handle `error` raised while dispatching `event` to `handler`.
    async fn wrap(&self, error: DispatchError, handler: &SlashHandler, event: &InteractionEvent);
}

/// Generic notice sent for unexpected failures.
pub const GENERIC_FAILURE_NOTICE: &str =
    "\u{26A0}\u{FE0F} Something went wrong while running this command.";

/// Permission failures get a dedicated notice; everything else is logged and,
/// unless silenced, answered with [`GENERIC_FAILURE_NOTICE`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultExceptionHandler {
    notify_user: bool,
}

impl Default for DefaultExceptionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultExceptionHandler {
    /// Notify the user of unexpected failures.
    pub fn new() -> Self {
        Self { notify_user: true }
    }

    /// Log unexpected failures without telling the user.
    pub fn silent() -> Self {
        Self { notify_user: false }
    }

    async fn send(&self, event: &InteractionEvent, reply: Reply) {
        if let Err(err) = event.respond(reply).await {
            warn!(
                target: "slashgate::exception",
                command = event.command_path(),
                error = %err,
                "failed to send failure notice"
            );
        }
    }
}

#[async_trait]
impl ExceptionHandler for DefaultExceptionHandler {
    async fn wrap(&self, error: DispatchError, handler: &SlashHandler, event: &InteractionEvent) {
        if let Some(lack) = error.permissions_lack() {
            warn!(
                target: "slashgate::exception",
                command = handler.path(),
                user = event.user_id(),
                guild = ?event.guild_id(),
                %lack,
                "missing permissions"
            );
            self.send(event, permissions_lack_message(lack)).await;
            return;
        }

        error!(
            target: "slashgate::exception",
            command = handler.path(),
            user = event.user_id(),
            guild = ?event.guild_id(),
            channel = ?event.channel_id(),
            error = %error,
            "command failed"
        );
        if self.notify_user {
            self.send(event, Reply::ephemeral(GENERIC_FAILURE_NOTICE)).await;
        }
    }
}

/// Ephemeral notice naming who lacks which permissions.
pub fn permissions_lack_message(lack: &PermissionsLack) -> Reply {
    let who = match lack.target {
        PermissionTarget::Bot => "The bot does not",
        PermissionTarget::User => "You do not",
    };
    Reply::ephemeral(format!(
        "\u{1F6AB} {who} have the necessary permissions to carry out this action.\n\
         Required permissions: **{}**.",
        lack.missing.to_human()
    ))
}
