//! Platform permission bits and per-handler permission requirements.

use bitflags::bitflags;

bitflags! {
    /// Guild permission set, using the platform's bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS = 1 << 1;
        const BAN_MEMBERS = 1 << 2;
        const ADMINISTRATOR = 1 << 3;
        const MANAGE_CHANNELS = 1 << 4;
        const MANAGE_GUILD = 1 << 5;
        const ADD_REACTIONS = 1 << 6;
        const VIEW_AUDIT_LOG = 1 << 7;
        const PRIORITY_SPEAKER = 1 << 8;
        const STREAM = 1 << 9;
        const VIEW_CHANNEL = 1 << 10;
        const SEND_MESSAGES = 1 << 11;
        const SEND_TTS_MESSAGES = 1 << 12;
        const MANAGE_MESSAGES = 1 << 13;
        const EMBED_LINKS = 1 << 14;
        const ATTACH_FILES = 1 << 15;
        const READ_MESSAGE_HISTORY = 1 << 16;
        const MENTION_EVERYONE = 1 << 17;
        const USE_EXTERNAL_EMOJIS = 1 << 18;
        const VIEW_GUILD_INSIGHTS = 1 << 19;
        const CONNECT = 1 << 20;
        const SPEAK = 1 << 21;
        const MUTE_MEMBERS = 1 << 22;
        const DEAFEN_MEMBERS = 1 << 23;
        const MOVE_MEMBERS = 1 << 24;
        const USE_VOICE_ACTIVITY = 1 << 25;
        const CHANGE_NICKNAME = 1 << 26;
        const MANAGE_NICKNAMES = 1 << 27;
        const MANAGE_ROLES = 1 << 28;
        const MANAGE_WEBHOOKS = 1 << 29;
        const MANAGE_EMOJIS = 1 << 30;
        const USE_APPLICATION_COMMANDS = 1 << 31;
        const MANAGE_EVENTS = 1 << 33;
        const MANAGE_THREADS = 1 << 34;
        const MODERATE_MEMBERS = 1 << 40;
    }
}

impl Permissions {
    /// Permissions from `self` that `held` does not cover.
    ///
    /// Administrator implies every other permission.
    pub fn missing_from(self, held: Permissions) -> Permissions {
        if held.contains(Permissions::ADMINISTRATOR) {
            return Permissions::empty();
        }
        self.difference(held)
    }

    /// Human-readable, comma-separated names ("Manage Channels, Kick Members").
    pub fn to_human(&self) -> String {
        self.iter_names().map(|(name, _)| title_case(name)).collect::<Vec<_>>().join(", ")
    }
}

fn title_case(flag_name: &str) -> String {
    flag_name
        .split('_')
        .map(|word| {
            let lower = word.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Permissions a handler requires from the invoking member and from the bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequiredPermissions {
    /// Required of the invoking member.
    pub user: Permissions,
    /// Required of the bot's own member.
    pub bot: Permissions,
}

impl RequiredPermissions {
    /// Build from explicit user and bot sets.
    pub fn new(user: Permissions, bot: Permissions) -> Self {
        Self { user, bot }
    }

    /// True when nothing is required of either party.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.bot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_from_reports_only_unheld_bits() {
        let required = Permissions::MANAGE_CHANNELS | Permissions::SEND_MESSAGES;
        let held = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL;
        assert_eq!(required.missing_from(held), Permissions::MANAGE_CHANNELS);
    }

    #[test]
    fn administrator_covers_everything() {
        let required = Permissions::BAN_MEMBERS | Permissions::MANAGE_ROLES;
        assert!(required.missing_from(Permissions::ADMINISTRATOR).is_empty());
    }

    #[test]
    fn human_names_are_title_cased() {
        assert_eq!(Permissions::MANAGE_CHANNELS.to_human(), "Manage Channels");
        let both = Permissions::KICK_MEMBERS | Permissions::MANAGE_CHANNELS;
        assert_eq!(both.to_human(), "Kick Members, Manage Channels");
        assert_eq!(Permissions::empty().to_human(), "");
    }

    #[test]
    fn required_permissions_empty_by_default() {
        assert!(RequiredPermissions::default().is_empty());
        assert!(!RequiredPermissions::new(Permissions::empty(), Permissions::SPEAK).is_empty());
    }
}
