//! Prefix command parsing and canned replies

/// Default command prefix
pub const DEFAULT_PREFIX: &str = "!";

pub const REPLY_NOT_IN_VOICE: &str = "You need to be in a voice channel for me to join!";
pub const REPLY_JOINED: &str = "👋 I've joined your voice channel! Say 'bot' to get my attention!";
pub const REPLY_JOIN_FAILED: &str = "❌ I couldn't join the voice channel!";
pub const REPLY_VOICE_DISABLED: &str = "❌ Voice support is disabled!";
pub const REPLY_LEFT: &str = "👋 See ya!";
pub const REPLY_CLEARED: &str = "🧹 Conversation history cleared!";
pub const REPLY_ASK_USAGE: &str = "Please ask something. Usage: !ask your question";
pub const REPLY_RENAME_GUILD_ONLY: &str = "This command can only be used in a server.";
pub const REPLY_RENAME_OWNER_ONLY: &str = "Only the bot owner can use this command.";
pub const REPLY_RENAME_USAGE: &str = "Please provide a new name. Usage: !rename new_name";
pub const REPLY_RENAME_FAILED: &str =
    "Failed to change nickname. Make sure I have the necessary permissions.";

/// A parsed prefix command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Generate a reply regardless of mentions
    Ask(String),
    /// Reset text and voice history for the scope
    Clear,
    Join,
    Leave,
    Ping,
    /// Change the bot's nickname (owner only)
    Rename(String),
    /// Prefixed but not recognized; never treated as conversation
    Unknown(String),
}

impl BotCommand {
    /// Parse `content` if it starts with `prefix`
    #[must_use]
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.strip_prefix(prefix)?;
        let rest = rest.trim_start();
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));

        let command = match name.to_lowercase().as_str() {
            "ask" => Self::Ask(args.to_string()),
            "clear" => Self::Clear,
            "join" => Self::Join,
            "leave" => Self::Leave,
            "ping" => Self::Ping,
            "rename" => Self::Rename(args.to_string()),
            other => Self::Unknown(other.to_string()),
        };
        Some(command)
    }
}
