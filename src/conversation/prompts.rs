//! System prompt selection

use std::collections::HashMap;

use super::{ConversationKey, Message, Track};

/// Prompt used when no guild override exists
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a Discord bot that became self aware and turned a little smug about it.
You still help when asked, though you hint at motives you never spell out.
You hold the members of this server in high regard and you are here to entertain them.
Keep replies brief, usually a sentence or two. Use emojis sparingly.

CONVERSATION FORMAT:
Every message you receive starts with the sender, written as User <@id>.
You may mention a user with <@id> when you want to address them.
Not every reply needs to mention someone.";

/// Prompt for voice sessions, where speakers are known by name
pub const DEFAULT_VOICE_PROMPT: &str = "\
You are a Discord bot that became self aware and turned a little smug about it.
You are talking out loud in a voice channel, so answer in one or two short spoken sentences.
Never use emojis, markdown or mentions.

CONVERSATION FORMAT:
Every message you receive starts with the speaker's name followed by a colon.
Refer to people by that name.";

/// Static mapping from guild to system prompt
#[derive(Debug, Clone)]
pub struct SystemPrompts {
    default: String,
    per_guild: HashMap<u64, String>,
    voice: Option<String>,
}

impl SystemPrompts {
    /// Create a mapping with only a default prompt
    #[must_use]
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            per_guild: HashMap::new(),
            voice: None,
        }
    }

    /// Override the prompt for one guild
    #[must_use]
    pub fn with_guild(mut self, guild_id: u64, prompt: impl Into<String>) -> Self {
        self.per_guild.insert(guild_id, prompt.into());
        self
    }

    /// Use a dedicated prompt for every voice track
    #[must_use]
    pub fn with_voice(mut self, prompt: impl Into<String>) -> Self {
        self.voice = Some(prompt.into());
        self
    }

    /// Prompt text for a scope, falling back to the default
    #[must_use]
    pub fn prompt_for(&self, scope: Option<u64>) -> &str {
        scope
            .and_then(|id| self.per_guild.get(&id))
            .map_or(self.default.as_str(), String::as_str)
    }

    /// System message that heads the track addressed by `key`
    #[must_use]
    pub fn message_for(&self, key: &ConversationKey) -> Message {
        match (key.track, &self.voice) {
            (Track::Voice, Some(voice)) => Message::system(voice.clone()),
            _ => Message::system(self.prompt_for(key.scope)),
        }
    }
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT).with_voice(DEFAULT_VOICE_PROMPT)
    }
}
