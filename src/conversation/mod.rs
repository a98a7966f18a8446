//! Conversation history
//!
//! Short, bounded, in-memory message logs. Every scope has two independent
//! tracks: text history keyed by channel and voice history keyed by guild.

mod prompts;
mod store;

use serde::{Deserialize, Serialize};

pub use prompts::{DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE_PROMPT, SystemPrompts};
pub use store::{ConversationStore, DEFAULT_MAX_HISTORY};

/// Role of a message in the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt, always slot 0
    System,
    /// Someone talking to the bot
    User,
    /// The bot's own reply
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Who said a user message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Speaker {
    /// Platform user, rendered as a mention so the model can address them
    Mention(u64),
    /// Display name, used on the voice track where mentions mean nothing
    Name(String),
}

/// A single immutable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    speaker: Option<Speaker>,
    content: String,
}

impl Message {
    /// Create a system prompt message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            speaker: None,
            content: content.into(),
        }
    }

    /// Create a user message attributed to a speaker
    #[must_use]
    pub fn user(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            speaker: Some(speaker),
            content: content.into(),
        }
    }

    /// Create an assistant reply
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            speaker: None,
            content: content.into(),
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn speaker(&self) -> Option<&Speaker> {
        self.speaker.as_ref()
    }

    /// Raw text without speaker prefix
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Text as sent to the completion service
    ///
    /// User messages carry their speaker so the model can tell people apart:
    /// `User <@123>: hello` on text tracks, `alice: hello` on voice tracks.
    #[must_use]
    pub fn rendered(&self) -> String {
        match &self.speaker {
            Some(Speaker::Mention(id)) => format!("User <@{id}>: {}", self.content),
            Some(Speaker::Name(name)) => format!("{name}: {}", self.content),
            None => self.content.clone(),
        }
    }

    /// Opaque end-user tag for the completion request
    #[must_use]
    pub fn speaker_tag(&self) -> Option<String> {
        match &self.speaker {
            Some(Speaker::Mention(id)) => Some(id.to_string()),
            Some(Speaker::Name(name)) => Some(name.clone()),
            None => None,
        }
    }
}

/// Which of the two histories a scope refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    /// Chat channel history, keyed by channel id
    Text,
    /// Voice session history, keyed by guild id
    Voice,
}

/// Address of one conversation track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    /// Track kind
    pub track: Track,
    /// Channel id (text) or guild id (voice)
    pub id: u64,
    /// Guild used for system prompt selection; `None` for DMs
    pub scope: Option<u64>,
}

impl ConversationKey {
    /// Text history of a channel
    #[must_use]
    pub const fn text(channel_id: u64, guild_id: Option<u64>) -> Self {
        Self {
            track: Track::Text,
            id: channel_id,
            scope: guild_id,
        }
    }

    /// Voice history of a guild
    #[must_use]
    pub const fn voice(guild_id: u64) -> Self {
        Self {
            track: Track::Voice,
            id: guild_id,
            scope: Some(guild_id),
        }
    }
}
