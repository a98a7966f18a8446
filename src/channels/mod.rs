//! Chat platform adapters
//!
//! The orchestrator talks to the platform only through [`ChatPlatform`] and
//! [`VoiceGateway`]; inbound traffic arrives as [`PlatformEvent`]s on a channel.

mod chunking;
mod discord;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use chunking::{MESSAGE_LIMIT, chunk_text};
pub use discord::DiscordChannel;

use crate::Result;
use crate::voice::{SpeakerTracker, VoiceSink};

/// A message from the platform
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    /// Message identifier
    pub id: u64,

    pub channel_id: u64,

    /// Guild the message was posted in; `None` for DMs
    pub guild_id: Option<u64>,

    pub author_id: u64,

    /// Author display name
    pub author_name: String,

    /// Whether the author is a bot account
    pub author_is_bot: bool,

    pub content: String,

    /// Whether the bot was mentioned
    pub mentions_bot: bool,

    /// Whether this is a direct message
    pub is_dm: bool,

    /// Voice channel the author is connected to, if known
    pub author_voice_channel: Option<u64>,
}

/// Something happened on the platform
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// Gateway session established
    Ready { user_id: u64, user_name: String },
    Message(IncomingMessage),
    /// The bot's voice connection in a guild went away
    VoiceDisconnected { guild_id: u64 },
}

/// Outbound text operations
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Send one message; callers chunk long text first
    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()>;

    async fn send_typing(&self, channel_id: u64) -> Result<()>;

    /// Change the bot's nickname in a guild
    async fn set_nickname(&self, guild_id: u64, nickname: &str) -> Result<()>;

    /// Round-trip time of a trivial platform call
    async fn latency(&self) -> Result<Duration>;

    /// Name to use for a user in a guild
    async fn display_name(&self, guild_id: u64, user_id: u64) -> Result<String>;
}

/// Voice connection plumbing
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Connect to a voice channel, feeding speaking-state changes to `speakers`
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` if the platform rejects the join
    async fn join(
        &self,
        guild_id: u64,
        channel_id: u64,
        speakers: Arc<SpeakerTracker>,
    ) -> Result<Arc<dyn VoiceSink>>;

    /// Drop the voice connection in a guild
    async fn leave(&self, guild_id: u64) -> Result<()>;
}
