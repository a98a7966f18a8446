//! Discord adapter using serenity and songbird

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serenity::Client;
use serenity::all::{
    ChannelId, Context, EventHandler, GatewayIntents, GuildId, Message, Ready, UserId, VoiceState,
};
use serenity::gateway::ShardManager;
use serenity::http::Http;
use songbird::driver::DecodeMode;
use songbird::error::JoinError;
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{CoreEvent, SerenityInit, Songbird};
use tokio::sync::mpsc;

use super::{ChatPlatform, IncomingMessage, PlatformEvent, VoiceGateway};
use crate::voice::{PlaybackHandle, SpeakerTracker, VoiceSink};
use crate::{Error, Result};

/// Discord adapter
///
/// Implements both the text and voice sides of the platform once connected.
pub struct DiscordChannel {
    token: String,
    songbird: Arc<Songbird>,
    event_tx: mpsc::Sender<PlatformEvent>,
    http: Option<Arc<Http>>,
    shard_manager: Option<Arc<ShardManager>>,
}

impl DiscordChannel {
    /// Create the adapter and the receiver for its events
    #[must_use]
    pub fn with_receiver(token: String) -> (Self, mpsc::Receiver<PlatformEvent>) {
        let (event_tx, event_rx) = mpsc::channel(100);
        let config = songbird::Config::default().decode_mode(DecodeMode::Pass);

        let channel = Self {
            token,
            songbird: Songbird::serenity_from_config(config),
            event_tx,
            http: None,
            shard_manager: None,
        };
        (channel, event_rx)
    }

    /// Log in and start the gateway in a background task
    ///
    /// # Errors
    ///
    /// Returns error if the client cannot be built
    pub async fn connect(&mut self) -> Result<()> {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES;

        let handler = DiscordHandler {
            event_tx: self.event_tx.clone(),
        };

        let mut client = Client::builder(&self.token, intents)
            .event_handler(handler)
            .register_songbird_with(Arc::clone(&self.songbird))
            .await
            .map_err(|e| Error::Channel(format!("Discord client error: {e}")))?;

        self.http = Some(Arc::clone(&client.http));
        self.shard_manager = Some(Arc::clone(&client.shard_manager));

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(error = %e, "Discord client error");
            }
        });

        tracing::info!("Discord channel connected");
        Ok(())
    }

    /// Close every shard
    pub async fn shutdown(&self) {
        if let Some(manager) = &self.shard_manager {
            manager.shutdown_all().await;
            tracing::info!("Discord channel disconnected");
        }
    }

    fn http(&self) -> Result<&Arc<Http>> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Channel("Discord not connected".to_string()))
    }
}

#[async_trait]
impl ChatPlatform for DiscordChannel {
    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        let http = self.http()?;

        ChannelId::new(channel_id)
            .say(http, text)
            .await
            .map_err(|e| Error::Channel(format!("Discord send error: {e}")))?;

        tracing::debug!(channel_id, "Discord message sent");
        Ok(())
    }

    async fn send_typing(&self, channel_id: u64) -> Result<()> {
        let http = self.http()?;

        ChannelId::new(channel_id)
            .broadcast_typing(http)
            .await
            .map_err(|e| Error::Channel(format!("Discord typing error: {e}")))?;

        Ok(())
    }

    async fn set_nickname(&self, guild_id: u64, nickname: &str) -> Result<()> {
        let http = self.http()?;

        GuildId::new(guild_id)
            .edit_nickname(http, Some(nickname))
            .await
            .map_err(|e| Error::Channel(format!("Discord nickname error: {e}")))?;

        tracing::info!(guild_id, nickname, "nickname changed");
        Ok(())
    }

    async fn latency(&self) -> Result<Duration> {
        let http = self.http()?;

        let started = Instant::now();
        http.get_current_user()
            .await
            .map_err(|e| Error::Channel(format!("Discord latency probe failed: {e}")))?;
        Ok(started.elapsed())
    }

    async fn display_name(&self, guild_id: u64, user_id: u64) -> Result<String> {
        let http = self.http()?;

        let member = GuildId::new(guild_id)
            .member(http, UserId::new(user_id))
            .await
            .map_err(|e| Error::Channel(format!("Discord member lookup failed: {e}")))?;

        Ok(member.display_name().to_string())
    }
}

#[async_trait]
impl VoiceGateway for DiscordChannel {
    async fn join(
        &self,
        guild_id: u64,
        channel_id: u64,
        speakers: Arc<SpeakerTracker>,
    ) -> Result<Arc<dyn VoiceSink>> {
        let guild = GuildId::new(guild_id);

        let call = match self.songbird.join(guild, ChannelId::new(channel_id)).await {
            Ok(call) => call,
            Err(e) => {
                let _ = self.songbird.remove(guild).await;
                return Err(Error::Connect(e.to_string()));
            }
        };

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            let watcher = SpeakingWatcher::new(speakers);
            handler.add_global_event(Event::Core(CoreEvent::SpeakingStateUpdate), watcher.clone());
            handler.add_global_event(Event::Core(CoreEvent::VoiceTick), watcher);
        }

        tracing::info!(guild_id, channel_id, "joined voice channel");
        Ok(Arc::new(DiscordSink {
            songbird: Arc::clone(&self.songbird),
            guild,
        }))
    }

    async fn leave(&self, guild_id: u64) -> Result<()> {
        match self.songbird.remove(GuildId::new(guild_id)).await {
            Ok(()) | Err(JoinError::NoCall) => {
                tracing::info!(guild_id, "left voice channel");
                Ok(())
            }
            Err(e) => Err(Error::Connect(e.to_string())),
        }
    }
}

/// Playback side of a songbird call
struct DiscordSink {
    songbird: Arc<Songbird>,
    guild: GuildId,
}

#[async_trait]
impl VoiceSink for DiscordSink {
    async fn is_connected(&self) -> bool {
        match self.songbird.get(self.guild) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn play(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        let call = self
            .songbird
            .get(self.guild)
            .ok_or_else(|| Error::Playback("not in a voice channel".to_string()))?;

        let input = songbird::input::File::new(path.to_path_buf());
        let track = call.lock().await.play_input(input.into());

        Ok(Box::new(DiscordPlayback { track }))
    }
}

struct DiscordPlayback {
    track: TrackHandle,
}

#[async_trait]
impl PlaybackHandle for DiscordPlayback {
    async fn is_playing(&self) -> bool {
        match self.track.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn stop(&self) {
        if let Err(e) = self.track.stop() {
            tracing::debug!(error = %e, "stopping finished track");
        }
    }
}

/// Maps voice SSRCs to users and reports speaking transitions
#[derive(Clone)]
struct SpeakingWatcher {
    speakers: Arc<SpeakerTracker>,
    ssrc_users: Arc<parking_lot::Mutex<HashMap<u32, u64>>>,
}

impl SpeakingWatcher {
    fn new(speakers: Arc<SpeakerTracker>) -> Self {
        Self {
            speakers,
            ssrc_users: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl VoiceEventHandler for SpeakingWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(update) => {
                if let Some(user) = update.user_id {
                    self.ssrc_users.lock().insert(update.ssrc, user.0);
                }
            }
            EventContext::VoiceTick(tick) => {
                let users = self.ssrc_users.lock();
                for ssrc in tick.speaking.keys() {
                    if let Some(&user) = users.get(ssrc) {
                        self.speakers.speaking_started(user);
                    }
                }
                for ssrc in &tick.silent {
                    if let Some(&user) = users.get(ssrc) {
                        self.speakers.speaking_stopped(user);
                    }
                }
            }
            _ => {}
        }
        None
    }
}

/// Discord event handler
struct DiscordHandler {
    event_tx: mpsc::Sender<PlatformEvent>,
}

impl DiscordHandler {
    async fn forward(&self, event: PlatformEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            tracing::warn!(error = %e, "failed to forward Discord event");
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "Discord bot ready");
        self.forward(PlatformEvent::Ready {
            user_id: ready.user.id.get(),
            user_name: ready.user.name.clone(),
        })
        .await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let is_dm = msg.guild_id.is_none();
        let mentions_bot = msg.mentions_me(&ctx).await.unwrap_or(false);

        let author_voice_channel = msg.guild_id.and_then(|guild_id| {
            let guild = ctx.cache.guild(guild_id)?;
            guild
                .voice_states
                .get(&msg.author.id)
                .and_then(|state| state.channel_id)
                .map(ChannelId::get)
        });

        let incoming = IncomingMessage {
            id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            guild_id: msg.guild_id.map(GuildId::get),
            author_id: msg.author.id.get(),
            author_name: msg
                .author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.name.clone()),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            mentions_bot,
            is_dm,
            author_voice_channel,
        };

        tracing::debug!(
            author = %msg.author.name,
            channel_id = incoming.channel_id,
            is_dm,
            mentions_bot,
            "Discord message received"
        );

        self.forward(PlatformEvent::Message(incoming)).await;
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let own_id = ctx.cache.current_user().id;
        if new.user_id != own_id || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            tracing::info!(guild_id = guild_id.get(), "voice connection dropped");
            self.forward(PlatformEvent::VoiceDisconnected {
                guild_id: guild_id.get(),
            })
            .await;
        }
    }
}
