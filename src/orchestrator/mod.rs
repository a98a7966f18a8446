//! Event routing
//!
//! The orchestrator owns the guild to voice session registry and is the only
//! place sessions are created or destroyed. Platform events and wake events
//! are handled on their own tasks; failures are logged or turned into chat
//! replies, never propagated back into the event loops.

mod commands;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

pub use commands::{
    BotCommand, DEFAULT_PREFIX, REPLY_ASK_USAGE, REPLY_CLEARED, REPLY_JOIN_FAILED, REPLY_JOINED,
    REPLY_LEFT, REPLY_NOT_IN_VOICE, REPLY_RENAME_FAILED, REPLY_RENAME_GUILD_ONLY,
    REPLY_RENAME_OWNER_ONLY, REPLY_RENAME_USAGE, REPLY_VOICE_DISABLED,
};

use crate::{Error, Result};
use crate::channels::{
    ChatPlatform, IncomingMessage, MESSAGE_LIMIT, PlatformEvent, VoiceGateway, chunk_text,
};
use crate::completion::CompletionGateway;
use crate::conversation::{ConversationKey, ConversationStore, Message, Speaker};
use crate::voice::{
    SpeakerTracker, VoiceCaptureEngine, VoicePlaybackEngine, VoiceSession, WakeEvent,
};

/// YAGPDB.xyz, the welcome bot the original server used
pub const DEFAULT_WELCOME_BOT_ID: u64 = 204_255_221_017_214_977;

/// Name used when the speaker of a voice utterance is unknown
const UNKNOWN_SPEAKER: &str = "someone";

/// Behavior knobs for message routing
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub command_prefix: String,
    /// User allowed to run owner-only commands
    pub owner_id: Option<u64>,
    /// Bot whose welcome announcements get a reply
    pub welcome_bot_id: Option<u64>,
    pub welcome_keywords: Vec<String>,
    /// Pause before replying to a welcome announcement
    pub welcome_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_PREFIX.to_string(),
            owner_id: None,
            welcome_bot_id: Some(DEFAULT_WELCOME_BOT_ID),
            welcome_keywords: vec![
                "welcome".to_string(),
                "joined".to_string(),
                "welcomed".to_string(),
            ],
            welcome_delay: Duration::from_secs(1),
        }
    }
}

/// Voice side of the orchestrator
pub struct VoiceStack {
    pub gateway: Arc<dyn VoiceGateway>,
    pub capture: VoiceCaptureEngine,
    pub playback: VoicePlaybackEngine,
}

/// Routes platform and wake events to the conversation pipeline
pub struct SessionOrchestrator {
    settings: OrchestratorSettings,
    store: Arc<ConversationStore>,
    gateway: CompletionGateway,
    platform: Arc<dyn ChatPlatform>,
    voice: Option<VoiceStack>,
    sessions: Mutex<HashMap<u64, Arc<VoiceSession>>>,
    next_session: AtomicU64,
    bot_id: AtomicU64,
    ready: AtomicBool,
}

impl SessionOrchestrator {
    #[must_use]
    pub fn new(
        settings: OrchestratorSettings,
        gateway: CompletionGateway,
        platform: Arc<dyn ChatPlatform>,
        voice: Option<VoiceStack>,
    ) -> Self {
        Self {
            settings,
            store: Arc::clone(gateway.store()),
            gateway,
            platform,
            voice,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            bot_id: AtomicU64::new(0),
            ready: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Whether the platform reported ready
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Number of live voice sessions
    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Live session for a guild
    pub async fn session(&self, guild_id: u64) -> Option<Arc<VoiceSession>> {
        self.sessions.lock().await.get(&guild_id).cloned()
    }

    /// Drive the orchestrator until `shutdown` resolves or the platform goes away
    pub async fn run<F>(
        self: Arc<Self>,
        mut events: mpsc::Receiver<PlatformEvent>,
        mut wakes: mpsc::UnboundedReceiver<WakeEvent>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        tracing::warn!(
            "completion calls have no caller-side timeout; a hung upstream stalls that turn until the transport gives up"
        );

        tokio::pin!(shutdown);
        let mut wakes_open = true;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("platform event stream closed");
                        break;
                    };
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.handle_event(event).await });
                }
                wake = wakes.recv(), if wakes_open => {
                    let Some(wake) = wake else {
                        wakes_open = false;
                        continue;
                    };
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        let guild_id = wake.guild_id;
                        if let Err(e) = this.handle_wake(wake).await {
                            tracing::error!(guild_id, error = %e, "voice reply failed");
                        }
                    });
                }
            }
        }

        self.shutdown().await;
    }

    /// Leave every voice session
    pub async fn shutdown(&self) {
        let guilds: Vec<u64> = self.sessions.lock().await.keys().copied().collect();
        for guild_id in guilds {
            self.leave_voice(guild_id).await;
        }
    }

    /// Handle one platform event
    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Ready { user_id, user_name } => {
                self.bot_id.store(user_id, Ordering::SeqCst);
                self.ready.store(true, Ordering::SeqCst);
                tracing::info!(user_id, user = %user_name, "platform ready");
            }
            PlatformEvent::Message(message) => self.handle_message(message).await,
            PlatformEvent::VoiceDisconnected { guild_id } => {
                self.handle_voice_disconnected(guild_id).await;
            }
        }
    }

    /// Route an inbound chat message
    pub async fn handle_message(&self, msg: IncomingMessage) {
        if msg.author_id == self.bot_id.load(Ordering::SeqCst) {
            return;
        }

        if msg.author_is_bot {
            if self.is_welcome(&msg) {
                self.handle_welcome(&msg).await;
            }
            return;
        }

        if let Some(command) = BotCommand::parse(&self.settings.command_prefix, &msg.content) {
            self.handle_command(&msg, command).await;
            return;
        }

        let key = ConversationKey::text(msg.channel_id, msg.guild_id);
        let message = Message::user(Speaker::Mention(msg.author_id), msg.content.clone());

        if msg.mentions_bot || msg.is_dm {
            self.respond(&key, &msg, message).await;
        } else {
            self.store.append(&key, message);
        }
    }

    async fn handle_command(&self, msg: &IncomingMessage, command: BotCommand) {
        tracing::info!(
            command = ?command,
            author_id = msg.author_id,
            channel_id = msg.channel_id,
            "command received"
        );

        match command {
            BotCommand::Ask(question) => {
                if question.is_empty() {
                    self.deliver(msg.channel_id, REPLY_ASK_USAGE).await;
                    return;
                }
                let key = ConversationKey::text(msg.channel_id, msg.guild_id);
                let message = Message::user(Speaker::Mention(msg.author_id), question);
                self.respond(&key, msg, message).await;
            }
            BotCommand::Clear => {
                self.store
                    .reset(&ConversationKey::text(msg.channel_id, msg.guild_id));
                if let Some(guild_id) = msg.guild_id {
                    self.store.reset(&ConversationKey::voice(guild_id));
                }
                self.deliver(msg.channel_id, REPLY_CLEARED).await;
            }
            BotCommand::Join => self.handle_join(msg).await,
            BotCommand::Leave => {
                if let Some(guild_id) = msg.guild_id {
                    self.leave_voice(guild_id).await;
                }
                self.deliver(msg.channel_id, REPLY_LEFT).await;
            }
            BotCommand::Ping => {
                let reply = match self.platform.latency().await {
                    Ok(latency) => format!("Pong! Latency: {}ms", latency.as_millis()),
                    Err(e) => error_reply(msg.author_id, &e),
                };
                self.deliver(msg.channel_id, &reply).await;
            }
            BotCommand::Rename(name) => self.handle_rename(msg, &name).await,
            BotCommand::Unknown(_) => {}
        }
    }

    async fn handle_join(&self, msg: &IncomingMessage) {
        let (Some(guild_id), Some(channel_id)) = (msg.guild_id, msg.author_voice_channel) else {
            self.deliver(msg.channel_id, REPLY_NOT_IN_VOICE).await;
            return;
        };

        if self.voice.is_none() {
            self.deliver(msg.channel_id, REPLY_VOICE_DISABLED).await;
            return;
        }

        match self.join_voice(guild_id, channel_id).await {
            Ok(_) => self.deliver(msg.channel_id, REPLY_JOINED).await,
            Err(e) => {
                tracing::warn!(guild_id, channel_id, error = %e, "voice join failed");
                self.deliver(msg.channel_id, REPLY_JOIN_FAILED).await;
            }
        }
    }

    async fn handle_rename(&self, msg: &IncomingMessage, name: &str) {
        let Some(guild_id) = msg.guild_id else {
            self.deliver(msg.channel_id, REPLY_RENAME_GUILD_ONLY).await;
            return;
        };
        if self.settings.owner_id != Some(msg.author_id) {
            self.deliver(msg.channel_id, REPLY_RENAME_OWNER_ONLY).await;
            return;
        }
        if name.is_empty() {
            self.deliver(msg.channel_id, REPLY_RENAME_USAGE).await;
            return;
        }

        let reply = match self.platform.set_nickname(guild_id, name).await {
            Ok(()) => format!("Successfully changed my nickname to \"{name}\""),
            Err(e) => {
                tracing::warn!(guild_id, error = %e, "nickname change failed");
                REPLY_RENAME_FAILED.to_string()
            }
        };
        self.deliver(msg.channel_id, &reply).await;
    }

    fn is_welcome(&self, msg: &IncomingMessage) -> bool {
        if self.settings.welcome_bot_id != Some(msg.author_id) {
            return false;
        }
        let content = msg.content.to_lowercase();
        self.settings
            .welcome_keywords
            .iter()
            .any(|k| content.contains(k.as_str()))
    }

    /// Reply to a welcome announcement
    ///
    /// Fire-and-forget: the author is a bot, so a failed completion is logged
    /// and nothing is sent.
    async fn handle_welcome(&self, msg: &IncomingMessage) {
        let key = ConversationKey::text(msg.channel_id, msg.guild_id);
        let message = Message::user(
            Speaker::Mention(msg.author_id),
            format!("I just welcomed a new user with this message: {}", msg.content),
        );

        if let Err(e) = self.platform.send_typing(msg.channel_id).await {
            tracing::debug!(error = %e, "typing indicator failed");
        }

        match self.converse(&key, message).await {
            Ok(reply) => {
                tokio::time::sleep(self.settings.welcome_delay).await;
                self.deliver(msg.channel_id, &reply).await;
            }
            Err(e) => {
                tracing::warn!(channel_id = msg.channel_id, error = %e, "welcome reply failed");
            }
        }
    }

    /// Generate and send a text reply, or an apology carrying the error
    async fn respond(&self, key: &ConversationKey, msg: &IncomingMessage, message: Message) {
        if let Err(e) = self.platform.send_typing(msg.channel_id).await {
            tracing::debug!(error = %e, "typing indicator failed");
        }

        let reply = match self.converse(key, message).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(channel_id = msg.channel_id, error = %e, "completion failed");
                error_reply(msg.author_id, &e)
            }
        };
        self.deliver(msg.channel_id, &reply).await;
    }

    /// Window, persist the user turn, complete, persist the reply
    ///
    /// The user turn is stored before the call is awaited; the reply only on
    /// success.
    async fn converse(&self, key: &ConversationKey, message: Message) -> Result<String> {
        let window = self.gateway.window(key, &message);
        self.store.append(key, message);

        let reply = self.gateway.complete(&window).await?;
        self.store.append(key, Message::assistant(reply.clone()));
        Ok(reply)
    }

    /// Send text in platform-sized chunks, in order
    async fn deliver(&self, channel_id: u64, text: &str) {
        for chunk in chunk_text(text, MESSAGE_LIMIT) {
            if let Err(e) = self.platform.send_text(channel_id, &chunk).await {
                tracing::warn!(channel_id, error = %e, "failed to send message");
                return;
            }
        }
    }

    /// Join a voice channel and start listening
    ///
    /// Reuses the guild's session when already in that channel; moving to
    /// another channel replaces it. The registry is not held while the
    /// platform join is in flight. When two joins for one guild race, the
    /// one that completes last owns the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connect` if voice is disabled or the join fails
    pub async fn join_voice(&self, guild_id: u64, channel_id: u64) -> Result<Arc<VoiceSession>> {
        let voice = self
            .voice
            .as_ref()
            .ok_or_else(|| Error::Connect("voice support is disabled".to_string()))?;

        let previous = {
            let mut sessions = self.sessions.lock().await;
            let current = sessions
                .get(&guild_id)
                .filter(|s| s.channel_id() == channel_id)
                .cloned();
            if let Some(current) = current {
                drop(sessions);
                Self::listen(voice, &current).await;
                return Ok(current);
            }
            sessions.remove(&guild_id)
        };
        if let Some(previous) = previous {
            voice.capture.stop_listening(&previous);
            previous.close();
        }

        let speakers = Arc::new(SpeakerTracker::new());
        let sink = voice
            .gateway
            .join(guild_id, channel_id, Arc::clone(&speakers))
            .await?;

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(VoiceSession::new(id, guild_id, channel_id, sink, speakers));
        let superseded = self
            .sessions
            .lock()
            .await
            .insert(guild_id, Arc::clone(&session));
        if let Some(superseded) = superseded {
            tracing::debug!(guild_id, session = superseded.id(), "concurrent join superseded");
            voice.capture.stop_listening(&superseded);
            superseded.close();
        }
        tracing::info!(guild_id, channel_id, session = id, "voice session created");

        Self::listen(voice, &session).await;
        Ok(session)
    }

    async fn listen(voice: &VoiceStack, session: &Arc<VoiceSession>) {
        if session.is_closed() {
            return;
        }
        if let Err(e) = voice.capture.start_listening(session).await {
            tracing::error!(guild_id = session.guild_id(), error = %e, "could not start listening");
        }
    }

    /// Tear down a guild's voice session
    ///
    /// Returns whether a session existed. Safe to call repeatedly.
    pub async fn leave_voice(&self, guild_id: u64) -> bool {
        let Some(session) = self.sessions.lock().await.remove(&guild_id) else {
            return false;
        };

        if let Some(voice) = &self.voice {
            voice.capture.stop_listening(&session);
            session.close();
            if let Err(e) = voice.gateway.leave(guild_id).await {
                tracing::warn!(guild_id, error = %e, "voice leave failed");
            }
        } else {
            session.close();
        }

        tracing::info!(guild_id, session = session.id(), "voice session destroyed");
        true
    }

    async fn handle_voice_disconnected(&self, guild_id: u64) {
        let Some(session) = self.session(guild_id).await else {
            return;
        };
        // Our own leave also produces this event; only react to real drops
        if session.sink().is_connected().await {
            return;
        }

        if self.live_session(guild_id, session.id()).await.is_some() {
            tracing::warn!(guild_id, "voice connection lost, closing session");
            self.leave_voice(guild_id).await;
        }
    }

    /// Session for a guild if it is still the one that produced an event
    async fn live_session(&self, guild_id: u64, session_id: u64) -> Option<Arc<VoiceSession>> {
        self.session(guild_id)
            .await
            .filter(|s| s.id() == session_id && !s.is_closed())
    }

    /// Answer a wake phrase out loud
    ///
    /// Results for a session that closed in the meantime are discarded.
    ///
    /// # Errors
    ///
    /// Returns error if completion or playback fails
    pub async fn handle_wake(&self, event: WakeEvent) -> Result<()> {
        let Some(voice) = &self.voice else {
            return Ok(());
        };
        let guild_id = event.guild_id;

        let Some(session) = self.live_session(guild_id, event.session_id).await else {
            tracing::debug!(guild_id, session = event.session_id, "stale wake event dropped");
            return Ok(());
        };

        let name = match event.speaker {
            Some(user_id) => self
                .platform
                .display_name(guild_id, user_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!(user_id, error = %e, "speaker name lookup failed");
                    UNKNOWN_SPEAKER.to_string()
                }),
            None => UNKNOWN_SPEAKER.to_string(),
        };

        let key = ConversationKey::voice(guild_id);
        let message = Message::user(Speaker::Name(name), event.text);
        let window = self.gateway.window(&key, &message);
        self.store.append(&key, message);

        let reply = self.gateway.complete(&window).await?;

        if self.live_session(guild_id, session.id()).await.is_none() {
            tracing::debug!(guild_id, "session closed during completion, reply discarded");
            return Ok(());
        }

        self.store.append(&key, Message::assistant(reply.clone()));
        let outcome = voice.playback.speak(&session, &reply).await?;
        tracing::debug!(guild_id, ?outcome, "voice reply delivered");
        Ok(())
    }
}

fn error_reply(author_id: u64, error: &Error) -> String {
    format!("Sorry <@{author_id}>, I encountered an error: {error}")
}
