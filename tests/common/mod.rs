//! Shared test utilities
//!
//! In-memory stand-ins for the completion service, the chat platform and the
//! voice plumbing so orchestration can be driven without network or audio.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use banter::channels::{ChatPlatform, IncomingMessage, PlatformEvent, VoiceGateway};
use banter::completion::{CompletionBackend, CompletionRequest, SamplingParams};
use banter::conversation::SystemPrompts;
use banter::orchestrator::{OrchestratorSettings, VoiceStack};
use banter::voice::{
    AudioInput, Frame, InputGuard, PlaybackHandle, Recognizer, RecognizerFactory,
    SpeakerTracker, SpeechSynthesizer, VoiceCaptureEngine, VoicePlaybackEngine, VoiceSink,
    WakeEvent, WakePhrase,
};
use banter::{CompletionGateway, ConversationStore, Error, Result, SessionOrchestrator};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

pub const BOT_ID: u64 = 1000;
pub const OWNER_ID: u64 = 7;
pub const USER_ID: u64 = 42;
pub const GUILD_ID: u64 = 500;
pub const CHANNEL_ID: u64 = 600;
pub const VOICE_CHANNEL_ID: u64 = 700;
pub const WELCOME_BOT_ID: u64 = 900;

/// Completion backend answering from a script
///
/// Replies are consumed in order; once the script runs out every call
/// answers `"ok"`.
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Gate>,
}

/// Holds a call open until released
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying<I: IntoIterator<Item = &'static str>>(replies: I) -> Self {
        let backend = Self::new();
        for reply in replies {
            backend.push_reply(Ok(reply.to_string()));
        }
        backend
    }

    /// Calls block after recording the request until `release` is notified
    pub fn gated() -> (Self, Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let backend = Self {
            gate: Some(Gate {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            }),
            ..Self::default()
        };
        (backend, entered, release)
    }

    pub fn push_reply(&self, reply: Result<String>) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Chat platform that records everything sent to it
#[derive(Default)]
pub struct FakePlatform {
    pub sent: Mutex<Vec<(u64, String)>>,
    pub typing: Mutex<Vec<u64>>,
    pub nicknames: Mutex<Vec<(u64, String)>>,
    pub fail_nickname: AtomicBool,
    pub names: Mutex<HashMap<u64, String>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_sent(&self) -> Option<String> {
        self.sent.lock().last().map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        self.sent.lock().push((channel_id, text.to_string()));
        Ok(())
    }

    async fn send_typing(&self, channel_id: u64) -> Result<()> {
        self.typing.lock().push(channel_id);
        Ok(())
    }

    async fn set_nickname(&self, guild_id: u64, nickname: &str) -> Result<()> {
        if self.fail_nickname.load(Ordering::SeqCst) {
            return Err(Error::Channel("missing permissions".to_string()));
        }
        self.nicknames.lock().push((guild_id, nickname.to_string()));
        Ok(())
    }

    async fn latency(&self) -> Result<Duration> {
        Ok(Duration::from_millis(42))
    }

    async fn display_name(&self, _guild_id: u64, user_id: u64) -> Result<String> {
        self.names
            .lock()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| Error::Channel(format!("unknown member {user_id}")))
    }
}

/// Voice sink whose tracks play for a fixed time, or forever
pub struct FakeSink {
    pub connected: AtomicBool,
    play_for: Option<Duration>,
    pub played: Mutex<Vec<PathBuf>>,
    /// Whether the artifact existed when playback started
    pub file_existed: AtomicBool,
    pub stops: Arc<AtomicUsize>,
}

impl FakeSink {
    pub fn new(play_for: Option<Duration>) -> Self {
        Self {
            connected: AtomicBool::new(true),
            play_for,
            played: Mutex::new(Vec::new()),
            file_existed: AtomicBool::new(false),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().clone()
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn play(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>> {
        self.file_existed.store(path.exists(), Ordering::SeqCst);
        self.played.lock().push(path.to_path_buf());
        Ok(Box::new(FakeHandle {
            until: self.play_for.map(|d| Instant::now() + d),
            stopped: AtomicBool::new(false),
            stops: Arc::clone(&self.stops),
        }))
    }
}

struct FakeHandle {
    until: Option<Instant>,
    stopped: AtomicBool,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl PlaybackHandle for FakeHandle {
    async fn is_playing(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.until.is_none_or(|u| Instant::now() < u)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Voice gateway handing out [`FakeSink`]s
#[derive(Default)]
pub struct FakeVoiceGateway {
    pub joins: Mutex<Vec<(u64, u64)>>,
    pub leaves: Mutex<Vec<u64>>,
    pub fail_join: AtomicBool,
    /// How long each join takes to complete
    pub join_delay: Mutex<Duration>,
    pub sinks: Mutex<Vec<Arc<FakeSink>>>,
    pub trackers: Mutex<Vec<Arc<SpeakerTracker>>>,
}

impl FakeVoiceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sink(&self) -> Option<Arc<FakeSink>> {
        self.sinks.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for FakeVoiceGateway {
    async fn join(
        &self,
        guild_id: u64,
        channel_id: u64,
        speakers: Arc<SpeakerTracker>,
    ) -> Result<Arc<dyn VoiceSink>> {
        let delay = *self.join_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(Error::Connect("missing permissions".to_string()));
        }
        self.joins.lock().push((guild_id, channel_id));
        self.trackers.lock().push(speakers);

        let sink = Arc::new(FakeSink::new(Some(Duration::from_millis(20))));
        self.sinks.lock().push(Arc::clone(&sink));
        Ok(sink)
    }

    async fn leave(&self, guild_id: u64) -> Result<()> {
        self.leaves.lock().push(guild_id);
        if let Some(sink) = self.sinks.lock().last() {
            sink.connected.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Synthesizer producing a few fake MP3 bytes, or failing
#[derive(Default)]
pub struct FakeSynth {
    pub fail: bool,
    pub spoken: Mutex<Vec<String>>,
}

impl FakeSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if self.fail {
            return Err(Error::Playback("synthesis unavailable".to_string()));
        }
        self.spoken.lock().push(text.to_string());
        Ok(b"ID3fake-audio".to_vec())
    }
}

/// Recognizer that never finishes an utterance
pub struct QuietRecognizer;

impl Recognizer for QuietRecognizer {
    fn accept_waveform(&mut self, _samples: &[i16]) -> Result<Option<String>> {
        Ok(None)
    }

    fn reset(&mut self) {}
}

pub struct QuietRecognizerFactory;

impl RecognizerFactory for QuietRecognizerFactory {
    fn create(&self) -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(QuietRecognizer))
    }
}

/// Audio input that stays open without producing frames
pub struct SilentInput;

impl AudioInput for SilentInput {
    fn open(&self, frames: SyncSender<Frame>) -> Result<InputGuard> {
        Ok(InputGuard::new(frames))
    }
}

/// Orchestrator wired to fakes
pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub backend: Arc<FakeBackend>,
    pub platform: Arc<FakePlatform>,
    pub voice: Arc<FakeVoiceGateway>,
    pub synth: Arc<FakeSynth>,
    pub wakes: mpsc::UnboundedReceiver<WakeEvent>,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::build(backend, true, 20)
    }

    pub fn text_only(backend: FakeBackend) -> Self {
        Self::build(backend, false, 20)
    }

    pub fn build(backend: FakeBackend, voice_enabled: bool, max_history: usize) -> Self {
        let backend = Arc::new(backend);
        let platform = Arc::new(FakePlatform::new());
        let voice = Arc::new(FakeVoiceGateway::new());
        let synth = Arc::new(FakeSynth::new());
        let (wake_tx, wakes) = mpsc::unbounded_channel();

        let store = Arc::new(ConversationStore::new(
            max_history,
            SystemPrompts::new("S").with_voice("V"),
        ));
        let gateway = CompletionGateway::new(
            store,
            Arc::clone(&backend) as Arc<dyn CompletionBackend>,
            SamplingParams::default(),
        );

        let stack = voice_enabled.then(|| VoiceStack {
            gateway: Arc::clone(&voice) as Arc<dyn VoiceGateway>,
            capture: VoiceCaptureEngine::new(
                Arc::new(SilentInput),
                Arc::new(QuietRecognizerFactory),
                WakePhrase::default(),
                wake_tx,
            ),
            playback: VoicePlaybackEngine::new(Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>)
                .with_poll_interval(Duration::from_millis(5)),
        });

        let settings = OrchestratorSettings {
            owner_id: Some(OWNER_ID),
            welcome_bot_id: Some(WELCOME_BOT_ID),
            welcome_delay: Duration::ZERO,
            ..OrchestratorSettings::default()
        };

        let orchestrator = Arc::new(SessionOrchestrator::new(
            settings,
            gateway,
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            stack,
        ));

        Self {
            orchestrator,
            backend,
            platform,
            voice,
            synth,
            wakes,
        }
    }

    /// Deliver the ready event so the bot knows its own id
    pub async fn ready(&self) {
        self.orchestrator
            .handle_event(PlatformEvent::Ready {
                user_id: BOT_ID,
                user_name: "banter".to_string(),
            })
            .await;
    }

    pub async fn send(&self, message: IncomingMessage) {
        self.orchestrator
            .handle_event(PlatformEvent::Message(message))
            .await;
    }
}

/// A guild message from [`USER_ID`] in [`CHANNEL_ID`]
pub fn guild_message(content: &str) -> IncomingMessage {
    IncomingMessage {
        id: 1,
        channel_id: CHANNEL_ID,
        guild_id: Some(GUILD_ID),
        author_id: USER_ID,
        author_name: "alice".to_string(),
        content: content.to_string(),
        ..IncomingMessage::default()
    }
}

/// A guild message that mentions the bot
pub fn mention(content: &str) -> IncomingMessage {
    IncomingMessage {
        mentions_bot: true,
        ..guild_message(content)
    }
}

/// A guild message from a user sitting in [`VOICE_CHANNEL_ID`]
pub fn from_voice_user(content: &str) -> IncomingMessage {
    IncomingMessage {
        author_voice_channel: Some(VOICE_CHANNEL_ID),
        ..guild_message(content)
    }
}
