//! Per-guild voice session state

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use super::capture::CaptureHandle;
use super::playback::VoiceSink;

/// Best-effort pointer to whoever is talking
///
/// The most recent user to start speaking wins. The pointer is kept after
/// that user falls silent, since utterances only finalize after silence.
#[derive(Debug, Default)]
pub struct SpeakerTracker {
    current: Mutex<Option<u64>>,
    active: Mutex<HashSet<u64>>,
}

impl SpeakerTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A user started speaking
    pub fn speaking_started(&self, user_id: u64) {
        if self.active.lock().insert(user_id) {
            *self.current.lock() = Some(user_id);
            tracing::trace!(user_id, "speaker changed");
        }
    }

    /// A user stopped speaking
    pub fn speaking_stopped(&self, user_id: u64) {
        self.active.lock().remove(&user_id);
    }

    /// Latest known speaker, if any
    #[must_use]
    pub fn current(&self) -> Option<u64> {
        *self.current.lock()
    }

    /// Whether a user is flagged as speaking right now
    #[must_use]
    pub fn is_active(&self, user_id: u64) -> bool {
        self.active.lock().contains(&user_id)
    }

    /// Forget everything
    pub fn clear(&self) {
        self.active.lock().clear();
        *self.current.lock() = None;
    }
}

/// When the bot last spoke, shared with the capture thread
///
/// Capture compares frame timestamps against this so audio recorded during
/// playback is dropped even when it is processed afterwards.
#[derive(Debug, Default)]
pub struct SpeakingState {
    active: AtomicBool,
    span: Mutex<SpeechSpan>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SpeechSpan {
    started: Option<Instant>,
    ended: Option<Instant>,
}

impl SpeakingState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether audio recorded between `from` and `to` may hold bot speech
    #[must_use]
    pub fn overlaps(&self, from: Instant, to: Instant) -> bool {
        if self.is_active() {
            return true;
        }
        let span = *self.span.lock();
        match (span.started, span.ended) {
            (Some(started), Some(ended)) => from <= ended && to >= started,
            _ => false,
        }
    }

    fn start(&self) {
        self.span.lock().started = Some(Instant::now());
        self.active.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.span.lock().ended = Some(Instant::now());
        self.active.store(false, Ordering::SeqCst);
    }
}

/// One live voice connection in a guild
///
/// Created and destroyed only by the orchestrator. The capture and playback
/// engines borrow it for the duration of a call.
pub struct VoiceSession {
    id: u64,
    guild_id: u64,
    channel_id: u64,
    sink: Arc<dyn VoiceSink>,
    speakers: Arc<SpeakerTracker>,
    speaking: Arc<SpeakingState>,
    closed: AtomicBool,
    capture: Mutex<Option<CaptureHandle>>,
    speak_lock: tokio::sync::Mutex<()>,
}

impl VoiceSession {
    /// Create a session
    ///
    /// `id` must be unique for the life of the process so results produced
    /// for an old session can be told apart from a newer one in the same guild.
    #[must_use]
    pub fn new(
        id: u64,
        guild_id: u64,
        channel_id: u64,
        sink: Arc<dyn VoiceSink>,
        speakers: Arc<SpeakerTracker>,
    ) -> Self {
        Self {
            id,
            guild_id,
            channel_id,
            sink,
            speakers,
            speaking: Arc::new(SpeakingState::default()),
            closed: AtomicBool::new(false),
            capture: Mutex::new(None),
            speak_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn guild_id(&self) -> u64 {
        self.guild_id
    }

    #[must_use]
    pub const fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Output sink for synthesized audio
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn VoiceSink> {
        &self.sink
    }

    #[must_use]
    pub fn speakers(&self) -> &Arc<SpeakerTracker> {
        &self.speakers
    }

    /// Whether the bot is currently playing its own speech
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.is_active()
    }

    /// Speech timeline, read by the capture thread
    pub(crate) fn speaking_state(&self) -> Arc<SpeakingState> {
        Arc::clone(&self.speaking)
    }

    /// Whether a capture stream is attached
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.capture.lock().as_ref().is_some_and(CaptureHandle::is_running)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the session closed and stop capture
    ///
    /// Safe to call repeatedly.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(guild_id = self.guild_id, session = self.id, "voice session closed");
        }
        self.detach_capture();
        self.speakers.clear();
    }

    /// Attach a capture handle unless one is already running
    ///
    /// Returns the rejected handle when capture is already attached.
    pub(crate) fn attach_capture(&self, handle: CaptureHandle) -> Option<CaptureHandle> {
        let mut slot = self.capture.lock();
        if slot.as_ref().is_some_and(CaptureHandle::is_running) {
            return Some(handle);
        }
        *slot = Some(handle);
        None
    }

    /// Detach and stop the capture handle, if any
    pub(crate) fn detach_capture(&self) -> bool {
        let handle = self.capture.lock().take();
        handle.is_some_and(|mut h| {
            h.stop();
            true
        })
    }

    /// Serialize speech and raise the speaking flag until the guard drops
    pub(crate) async fn begin_speaking(&self) -> SpeakingGuard<'_> {
        let turn = self.speak_lock.lock().await;
        self.speaking.start();
        SpeakingGuard {
            state: &self.speaking,
            _turn: turn,
        }
    }
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("id", &self.id)
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("speaking", &self.is_speaking())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Holds the speaking flag up; lowers it on drop
pub(crate) struct SpeakingGuard<'a> {
    state: &'a SpeakingState,
    _turn: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.state.finish();
    }
}
