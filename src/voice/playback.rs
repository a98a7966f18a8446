//! Speech playback into a voice session
//!
//! The speaking flag raised here is what the capture loop reads to drop
//! the bot's own audio, so it is released on every exit path.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::session::VoiceSession;
use super::tts::SpeechSynthesizer;
use crate::{Error, Result};

/// Hard cap on a single playback
pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between playback status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Audio output of a voice connection
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Whether the underlying connection is still up
    async fn is_connected(&self) -> bool;

    /// Start playing an audio file
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if playback cannot start
    async fn play(&self, path: &Path) -> Result<Box<dyn PlaybackHandle>>;
}

/// A track that is playing
#[async_trait]
pub trait PlaybackHandle: Send + Sync {
    async fn is_playing(&self) -> bool;

    async fn stop(&self);
}

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    /// Hit the timeout and was force-stopped
    TimedOut,
}

/// Synthesizes and plays speech
pub struct VoicePlaybackEngine {
    synth: Arc<dyn SpeechSynthesizer>,
    timeout: Duration,
    poll_interval: Duration,
}

impl VoicePlaybackEngine {
    #[must_use]
    pub fn new(synth: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synth,
            timeout: DEFAULT_PLAYBACK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Speak `text` in a session and wait for playback to end
    ///
    /// Calls on the same session are serialized.
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if synthesis fails or the session is gone
    pub async fn speak(&self, session: &VoiceSession, text: &str) -> Result<PlaybackOutcome> {
        let _speaking = session.begin_speaking().await;
        let guild_id = session.guild_id();

        if session.is_closed() {
            return Err(Error::Playback("voice session closed".to_string()));
        }

        let audio = self.synth.synthesize(text).await.map_err(into_playback)?;

        let artifact = tempfile::Builder::new()
            .prefix("banter-tts-")
            .suffix(&format!(".{}", self.synth.extension()))
            .tempfile()
            .map_err(into_playback)?;
        tokio::fs::write(artifact.path(), &audio)
            .await
            .map_err(into_playback)?;

        if !session.sink().is_connected().await {
            return Err(Error::Playback("voice session disconnected".to_string()));
        }

        tracing::debug!(guild_id, bytes = audio.len(), "playing speech");
        let handle = session
            .sink()
            .play(artifact.path())
            .await
            .map_err(into_playback)?;

        let started = Instant::now();
        let outcome = loop {
            if !handle.is_playing().await {
                break PlaybackOutcome::Finished;
            }
            if started.elapsed() >= self.timeout {
                handle.stop().await;
                tracing::warn!(guild_id, timeout = ?self.timeout, "playback timed out, stopped");
                break PlaybackOutcome::TimedOut;
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        drop(artifact);
        tracing::debug!(guild_id, ?outcome, "playback ended");
        Ok(outcome)
    }
}

fn into_playback(e: impl Into<Error>) -> Error {
    match e.into() {
        e @ Error::Playback(_) => e,
        other => Error::Playback(other.to_string()),
    }
}
