//! Per-session capture loop
//!
//! Each listening session owns a dedicated OS thread that reads frames from
//! the audio input, feeds the recognizer and checks finalized text for the
//! wake phrase. The thread never calls into orchestration code: wake events
//! are pushed onto a channel drained by the async side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc::UnboundedSender, oneshot};

use super::input::{AudioInput, Frame};
use super::recognizer::{Recognizer, RecognizerFactory};
use super::session::{SpeakerTracker, SpeakingState, VoiceSession};
use super::wake::{WakeEvent, WakePhrase};
use crate::{Error, Result};

/// Frames buffered between the audio callback and the capture thread
const FRAME_QUEUE: usize = 32;

/// How often the capture thread checks for a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Running capture thread; stops it when dropped
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Whether the thread is still alive and not asked to stop
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the thread to stop
    ///
    /// The thread is detached, not joined; it exits within one poll interval.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.take();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame was recorded while the bot spoke; it never reached the recognizer
    Suppressed,
    /// Recognizer consumed the frame, no utterance yet
    Pending,
    /// Utterance finished without the wake phrase
    Utterance(String),
    /// Wake phrase heard and event queued
    Woke(WakeEvent),
}

/// Recognition state for one session, driven by the capture thread
pub struct CaptureWorker {
    guild_id: u64,
    session_id: u64,
    recognizer: Box<dyn Recognizer>,
    wake: WakePhrase,
    speaking: Arc<SpeakingState>,
    speakers: Arc<SpeakerTracker>,
    events: UnboundedSender<WakeEvent>,
    suppressed: bool,
}

impl CaptureWorker {
    #[must_use]
    pub fn new(
        session: &VoiceSession,
        recognizer: Box<dyn Recognizer>,
        wake: WakePhrase,
        events: UnboundedSender<WakeEvent>,
    ) -> Self {
        Self {
            guild_id: session.guild_id(),
            session_id: session.id(),
            recognizer,
            wake,
            speaking: session.speaking_state(),
            speakers: Arc::clone(session.speakers()),
            events,
            suppressed: false,
        }
    }

    /// Process one frame
    ///
    /// Suppression is decided by when the frame was recorded, not when it
    /// is processed.
    pub fn handle_frame(&mut self, frame: &Frame) -> FrameOutcome {
        if self.speaking.overlaps(frame.started_at(), frame.captured_at) {
            if !self.suppressed {
                // Partial speech before the bot started talking is stale now
                self.recognizer.reset();
                self.suppressed = true;
                tracing::trace!(guild_id = self.guild_id, "capture suppressed");
            }
            return FrameOutcome::Suppressed;
        }
        self.suppressed = false;

        let text = match self.recognizer.accept_waveform(&frame.samples) {
            Ok(Some(text)) => text.to_lowercase(),
            Ok(None) => return FrameOutcome::Pending,
            Err(e) => {
                tracing::warn!(guild_id = self.guild_id, error = %e, "recognition failed");
                return FrameOutcome::Pending;
            }
        };

        tracing::debug!(guild_id = self.guild_id, transcript = %text, "utterance recognized");

        let Some(word) = self.wake.matches(&text) else {
            return FrameOutcome::Utterance(text);
        };

        let event = WakeEvent {
            guild_id: self.guild_id,
            session_id: self.session_id,
            text: text.clone(),
            speaker: self.speakers.current(),
        };
        tracing::info!(
            guild_id = self.guild_id,
            wake_word = word,
            speaker = ?event.speaker,
            "wake phrase detected"
        );

        if self.events.send(event.clone()).is_err() {
            tracing::warn!(guild_id = self.guild_id, "wake event dropped, no consumer");
        }

        FrameOutcome::Woke(event)
    }

    /// Drain frames until stopped or the input goes away
    pub fn run(mut self, frames: &Receiver<Frame>, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => {
                    self.handle_frame(&frame);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(guild_id = self.guild_id, "audio input closed");
                    break;
                }
            }
        }
    }
}

/// Starts and stops capture threads for voice sessions
pub struct VoiceCaptureEngine {
    input: Arc<dyn AudioInput>,
    recognizers: Arc<dyn RecognizerFactory>,
    wake: WakePhrase,
    events: UnboundedSender<WakeEvent>,
}

impl VoiceCaptureEngine {
    /// Wake events for every session are delivered to `events`
    #[must_use]
    pub fn new(
        input: Arc<dyn AudioInput>,
        recognizers: Arc<dyn RecognizerFactory>,
        wake: WakePhrase,
        events: UnboundedSender<WakeEvent>,
    ) -> Self {
        Self {
            input,
            recognizers,
            wake,
            events,
        }
    }

    #[must_use]
    pub const fn wake(&self) -> &WakePhrase {
        &self.wake
    }

    /// Begin capture for a session; no-op if already listening
    ///
    /// # Errors
    ///
    /// Returns error if the session is closed, the recognizer cannot be
    /// created or the audio input cannot be opened
    pub async fn start_listening(&self, session: &Arc<VoiceSession>) -> Result<()> {
        if session.is_closed() {
            return Err(Error::Connect("voice session is closed".to_string()));
        }
        if session.is_listening() {
            tracing::debug!(guild_id = session.guild_id(), "already listening");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let input = Arc::clone(&self.input);
        let factory = Arc::clone(&self.recognizers);
        let wake = self.wake.clone();
        let events = self.events.clone();
        let worker_session = Arc::clone(session);
        let worker_stop = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name(format!("capture-{}", session.guild_id()))
            .spawn(move || {
                let recognizer = match factory.create() {
                    Ok(r) => r,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let worker = CaptureWorker::new(&worker_session, recognizer, wake, events);
                let guild_id = worker_session.guild_id();
                drop(worker_session);

                let (frames_tx, frames_rx) = mpsc::sync_channel(FRAME_QUEUE);
                let _input = match input.open(frames_tx) {
                    Ok(guard) => guard,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                worker.run(&frames_rx, &worker_stop);
                tracing::debug!(guild_id, "capture thread exited");
            })?;

        let mut handle = CaptureHandle {
            stop,
            thread: Some(thread),
        };

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                handle.stop();
                return Err(e);
            }
            Err(_) => {
                handle.stop();
                return Err(Error::Audio("capture thread exited during startup".to_string()));
            }
        }

        if let Some(mut rejected) = session.attach_capture(handle) {
            rejected.stop();
            return Ok(());
        }
        if session.is_closed() {
            session.detach_capture();
            return Ok(());
        }

        tracing::info!(guild_id = session.guild_id(), session = session.id(), "listening");
        Ok(())
    }

    /// Stop capture for a session
    ///
    /// Idempotent. Returns whether a capture was running.
    pub fn stop_listening(&self, session: &VoiceSession) -> bool {
        let stopped = session.detach_capture();
        if stopped {
            tracing::info!(guild_id = session.guild_id(), "stopped listening");
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::SyncSender;

    use async_trait::async_trait;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::voice::input::InputGuard;
    use crate::voice::playback::{PlaybackHandle, VoiceSink};

    struct NullSink;

    #[async_trait]
    impl VoiceSink for NullSink {
        async fn is_connected(&self) -> bool {
            true
        }

        async fn play(&self, _path: &Path) -> Result<Box<dyn PlaybackHandle>> {
            Err(Error::Playback("not used".to_string()))
        }
    }

    /// Returns `reply` on every frame and counts calls
    struct Scripted {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl Recognizer for Scripted {
        fn accept_waveform(&mut self, _samples: &[i16]) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply.as_deref() {
                Some("!fail") => Err(Error::Recognition("service down".to_string())),
                other => Ok(other.map(str::to_string)),
            }
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedFactory;

    impl RecognizerFactory for ScriptedFactory {
        fn create(&self) -> Result<Box<dyn Recognizer>> {
            Ok(Box::new(Scripted {
                reply: None,
                calls: Arc::new(AtomicUsize::new(0)),
                resets: Arc::new(AtomicUsize::new(0)),
            }))
        }
    }

    /// Keeps the frame sender alive without producing audio
    struct SilentInput;

    impl AudioInput for SilentInput {
        fn open(&self, frames: SyncSender<Frame>) -> Result<InputGuard> {
            Ok(InputGuard::new(frames))
        }
    }

    struct BrokenInput;

    impl AudioInput for BrokenInput {
        fn open(&self, _frames: SyncSender<Frame>) -> Result<InputGuard> {
            Err(Error::Audio("no microphone".to_string()))
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 160])
    }

    fn session() -> Arc<VoiceSession> {
        Arc::new(VoiceSession::new(
            7,
            1,
            2,
            Arc::new(NullSink),
            Arc::new(SpeakerTracker::new()),
        ))
    }

    fn worker(
        session: &VoiceSession,
        reply: Option<&str>,
    ) -> (
        CaptureWorker,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
        tokio::sync::mpsc::UnboundedReceiver<WakeEvent>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));
        let recognizer = Scripted {
            reply: reply.map(str::to_string),
            calls: Arc::clone(&calls),
            resets: Arc::clone(&resets),
        };
        let (tx, rx) = unbounded_channel();
        let worker = CaptureWorker::new(session, Box::new(recognizer), WakePhrase::default(), tx);
        (worker, calls, resets, rx)
    }

    #[tokio::test]
    async fn test_frames_dropped_while_speaking() {
        let session = session();
        let (mut worker, calls, resets, mut rx) = worker(&session, Some("hey bot how are you"));

        let guard = session.begin_speaking().await;
        assert_eq!(worker.handle_frame(&frame()), FrameOutcome::Suppressed);
        assert_eq!(worker.handle_frame(&frame()), FrameOutcome::Suppressed);
        drop(guard);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frame_recorded_during_speech_dropped_after_it_ends() {
        let session = session();
        let (worker, calls, _, mut rx) = worker(&session, Some("hey bot"));
        let (frames_tx, frames_rx) = mpsc::sync_channel(FRAME_QUEUE);

        let guard = session.begin_speaking().await;
        frames_tx.send(frame()).unwrap();
        drop(guard);
        assert!(!session.is_speaking());

        // Half a second of audio that runs past the end of playback
        frames_tx.send(Frame::new(vec![0; 8000])).unwrap();
        drop(frames_tx);

        worker.run(&frames_rx, &AtomicBool::new(false));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_frames_after_speech_are_recognized() {
        let session = session();
        let (mut worker, calls, _, mut rx) = worker(&session, Some("hey bot"));

        drop(session.begin_speaking().await);
        std::thread::sleep(Duration::from_millis(30));

        assert!(matches!(worker.handle_frame(&frame()), FrameOutcome::Woke(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_wake_phrase_queues_event() {
        let session = session();
        session.speakers().speaking_started(42);
        let (mut worker, calls, _, mut rx) = worker(&session, Some("Hey BOT how are you"));

        let outcome = worker.handle_frame(&frame());
        let FrameOutcome::Woke(event) = outcome else {
            panic!("expected wake, got {outcome:?}");
        };
        assert_eq!(event.text, "hey bot how are you");
        assert_eq!(event.speaker, Some(42));
        assert_eq!(event.session_id, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_utterance_without_wake_word() {
        let session = session();
        let (mut worker, _, _, mut rx) = worker(&session, Some("nice weather today"));

        assert_eq!(
            worker.handle_frame(&frame()),
            FrameOutcome::Utterance("nice weather today".to_string())
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_recognition_error_keeps_going() {
        let session = session();
        let (mut worker, calls, _, _rx) = worker(&session, Some("!fail"));

        assert_eq!(worker.handle_frame(&frame()), FrameOutcome::Pending);
        assert_eq!(worker.handle_frame(&frame()), FrameOutcome::Pending);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn engine(input: Arc<dyn AudioInput>) -> VoiceCaptureEngine {
        let (tx, _rx) = unbounded_channel();
        VoiceCaptureEngine::new(input, Arc::new(ScriptedFactory), WakePhrase::default(), tx)
    }

    #[tokio::test]
    async fn test_start_and_stop_listening() {
        let engine = engine(Arc::new(SilentInput));
        let session = session();

        engine.start_listening(&session).await.unwrap();
        assert!(session.is_listening());

        // Second start is a no-op
        engine.start_listening(&session).await.unwrap();
        assert!(session.is_listening());

        assert!(engine.stop_listening(&session));
        assert!(!engine.stop_listening(&session));
        assert!(!session.is_listening());
    }

    #[tokio::test]
    async fn test_input_failure_reported() {
        let engine = engine(Arc::new(BrokenInput));
        let session = session();

        let result = engine.start_listening(&session).await;
        assert!(matches!(result, Err(Error::Audio(_))));
        assert!(!session.is_listening());
    }

    #[tokio::test]
    async fn test_closed_session_rejected() {
        let engine = engine(Arc::new(SilentInput));
        let session = session();
        session.close();

        let result = engine.start_listening(&session).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
