//! Voice pipeline
//!
//! Capture runs on one OS thread per listening session and hands wake events
//! to the async side over a channel. Playback raises the session's speaking
//! flag so capture can drop the bot's own audio.

mod capture;
mod input;
mod playback;
mod recognizer;
mod session;
mod tts;
mod wake;

pub use capture::{CaptureHandle, CaptureWorker, FrameOutcome, VoiceCaptureEngine};
pub use input::{
    AudioInput, FRAME_SAMPLES, Frame, InputGuard, MicrophoneInput, SAMPLE_RATE, samples_to_wav,
};
pub use playback::{
    DEFAULT_PLAYBACK_TIMEOUT, DEFAULT_POLL_INTERVAL, PlaybackHandle, PlaybackOutcome,
    VoicePlaybackEngine, VoiceSink,
};
pub use recognizer::{
    Recognizer, RecognizerFactory, RemoteRecognizer, RemoteRecognizerFactory, SttProvider,
    UtteranceSegmenter,
};
pub use session::{SpeakerTracker, SpeakingState, VoiceSession};
pub use tts::{SpeechSynthesizer, TextToSpeech};
pub use wake::{DEFAULT_WAKE_WORD, WakeEvent, WakePhrase};
