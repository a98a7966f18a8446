//! Streaming speech recognition
//!
//! Frames go in continuously; finalized utterance text comes out at
//! utterance boundaries. Recognizers run on the capture thread, so the
//! remote implementation uses blocking HTTP.

use std::time::Duration;

use super::input::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// RMS energy above which a frame counts as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Shortest utterance worth transcribing (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Trailing silence that closes an utterance (0.5 seconds)
const SILENCE_SAMPLES: usize = 8000;

/// Longest utterance before it is cut (15 seconds)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// Stateful recognizer for one voice session
pub trait Recognizer: Send {
    /// Feed 16 kHz mono samples
    ///
    /// Returns the finalized text when the samples complete an utterance.
    ///
    /// # Errors
    ///
    /// Returns `Error::Recognition` if transcription fails; the recognizer
    /// stays usable afterwards
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<Option<String>>;

    /// Drop any partial utterance
    fn reset(&mut self);
}

/// Creates one recognizer per session, on the capture thread
pub trait RecognizerFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `Error::Recognition` if the recognizer cannot be initialized
    fn create(&self) -> Result<Box<dyn Recognizer>>;
}

/// Energy-based utterance boundary detection
#[derive(Debug, Default)]
pub struct UtteranceSegmenter {
    buffer: Vec<i16>,
    voiced: usize,
    silence: usize,
    in_speech: bool,
}

impl UtteranceSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed samples, returning a complete utterance at a boundary
    pub fn push(&mut self, samples: &[i16]) -> Option<Vec<i16>> {
        let is_speech = calculate_energy(samples) > ENERGY_THRESHOLD;

        if !self.in_speech {
            if is_speech {
                self.in_speech = true;
                self.buffer.clear();
                self.buffer.extend_from_slice(samples);
                self.voiced = samples.len();
                self.silence = 0;
                tracing::trace!("speech started");
            }
            return None;
        }

        self.buffer.extend_from_slice(samples);
        if is_speech {
            self.voiced += samples.len();
            self.silence = 0;
        } else {
            self.silence += samples.len();
        }

        if self.buffer.len() >= MAX_UTTERANCE_SAMPLES {
            tracing::debug!(samples = self.buffer.len(), "utterance cut at max length");
            return Some(self.take());
        }

        if self.silence >= SILENCE_SAMPLES {
            if self.voiced >= MIN_SPEECH_SAMPLES {
                tracing::debug!(samples = self.buffer.len(), "utterance complete");
                return Some(self.take());
            }
            tracing::trace!(voiced = self.voiced, "too short, discarded");
            self.reset();
        }

        None
    }

    /// Whether speech is being accumulated
    #[must_use]
    pub const fn in_speech(&self) -> bool {
        self.in_speech
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.voiced = 0;
        self.silence = 0;
        self.in_speech = false;
    }

    fn take(&mut self) -> Vec<i16> {
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        utterance
    }
}

/// RMS energy of samples, normalized to 0.0..=1.0
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let s = f32::from(s) / 32768.0;
            s * s
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Remote transcription service
#[derive(Debug, Clone)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    Whisper { api_key: String, model: String },
    /// Deepgram
    Deepgram { api_key: String, model: String },
}

impl SttProvider {
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }
        Ok(Self::Whisper { api_key, model })
    }

    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }
        Ok(Self::Deepgram { api_key, model })
    }
}

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Segmenter plus remote transcription per utterance
pub struct RemoteRecognizer {
    client: reqwest::blocking::Client,
    provider: SttProvider,
    segmenter: UtteranceSegmenter,
}

impl RemoteRecognizer {
    /// Must be called outside an async context
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(provider: SttProvider, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Recognition(e.to_string()))?;

        Ok(Self {
            client,
            provider,
            segmenter: UtteranceSegmenter::new(),
        })
    }

    fn transcribe(&self, utterance: &[i16]) -> Result<String> {
        let audio = samples_to_wav(utterance)?;
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let text = match &self.provider {
            SttProvider::Whisper { api_key, model } => {
                self.transcribe_whisper(api_key, model, audio)?
            }
            SttProvider::Deepgram { api_key, model } => {
                self.transcribe_deepgram(api_key, model, audio)?
            }
        };

        tracing::debug!(transcript = %text, "transcription complete");
        Ok(text)
    }

    fn transcribe_whisper(&self, api_key: &str, model: &str, audio: Vec<u8>) -> Result<String> {
        let part = reqwest::blocking::multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Recognition(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .map_err(|e| Error::Recognition(format!("Whisper request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Recognition(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response
            .json()
            .map_err(|e| Error::Recognition(e.to_string()))?;
        Ok(result.text)
    }

    fn transcribe_deepgram(&self, api_key: &str, model: &str, audio: Vec<u8>) -> Result<String> {
        let url = format!("https://api.deepgram.com/v1/listen?model={model}&punctuate=true");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {api_key}"))
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .map_err(|e| Error::Recognition(format!("Deepgram request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::Recognition(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response
            .json()
            .map_err(|e| Error::Recognition(e.to_string()))?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

impl Recognizer for RemoteRecognizer {
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<Option<String>> {
        let Some(utterance) = self.segmenter.push(samples) else {
            return Ok(None);
        };

        let text = self.transcribe(&utterance)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn reset(&mut self) {
        self.segmenter.reset();
    }
}

/// Builds [`RemoteRecognizer`]s for a provider
#[derive(Debug, Clone)]
pub struct RemoteRecognizerFactory {
    provider: SttProvider,
    timeout: Duration,
}

impl RemoteRecognizerFactory {
    #[must_use]
    pub const fn new(provider: SttProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }
}

impl RecognizerFactory for RemoteRecognizerFactory {
    fn create(&self) -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(RemoteRecognizer::new(
            self.provider.clone(),
            self.timeout,
        )?))
    }
}
