//! Text-to-speech (TTS) synthesis

use async_trait::async_trait;

use crate::{Error, Result};

/// Longest text accepted per Google Translate TTS request
const GOOGLE_SEGMENT_CHARS: usize = 200;

/// Text in, encoded audio out
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// File extension of the produced audio
    fn extension(&self) -> &'static str {
        "mp3"
    }
}

/// TTS provider backend
#[derive(Clone, Debug)]
enum TtsProvider {
    /// Google Translate's public endpoint, language tagged
    GoogleTranslate { lang: String },
    OpenAI { model: String, voice: String, speed: f32 },
    ElevenLabs { model: String, voice_id: String },
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Google Translate TTS for a language tag such as `en`
    #[must_use]
    pub fn new_google(lang: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: String::new(),
            provider: TtsProvider::GoogleTranslate { lang: lang.into() },
        }
    }

    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f32, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            provider: TtsProvider::OpenAI { model, voice, speed },
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            provider: TtsProvider::ElevenLabs { model, voice_id },
        })
    }

    async fn synthesize_google(&self, lang: &str, text: &str) -> Result<Vec<u8>> {
        let segments = split_segments(text, GOOGLE_SEGMENT_CHARS);
        let total = segments.len();
        let mut audio = Vec::new();

        // MP3 frames concatenate cleanly
        for (idx, segment) in segments.iter().enumerate() {
            let url = format!(
                "https://translate.google.com/translate_tts?ie=UTF-8&client=tw-ob&tl={}&q={}&total={total}&idx={idx}&textlen={}",
                urlencoding::encode(lang),
                urlencoding::encode(segment),
                segment.chars().count(),
            );

            let response = self
                .client
                .get(&url)
                .header("User-Agent", "Mozilla/5.0")
                .send()
                .await
                .map_err(|e| Error::Playback(format!("Google TTS request failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Playback(format!("Google TTS error {status}")));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::Playback(e.to_string()))?;
            audio.extend_from_slice(&bytes);
        }

        Ok(audio)
    }

    async fn synthesize_openai(
        &self,
        model: &str,
        voice: &str,
        speed: f32,
        text: &str,
    ) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Playback(format!("OpenAI TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Playback(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Playback(e.to_string()))?;
        Ok(audio.to_vec())
    }

    async fn synthesize_elevenlabs(&self, model: &str, voice_id: &str, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice_id}");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&ElevenLabsRequest {
                text,
                model_id: model,
            })
            .send()
            .await
            .map_err(|e| Error::Playback(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Playback(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Playback(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Playback("nothing to synthesize".to_string()));
        }

        tracing::debug!(chars = text.len(), "synthesizing speech");

        let audio = match &self.provider {
            TtsProvider::GoogleTranslate { lang } => self.synthesize_google(lang, text).await?,
            TtsProvider::OpenAI {
                model,
                voice,
                speed,
            } => self.synthesize_openai(model, voice, *speed, text).await?,
            TtsProvider::ElevenLabs { model, voice_id } => {
                self.synthesize_elevenlabs(model, voice_id, text).await?
            }
        };

        if audio.is_empty() {
            return Err(Error::Playback("synthesizer returned no audio".to_string()));
        }
        Ok(audio)
    }
}

/// Split text into segments of at most `max` chars, preferring word boundaries
fn split_segments(text: &str, max: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max) {
                segments.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
