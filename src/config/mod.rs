//! Configuration management for Banter
//!
//! Precedence: environment > TOML file > defaults.

pub mod file;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::api::DEFAULT_HEALTH_PORT;
use crate::completion::SamplingParams;
use crate::conversation::{DEFAULT_MAX_HISTORY, DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE_PROMPT, SystemPrompts};
use crate::orchestrator::{DEFAULT_PREFIX, OrchestratorSettings};
use crate::voice::{DEFAULT_PLAYBACK_TIMEOUT, DEFAULT_WAKE_WORD, SttProvider, TextToSpeech};
use crate::{Error, Result};

use file::BanterConfigFile;

/// Banter configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: Option<String>,

    /// Completion service configuration
    pub completion: CompletionConfig,

    /// System prompts
    pub prompts: PromptConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys for speech services
    pub api_keys: ApiKeys,

    /// Command prefix, owner and welcome trigger
    pub bot: OrchestratorSettings,

    /// Health server port
    pub health_port: u16,
}

/// Completion service configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL; the client default when unset
    pub api_base: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_history: usize,
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub default: String,
    pub voice: Option<String>,
    pub guilds: HashMap<u64, String>,
}

/// Speech recognition backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttKind {
    Whisper,
    Deepgram,
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsKind {
    Google,
    OpenAi,
    ElevenLabs,
}

/// Voice configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Whether voice features are enabled
    pub enabled: bool,

    pub wake_words: Vec<String>,

    pub stt: SttKind,
    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,
    /// Request timeout per transcription
    pub stt_timeout: Duration,

    pub tts: TtsKind,
    /// Language tag for Google TTS
    pub tts_lang: String,
    /// Voice name (`OpenAI`) or voice id (ElevenLabs)
    pub tts_voice: String,
    pub tts_model: String,
    pub tts_speed: f32,

    /// Microphone name; system default when unset
    pub input_device: Option<String>,
    pub playback_timeout: Duration,
}

/// API keys for external speech services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded or a value
    /// is invalid
    pub fn load(path: Option<&Path>, disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        let config = Self::from_sources(fc, |key| std::env::var(key).ok(), disable_voice)?;

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }
        Ok(config)
    }

    /// Merge a parsed file with variables from `env`
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric value is invalid
    pub fn from_sources<F>(fc: BanterConfigFile, env: F, disable_voice: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        let defaults = SamplingParams::default();
        let completion = CompletionConfig {
            api_key: env("DEEPSEEK_API_KEY").or(fc.api_keys.deepseek),
            api_base: env("DEEPSEEK_API_BASE").or(fc.completion.api_base),
            model: env("BANTER_MODEL")
                .or(fc.completion.model)
                .unwrap_or(defaults.model),
            max_tokens: fc.completion.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: fc.completion.temperature.unwrap_or(defaults.temperature),
            max_history: parsed(&env, "BANTER_MAX_HISTORY")?
                .or(fc.completion.max_history)
                .unwrap_or(DEFAULT_MAX_HISTORY),
        };

        let mut guilds = HashMap::with_capacity(fc.prompts.guilds.len());
        for (guild, prompt) in fc.prompts.guilds {
            let guild_id = guild
                .parse()
                .map_err(|_| Error::Config(format!("invalid guild id in prompts: {guild}")))?;
            guilds.insert(guild_id, prompt);
        }
        let prompts = PromptConfig {
            default: fc
                .prompts
                .default
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            voice: Some(
                fc.prompts
                    .voice
                    .unwrap_or_else(|| DEFAULT_VOICE_PROMPT.to_string()),
            )
            .filter(|p| !p.trim().is_empty()),
            guilds,
        };

        let wake_words = env("BANTER_WAKE_WORDS")
            .map(|words| words.split(',').map(str::to_string).collect())
            .or(fc.voice.wake_words)
            .unwrap_or_else(|| vec![DEFAULT_WAKE_WORD.to_string()]);

        let stt = match env("BANTER_STT_PROVIDER")
            .or(fc.voice.stt_provider)
            .as_deref()
        {
            None => SttKind::Whisper,
            Some(name) => parse_stt(name)?,
        };
        let tts = match env("BANTER_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .as_deref()
        {
            None => TtsKind::Google,
            Some(name) => parse_tts(name)?,
        };

        let voice = VoiceConfig {
            enabled: !disable_voice && fc.voice.enabled.unwrap_or(true),
            wake_words,
            stt,
            stt_model: env("BANTER_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| default_stt_model(stt).to_string()),
            stt_timeout: Duration::from_secs(30),
            tts,
            tts_lang: env("BANTER_TTS_LANG")
                .or(fc.voice.tts_lang)
                .unwrap_or_else(|| "en".to_string()),
            tts_voice: env("BANTER_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| default_tts_voice(tts).to_string()),
            tts_model: env("BANTER_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| default_tts_model(tts).to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            input_device: env("BANTER_INPUT_DEVICE").or(fc.voice.input_device),
            playback_timeout: fc
                .voice
                .playback_timeout_secs
                .map_or(DEFAULT_PLAYBACK_TIMEOUT, Duration::from_secs),
        };

        let bot_defaults = OrchestratorSettings::default();
        let bot = OrchestratorSettings {
            command_prefix: env("BANTER_PREFIX")
                .or(fc.bot.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            owner_id: parsed(&env, "BANTER_OWNER_ID")?.or(fc.bot.owner_id),
            welcome_bot_id: fc.bot.welcome_bot_id.or(bot_defaults.welcome_bot_id),
            welcome_keywords: fc.bot.welcome_keywords.map_or(bot_defaults.welcome_keywords, |keywords| {
                keywords.iter().map(|k| k.to_lowercase()).collect()
            }),
            welcome_delay: bot_defaults.welcome_delay,
        };

        let health_port = match parsed(&env, "BANTER_HEALTH_PORT")? {
            Some(port) => port,
            None => parsed(&env, "PORT")?
                .or(fc.server.health_port)
                .unwrap_or(DEFAULT_HEALTH_PORT),
        };

        Ok(Self {
            discord_token: env("DISCORD_TOKEN").or(fc.api_keys.discord),
            completion,
            prompts,
            voice,
            api_keys,
            bot,
            health_port,
        })
    }

    /// Check everything needed to start
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing credential
    pub fn validate(&self) -> Result<()> {
        if is_blank(self.discord_token.as_ref()) {
            return Err(Error::Config("DISCORD_TOKEN is not set".to_string()));
        }
        if is_blank(self.completion.api_key.as_ref()) {
            return Err(Error::Config("DEEPSEEK_API_KEY is not set".to_string()));
        }
        if self.completion.max_history < 2 {
            return Err(Error::Config(
                "max_history must keep the system prompt and one message".to_string(),
            ));
        }
        if self.bot.command_prefix.is_empty() {
            return Err(Error::Config("command prefix cannot be empty".to_string()));
        }

        if self.voice.enabled {
            self.stt_provider()?;
            self.text_to_speech()?;
        }
        Ok(())
    }

    /// Sampling parameters for the completion gateway
    #[must_use]
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            model: self.completion.model.clone(),
            max_tokens: self.completion.max_tokens,
            temperature: self.completion.temperature,
        }
    }

    /// Prompt mapping for the conversation store
    #[must_use]
    pub fn system_prompts(&self) -> SystemPrompts {
        let mut prompts = SystemPrompts::new(self.prompts.default.clone());
        for (&guild_id, prompt) in &self.prompts.guilds {
            prompts = prompts.with_guild(guild_id, prompt.clone());
        }
        if let Some(voice) = &self.prompts.voice {
            prompts = prompts.with_voice(voice.clone());
        }
        prompts
    }

    /// Configured speech recognition provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn stt_provider(&self) -> Result<SttProvider> {
        let model = self.voice.stt_model.clone();
        match self.voice.stt {
            SttKind::Whisper => {
                SttProvider::whisper(self.api_keys.openai.clone().unwrap_or_default(), model)
            }
            SttKind::Deepgram => {
                SttProvider::deepgram(self.api_keys.deepgram.clone().unwrap_or_default(), model)
            }
        }
    }

    /// Configured speech synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn text_to_speech(&self) -> Result<TextToSpeech> {
        let voice = &self.voice;
        match voice.tts {
            TtsKind::Google => Ok(TextToSpeech::new_google(voice.tts_lang.clone())),
            TtsKind::OpenAi => TextToSpeech::new_openai(
                self.api_keys.openai.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            ),
            TtsKind::ElevenLabs => TextToSpeech::new_elevenlabs(
                self.api_keys.elevenlabs.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_model.clone(),
            ),
        }
    }
}

fn parsed<F, T>(env: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn parse_stt(name: &str) -> Result<SttKind> {
    match name.to_lowercase().as_str() {
        "whisper" | "openai" => Ok(SttKind::Whisper),
        "deepgram" => Ok(SttKind::Deepgram),
        other => Err(Error::Config(format!("unknown STT provider: {other}"))),
    }
}

fn parse_tts(name: &str) -> Result<TtsKind> {
    match name.to_lowercase().as_str() {
        "google" | "gtts" => Ok(TtsKind::Google),
        "openai" => Ok(TtsKind::OpenAi),
        "elevenlabs" => Ok(TtsKind::ElevenLabs),
        other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
    }
}

const fn default_stt_model(kind: SttKind) -> &'static str {
    match kind {
        SttKind::Whisper => "whisper-1",
        SttKind::Deepgram => "nova-2",
    }
}

const fn default_tts_voice(kind: TtsKind) -> &'static str {
    match kind {
        TtsKind::Google => "",
        TtsKind::OpenAi => "alloy",
        // "Rachel"
        TtsKind::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
    }
}

const fn default_tts_model(kind: TtsKind) -> &'static str {
    match kind {
        TtsKind::Google => "",
        TtsKind::OpenAi => "tts-1",
        TtsKind::ElevenLabs => "eleven_turbo_v2_5",
    }
}
