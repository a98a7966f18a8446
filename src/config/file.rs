//! TOML configuration file loading
//!
//! Supports `~/.config/banter/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BanterConfigFile {
    /// Completion service settings
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// System prompts
    #[serde(default)]
    pub prompts: PromptsFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Command and trigger behavior
    #[serde(default)]
    pub bot: BotFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    /// Model identifier (e.g. "deepseek-chat")
    pub model: Option<String>,
    /// OpenAI-compatible base URL
    pub api_base: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Messages kept per track, system prompt included
    pub max_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptsFileConfig {
    pub default: Option<String>,
    pub voice: Option<String>,
    /// Per-guild overrides, keyed by guild id
    #[serde(default)]
    pub guilds: HashMap<String, String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    pub wake_words: Option<Vec<String>>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,

    /// "google", "openai" or "elevenlabs"
    pub tts_provider: Option<String>,
    /// Language tag for Google TTS
    pub tts_lang: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_model: Option<String>,
    pub tts_speed: Option<f32>,

    /// Microphone name; system default when unset
    pub input_device: Option<String>,
    pub playback_timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub discord: Option<String>,
    pub deepseek: Option<String>,
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BotFileConfig {
    pub prefix: Option<String>,
    pub owner_id: Option<u64>,
    pub welcome_bot_id: Option<u64>,
    pub welcome_keywords: Option<Vec<String>>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Health server port
    pub health_port: Option<u16>,
}

/// Load the TOML config file
///
/// With an explicit `path`, a missing or malformed file is an error. The
/// standard path is optional: returns `BanterConfigFile::default()` if it
/// doesn't exist or can't be parsed.
///
/// # Errors
///
/// Returns error if an explicitly given file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<BanterConfigFile> {
    if let Some(path) = path {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config = parse(&contents)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(BanterConfigFile::default());
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BanterConfigFile::default());
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            return Ok(BanterConfigFile::default());
        }
    };

    match parse(&contents) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
            Ok(BanterConfigFile::default())
        }
    }
}

fn parse(contents: &str) -> Result<BanterConfigFile> {
    Ok(toml::from_str(contents)?)
}

/// Path to the config file: `~/.config/banter/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("banter").join("config.toml"))
}
