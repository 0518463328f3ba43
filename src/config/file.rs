//! TOML configuration file loading
//!
//! Supports `~/.config/voice-chat/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Answer with a placeholder instead of calling the completion API
    #[serde(default)]
    pub debug: Option<bool>,

    /// Completion API configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Conversation window configuration
    #[serde(default)]
    pub conversation: ConversationFileConfig,

    /// Voice output configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Completion API configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,

    /// `OpenAI`-compatible base URL
    pub base_url: Option<String>,

    /// API key pre-filled into the credential prompt
    pub api_key: Option<String>,
}

/// Conversation window configuration
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Number of messages kept as context
    pub window: Option<usize>,

    /// Default system directive
    pub system_directive: Option<String>,
}

/// Voice output configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable speech output
    pub enabled: Option<bool>,

    /// TTS provider ("google" or "openai")
    pub provider: Option<String>,

    /// Language tag for synthesis (e.g. "zh-TW")
    pub language: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Load a TOML config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/voice-chat/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-chat").join("config.toml"))
}
