//! Configuration management for the voice chat client
//!
//! Values are layered env > TOML file > default.

pub mod file;

use std::str::FromStr;

use secrecy::SecretString;

use crate::completion::OPENAI_BASE_URL;
use crate::conversation::{DEFAULT_MODEL, DEFAULT_WINDOW};
use crate::voice::DEFAULT_LANGUAGE;
use crate::{Error, Result};

use self::file::ConfigFile;

/// System directive used when none is configured
pub const DEFAULT_SYSTEM_DIRECTIVE: &str = "你是一個樂於助人的聊天機器人，你只能用繁體中文回覆人類，一步一步思考並將你提供的解法以詳細且好理解的方式回答人類。";

/// Default HTTP API port
pub const DEFAULT_PORT: u16 = 18790;

/// Voice chat configuration
#[derive(Debug)]
pub struct Config {
    /// Completion API configuration
    pub llm: LlmConfig,

    /// Conversation window configuration
    pub conversation: ConversationConfig,

    /// Voice output configuration
    pub voice: VoiceConfig,

    /// HTTP server port
    pub port: u16,

    /// Answer with a fixed placeholder instead of calling the completion API
    pub debug: bool,
}

/// Completion API configuration
#[derive(Debug)]
pub struct LlmConfig {
    /// Model identifier for chat completions and token accounting
    pub model: String,

    /// `OpenAI`-compatible base URL
    pub base_url: String,

    /// Credential used to pre-fill prompts and for `OpenAI` TTS
    pub api_key: Option<SecretString>,
}

/// Conversation window configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Number of messages kept as context
    pub window: usize,

    /// Directive offered when a session starts
    pub system_directive: String,
}

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// Keyless Google translate speech
    #[default]
    Google,
    /// `OpenAI` speech API
    OpenAi,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Voice output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Synthesize and play replies
    pub enabled: bool,

    /// Synthesis backend
    pub provider: TtsProvider,

    /// Language tag passed to the synthesizer
    pub language: String,

    /// TTS model for `OpenAI` (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier for `OpenAI`
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                model: DEFAULT_MODEL.to_string(),
                base_url: OPENAI_BASE_URL.to_string(),
                api_key: None,
            },
            conversation: ConversationConfig {
                window: DEFAULT_WINDOW,
                system_directive: DEFAULT_SYSTEM_DIRECTIVE.to_string(),
            },
            voice: VoiceConfig {
                enabled: true,
                provider: TtsProvider::Google,
                language: DEFAULT_LANGUAGE.to_string(),
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
                tts_speed: 1.0,
            },
            port: DEFAULT_PORT,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from the standard config file and environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded or a value is invalid
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        Self::from_sources(file::load_config_from(path)?, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default = Self::default();

        let flag = |key: &str| env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let llm = LlmConfig {
            model: env("VOICE_CHAT_MODEL")
                .or(fc.llm.model)
                .unwrap_or(default.llm.model),
            base_url: env("VOICE_CHAT_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or(default.llm.base_url),
            api_key: env("OPENAI_API_KEY")
                .or(fc.llm.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        };

        let window = parse_env(&env, "VOICE_CHAT_WINDOW")?
            .or(fc.conversation.window)
            .unwrap_or(default.conversation.window);
        if window == 0 {
            return Err(Error::Config(
                "conversation window must hold at least one message".to_string(),
            ));
        }

        let conversation = ConversationConfig {
            window,
            system_directive: env("VOICE_CHAT_SYSTEM_DIRECTIVE")
                .or(fc.conversation.system_directive)
                .unwrap_or(default.conversation.system_directive),
        };

        let provider = env("VOICE_CHAT_TTS_PROVIDER")
            .or(fc.voice.provider)
            .map(|p| p.parse())
            .transpose()?
            .unwrap_or(default.voice.provider);

        let tts_speed = fc.voice.tts_speed.unwrap_or(default.voice.tts_speed);
        if !(0.25..=4.0).contains(&tts_speed) {
            return Err(Error::Config(format!(
                "tts_speed must be between 0.25 and 4.0, got {tts_speed}"
            )));
        }

        let voice = VoiceConfig {
            enabled: flag("VOICE_CHAT_VOICE")
                .or(fc.voice.enabled)
                .unwrap_or(default.voice.enabled),
            provider,
            language: env("VOICE_CHAT_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or(default.voice.language),
            tts_model: fc.voice.tts_model.unwrap_or(default.voice.tts_model),
            tts_voice: fc.voice.tts_voice.unwrap_or(default.voice.tts_voice),
            tts_speed,
        };

        let port = parse_env(&env, "VOICE_CHAT_PORT")?
            .or(fc.server.port)
            .unwrap_or(default.port);

        let debug = flag("VOICE_CHAT_DEBUG")
            .or(fc.debug)
            .unwrap_or(default.debug);

        if debug {
            tracing::info!("debug bypass enabled, completion API will not be called");
        }

        Ok(Self {
            llm,
            conversation,
            voice,
            port,
            debug,
        })
    }
}

/// Parse a numeric environment value, rejecting malformed input
fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} must be a number, got {v:?}")))
        })
        .transpose()
}
