//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Language tag used when none is configured
pub const DEFAULT_LANGUAGE: &str = "zh-TW";

/// Google translate speech endpoint
pub const GOOGLE_TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Longest text the Google endpoint accepts per request
const GOOGLE_MAX_CHARS: usize = 100;

/// Synthesizes speech from text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` spoken in `language`
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>>;
}

/// Keyless synthesis through the Google translate speech endpoint
pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for GoogleTts {
    fn default() -> Self {
        Self::with_endpoint(GOOGLE_TTS_ENDPOINT)
    }
}

impl GoogleTts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an instance against a custom endpoint
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&total={total}&idx={idx}&textlen={}&q={}",
            self.endpoint,
            urlencoding::encode(language),
            chunk.chars().count(),
            urlencoding::encode(chunk),
        );

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .header("Referer", "http://translate.google.com/")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let chunks = chunk_text(text, GOOGLE_MAX_CHARS);
        if chunks.is_empty() {
            return Err(Error::Tts("no text to speak".to_string()));
        }

        tracing::debug!(language, chunks = chunks.len(), "synthesizing speech");

        // MP3 frames are self-delimiting, so chunk responses concatenate
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, language, idx, chunks.len()).await?);
        }

        Ok(audio)
    }
}

/// Synthesis through the `OpenAI` speech endpoint
pub struct OpenAiTts {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
}

impl OpenAiTts {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, voice: String, speed: f32) -> Result<Self> {
        Self::with_model(api_key, voice, speed, "tts-1".to_string())
    }

    /// Create a new TTS instance using `OpenAI` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn with_model(
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: crate::completion::OPENAI_BASE_URL.to_string(),
            api_key,
            voice,
            speed,
            model,
        })
    }

    /// Point the client at an `OpenAI`-compatible endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        // the model detects the language from the text itself
        tracing::trace!(language, "language tag not sent to OpenAI TTS");

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// Split text into chunks of at most `max_chars` characters
///
/// Prefers breaking after whitespace or punctuation; text without any break
/// point is cut hard at the limit. A limit of zero is treated as one.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
            chunks.push(rest.to_string());
            break;
        };

        let split = rest[..limit]
            .char_indices()
            .filter(|&(_, c)| is_break(c))
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(limit);

        let (head, tail) = rest.split_at(split);
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = tail.trim_start();
    }

    chunks
}

fn is_break(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | '.' | '!' | '?' | ';' | ':' | '，' | '。' | '！' | '？' | '；' | '：' | '、'
        )
}
