//! Chat session - the interaction loop
//!
//! One session per user: owns the conversation buffer, the visible history
//! and the playback slot, and sequences each turn through completion,
//! synthesis and playback.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::completion::{CompletionClient, OpenAiCompletion, PlaceholderCompletion};
use crate::config::{Config, TtsProvider};
use crate::conversation::ConversationBuffer;
use crate::voice::{
    AudioPlayer, GoogleTts, OpenAiTts, PlaybackSlot, SpeakerPlayer, SpeechSynthesizer,
};
use crate::{Error, Result};

/// Build the configured speech synthesizer
///
/// `OpenAI` TTS uses `credential` when given, else the configured API key.
///
/// # Errors
///
/// Returns `Config` if `OpenAI` TTS is selected without any API key
pub fn synthesizer_from_config(
    config: &Config,
    credential: Option<SecretString>,
) -> Result<Arc<dyn SpeechSynthesizer>> {
    match config.voice.provider {
        TtsProvider::Google => Ok(Arc::new(GoogleTts::new())),
        TtsProvider::OpenAi => {
            let key = credential
                .or_else(|| {
                    config
                        .llm
                        .api_key
                        .as_ref()
                        .map(|k| SecretString::from(k.expose_secret().to_string()))
                })
                .ok_or_else(|| Error::Config("OpenAI TTS requires an API key".to_string()))?;

            let tts = OpenAiTts::with_model(
                key,
                config.voice.tts_voice.clone(),
                config.voice.tts_speed,
                config.voice.tts_model.clone(),
            )?
            .with_base_url(config.llm.base_url.clone());

            Ok(Arc::new(tts))
        }
    }
}

/// One user submission and the reply it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

/// Speech synthesis plus playback for replies
pub struct VoiceOutput {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    language: String,
    playback: PlaybackSlot,
}

impl VoiceOutput {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            synthesizer,
            language: language.into(),
            playback: PlaybackSlot::new(player),
        }
    }

    /// Synthesize `text` and start playing it without waiting
    ///
    /// Synthesis failures are logged; the reply text is still delivered.
    async fn speak(&mut self, text: &str) {
        match self.synthesizer.synthesize(text, &self.language).await {
            Ok(audio) => self.playback.dispatch(audio),
            Err(e) => tracing::warn!(error = %e, "speech synthesis failed, skipping playback"),
        }
    }
}

/// A single user's chat session
pub struct ChatSession {
    conversation: ConversationBuffer,
    completion: Arc<dyn CompletionClient>,
    debug_bypass: Option<Arc<PlaceholderCompletion>>,
    voice: Option<VoiceOutput>,
    history: Vec<Turn>,
}

impl ChatSession {
    /// Create a text-only session
    #[must_use]
    pub fn new(conversation: ConversationBuffer, completion: Arc<dyn CompletionClient>) -> Self {
        Self {
            conversation,
            completion,
            debug_bypass: None,
            voice: None,
            history: Vec::new(),
        }
    }

    /// Speak replies through `voice`
    #[must_use]
    pub fn with_voice(mut self, voice: VoiceOutput) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Answer every turn with `placeholder` instead of calling the completion API
    ///
    /// The credential check is waived while the bypass is active.
    #[must_use]
    pub fn with_debug_bypass(mut self, placeholder: PlaceholderCompletion) -> Self {
        self.debug_bypass = Some(Arc::new(placeholder));
        self
    }

    /// Build a session from configuration
    ///
    /// `credential` is only needed here for `OpenAI` TTS; completion
    /// requests take the credential per turn.
    ///
    /// # Errors
    ///
    /// Returns error if the conversation window or TTS backend is misconfigured
    pub fn from_config(config: &Config, credential: Option<SecretString>) -> Result<Self> {
        let conversation =
            ConversationBuffer::with_model(config.conversation.window, config.llm.model.clone())?;
        let completion = Arc::new(OpenAiCompletion::with_base_url(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
        ));

        let mut session = Self::new(conversation, completion);

        if config.debug {
            session = session.with_debug_bypass(PlaceholderCompletion::default());
        }

        if config.voice.enabled {
            session = session.with_voice(VoiceOutput::new(
                synthesizer_from_config(config, credential)?,
                Arc::new(SpeakerPlayer::new()),
                config.voice.language.clone(),
            ));
        }

        Ok(session)
    }

    /// Run one turn and return the updated visible history
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` or `EmptyInput` without touching the
    /// conversation, or the completion error that aborted the turn. A
    /// completion failure leaves the user message in the window unpaired.
    pub async fn submit(
        &mut self,
        system_directive: &str,
        credential: &str,
        user_input: &str,
    ) -> Result<&[Turn]> {
        if credential.trim().is_empty() && self.debug_bypass.is_none() {
            return Err(Error::MissingCredential);
        }
        if user_input.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        self.conversation.set_system_directive(system_directive);
        let prompt = self.conversation.prepare_prompt(user_input);

        tracing::debug!(
            prompt_messages = prompt.len(),
            window = self.conversation.len(),
            "submitting turn"
        );

        let client = self.active_client();
        let reply = client.complete(&prompt, credential).await?;

        self.conversation.append_response(reply.clone());

        if let Some(voice) = self.voice.as_mut() {
            voice.speak(&reply).await;
        }

        self.history.push(Turn {
            user: user_input.to_string(),
            assistant: reply,
        });

        tracing::info!(turns = self.history.len(), "turn complete");

        Ok(&self.history)
    }

    /// Every completed turn, oldest first
    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The conversation buffer backing this session
    #[must_use]
    pub const fn conversation(&self) -> &ConversationBuffer {
        &self.conversation
    }

    /// Tokens occupied by the conversation window
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` if the session's model has no token accounting
    pub fn token_count(&self) -> Result<usize> {
        self.conversation.token_count()
    }

    /// Whether the debug bypass is active
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug_bypass.is_some()
    }

    /// Cancel any reply still playing
    pub fn stop_playback(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.playback.stop();
        }
    }

    /// Wait for the reply currently playing to finish
    pub async fn wait_for_playback(&mut self) {
        if let Some(voice) = self.voice.as_mut() {
            voice.playback.wait().await;
        }
    }

    fn active_client(&self) -> Arc<dyn CompletionClient> {
        match &self.debug_bypass {
            Some(placeholder) => Arc::clone(placeholder) as Arc<dyn CompletionClient>,
            None => Arc::clone(&self.completion),
        }
    }
}
