//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use voice_chat::{
    AudioPlayer, ChatSession, CompletionClient, ConversationBuffer, Error, Message, Result,
    SpeechSynthesizer, VoiceOutput,
};

/// Completion client that records every prompt and replies from a script
#[derive(Default)]
pub struct ScriptedCompletion {
    pub prompts: Mutex<Vec<Vec<Message>>>,
    pub credentials: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl ScriptedCompletion {
    /// Make every following call fail with a completion error
    pub fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Vec<Message> {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, messages: &[Message], credential: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.credentials.lock().unwrap().push(credential.to_string());

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Completion("API error 500 Internal Server Error: boom".to_string()));
        }

        let last = messages.last().map(Message::content).unwrap_or_default();
        Ok(format!("reply to {last}"))
    }
}

/// Synthesizer that returns the text bytes as "audio"
#[derive(Default)]
pub struct EchoSynthesizer {
    pub requests: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl EchoSynthesizer {
    pub fn failing() -> Self {
        Self {
            requests: Mutex::default(),
            fail: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), language.to_string()));

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tts("TTS request failed: 503".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Player that records what it was asked to play and returns immediately
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<Vec<u8>>>,
    pub plays: AtomicUsize,
}

impl AudioPlayer for RecordingPlayer {
    fn play(&self, audio: &[u8], _cancel: &AtomicBool) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.played.lock().unwrap().push(audio.to_vec());
        Ok(())
    }
}

/// Session over fakes with a window of `capacity`
pub fn text_session(capacity: usize, completion: Arc<ScriptedCompletion>) -> ChatSession {
    ChatSession::new(ConversationBuffer::new(capacity).unwrap(), completion)
}

/// Session over fakes that also speaks its replies
pub fn voice_session(
    completion: Arc<ScriptedCompletion>,
    synthesizer: Arc<EchoSynthesizer>,
    player: Arc<RecordingPlayer>,
) -> ChatSession {
    text_session(5, completion).with_voice(VoiceOutput::new(synthesizer, player, "zh-TW"))
}
