//! Voice Chat - spoken chat client for `OpenAI`-compatible completion APIs
//!
//! This library provides the core functionality for the voice chat client:
//! - Bounded conversation window with exact token accounting
//! - Chat completion client
//! - Speech synthesis and speaker playback of replies
//! - Terminal and HTTP surfaces over a chat session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Surfaces                          │
//! │        Terminal REPL        │       HTTP API         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  ChatSession                         │
//! │   Conversation  │  Completion  │  TTS  │  Playback  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        Completion API  │  Speech API  │  Speakers   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod session;
pub mod voice;

pub use completion::{CompletionClient, OpenAiCompletion, PlaceholderCompletion};
pub use config::Config;
pub use conversation::{ConversationBuffer, Message, Role, TokenEstimator, count_tokens};
pub use error::{Error, Result};
pub use session::{ChatSession, Turn, VoiceOutput};
pub use voice::{AudioPlayer, PlaybackSlot, SpeakerPlayer, SpeechSynthesizer};
