//! Voice output
//!
//! Synthesizes assistant replies to speech and plays them back.

mod playback;
pub mod tts;

pub use playback::{
    AudioPlayer, PLAYBACK_SAMPLE_RATE, PlaybackSlot, SpeakerPlayer, decode_mp3,
};
pub use tts::{DEFAULT_LANGUAGE, GoogleTts, OpenAiTts, SpeechSynthesizer};
