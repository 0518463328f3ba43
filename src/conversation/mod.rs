//! Bounded conversation buffer
//!
//! Holds a fixed-size sliding window of exchanged messages plus a single
//! system directive. The directive is sent with every prompt but does not
//! occupy a window slot and is not part of [`ConversationBuffer::token_count`].

pub mod tokens;

use std::collections::VecDeque;
use std::fmt;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub use tokens::{DEFAULT_MODEL, TokenEstimator, count_tokens, is_supported_model};

use crate::{Error, Result};

/// Window capacity used when none is configured
pub const DEFAULT_WINDOW: usize = 5;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a participant name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Sliding window of recent messages plus the system directive
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    system_directive: String,
    window: VecDeque<Message>,
    capacity: usize,
    model: String,
    estimator: OnceCell<TokenEstimator>,
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self {
            system_directive: String::new(),
            window: VecDeque::with_capacity(DEFAULT_WINDOW),
            capacity: DEFAULT_WINDOW,
            model: DEFAULT_MODEL.to_string(),
            estimator: OnceCell::new(),
        }
    }
}

impl ConversationBuffer {
    /// Create an empty buffer holding at most `capacity` messages
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_model(capacity, DEFAULT_MODEL)
    }

    /// Create an empty buffer that counts tokens for `model`
    ///
    /// The model is only consulted by [`Self::token_count`], so an
    /// unsupported model surfaces there rather than here.
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub fn with_model(capacity: usize, model: impl Into<String>) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config(
                "conversation window must hold at least one message".to_string(),
            ));
        }

        Ok(Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            model: model.into(),
            ..Self::default()
        })
    }

    /// Replace the system directive
    pub fn set_system_directive(&mut self, text: impl Into<String>) {
        self.system_directive = text.into();
    }

    /// Record the user's input and return the prompt to submit
    ///
    /// The returned messages are `[system directive] + window`, owned by the
    /// caller and unaffected by later changes to the buffer.
    pub fn prepare_prompt(&mut self, user_text: impl Into<String>) -> Vec<Message> {
        self.push(Message::user(user_text));

        let mut prompt = Vec::with_capacity(self.window.len() + 1);
        prompt.push(Message::system(self.system_directive.clone()));
        prompt.extend(self.window.iter().cloned());
        prompt
    }

    /// Record the assistant's reply for the current turn
    pub fn append_response(&mut self, assistant_text: impl Into<String>) {
        self.push(Message::assistant(assistant_text));
    }

    /// Tokens occupied by the window for the buffer's model
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` if the buffer was built for a model
    /// outside the supported family
    pub fn token_count(&self) -> Result<usize> {
        let estimator = self
            .estimator
            .get_or_try_init(|| TokenEstimator::for_model(&self.model))?;
        Ok(estimator.count(&self.window))
    }

    /// Tokens occupied by the window for an explicit model
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` for any model outside the supported family
    pub fn token_count_for(&self, model: &str) -> Result<usize> {
        if model == self.model {
            return self.token_count();
        }
        count_tokens(&self.window, model)
    }

    #[must_use]
    pub fn system_directive(&self) -> &str {
        &self.system_directive
    }

    /// Window contents, oldest first
    #[must_use]
    pub fn messages(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.window.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn push(&mut self, message: Message) {
        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                tracing::trace!(role = %evicted.role(), "evicted oldest message");
            }
        }
        self.window.push_back(message);
    }
}

/// Pretty JSON rendering of the window, for diagnostics only
impl fmt::Display for ConversationBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.window
            .serialize(&mut serializer)
            .map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}
