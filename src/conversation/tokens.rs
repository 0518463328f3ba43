//! Token accounting for chat completion requests
//!
//! Counts follow the chat markup framing: every message is wrapped as
//! `<im_start>{role/name}\n{content}<im_end>\n` and every reply is primed
//! with `<im_start>assistant`.

use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};

use super::Message;
use crate::{Error, Result};

/// Model used for token accounting unless configured otherwise
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Framing tokens charged for every message
const TOKENS_PER_MESSAGE: usize = 4;

/// Tokens priming the assistant reply, charged once per request
const REPLY_PRIMER_TOKENS: usize = 2;

/// Whether `model` belongs to the family the framing formula is defined for
#[must_use]
pub fn is_supported_model(model: &str) -> bool {
    model == DEFAULT_MODEL
}

/// Resolve the BPE encoding for a model, falling back to `cl100k_base`
#[must_use]
pub fn resolve_tokenizer(model: &str) -> Tokenizer {
    get_tokenizer(model).unwrap_or_else(|| {
        tracing::debug!(model, "unknown model, falling back to cl100k_base");
        Tokenizer::Cl100kBase
    })
}

/// Counts the tokens a message sequence occupies in a completion request
#[derive(Clone)]
pub struct TokenEstimator {
    model: String,
    tokenizer: Tokenizer,
    bpe: Arc<CoreBPE>,
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("model", &self.model)
            .field("tokenizer", &self.tokenizer)
            .finish_non_exhaustive()
    }
}

impl TokenEstimator {
    /// Build an estimator for `model`
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedModel` for any model outside the supported family,
    /// or `Tokenizer` if the BPE tables cannot be loaded
    pub fn for_model(model: &str) -> Result<Self> {
        if !is_supported_model(model) {
            return Err(Error::UnsupportedModel(model.to_string()));
        }

        let tokenizer = resolve_tokenizer(model);
        let bpe = tiktoken_rs::get_bpe_from_tokenizer(tokenizer)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;

        tracing::debug!(model, ?tokenizer, "token estimator ready");

        Ok(Self {
            model: model.to_string(),
            tokenizer,
            bpe: Arc::new(bpe),
        })
    }

    /// Model this estimator counts for
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of tokens `text` encodes to
    #[must_use]
    pub fn encoded_len(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Count the tokens of `messages` including per-request overhead
    #[must_use]
    pub fn count<'a>(&self, messages: impl IntoIterator<Item = &'a Message>) -> usize {
        let mut total = 0;

        for message in messages {
            total += TOKENS_PER_MESSAGE;
            total += self.encoded_len(message.role().as_str());
            total += self.encoded_len(message.content());

            // role is omitted from the framing when a name is given
            if let Some(name) = message.name() {
                total += self.encoded_len(name);
                total -= 1;
            }
        }

        total + REPLY_PRIMER_TOKENS
    }
}

/// Count the tokens of `messages` for `model`
///
/// # Errors
///
/// Returns `UnsupportedModel` for any model outside the supported family
pub fn count_tokens<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
    model: &str,
) -> Result<usize> {
    Ok(TokenEstimator::for_model(model)?.count(messages))
}
