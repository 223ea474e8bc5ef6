//! Generation settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Fallback token budget when neither the request nor the backend sets one.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;

/// Knobs controlling text generation.
///
/// Every field is optional so a request-level override can be merged onto
/// backend defaults with [`GenerationConfig::merged_onto`].
///
/// ```
/// use ragchat::types::GenerationConfig;
///
/// let defaults = GenerationConfig::builder().temperature(0.8).max_new_tokens(256).build();
/// let request = GenerationConfig::builder().max_new_tokens(50).build();
/// let merged = request.merged_onto(&defaults);
/// assert_eq!(merged.max_new_tokens, Some(50));
/// assert_eq!(merged.temperature, Some(0.8));
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationConfig {
    /// Fill every unset field of `self` from `defaults`.
    pub fn merged_onto(&self, defaults: &GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            top_k: self.top_k.or(defaults.top_k),
            repetition_penalty: self.repetition_penalty.or(defaults.repetition_penalty),
            max_new_tokens: self.max_new_tokens.or(defaults.max_new_tokens),
            seed: self.seed.or(defaults.seed),
        }
    }

    /// Effective token budget for a call.
    pub fn token_budget(&self) -> usize {
        self.max_new_tokens.unwrap_or(DEFAULT_MAX_NEW_TOKENS)
    }

    /// Reject values no backend can honor.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ChatError;

        if let Some(t) = self.temperature {
            if !t.is_finite() || t < 0.0 {
                return Err(ChatError::InvalidArgument(format!(
                    "temperature must be a non-negative number, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ChatError::InvalidArgument(format!(
                    "top_p must be within [0, 1], got {p}"
                )));
            }
        }
        if let Some(r) = self.repetition_penalty {
            if !r.is_finite() || r < 0.0 {
                return Err(ChatError::InvalidArgument(format!(
                    "repetition_penalty must be a non-negative number, got {r}"
                )));
            }
        }
        if self.max_new_tokens == Some(0) {
            return Err(ChatError::InvalidArgument(
                "max_new_tokens must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Why a generation call finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A caller-supplied stop word appeared in the generated text.
    #[strum(serialize = "stopword detected")]
    StopWord,
    /// The token budget was exhausted.
    #[strum(serialize = "max tokens")]
    MaxTokens,
    /// The model emitted its end-of-sequence token.
    #[strum(serialize = "end of text")]
    EndOfText,
    /// The consumer abandoned the stream before it finished.
    #[strum(serialize = "cancelled")]
    Cancelled,
}
