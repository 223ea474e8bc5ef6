//! Token encoding/decoding seam between local models and the streamers.

use tokenizers::Tokenizer;

use crate::error::Result;

/// Converts between text and model token ids.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode `tokens` to text, skipping special tokens.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// End-of-sequence token id, if the vocabulary has one.
    fn eos_token(&self) -> Option<u32>;
}

/// Well-known EOS spellings, most specific first.
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<|endoftext|>", "<|end_of_text|>", "<eos>"];

/// [`TokenCodec`] backed by a Hugging Face `tokenizer.json`.
pub struct HfTokenCodec {
    tokenizer: Tokenizer,
    eos_token: Option<u32>,
}

impl HfTokenCodec {
    /// Wrap a tokenizer. `eos_override` wins over vocabulary detection.
    pub fn new(tokenizer: Tokenizer, eos_override: Option<u32>) -> Self {
        let eos_token = eos_override.or_else(|| {
            EOS_CANDIDATES
                .iter()
                .find_map(|candidate| tokenizer.token_to_id(candidate))
        });
        Self {
            tokenizer,
            eos_token,
        }
    }

    pub fn from_file(path: impl AsRef<std::path::Path>, eos_override: Option<u32>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)?;
        Ok(Self::new(tokenizer, eos_override))
    }
}

impl TokenCodec for HfTokenCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Ok(self.tokenizer.decode(tokens, true)?)
    }

    fn eos_token(&self) -> Option<u32> {
        self.eos_token
    }
}
