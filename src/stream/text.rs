//! Incremental detokenization.

use std::sync::Arc;

use crate::codec::TokenCodec;
use crate::error::Result;

/// Turns raw token batches into printable text fragments.
///
/// The growing token cache is decoded as a whole and text is only released
/// up to a safe boundary: the whole cache once it ends in a newline, otherwise
/// everything up to and including the last whitespace character. Partial
/// words, which later tokens could still change, stay buffered.
pub struct TextStreamer {
    codec: Arc<dyn TokenCodec>,
    skip_prompt: bool,
    token_cache: Vec<u32>,
    print_len: usize,
    next_tokens_are_prompt: bool,
}

impl TextStreamer {
    /// With `skip_prompt`, the first batch pushed after creation (or after a
    /// [`flush`](Self::flush)) is treated as the echoed prompt and dropped.
    pub fn new(codec: Arc<dyn TokenCodec>, skip_prompt: bool) -> Self {
        Self {
            codec,
            skip_prompt,
            token_cache: Vec::new(),
            print_len: 0,
            next_tokens_are_prompt: true,
        }
    }

    /// Feed a batch of tokens, returning any text that became printable.
    pub fn push(&mut self, tokens: &[u32]) -> Result<Option<String>> {
        if self.skip_prompt && self.next_tokens_are_prompt {
            self.next_tokens_are_prompt = false;
            return Ok(None);
        }

        self.token_cache.extend_from_slice(tokens);
        let text = self.codec.decode(&self.token_cache)?;

        let start = floor_char_boundary(&text, self.print_len);
        if text.ends_with('\n') {
            let printable = text[start..].to_string();
            self.token_cache.clear();
            self.print_len = 0;
            return Ok(non_empty(printable));
        }

        let boundary = last_whitespace_end(&text);
        if boundary > start {
            self.print_len = boundary;
            Ok(Some(text[start..boundary].to_string()))
        } else {
            Ok(None)
        }
    }

    /// Release whatever is still buffered and reset for the next generation.
    pub fn flush(&mut self) -> Result<Option<String>> {
        let printable = if self.token_cache.is_empty() {
            None
        } else {
            let text = self.codec.decode(&self.token_cache)?;
            let rest = text[floor_char_boundary(&text, self.print_len)..].to_string();
            self.token_cache.clear();
            self.print_len = 0;
            non_empty(rest)
        };
        self.next_tokens_are_prompt = true;
        Ok(printable)
    }
}

/// Byte offset just past the last whitespace character, or 0.
fn last_whitespace_end(text: &str) -> usize {
    text.char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

/// Largest char boundary at or below `index`, clamped to the text.
///
/// Re-decoding the cache can shift earlier text, leaving the previous print
/// offset inside a character or past the end.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
