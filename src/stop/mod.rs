//! Stop conditions for streaming generation.
//!
//! [`StopSignal`] is the per-call flag shared between the decode loop (which
//! polls it once per token) and whoever wants generation to end early: the
//! stop-word matcher, or a consumer that abandons the stream. Once set it
//! stays set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellable flag checked by the generation loop each step.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that generation stop. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Matches accumulated generated text against caller-supplied stop words.
#[derive(Debug, Clone, Default)]
pub struct StopWords {
    words: Vec<String>,
}

impl StopWords {
    /// Empty strings are dropped; they would match any text.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words
                .into_iter()
                .map(Into::into)
                .filter(|w: &String| !w.is_empty())
                .collect(),
        }
    }

    /// The first stop word contained in `text`, if any.
    pub fn find_in(&self, text: &str) -> Option<&str> {
        self.words
            .iter()
            .find(|word| text.contains(word.as_str()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.words
    }
}
