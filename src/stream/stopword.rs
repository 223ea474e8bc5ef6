//! Stop-word aware streamer: the bridge between a decode loop and a reader.

use tracing::debug;

use crate::error::{ChatError, Result};
use crate::stop::{StopSignal, StopWords};
use crate::types::StopReason;

use super::fragments::FragmentSender;
use super::text::TextStreamer;
use super::TokenSink;

/// Decodes tokens into fragments and forwards them to the fragment queue,
/// checking the accumulated text against the stop words after every fragment.
///
/// On a match the stop signal is set, the matching fragment is withheld, and
/// the queue is closed: the reader only ever sees fragments produced strictly
/// before the one that completed the stop word. Tokens arriving after that
/// (the decode loop notices the signal one step late at most) are ignored.
pub struct StopwordStreamer {
    text: TextStreamer,
    stop_words: StopWords,
    signal: StopSignal,
    sender: Option<FragmentSender>,
    generated: String,
}

impl StopwordStreamer {
    pub fn new(
        text: TextStreamer,
        stop_words: StopWords,
        signal: StopSignal,
        sender: FragmentSender,
    ) -> Self {
        Self {
            text,
            stop_words,
            signal,
            sender: Some(sender),
            generated: String::new(),
        }
    }

    /// Whether the queue has been closed.
    pub fn is_finished(&self) -> bool {
        self.sender.is_none()
    }

    /// Everything decoded so far, including a withheld triggering fragment.
    pub fn generated_text(&self) -> &str {
        &self.generated
    }

    /// Close the queue with an error. No-op once finished.
    pub fn fail(&mut self, err: ChatError) {
        if let Some(sender) = self.sender.take() {
            sender.fail(err);
        }
    }

    fn finish(&mut self, reason: StopReason) {
        if let Some(sender) = self.sender.take() {
            sender.finish(reason);
        }
    }

    fn on_finalized_text(&mut self, fragment: Option<String>, stream_end: Option<StopReason>) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };

        if let Some(fragment) = fragment {
            self.generated.push_str(&fragment);
            let matched = self.stop_words.find_in(&self.generated).map(str::to_owned);
            if let Some(word) = matched {
                debug!(stop_word = %word, "stop word detected, halting generation");
                self.signal.stop();
                self.finish(StopReason::StopWord);
                return;
            }
            if !sender.send(fragment) {
                self.signal.stop();
            }
        }

        if let Some(reason) = stream_end {
            self.finish(reason);
        }
    }
}

impl TokenSink for StopwordStreamer {
    fn put(&mut self, tokens: &[u32]) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        let fragment = self.text.push(tokens)?;
        self.on_finalized_text(fragment, None);
        Ok(())
    }

    fn end(&mut self, reason: StopReason) -> Result<()> {
        if self.is_finished() {
            return Ok(());
        }
        let tail = self.text.flush()?;
        self.on_finalized_text(tail, Some(reason));
        Ok(())
    }
}
