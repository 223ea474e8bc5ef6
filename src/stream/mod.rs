//! Streaming machinery shared by the local backends.
//!
//! A decode loop pushes token batches into a [`TokenSink`]. The
//! [`StopwordStreamer`] sink decodes them with a [`TextStreamer`], screens
//! them against the stop words, and forwards printable fragments through the
//! [`fragment_channel`] to whoever reads the [`FragmentStream`].

pub mod fragments;
pub mod stopword;
pub mod text;

pub use fragments::{fragment_channel, BlockingFragments, FinishCell, FragmentSender, FragmentStream};
pub use stopword::StopwordStreamer;
pub use text::TextStreamer;

use crate::error::Result;
use crate::types::StopReason;

/// Receives tokens from a decode loop.
pub trait TokenSink: Send {
    /// Called with the prompt tokens first, then with each generated batch.
    fn put(&mut self, tokens: &[u32]) -> Result<()>;

    /// Called once when the decode loop exits.
    fn end(&mut self, reason: StopReason) -> Result<()>;
}
