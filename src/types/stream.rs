//! Streaming types.

use futures::stream::BoxStream;

use crate::error::ChatError;

/// A one-shot, finite stream of generated text fragments.
pub type TextStream = BoxStream<'static, Result<String, ChatError>>;
