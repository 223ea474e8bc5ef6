//! Per-call fragment queue between the generation thread and the reader.
//!
//! Fragments are delivered in production order. The reader sees the end of
//! the stream only after every fragment sent before the sender finished has
//! been yielded.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::{ChatError, Result};
use crate::stop::StopSignal;
use crate::types::StopReason;

type Fragment = Result<String>;

/// Set-once record of why a call finished.
#[derive(Debug, Clone, Default)]
pub struct FinishCell(Arc<OnceLock<StopReason>>);

impl FinishCell {
    /// Record `reason` unless a reason was already recorded.
    pub fn record(&self, reason: StopReason) -> bool {
        self.0.set(reason).is_ok()
    }

    pub fn get(&self) -> Option<StopReason> {
        self.0.get().copied()
    }
}

/// Create the queue for one generation call.
///
/// `signal` is set when the returned stream is dropped before it finished,
/// which is how an abandoned reader cancels the generation behind it.
pub fn fragment_channel(signal: StopSignal) -> (FragmentSender, FragmentStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let finish = FinishCell::default();
    (
        FragmentSender {
            tx,
            finish: finish.clone(),
            closed: false,
        },
        FragmentStream {
            rx,
            signal,
            finish,
            exhausted: false,
        },
    )
}

/// Producer half, owned by the streamer on the generation thread.
///
/// Dropping it without [`finish`](Self::finish) or [`fail`](Self::fail),
/// as happens when the worker unwinds, ends the stream with an error.
#[derive(Debug)]
pub struct FragmentSender {
    tx: mpsc::UnboundedSender<Fragment>,
    finish: FinishCell,
    closed: bool,
}

impl FragmentSender {
    /// Enqueue a fragment. Returns `false` once the reader is gone.
    pub fn send(&self, text: String) -> bool {
        self.tx.send(Ok(text)).is_ok()
    }

    /// Close the queue, recording why generation ended.
    pub fn finish(mut self, reason: StopReason) {
        self.finish.record(reason);
        self.closed = true;
    }

    /// Close the queue with an error the reader will observe last.
    pub fn fail(mut self, err: ChatError) {
        let _ = self.tx.send(Err(err));
        self.closed = true;
    }

    pub fn finish_cell(&self) -> FinishCell {
        self.finish.clone()
    }
}

impl Drop for FragmentSender {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.tx.send(Err(ChatError::Stream(
                "generation ended without finishing".into(),
            )));
        }
    }
}

/// Consumer half: a finite, one-shot stream of fragments.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<Fragment>,
    signal: StopSignal,
    finish: FinishCell,
    exhausted: bool,
}

impl FragmentStream {
    /// Why generation ended. `None` until the producer finished.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.finish.get()
    }

    pub fn finish_cell(&self) -> FinishCell {
        self.finish.clone()
    }

    /// Drain the stream into one string, failing on the first error.
    pub async fn collect_text(mut self) -> Result<String> {
        use futures::StreamExt;

        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    /// Iterate from synchronous code. Must not be called on an async runtime thread.
    pub fn into_blocking_iter(self) -> BlockingFragments {
        BlockingFragments { inner: self }
    }
}

impl Stream for FragmentStream {
    type Item = Fragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exhausted {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(None) => {
                this.exhausted = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        if !self.exhausted {
            self.signal.stop();
        }
    }
}

/// Blocking iterator over a [`FragmentStream`].
#[derive(Debug)]
pub struct BlockingFragments {
    inner: FragmentStream,
}

impl BlockingFragments {
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.stop_reason()
    }
}

impl Iterator for BlockingFragments {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.inner.exhausted {
            return None;
        }
        let next = self.inner.rx.blocking_recv();
        if next.is_none() {
            self.inner.exhausted = true;
        }
        next
    }
}
