//! Shared test helpers: a mock adapter and a scripted in-process model.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use parking_lot::Mutex;

use ragchat::adapter::local::{CausalLm, LocalBackend, LocalEngine};
use ragchat::adapter::ModelAdapter;
use ragchat::codec::TokenCodec;
use ragchat::error::{ChatError, Result};
use ragchat::prompt::PromptTemplate;
use ragchat::types::*;

pub const EOS: u32 = 0;
pub const VOCAB: usize = 256;

/// One token per character; token 0 is end-of-sequence.
pub struct CharCodec;

impl TokenCodec for CharCodec {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(|c| c as u32).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        Ok(tokens
            .iter()
            .filter(|&&t| t != EOS)
            .filter_map(|&t| char::from_u32(t))
            .collect())
    }

    fn eos_token(&self) -> Option<u32> {
        Some(EOS)
    }
}

/// A model that "predicts" the characters of a fixed reply, then EOS.
pub struct ScriptedModel {
    script: Vec<u32>,
    step: usize,
    delay: Option<Duration>,
    forward_calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            script: reply.chars().map(|c| c as u32).collect(),
            step: 0,
            delay: None,
            forward_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long in every forward pass.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of forward passes.
    pub fn forward_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.forward_calls)
    }
}

impl CausalLm for ScriptedModel {
    fn forward(&mut self, _tokens: &[u32], _index_pos: usize) -> Result<Tensor> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let target = self.script.get(self.step).copied().unwrap_or(EOS) as usize;
        self.step += 1;
        let mut logits = vec![0f32; VOCAB];
        logits[target] = 10.0;
        Ok(Tensor::from_vec(logits, (1, VOCAB), &Device::Cpu)?)
    }

    fn reset(&mut self) -> Result<()> {
        self.step = 0;
        Ok(())
    }
}

/// A [`ScriptedModel`] whose forward pass number `n` panics, once.
pub struct PanicAfter {
    pub inner: ScriptedModel,
    pub n: usize,
    calls: usize,
}

impl PanicAfter {
    pub fn new(inner: ScriptedModel, n: usize) -> Self {
        Self { inner, n, calls: 0 }
    }
}

impl CausalLm for PanicAfter {
    fn forward(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor> {
        self.calls += 1;
        if self.calls == self.n {
            panic!("kernel fault on forward {}", self.n);
        }
        self.inner.forward(tokens, index_pos)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }
}

/// An engine over a [`ScriptedModel`] with the default prompt template.
pub fn scripted_engine(model: ScriptedModel) -> LocalEngine {
    LocalEngine::new(
        Box::new(model),
        Arc::new(CharCodec),
        PromptTemplate::default(),
        0,
    )
}

/// Greedy decoding with the given budget.
pub fn greedy(max_new_tokens: usize) -> GenerationConfig {
    GenerationConfig::builder().max_new_tokens(max_new_tokens).build()
}

/// A local backend whose "download" builds a scripted engine.
pub struct ScriptedBackend {
    pub reply: String,
}

impl LocalBackend for ScriptedBackend {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "Scripted".into(),
            model: "scripted".into(),
            accelerator: Accelerator::Cpu,
        }
    }

    fn default_config(&self) -> GenerationConfig {
        greedy(64)
    }

    fn load_engine(&self) -> Result<LocalEngine> {
        Ok(scripted_engine(ScriptedModel::new(&self.reply)))
    }
}

/// An adapter that replays canned fragments.
pub struct MockAdapter {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    calls: AtomicUsize,
    last_config: Mutex<Option<GenerationConfig>>,
}

impl MockAdapter {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_after: None,
            calls: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        }
    }

    /// Emit `n` fragments, then an error.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<GenerationConfig> {
        self.last_config.lock().clone()
    }

    fn record(&self, config: &GenerationConfig) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock() = Some(config.clone());
    }
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "Mock".into(),
            model: "mock-1".into(),
            accelerator: Accelerator::ExternalApi,
        }
    }

    fn default_config(&self) -> GenerationConfig {
        GenerationConfig::builder()
            .temperature(0.7)
            .max_new_tokens(128)
            .build()
    }

    async fn generate(
        &self,
        _messages: &[ChatMessage],
        config: &GenerationConfig,
        _stop_words: &[String],
    ) -> Result<String> {
        self.record(config);
        if self.fail_after.is_some() {
            return Err(ChatError::Stream("mock failure".into()));
        }
        Ok(self.fragments.concat())
    }

    async fn generate_streaming(
        &self,
        _messages: &[ChatMessage],
        config: &GenerationConfig,
        _stop_words: &[String],
    ) -> Result<TextStream> {
        self.record(config);
        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(ChatError::Stream("mock failure".into())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
