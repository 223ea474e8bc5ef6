//! Backends that run the model in-process.
//!
//! A [`LocalEngine`] owns a loaded [`CausalLm`] and its tokenizer. Every
//! streaming call gets its own fragment queue and stop signal; the decode
//! loop runs on a dedicated thread and feeds a [`StopwordStreamer`], while
//! the caller reads fragments as they arrive.

pub mod cpu;
pub mod generate;
pub mod gpu;
mod hub;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec::TokenCodec;
use crate::error::{ChatError, Result};
use crate::prompt::PromptTemplate;
use crate::stop::{StopSignal, StopWords};
use crate::stream::{fragment_channel, FinishCell, FragmentStream, StopwordStreamer, TextStreamer};
use crate::types::{ChatMessage, GenerationConfig, ModelInfo, StopReason, TextStream};

use super::ModelAdapter;

pub use cpu::CpuBackend;
pub use generate::{fit_budget, run_decode_loop, truncate_prompt, CausalLm, DecodeOutcome};
pub use gpu::GpuBackend;

/// A loaded local model ready to generate.
pub struct LocalEngine {
    model: Arc<Mutex<Box<dyn CausalLm>>>,
    codec: Arc<dyn TokenCodec>,
    template: PromptTemplate,
    max_length: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
    last_finish: Mutex<Option<FinishCell>>,
}

impl LocalEngine {
    /// `max_length` caps prompt plus generated tokens; 0 disables truncation.
    pub fn new(
        model: Box<dyn CausalLm>,
        codec: Arc<dyn TokenCodec>,
        template: PromptTemplate,
        max_length: usize,
    ) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            codec,
            template,
            max_length,
            pool: None,
            last_finish: Mutex::new(None),
        }
    }

    /// Run decode loops inside `pool` instead of on the bare worker thread.
    pub fn with_thread_pool(mut self, pool: rayon::ThreadPool) -> Self {
        self.pool = Some(Arc::new(pool));
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Start a generation and return its fragment stream immediately.
    ///
    /// Calls are serialized on the model; a second call waits on the worker
    /// thread until the first one finishes.
    pub fn stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<FragmentStream> {
        if messages.is_empty() {
            return Err(ChatError::InvalidArgument("messages must not be empty".into()));
        }

        let prompt = self.template.build_prompt(messages);
        let requested = config.token_budget();
        let encoded = self.codec.encode(&prompt)?;
        let prompt_len = encoded.len();
        let prompt_ids = truncate_prompt(encoded, requested, self.max_length);
        let budget = fit_budget(prompt_ids.len(), requested, self.max_length);
        if prompt_ids.len() < prompt_len {
            warn!(
                prompt_tokens = prompt_len,
                kept = prompt_ids.len(),
                max_length = self.max_length,
                "prompt truncated to fit the context"
            );
        }

        let signal = StopSignal::new();
        let (sender, fragments) = fragment_channel(signal.clone());
        let finish = fragments.finish_cell();
        *self.last_finish.lock() = Some(finish.clone());

        let mut streamer = StopwordStreamer::new(
            TextStreamer::new(Arc::clone(&self.codec), true),
            StopWords::new(stop_words.iter().cloned()),
            signal.clone(),
            sender,
        );

        let model = Arc::clone(&self.model);
        let pool = self.pool.clone();
        let eos = self.codec.eos_token();
        let mut config = config.clone();
        config.max_new_tokens = Some(budget);

        thread::Builder::new()
            .name("ragchat-generate".into())
            .spawn(move || {
                let mut decode = || {
                    let mut model = model.lock();
                    run_decode_loop(
                        &mut **model,
                        eos,
                        &prompt_ids,
                        &config,
                        &mut streamer,
                        &signal,
                    )
                };
                let result = panic::catch_unwind(AssertUnwindSafe(|| match pool {
                    Some(pool) => pool.install(decode),
                    None => decode(),
                }))
                .unwrap_or_else(|payload| {
                    Err(ChatError::Task(format!(
                        "generation panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
                match result {
                    Ok(outcome) => info!(
                        prompt_tokens = prompt_ids.len(),
                        generated = outcome.generated,
                        reason = %finish.get().unwrap_or(outcome.reason),
                        "generation finished"
                    ),
                    Err(err) => {
                        error!(error = %err, "generation failed");
                        streamer.fail(err);
                    }
                }
            })?;

        debug!(prompt_tokens = prompt_len, budget, "generation started");
        Ok(fragments)
    }

    /// Why the most recent call finished, if it has.
    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_finish.lock().as_ref().and_then(FinishCell::get)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

/// What distinguishes one local backend from another: how its model is
/// obtained and how it describes itself.
pub trait LocalBackend: Send + Sync + 'static {
    fn info(&self) -> ModelInfo;

    fn default_config(&self) -> GenerationConfig;

    /// Download and initialize the model. Blocking; runs off the async runtime.
    fn load_engine(&self) -> Result<LocalEngine>;
}

/// [`ModelAdapter`] over a [`LocalBackend`].
pub struct LocalAdapter<B: LocalBackend> {
    backend: Arc<B>,
    engine: OnceLock<LocalEngine>,
}

impl<B: LocalBackend> LocalAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            engine: OnceLock::new(),
        }
    }

    /// Wrap an engine that is already loaded.
    pub fn with_engine(backend: B, engine: LocalEngine) -> Self {
        let adapter = Self::new(backend);
        let _ = adapter.engine.set(engine);
        adapter
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn engine(&self) -> Result<&LocalEngine> {
        self.engine.get().ok_or(ChatError::NotLoaded)
    }
}

#[async_trait]
impl<B: LocalBackend> ModelAdapter for LocalAdapter<B> {
    async fn load(&self) -> Result<()> {
        if self.engine.get().is_some() {
            return Ok(());
        }
        let backend = Arc::clone(&self.backend);
        let info = backend.info();
        info!(model = %info.model, accelerator = %info.accelerator, "loading model");

        let engine = tokio::task::spawn_blocking(move || backend.load_engine()).await??;
        if self.engine.set(engine).is_err() {
            debug!("model was loaded concurrently, keeping the first instance");
        }
        info!(model = %info.model, "model loaded");
        Ok(())
    }

    fn info(&self) -> ModelInfo {
        self.backend.info()
    }

    fn default_config(&self) -> GenerationConfig {
        self.backend.default_config()
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<String> {
        self.engine()?
            .stream(messages, config, stop_words)?
            .collect_text()
            .await
    }

    async fn generate_streaming(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<TextStream> {
        let fragments = self.engine()?.stream(messages, config, stop_words)?;
        Ok(Box::pin(fragments))
    }

    fn last_stop_reason(&self) -> Option<StopReason> {
        self.engine.get().and_then(LocalEngine::last_stop_reason)
    }
}
