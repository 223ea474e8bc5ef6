//! Chat model adapters: one interface over the cloud API and the local
//! GPU/CPU backends.

pub mod cloud;
pub mod http;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, Backend};
use crate::error::Result;
use crate::types::{ChatMessage, GenerationConfig, ModelInfo, StopReason, TextStream};

pub use cloud::CloudAdapter;
pub use local::{CpuBackend, GpuBackend, LocalAdapter, LocalBackend, LocalEngine};

/// Core trait implemented by every chat backend.
///
/// `config` is expected to be fully resolved (request overrides merged onto
/// [`default_config`](Self::default_config)). Stop words are matched against
/// the generated text only; the text that completes a stop word is never
/// returned.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Prepare the backend. Idempotent; must succeed before generating.
    async fn load(&self) -> Result<()>;

    fn info(&self) -> ModelInfo;

    /// Backend-specific generation defaults.
    fn default_config(&self) -> GenerationConfig;

    /// Produce the complete response text.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<String>;

    /// Produce the response as an ordered stream of text fragments. Dropping
    /// the stream before it ends cancels the generation.
    async fn generate_streaming(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<TextStream>;

    /// Why the most recent call finished, once it has.
    fn last_stop_reason(&self) -> Option<StopReason> {
        None
    }
}

/// Build the adapter selected by `config.chat_model`.
///
/// Nothing heavy happens here; call [`ModelAdapter::load`] afterwards.
pub fn create_adapter(config: &AppConfig) -> Result<Arc<dyn ModelAdapter>> {
    let hf_token = config.hf_token.as_ref().map(|t| t.expose().to_string());
    match config.chat_model {
        Backend::OpenAi => Ok(Arc::new(CloudAdapter::new(&config.openai)?)),
        Backend::Gpu => Ok(Arc::new(LocalAdapter::new(GpuBackend::new(
            config.gpu.clone(),
            hf_token,
            config.prompt.clone(),
            config.chat_max_length,
        )?))),
        Backend::Cpu => Ok(Arc::new(LocalAdapter::new(CpuBackend::new(
            config.cpu.clone(),
            hf_token,
            config.prompt.clone(),
            config.chat_max_length,
        )?))),
    }
}
