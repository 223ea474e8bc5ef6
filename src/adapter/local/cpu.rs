//! Quantized (GGUF) Llama on the CPU.

use std::sync::Arc;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_llama::ModelWeights;
use tracing::info;

use crate::codec::HfTokenCodec;
use crate::config::CpuConfig;
use crate::error::{ChatError, Result};
use crate::prompt::PromptTemplate;
use crate::types::{Accelerator, GenerationConfig, ModelInfo};

use super::generate::CausalLm;
use super::{hub, LocalBackend, LocalEngine};

/// Loads a GGUF file from `config.repository` and runs it on a dedicated
/// pool of `config.threads` threads.
pub struct CpuBackend {
    config: CpuConfig,
    hf_token: Option<String>,
    template: PromptTemplate,
    max_length: usize,
}

impl CpuBackend {
    pub fn new(
        config: CpuConfig,
        hf_token: Option<String>,
        template: PromptTemplate,
        max_length: usize,
    ) -> Result<Self> {
        if config.threads == 0 {
            return Err(ChatError::Configuration("CPU_MODEL_THREADS must be at least 1".into()));
        }
        Ok(Self {
            config,
            hf_token,
            template,
            max_length,
        })
    }

    /// Sampling defaults advertised by this backend.
    pub fn generation_defaults() -> GenerationConfig {
        GenerationConfig::builder()
            .temperature(0.8)
            .top_p(0.9)
            .top_k(40)
            .repetition_penalty(1.1)
            .max_new_tokens(256)
            .build()
    }
}

impl LocalBackend for CpuBackend {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "Huggingface".into(),
            model: format!("{}/{}", self.config.repository, self.config.filename),
            accelerator: Accelerator::Cpu,
        }
    }

    fn default_config(&self) -> GenerationConfig {
        Self::generation_defaults()
    }

    fn load_engine(&self) -> Result<LocalEngine> {
        let token = self.hf_token.as_deref();
        let model_repo = hub::open_repo(&self.config.repository, None, token)?;
        let model_path = hub::fetch(&model_repo, &self.config.filename)?;
        let tokenizer_repo = hub::open_repo(&self.config.tokenizer_repository, None, token)?;
        let tokenizer_path = hub::fetch(&tokenizer_repo, "tokenizer.json")?;

        let mut file = std::fs::File::open(&model_path)?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(&model_path))?;
        let eos = content
            .metadata
            .get("tokenizer.ggml.eos_token_id")
            .and_then(|v| v.to_u32().ok());
        let weights = ModelWeights::from_gguf(content, &mut file, &Device::Cpu)?;
        info!(path = %model_path.display(), threads = self.config.threads, "GGUF model loaded");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("ragchat-cpu-{i}"))
            .build()
            .map_err(|e| ChatError::Configuration(format!("cannot start CPU thread pool: {e}")))?;

        let codec = HfTokenCodec::from_file(tokenizer_path, eos)?;
        Ok(LocalEngine::new(
            Box::new(QuantizedModel { weights }),
            Arc::new(codec),
            self.template.clone(),
            self.max_length,
        )
        .with_thread_pool(pool))
    }
}

struct QuantizedModel {
    weights: ModelWeights,
}

impl CausalLm for QuantizedModel {
    fn forward(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor> {
        let input = Tensor::new(tokens, &Device::Cpu)?.unsqueeze(0)?;
        Ok(self.weights.forward(&input, index_pos)?)
    }

    // The kv cache restarts whenever a forward pass begins at position 0.
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}
