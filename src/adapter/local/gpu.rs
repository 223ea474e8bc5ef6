//! Full-precision Llama on a CUDA device.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use tracing::{info, warn};

use crate::codec::HfTokenCodec;
use crate::config::GpuConfig;
use crate::error::{ChatError, Result};
use crate::prompt::PromptTemplate;
use crate::types::{Accelerator, GenerationConfig, ModelInfo};

use super::generate::CausalLm;
use super::{hub, LocalBackend, LocalEngine};

/// Loads `config.base_model` from the hub onto the first CUDA device.
pub struct GpuBackend {
    config: GpuConfig,
    dtype: DType,
    device: Device,
    hf_token: Option<String>,
    template: PromptTemplate,
    max_length: usize,
}

impl GpuBackend {
    /// Fails when no CUDA device is present or the dtype is unknown.
    pub fn new(
        config: GpuConfig,
        hf_token: Option<String>,
        template: PromptTemplate,
        max_length: usize,
    ) -> Result<Self> {
        let device = Device::cuda_if_available(0)?;
        if !device.is_cuda() {
            return Err(ChatError::Configuration(
                "No GPU available! Choose the CPU or OPENAI backend.".into(),
            ));
        }
        let dtype = config.dtype.parse::<DType>().map_err(|_| {
            ChatError::Configuration(format!("unsupported GPU dtype '{}'", config.dtype))
        })?;
        Ok(Self {
            config,
            dtype,
            device,
            hf_token,
            template,
            max_length,
        })
    }

    /// Sampling defaults advertised by this backend.
    pub fn generation_defaults() -> GenerationConfig {
        GenerationConfig::builder()
            .top_p(0.9)
            .repetition_penalty(1.1)
            .max_new_tokens(256)
            .build()
    }
}

impl LocalBackend for GpuBackend {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "Huggingface".into(),
            model: self.config.base_model.clone(),
            accelerator: Accelerator::Gpu,
        }
    }

    fn default_config(&self) -> GenerationConfig {
        Self::generation_defaults()
    }

    fn load_engine(&self) -> Result<LocalEngine> {
        let repo = hub::open_repo(
            &self.config.base_model,
            self.config.revision.as_deref(),
            self.hf_token.as_deref(),
        )?;
        let config_path = hub::fetch(&repo, "config.json")?;
        let tokenizer_path = hub::fetch(&repo, "tokenizer.json")?;
        let weights = hub::safetensors_files(&repo)?;

        let llama_config: LlamaConfig = serde_json::from_slice(&std::fs::read(config_path)?)?;
        let use_flash_attn = self.config.apply_optimizations && cfg!(feature = "flash-attn");
        if self.config.apply_optimizations && !use_flash_attn {
            warn!("optimizations requested but this build lacks the flash-attn feature");
        }
        let config = llama_config.into_config(use_flash_attn);
        let eos = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => Some(*id),
            Some(LlamaEosToks::Multiple(ids)) => ids.first().copied(),
            None => None,
        };

        info!(shards = weights.len(), dtype = ?self.dtype, use_flash_attn, "loading safetensors");
        // SAFETY: the shards are hub cache files that are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weights, self.dtype, &self.device)? };
        let llama = Llama::load(vb, &config)?;
        let cache = Cache::new(true, self.dtype, &config, &self.device)?;

        let model = LlamaModel {
            llama,
            cache,
            config,
            dtype: self.dtype,
            device: self.device.clone(),
        };
        let codec = HfTokenCodec::from_file(tokenizer_path, eos)?;
        Ok(LocalEngine::new(
            Box::new(model),
            Arc::new(codec),
            self.template.clone(),
            self.max_length,
        ))
    }
}

struct LlamaModel {
    llama: Llama,
    cache: Cache,
    config: Config,
    dtype: DType,
    device: Device,
}

impl CausalLm for LlamaModel {
    fn forward(&mut self, tokens: &[u32], index_pos: usize) -> Result<Tensor> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.llama.forward(&input, index_pos, &mut self.cache)?)
    }

    fn reset(&mut self) -> Result<()> {
        self.cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        Ok(())
    }
}
