//! Service configuration (layered: defaults < TOML file < environment).
//!
//! The file lives at `~/.ragchat/config.toml` unless a path is given
//! explicitly. Environment variables (after loading `.env`, if present)
//! override anything the file sets.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::prompt::PromptTemplate;

/// Which chat backend to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum Backend {
    #[strum(serialize = "OPENAI")]
    OpenAi,
    #[strum(serialize = "GPU")]
    Gpu,
    #[default]
    #[strum(serialize = "CPU")]
    Cpu,
}

impl TryFrom<String> for Backend {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self> {
        Backend::from_str(value.trim()).map_err(|_| {
            ChatError::Configuration(format!(
                "unknown chat model '{value}', expected one of OPENAI, GPU, CPU"
            ))
        })
    }
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub token: Option<Secret>,
    pub model: String,
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            token: None,
            model: "gpt-3.5-turbo".into(),
            base_url: "https://api.openai.com/v1".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub base_model: String,
    pub revision: Option<String>,
    /// Weight dtype: `f16`, `bf16` or `f32`.
    pub dtype: String,
    /// Use fused attention kernels when the binary was built with them.
    pub apply_optimizations: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            base_model: "meta-llama/Llama-2-7b-hf".into(),
            revision: None,
            dtype: "f16".into(),
            apply_optimizations: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub repository: String,
    pub filename: String,
    pub tokenizer_repository: String,
    pub threads: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            repository: "TheBloke/Llama-2-7B-GGUF".into(),
            filename: "llama-2-7b.Q4_K_M.gguf".into(),
            tokenizer_repository: "hf-internal-testing/llama-tokenizer".into(),
            threads: 8,
        }
    }
}

/// Everything the service reads at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub chat_model: Backend,
    /// Requests admitted at once is one less than this.
    pub concurrency_limit: usize,
    pub hf_token: Option<Secret>,
    /// Cap on prompt plus generated tokens for the local backends.
    pub chat_max_length: usize,
    pub openai: OpenAiConfig,
    pub gpu: GpuConfig,
    pub cpu: CpuConfig,
    pub prompt: PromptTemplate,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8001,
            chat_model: Backend::default(),
            concurrency_limit: 5,
            hf_token: None,
            chat_max_length: 2000,
            openai: OpenAiConfig::default(),
            gpu: GpuConfig::default(),
            cpu: CpuConfig::default(),
            prompt: PromptTemplate::default(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then the TOML file, then the process environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "reading config file");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ChatError::Configuration(e.to_string()))
    }

    /// Override fields from environment variables resolved through `lookup`.
    /// Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("CHATMODEL") {
            self.chat_model = Backend::try_from(v)?;
        }
        if let Some(v) = var("CONCURRENCY_LIMIT").or_else(|| var("CONCURENCY_LIMIT")) {
            self.concurrency_limit = parse_number("CONCURRENCY_LIMIT", &v)?;
        }
        if let Some(v) = var("HOST") {
            self.host = v;
        }
        if let Some(v) = var("PORT") {
            self.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = var("HUGGINGFACE_TOKEN") {
            self.hf_token = Some(Secret::new(v));
        }
        if let Some(v) = var("CHAT_MAX_LENGTH") {
            self.chat_max_length = parse_number("CHAT_MAX_LENGTH", &v)?;
        }

        if let Some(v) = var("OPENAI_TOKEN") {
            self.openai.token = Some(Secret::new(v));
        }
        if let Some(v) = var("OPENAI_MODEL") {
            self.openai.model = v;
        }
        if let Some(v) = var("OPENAI_BASE_URL") {
            self.openai.base_url = v;
        }

        if let Some(v) = var("BASE_CHAT_MODEL") {
            self.gpu.base_model = v;
        }
        if let Some(v) = var("BASE_CHAT_MODEL_REVISION") {
            self.gpu.revision = Some(v);
        }
        if let Some(v) = var("GPU_DTYPE") {
            self.gpu.dtype = v;
        }
        if let Some(v) = var("CHAT_APPLY_OPTIMIZATIONS") {
            self.gpu.apply_optimizations = parse_bool(&v);
        }

        if let Some(v) = var("CPU_MODEL_REPO") {
            self.cpu.repository = v;
        }
        if let Some(v) = var("CPU_MODEL_FILENAME") {
            self.cpu.filename = v;
        }
        if let Some(v) = var("CPU_TOKENIZER_REPO") {
            self.cpu.tokenizer_repository = v;
        }
        if let Some(v) = var("CPU_MODEL_THREADS") {
            self.cpu.threads = parse_number("CPU_MODEL_THREADS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(ChatError::Configuration(
                "concurrency limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `~/.ragchat/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".ragchat").join("config.toml"))
}

/// Truthy spellings accepted for boolean settings; anything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ChatError::Configuration(format!("{key} must be a number, got '{value}'")))
}
