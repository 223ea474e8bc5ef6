//! Static description of the configured model.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Compute backend a model runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum Accelerator {
    #[serde(rename = "External API")]
    #[strum(serialize = "External API")]
    ExternalApi,
    #[serde(rename = "GPU")]
    #[strum(serialize = "GPU")]
    Gpu,
    #[serde(rename = "CPU")]
    #[strum(serialize = "CPU")]
    Cpu,
}

/// Descriptive record served by `GET /chat/info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    /// Backend family, e.g. "OpenAI".
    pub name: String,
    /// Underlying model identifier.
    pub model: String,
    pub accelerator: Accelerator,
}
