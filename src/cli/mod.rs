//! Command-line arguments for the `ragchat` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Retrieval QA chat service
#[derive(Parser, Debug)]
#[command(name = "ragchat", version, about = "Chat model service over cloud and local LLM backends")]
pub struct Cli {
    /// TOML config file (default: ~/.ragchat/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind, overriding HOST
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind, overriding PORT
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Apply command-line overrides, which win over file and environment.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}
