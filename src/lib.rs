//! ragchat — chat model service for retrieval QA.
//!
//! One [`ModelAdapter`](adapter::ModelAdapter) interface over a metered cloud
//! API and two in-process backends (CUDA and quantized CPU). Local generation
//! streams text fragments as they are decoded, stops on caller-supplied stop
//! words, and is cancelled when the reader goes away. A process-wide
//! [`RequestLimiter`](limiter::RequestLimiter) rejects work beyond the
//! configured concurrency instead of queueing it.
//!
//! # Quick Start
//!
//! ```no_run
//! use ragchat::adapter::create_adapter;
//! use ragchat::config::AppConfig;
//! use ragchat::types::ChatMessage;
//!
//! # async fn example() -> ragchat::error::Result<()> {
//! let config = AppConfig::load(None)?;
//! let adapter = create_adapter(&config)?;
//! adapter.load().await?;
//!
//! let defaults = adapter.default_config();
//! let answer = adapter
//!     .generate(&[ChatMessage::user("What is RAG?")], &defaults, &[])
//!     .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod limiter;
pub mod prompt;
pub mod server;
pub mod stop;
pub mod stream;
pub mod types;
pub mod util;
