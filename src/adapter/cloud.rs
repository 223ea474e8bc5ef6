//! OpenAI Chat Completions backend.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OpenAiConfig;
use crate::error::{ChatError, Result};
use crate::types::{
    Accelerator, ChatMessage, GenerationConfig, ModelInfo, StopReason, TextStream, Usage,
};
use crate::util::usage::{cost_for_tokens, UsageTracker};

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error};
use super::ModelAdapter;

/// The API accepts at most this many stop sequences.
const MAX_STOP_SEQUENCES: usize = 4;

/// Adapter for the metered OpenAI chat API.
///
/// Every successful call reports its token count to the shared
/// [`UsageTracker`], which logs the running total and estimated cost.
pub struct CloudAdapter {
    model: String,
    api_key: String,
    base_url: String,
    usage: UsageTracker,
    last_stop: Arc<Mutex<Option<StopReason>>>,
}

impl CloudAdapter {
    /// Fails when no API token is configured.
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .token
            .as_ref()
            .map(|t| t.expose().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ChatError::Configuration(
                    "No OpenAI token provided! Set OPENAI_TOKEN or choose the GPU or CPU backend."
                        .into(),
                )
            })?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            usage: UsageTracker::new(),
            last_stop: Arc::new(Mutex::new(None)),
        })
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    fn build_request_body(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        let Some(obj) = body.as_object_mut() else {
            return body;
        };

        if let Some(max) = config.max_new_tokens {
            obj.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = config.temperature {
            obj.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = config.top_p {
            obj.insert("top_p".into(), top_p.into());
        }
        if let Some(penalty) = config.repetition_penalty {
            obj.insert("frequency_penalty".into(), penalty.into());
        }
        if let Some(seed) = config.seed {
            obj.insert("seed".into(), seed.into());
        }

        let stops: Vec<&str> = stop_words
            .iter()
            .map(String::as_str)
            .filter(|w| !w.is_empty())
            .collect();
        if stops.len() > MAX_STOP_SEQUENCES {
            warn!(
                count = stops.len(),
                "too many stop words for the API, keeping the first {MAX_STOP_SEQUENCES}"
            );
        }
        if !stops.is_empty() {
            let stops = &stops[..stops.len().min(MAX_STOP_SEQUENCES)];
            obj.insert("stop".into(), serde_json::json!(stops));
        }
        if stream {
            obj.insert(
                "stream_options".into(),
                serde_json::json!({ "include_usage": true }),
            );
        }

        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

fn log_usage(tracker: &UsageTracker, usage: &Usage) {
    let total = tracker.record(usage);
    info!(
        used_tokens = usage.total_tokens,
        total_tokens = total.total_tokens,
        cost_usd = %format!("{:.4}", cost_for_tokens(total.total_tokens)),
        "OpenAI usage"
    );
}

fn parse_finish_reason(s: &str) -> StopReason {
    match s {
        "length" => StopReason::MaxTokens,
        _ => StopReason::EndOfText,
    }
}

#[async_trait]
impl ModelAdapter for CloudAdapter {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "OpenAI".into(),
            model: self.model.clone(),
            accelerator: Accelerator::ExternalApi,
        }
    }

    fn default_config(&self) -> GenerationConfig {
        GenerationConfig::builder()
            .temperature(1.0)
            .top_p(1.0)
            .repetition_penalty(0.0)
            .max_new_tokens(256)
            .build()
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<String> {
        *self.last_stop.lock() = None;
        let body = self.build_request_body(messages, config, stop_words, false);
        debug!(model = %self.model, "OpenAI generate");

        let data: ChatCompletionResponse = self.send(&body).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::api(200, "No choices in OpenAI response"))?;

        log_usage(&self.usage, &data.usage.map(Usage::from).unwrap_or_default());
        let reason = choice
            .finish_reason
            .as_deref()
            .map(parse_finish_reason)
            .unwrap_or(StopReason::EndOfText);
        *self.last_stop.lock() = Some(reason);

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn generate_streaming(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stop_words: &[String],
    ) -> Result<TextStream> {
        *self.last_stop.lock() = None;
        let body = self.build_request_body(messages, config, stop_words, true);
        debug!(model = %self.model, "OpenAI generate_streaming");

        let byte_stream = self.send(&body).await?.bytes_stream();
        let tracker = self.usage.clone();
        let last_stop = Arc::clone(&self.last_stop);

        let stream = async_stream::stream! {
            // Raw bytes: a UTF-8 sequence may be split across network chunks.
            let mut buffer: Vec<u8> = Vec::new();
            let mut usage = Usage::default();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ChatError::Network(e));
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = parse_sse_data(&line) else {
                        continue;
                    };
                    let chunk = match serde_json::from_str::<StreamChunk>(data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            debug!(error = %e, "skipping unparseable stream chunk");
                            continue;
                        }
                    };
                    if let Some(u) = chunk.usage {
                        usage = u.into();
                    }
                    if let Some(choice) = chunk.choices.into_iter().next() {
                        if let Some(reason) = choice.finish_reason.as_deref() {
                            *last_stop.lock() = Some(parse_finish_reason(reason));
                        }
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            yield Ok(text);
                        }
                    }
                }
            }

            log_usage(&tracker, &usage);
        };

        Ok(Box::pin(stream))
    }

    fn last_stop_reason(&self) -> Option<StopReason> {
        *self.last_stop.lock()
    }
}

// OpenAI API response types (internal)

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OpenAiConfig, Secret};

    fn adapter() -> CloudAdapter {
        CloudAdapter::new(&OpenAiConfig {
            token: Some(Secret::new("sk-test")),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn request_body_maps_generation_knobs() {
        let config = GenerationConfig::builder()
            .temperature(0.5)
            .repetition_penalty(0.3)
            .max_new_tokens(42)
            .build();
        let body = adapter().build_request_body(
            &[ChatMessage::user("hi")],
            &config,
            &["a".into(), "".into(), "b".into()],
            false,
        );
        assert_eq!(body["max_tokens"], 42);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["stop"], serde_json::json!(["a", "b"]));
        assert!(body.get("stream_options").is_none());
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn stop_words_are_capped() {
        let words: Vec<String> = (0..6).map(|i| format!("w{i}")).collect();
        let body =
            adapter().build_request_body(&[], &GenerationConfig::default(), &words, true);
        assert_eq!(body["stop"].as_array().map(Vec::len), Some(MAX_STOP_SEQUENCES));
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let err = CloudAdapter::new(&OpenAiConfig::default()).err().unwrap();
        assert!(err.is_fatal());
    }
}
