//! Chat routes.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::adapter::ModelAdapter;
use crate::error::{ChatError, Result};
use crate::types::{ChatMessage, GenerationConfig, ModelInfo};

use super::AppState;

/// Body of both prompt routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Partial override of the backend defaults. Unknown keys are ignored.
    #[serde(default)]
    pub config: Option<GenerationConfig>,
    #[serde(default)]
    pub stop_words: Vec<String>,
}

impl ChatRequest {
    /// Merge the request's overrides onto the adapter defaults.
    pub fn resolve_config(&self, adapter: &dyn ModelAdapter) -> Result<GenerationConfig> {
        if self.messages.is_empty() {
            return Err(ChatError::InvalidArgument("messages must not be empty".into()));
        }
        let config = self
            .config
            .clone()
            .unwrap_or_default()
            .merged_onto(&adapter.default_config());
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DefaultConfigResponse {
    pub config: GenerationConfig,
}

pub async fn info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.adapter.info())
}

pub async fn default_config(State(state): State<AppState>) -> Json<DefaultConfigResponse> {
    Json(DefaultConfigResponse {
        config: state.adapter.default_config(),
    })
}

/// Whether a prompt sent now would be admitted.
pub async fn availability(State(state): State<AppState>) -> Json<bool> {
    Json(state.limiter.is_available())
}

pub async fn prompt(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let span = info_span!("chat_prompt", request_id = %Uuid::new_v4());
    async move {
        let config = request.resolve_config(state.adapter.as_ref())?;
        let content = state
            .limiter
            .run(state.adapter.generate(&request.messages, &config, &request.stop_words))
            .await?;
        info!(chars = content.len(), "prompt answered");
        Ok(Json(ChatResponse { content }))
    }
    .instrument(span)
    .await
}

/// Stream the answer as chunked `text/plain`.
///
/// The admission permit lives as long as the response body, so the slot is
/// held until the last fragment is written or the client goes away. A
/// disconnect drops the fragment stream, which cancels the generation.
pub async fn prompt_streaming(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let span = info_span!("chat_prompt_streaming", request_id = %Uuid::new_v4());
    let config = request.resolve_config(state.adapter.as_ref())?;
    let permit = state.limiter.try_acquire()?;
    let mut fragments = state
        .adapter
        .generate_streaming(&request.messages, &config, &request.stop_words)
        .instrument(span.clone())
        .await?;

    let body = async_stream::stream! {
        let _permit = permit;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => yield Ok::<Bytes, ChatError>(Bytes::from(text)),
                Err(err) => {
                    error!(parent: &span, error = %err, "stream aborted");
                    yield Err(err);
                    break;
                }
            }
        }
    };

    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], Body::from_stream(body)).into_response())
}
