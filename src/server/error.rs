//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::{ChatError, ErrorCategory};

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let category = self.category();
        let status = StatusCode::from_u16(category.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match category {
            ErrorCategory::Capacity => debug!(error = %self, "request rejected"),
            ErrorCategory::InvalidRequest => warn!(error = %self, "invalid request"),
            _ => error!(error = %self, %category, "request failed"),
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
