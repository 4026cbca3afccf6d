use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use thiserror::Error;

use crate::types::FailureBody;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("token or chat id not configured")]
    NotConfigured,

    #[error("invalid submission: {0}")]
    Input(String),

    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Upstream { message: String, raw: Option<Value> },
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::NotConfigured | RelayError::Input(_) => StatusCode::BAD_REQUEST,
            RelayError::Timeout(_) | RelayError::Transport(_) | RelayError::Upstream { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let raw = match self {
            RelayError::Upstream { raw, .. } => raw,
            _ => None,
        };

        (
            status,
            Json(FailureBody {
                ok: false,
                error,
                raw,
            }),
        )
            .into_response()
    }
}
