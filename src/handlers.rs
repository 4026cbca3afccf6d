use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::Json;
use log::{error, info, warn};
use serde_json::Value;

use crate::config::Destination;
use crate::error::RelayError;
use crate::types::{FileUpload, HealthResponse, Submission, UpstreamRequest, DEFAULT_MIME_TYPE};
use crate::upstream::{normalize, Upstream};

pub struct AppState {
    pub destination: Destination,
    pub upstream: Arc<dyn Upstream>,
    pub api_key: Option<String>,
}

fn input_error(err: MultipartError) -> RelayError {
    RelayError::Input(err.body_text())
}

async fn read_submission(multipart: &mut Multipart) -> Result<Submission, RelayError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(input_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "message" => {
                submission.message = Some(field.text().await.map_err(input_error)?);
            }
            "date" => {
                let date = field.text().await.map_err(input_error)?;
                if !date.is_empty() {
                    submission.date = Some(date);
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let mime_type = field.content_type().unwrap_or("").to_string();
                let content = field.bytes().await.map_err(input_error)?;

                // An untouched file input still posts an empty, nameless part.
                if file_name.is_empty() && content.is_empty() {
                    continue;
                }

                submission.file = Some(FileUpload {
                    name: if file_name.is_empty() {
                        "file".to_string()
                    } else {
                        file_name
                    },
                    mime_type: if mime_type.is_empty() {
                        DEFAULT_MIME_TYPE.to_string()
                    } else {
                        mime_type
                    },
                    content: content.to_vec(),
                });
            }
            _ => {}
        }
    }

    Ok(submission)
}

pub async fn send(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, RelayError> {
    let (token, chat_id) = state.destination.resolve().map_err(|e| {
        warn!("Rejecting send: {}", e);
        e
    })?;

    let mut multipart = multipart.map_err(|e| RelayError::Input(e.body_text()))?;
    let submission = read_submission(&mut multipart).await.map_err(|e| {
        warn!("Rejecting send: {}", e);
        e
    })?;

    let request = UpstreamRequest::build(chat_id, submission);
    match &request {
        UpstreamRequest::Text(send) => {
            info!("Relaying text ({} chars, date {:?})", send.text.chars().count(), send.date)
        }
        UpstreamRequest::File(send) => info!(
            "Relaying file {} ({}, {} bytes, date {:?})",
            send.file.name,
            send.file.mime_type,
            send.file.content.len(),
            send.date
        ),
    }

    let reply = state.upstream.post(token, request).await.map_err(|e| {
        error!("Upstream call failed: {}", e);
        e
    })?;
    info!("Upstream responded with status {}", reply.status);

    Ok(Json(normalize(reply)?))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = if state.destination.is_configured() {
        "ok"
    } else {
        "not_configured"
    };
    Json(HealthResponse {
        status: status.to_string(),
    })
}
