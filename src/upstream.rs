use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::error::RelayError;
use crate::types::{UpstreamReply, UpstreamRequest};

/// The outbound side of the relay. One call, one attempt.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn post(
        &self,
        token: &str,
        request: UpstreamRequest,
    ) -> Result<UpstreamReply, RelayError>;
}

pub struct HttpUpstream {
    client: reqwest::Client,
    api_root: String,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(api_root: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_root: api_root.into(),
            timeout,
        })
    }

    fn url(&self, token: &str, method: &str) -> String {
        format!("{}/{}/{}", self.api_root, token, method)
    }

    fn map_err(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            return RelayError::Timeout(self.timeout);
        }
        // The URL carries the token.
        RelayError::Transport(format!("{:#}", anyhow::Error::from(err.without_url())))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn post(
        &self,
        token: &str,
        request: UpstreamRequest,
    ) -> Result<UpstreamReply, RelayError> {
        let url = self.url(token, request.method());

        let builder = match request {
            UpstreamRequest::Text(send) => self.client.post(&url).json(&send),
            UpstreamRequest::File(send) => {
                let part = Part::bytes(send.file.content)
                    .file_name(send.file.name)
                    .mime_str(&send.file.mime_type)
                    .map_err(|e| RelayError::Input(format!("invalid file content type: {}", e)))?;

                let mut form = Form::new()
                    .text("chat_id", send.chat_id)
                    .text("caption", send.caption);
                if let Some(date) = send.date {
                    form = form.text("date", date);
                }
                self.client.post(&url).multipart(form.part("file", part))
            }
        };

        let response = builder.send().await.map_err(|e| self.map_err(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.map_err(e))?;
        debug!("Upstream answered {} with {} bytes", status, body.len());

        Ok(UpstreamReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// Decides success from the upstream body, not the status line alone: the
/// bot API reports application failures as `{"ok": false}` under a 200.
pub fn normalize(reply: UpstreamReply) -> Result<Value, RelayError> {
    let UpstreamReply { status, body } = reply;

    if body.iter().all(u8::is_ascii_whitespace) {
        warn!("Upstream returned an empty body (status {})", status);
        return Err(RelayError::Upstream {
            message: format!("upstream returned an empty response (status {})", status),
            raw: None,
        });
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            warn!("Upstream returned a non-JSON body (status {})", status);
            return Err(RelayError::Upstream {
                message: format!("upstream returned a non-JSON response (status {})", status),
                raw: Some(Value::String(String::from_utf8_lossy(&body).into_owned())),
            });
        }
    };

    let flagged_failure = value.get("ok").and_then(Value::as_bool) == Some(false);
    if flagged_failure || !value.is_object() || !(200..300).contains(&status) {
        let message = upstream_message(&value)
            .unwrap_or_else(|| format!("upstream request failed with status {}", status));
        warn!("Upstream rejected the request (status {}): {}", status, message);
        return Err(RelayError::Upstream {
            message,
            raw: Some(value),
        });
    }

    Ok(value)
}

fn upstream_message(value: &Value) -> Option<String> {
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if let Some(description) = value.get("description").and_then(Value::as_str) {
        return Some(description.to_string());
    }
    match value.get("error") {
        None | Some(Value::Null) => None,
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::{FileSend, FileUpload, TextSend};

    fn reply(status: u16, body: &str) -> UpstreamReply {
        UpstreamReply {
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn success_body_passes_through_unchanged() {
        let value = normalize(reply(200, r#"{"ok":true,"result":{"message_id":42}}"#)).unwrap();
        assert_eq!(value, json!({ "ok": true, "result": { "message_id": 42 } }));
    }

    #[test]
    fn ok_false_under_200_is_a_failure() {
        let err = normalize(reply(200, r#"{"ok":false,"error":"bad chat id"}"#)).unwrap_err();
        match err {
            RelayError::Upstream { message, raw } => {
                assert_eq!(message, "bad chat id");
                assert_eq!(raw, Some(json!({ "ok": false, "error": "bad chat id" })));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn description_is_used_when_error_is_missing() {
        let err = normalize(reply(200, r#"{"ok":false,"description":"chat not found"}"#))
            .unwrap_err();
        assert_eq!(err.to_string(), "chat not found");
    }

    #[test]
    fn non_json_body_is_kept_as_raw_text() {
        let err = normalize(reply(502, "<html>Bad Gateway</html>")).unwrap_err();
        match err {
            RelayError::Upstream { message, raw } => {
                assert!(message.contains("non-JSON"));
                assert_eq!(raw, Some(json!("<html>Bad Gateway</html>")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn empty_body_is_a_failure() {
        let err = normalize(reply(200, "  ")).unwrap_err();
        assert!(matches!(err, RelayError::Upstream { raw: None, .. }));
    }

    #[test]
    fn error_status_without_flag_falls_back_to_status_message() {
        let err = normalize(reply(503, r#"{"retry":true}"#)).unwrap_err();
        assert_eq!(err.to_string(), "upstream request failed with status 503");
    }

    #[test]
    fn non_object_body_under_200_is_a_failure() {
        for body in ["null", "[]", "42"] {
            let err = normalize(reply(200, body)).unwrap_err();
            match err {
                RelayError::Upstream { message, raw } => {
                    assert_eq!(message, "upstream request failed with status 200");
                    assert_eq!(raw, Some(serde_json::from_str::<Value>(body).unwrap()));
                }
                other => panic!("unexpected error for {}: {:?}", body, other),
            }
        }
    }

    #[tokio::test]
    async fn text_send_posts_json_to_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot-token/sendMessage"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "chat_id": "42", "text": "hi", "date": "1700000000" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();
        let reply = upstream
            .post(
                "bot-token",
                UpstreamRequest::Text(TextSend {
                    chat_id: "42".into(),
                    text: "hi".into(),
                    date: Some("1700000000".into()),
                }),
            )
            .await
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(normalize(reply).unwrap(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn file_send_preserves_name_type_and_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot-token/sendFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let content = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46];
        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();
        upstream
            .post(
                "bot-token",
                UpstreamRequest::File(FileSend {
                    chat_id: "42".into(),
                    caption: "look".into(),
                    date: Some("1700000000".into()),
                    file: FileUpload {
                        name: "photo.jpg".into(),
                        mime_type: "image/jpeg".into(),
                        content: content.clone(),
                    },
                }),
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body = &requests[0].body;
        assert!(body.windows(content.len()).any(|w| w == content.as_slice()));

        let text = String::from_utf8_lossy(body).to_lowercase();
        assert!(text.contains(r#"name="file"; filename="photo.jpg""#));
        assert!(text.contains("content-type: image/jpeg"));
        assert!(text.contains(r#"name="chat_id""#));
        assert!(text.contains(r#"name="caption""#));
        assert!(text.contains("1700000000"));
    }

    #[tokio::test]
    async fn file_send_without_date_omits_the_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot-token/sendFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();
        upstream
            .post(
                "bot-token",
                UpstreamRequest::File(FileSend {
                    chat_id: "42".into(),
                    caption: String::new(),
                    date: None,
                    file: FileUpload {
                        name: "notes.txt".into(),
                        mime_type: "text/plain".into(),
                        content: b"hello".to_vec(),
                    },
                }),
            )
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let text = String::from_utf8_lossy(&requests[0].body).to_lowercase();
        assert!(text.contains(r#"name="chat_id""#));
        assert!(text.contains(r#"name="file"; filename="notes.txt""#));
        assert!(!text.contains(r#"name="date""#));
    }

    #[tokio::test]
    async fn error_statuses_are_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();
        let reply = upstream
            .post(
                "bot-token",
                UpstreamRequest::Text(TextSend {
                    chat_id: "42".into(),
                    text: String::new(),
                    date: None,
                }),
            )
            .await
            .unwrap();

        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, b"boom");
    }

    #[tokio::test]
    async fn stalled_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_millis(200)).unwrap();
        let started = Instant::now();
        let err = upstream
            .post(
                "bot-token",
                UpstreamRequest::Text(TextSend {
                    chat_id: "42".into(),
                    text: "hi".into(),
                    date: None,
                }),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, RelayError::Timeout(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn transport_errors_do_not_leak_the_token() {
        let upstream = HttpUpstream::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        let err = upstream
            .post(
                "secret-token",
                UpstreamRequest::Text(TextSend {
                    chat_id: "42".into(),
                    text: "hi".into(),
                    date: None,
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Transport(_)));
        assert!(!err.to_string().contains("secret-token"));
    }
}
