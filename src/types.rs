use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file attached to a submission, fully buffered.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

/// One multipart submission from the compose form.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub message: Option<String>,
    pub file: Option<FileUpload>,
    /// Unix seconds, forwarded verbatim.
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextSend {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileSend {
    pub chat_id: String,
    pub caption: String,
    pub date: Option<String>,
    pub file: FileUpload,
}

#[derive(Debug, Clone)]
pub enum UpstreamRequest {
    Text(TextSend),
    File(FileSend),
}

impl UpstreamRequest {
    /// A present file always wins over the message, which becomes the caption.
    pub fn build(chat_id: &str, submission: Submission) -> Self {
        let Submission {
            message,
            file,
            date,
        } = submission;
        let message = message.unwrap_or_default();

        match file {
            Some(file) => UpstreamRequest::File(FileSend {
                chat_id: chat_id.to_string(),
                caption: message,
                date,
                file,
            }),
            None => UpstreamRequest::Text(TextSend {
                chat_id: chat_id.to_string(),
                text: message,
                date,
            }),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            UpstreamRequest::Text(_) => "sendMessage",
            UpstreamRequest::File(_) => "sendFile",
        }
    }
}

/// Raw upstream HTTP response, whatever its status.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub ok: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}
