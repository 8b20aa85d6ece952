use thiserror::Error;

/// Failures at the client boundary: REST calls and the stream transport.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach local endpoint '{url}': {message}. Start the server or update RUNSTREAM_API_URL.")]
    LocalConnect { url: String, message: String },
    #[error("cannot reach endpoint '{url}': {message}")]
    Connect { url: String, message: String },
    #[error("request to '{url}' timed out: {message}")]
    Timeout { url: String, message: String },
    #[error("endpoint '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to '{url}' failed: {message}")]
    Request { url: String, message: String },
    #[error("stream connection to '{url}' failed: {message}")]
    Transport { url: String, message: String },
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

impl ClientError {
    /// HTTP status for non-2xx responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Renders a boundary failure the way the chat transcript shows it:
/// `"{action} ({status})."` for HTTP statuses, `"{action}: {error}"` otherwise.
pub fn describe_failure(action: &str, error: &ClientError) -> String {
    match error.status() {
        Some(status) => format!("{action} ({status})."),
        None => format!("{action}: {error}"),
    }
}
