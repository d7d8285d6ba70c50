use thiserror::Error;

/// Failure of a single read or action request.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("cache key is inactive; nothing to request")]
    InactiveKey,
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server error: status {status} body {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request was interrupted before it completed")]
    Interrupted,
}

impl NetworkError {
    /// HTTP status of a non-success response, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}
