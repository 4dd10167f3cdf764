use thiserror::Error;

/// Errors raised while encoding or decoding bridge payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid bridge payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bridge message url must not be empty")]
    EmptyUrl,

    #[error("bridge message url must be absolute: {url}")]
    RelativeUrl { url: String },
}
