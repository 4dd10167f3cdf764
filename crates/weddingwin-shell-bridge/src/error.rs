use thiserror::Error;
use weddingwin_bridge_protocol::ProtocolError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("callback url must be an https address on the shell domain: {0}")]
    InsecureCallback(String),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl BridgeError {
    pub(crate) fn invalid_url(url: &str, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            source,
        }
    }
}
