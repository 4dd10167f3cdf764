use async_trait::async_trait;
use thiserror::Error;
use url::Url;
use weddingwin_bridge_protocol::Delivery;

use crate::redirect::CallbackTarget;

/// How an external authentication session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCompletion {
    /// The session observed the callback address and returned the final URL.
    Redirected(String),
    /// The user closed the session without finishing.
    Dismissed,
    /// The platform hands the redirect to the OS link mechanism instead; the
    /// result arrives later through the deep-link path.
    DeferredToDeepLink,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("external authentication session is not available: {0}")]
    Unavailable(String),

    #[error("external authentication session failed: {0}")]
    Failed(String),
}

/// Platform primitive that opens a browser surface outside the embedded page.
#[async_trait]
pub trait ExternalAuthSession: Send + Sync {
    /// Opens `url` and resolves when the provider redirects to `callback`
    /// or the user dismisses the session.
    async fn authenticate(
        &self,
        url: &Url,
        callback: &CallbackTarget,
    ) -> Result<SessionCompletion, SessionError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("page is not reachable: {0}")]
    Unreachable(String),

    #[error("failed to encode delivery: {0}")]
    Encode(#[from] weddingwin_bridge_protocol::ProtocolError),
}

/// Hands a terminal delivery to the hosted page.
pub trait PageSink: Send + Sync {
    fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError>;
}
