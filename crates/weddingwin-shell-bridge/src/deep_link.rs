use url::Url;

use crate::redirect::CallbackTarget;

/// An externally delivered URL, as seen by the deep-link listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingLink {
    Callback(Url),
    /// Some other deep link; left for the rest of the app.
    Unrelated,
    Unparseable,
}

pub fn classify_incoming(raw: &str, target: &CallbackTarget) -> IncomingLink {
    match Url::parse(raw.trim()) {
        Ok(url) if target.matches(&url) => IncomingLink::Callback(url),
        Ok(_) => IncomingLink::Unrelated,
        Err(error) => {
            tracing::debug!(%error, "ignoring unparseable incoming url");
            IncomingLink::Unparseable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDisposition {
    /// Not a callback for this bridge.
    Ignored,
    /// Parsed and delivered (or queued until the page loads).
    Consumed,
    /// A callback whose attempt already has a result.
    Duplicate,
}
