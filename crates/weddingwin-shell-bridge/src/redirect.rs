//! The shell's HTTPS callback address and the authorization URL rewrite.

use url::Url;

use crate::error::BridgeError;

const REDIRECT_URI: &str = "redirect_uri";
const CLIENT_ID: &str = "client_id";
const STATE: &str = "state";

/// The fixed HTTPS address sign-in providers redirect back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    url: Url,
}

impl CallbackTarget {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let url = Url::parse(raw.trim()).map_err(|source| BridgeError::invalid_url(raw, source))?;
        if url.scheme() != "https" || url.host_str().is_none_or(str::is_empty) {
            return Err(BridgeError::InsecureCallback(raw.to_string()));
        }
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Same scheme, host, effective port and path; query and fragment are
    /// ignored, as is a trailing slash on the path.
    pub fn matches(&self, candidate: &Url) -> bool {
        candidate.scheme() == self.url.scheme()
            && candidate.host_str() == self.url.host_str()
            && candidate.port_or_known_default() == self.url.port_or_known_default()
            && trim_path(candidate.path()) == trim_path(self.url.path())
    }
}

fn trim_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Points the authorization request's `redirect_uri` at the shell callback.
///
/// Every existing `redirect_uri` is replaced by a single one in the position
/// of the first; other parameters keep their order. A missing `redirect_uri`
/// is appended, and `client_id` is filled in when the page left it out.
pub fn rewrite_redirect_uri(
    auth_url: &str,
    callback: &CallbackTarget,
    client_id: Option<&str>,
) -> Result<Url, BridgeError> {
    let mut url =
        Url::parse(auth_url.trim()).map_err(|source| BridgeError::invalid_url(auth_url, source))?;

    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut redirect_written = false;
    let mut has_client_id = false;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            REDIRECT_URI if redirect_written => {}
            REDIRECT_URI => {
                if value != callback.as_str() {
                    tracing::debug!(requested = %value, "overriding page-supplied redirect_uri");
                }
                pairs.push((REDIRECT_URI.to_string(), callback.as_str().to_string()));
                redirect_written = true;
            }
            CLIENT_ID => {
                has_client_id = !value.is_empty();
                pairs.push((key.into_owned(), value.into_owned()));
            }
            _ => pairs.push((key.into_owned(), value.into_owned())),
        }
    }
    if !has_client_id {
        if let Some(client_id) = client_id {
            pairs.retain(|(key, _)| key != CLIENT_ID);
            pairs.push((CLIENT_ID.to_string(), client_id.to_string()));
        }
    }
    if !redirect_written {
        pairs.push((REDIRECT_URI.to_string(), callback.as_str().to_string()));
    }

    url.query_pairs_mut().clear().extend_pairs(pairs);
    Ok(url)
}

/// Returns the URL's OAuth `state`. When the page sent none (or an empty
/// one), `fallback` is appended as the state and returned.
pub fn ensure_state(url: &mut Url, fallback: &str) -> String {
    if let Some(state) = state_param(url) {
        return state;
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != STATE)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(STATE, fallback);
    fallback.to_string()
}

/// The OAuth `state` value of an authorization URL, if any.
pub(crate) fn state_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == STATE && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
