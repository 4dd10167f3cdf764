//! Parsing of provider callback URLs into a terminal outcome.

use serde::Serialize;
use url::Url;
use weddingwin_bridge_protocol::{AuthFailure, SessionCredential};

/// `tokenType` carried by a credential that holds an unredeemed code.
pub const AUTHORIZATION_CODE_TOKEN_TYPE: &str = "authorization_code";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl CallbackParams {
    /// Collects callback parameters from the query string and then the
    /// fragment, so a fragment value overrides the query value.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            params.set(&key, &value);
        }
        if let Some(fragment) = url.fragment() {
            for (key, value) in url::form_urlencoded::parse(fragment_query(fragment).as_bytes()) {
                params.set(&key, &value);
            }
        }
        params
    }

    fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "access_token" => &mut self.access_token,
            "id_token" => &mut self.id_token,
            "refresh_token" => &mut self.refresh_token,
            "code" => &mut self.code,
            "expires_in" => &mut self.expires_in,
            "token_type" => &mut self.token_type,
            "error" => &mut self.error,
            "error_description" => &mut self.error_description,
            "state" => &mut self.state,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    /// Builds a credential from the token parameters; `None` when neither an
    /// access token nor an id token is present.
    pub fn credential(&self, now_ms: i64) -> Option<SessionCredential> {
        let access_token = self.access_token.as_ref().or(self.id_token.as_ref())?;
        let mut credential = SessionCredential::bearer(access_token.clone());
        if let Some(refresh_token) = &self.refresh_token {
            credential = credential.with_refresh_token(refresh_token.clone());
        }
        if let Some(id_token) = &self.id_token {
            credential = credential.with_id_token(id_token.clone());
        }
        if let Some(token_type) = &self.token_type {
            credential = credential.with_token_type(token_type.clone());
        }
        if let Some(expires_at) = expires_at(self.expires_in.as_deref(), now_ms) {
            credential = credential.with_expires_at(expires_at);
        }
        Some(credential)
    }
}

/// Hash routes such as `#/callback?access_token=..` keep their parameters
/// after the first `?`.
fn fragment_query(fragment: &str) -> &str {
    if fragment.starts_with('/') {
        return fragment.split_once('?').map(|(_, query)| query).unwrap_or("");
    }
    fragment
}

fn expires_at(expires_in: Option<&str>, now_ms: i64) -> Option<i64> {
    let seconds = expires_in?.parse::<i64>().ok().filter(|value| *value >= 0)?;
    now_ms.checked_add(seconds.checked_mul(1000)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Credential {
        credential: SessionCredential,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    /// Only a code came back; it still has to be redeemed.
    AuthorizationCode {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    ProviderError {
        failure: AuthFailure,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
    Malformed {
        failure: AuthFailure,
    },
}

impl CallbackOutcome {
    pub fn state(&self) -> Option<&str> {
        match self {
            CallbackOutcome::Credential { state, .. }
            | CallbackOutcome::AuthorizationCode { state, .. }
            | CallbackOutcome::ProviderError { state, .. } => state.as_deref(),
            CallbackOutcome::Malformed { .. } => None,
        }
    }

    /// The credential handed to the page when no code exchanger is set up:
    /// the raw code travels as the access token.
    pub fn code_credential(code: &str) -> SessionCredential {
        SessionCredential::bearer(code).with_token_type(AUTHORIZATION_CODE_TOKEN_TYPE)
    }
}

/// Classifies a callback URL: an `error` wins, then tokens, then a bare
/// code. Anything else, including an unparseable URL, is malformed.
pub fn parse_callback(raw: &str, now_ms: i64) -> CallbackOutcome {
    match Url::parse(raw.trim()) {
        Ok(url) => classify(&CallbackParams::from_url(&url), now_ms),
        Err(error) => {
            tracing::warn!(%error, "callback url could not be parsed");
            CallbackOutcome::Malformed {
                failure: AuthFailure::malformed_callback(format!(
                    "unparseable callback url: {error}"
                )),
            }
        }
    }
}

fn classify(params: &CallbackParams, now_ms: i64) -> CallbackOutcome {
    let state = params.state.clone();
    if let Some(error) = &params.error {
        return CallbackOutcome::ProviderError {
            failure: AuthFailure::provider(error.clone(), params.error_description.clone()),
            state,
        };
    }
    if let Some(credential) = params.credential(now_ms) {
        return CallbackOutcome::Credential { credential, state };
    }
    if let Some(code) = &params.code {
        return CallbackOutcome::AuthorizationCode {
            code: code.clone(),
            state,
        };
    }
    tracing::warn!("callback carried no token, code or error parameter");
    CallbackOutcome::Malformed {
        failure: AuthFailure::malformed_callback(
            "callback carried no access_token, id_token, code or error",
        ),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use weddingwin_bridge_protocol::FailureKind;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const CALLBACK: &str = "https://www.weddingwin.ca/auth/native-callback";

    #[test]
    fn access_and_refresh_tokens_from_query() {
        let outcome = parse_callback(
            &format!("{CALLBACK}?access_token=T1&refresh_token=T2"),
            NOW,
        );
        let CallbackOutcome::Credential { credential, state } = outcome else {
            panic!("expected credential");
        };
        assert_eq!(credential.access_token, "T1");
        assert_eq!(credential.refresh_token.as_deref(), Some("T2"));
        assert_eq!(credential.token_type, "Bearer");
        assert_eq!(state, None);
    }

    #[test]
    fn fragment_overrides_query_and_sets_expiry() {
        let outcome = parse_callback(
            &format!("{CALLBACK}?access_token=old&state=s1#access_token=new&expires_in=3600&token_type=bearer"),
            NOW,
        );
        let CallbackOutcome::Credential { credential, state } = outcome else {
            panic!("expected credential");
        };
        assert_eq!(credential.access_token, "new");
        assert_eq!(credential.expires_at, Some(NOW + 3_600_000));
        assert_eq!(credential.token_type, "bearer");
        assert_eq!(state.as_deref(), Some("s1"));
    }

    #[test]
    fn hash_route_fragment_is_supported() {
        let outcome = parse_callback(&format!("{CALLBACK}#/signed-in?id_token=jwt"), NOW);
        let CallbackOutcome::Credential { credential, .. } = outcome else {
            panic!("expected credential");
        };
        assert_eq!(credential.access_token, "jwt");
        assert_eq!(credential.id_token.as_deref(), Some("jwt"));
    }

    #[test]
    fn error_wins_over_tokens() {
        let outcome = parse_callback(
            &format!("{CALLBACK}?error=access_denied&error_description=User+denied&access_token=T1"),
            NOW,
        );
        let CallbackOutcome::ProviderError { failure, .. } = outcome else {
            panic!("expected provider error");
        };
        assert_eq!(failure.kind, FailureKind::Provider);
        assert_eq!(failure.reason, "access_denied");
        assert_eq!(failure.description.as_deref(), Some("User denied"));
    }

    #[test]
    fn code_only_callback() {
        let outcome = parse_callback(&format!("{CALLBACK}?code=abc&state=s9"), NOW);
        assert_eq!(
            outcome,
            CallbackOutcome::AuthorizationCode {
                code: "abc".to_string(),
                state: Some("s9".to_string()),
            }
        );
        assert_eq!(outcome.state(), Some("s9"));
    }

    #[test]
    fn empty_values_count_as_absent() {
        let outcome = parse_callback(&format!("{CALLBACK}?access_token=&error=&code="), NOW);
        assert!(matches!(outcome, CallbackOutcome::Malformed { .. }));
    }

    #[test]
    fn no_parameters_is_malformed() {
        let CallbackOutcome::Malformed { failure } = parse_callback(CALLBACK, NOW) else {
            panic!("expected malformed");
        };
        assert_eq!(failure.kind, FailureKind::MalformedCallback);
    }

    #[test]
    fn unparseable_url_is_malformed() {
        assert!(matches!(
            parse_callback("::not a url::", NOW),
            CallbackOutcome::Malformed { .. }
        ));
    }

    #[test]
    fn invalid_expiry_is_ignored() {
        let outcome = parse_callback(&format!("{CALLBACK}?access_token=T&expires_in=soon"), NOW);
        let CallbackOutcome::Credential { credential, .. } = outcome else {
            panic!("expected credential");
        };
        assert_eq!(credential.expires_at, None);
    }

    #[test]
    fn code_credential_marks_token_type() {
        let credential = CallbackOutcome::code_credential("abc");
        assert_eq!(credential.access_token, "abc");
        assert_eq!(credential.token_type, AUTHORIZATION_CODE_TOKEN_TYPE);
    }
}
