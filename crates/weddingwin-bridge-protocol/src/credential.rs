use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Normalized token bundle handed to the hosted application after a
/// successful sign-in. The bridge never stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(
        default,
        alias = "refresh_token",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "id_token", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(
        default,
        alias = "expires_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type", alias = "token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl SessionCredential {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            expires_at: None,
            token_type: default_token_type(),
        }
    }

    /// Interprets whatever the shell handed to the success notifier.
    ///
    /// A JSON object is decoded as a credential, a JSON string literal is
    /// unwrapped, and anything else is taken verbatim as a bare access token.
    pub fn from_notifier_payload(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(token)) => Self::bearer(token),
            Ok(value @ Value::Object(_)) => {
                serde_json::from_value(value).unwrap_or_else(|_| Self::bearer(raw))
            }
            _ => Self::bearer(raw),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bare_string_payload_becomes_access_token() {
        let credential = SessionCredential::from_notifier_payload("ya29.token");
        assert_eq!(credential, SessionCredential::bearer("ya29.token"));
    }

    #[test]
    fn json_string_literal_is_unwrapped() {
        let credential = SessionCredential::from_notifier_payload("\"ya29.token\"");
        assert_eq!(credential.access_token, "ya29.token");
    }

    #[test]
    fn json_object_payload_accepts_both_casings() {
        let camel = SessionCredential::from_notifier_payload(
            r#"{"accessToken":"T1","refreshToken":"T2","tokenType":"Bearer"}"#,
        );
        let snake = SessionCredential::from_notifier_payload(
            r#"{"access_token":"T1","refresh_token":"T2"}"#,
        );
        assert_eq!(camel, snake);
        assert_eq!(camel.refresh_token.as_deref(), Some("T2"));
    }

    #[test]
    fn object_without_access_token_falls_back_to_raw_text() {
        let raw = r#"{"idToken":"only-id"}"#;
        let credential = SessionCredential::from_notifier_payload(raw);
        assert_eq!(credential.access_token, raw);
    }

    #[test]
    fn serializes_camel_case_and_skips_absent_fields() {
        let credential = SessionCredential::bearer("T1").with_expires_at(42);
        let raw = serde_json::to_string(&credential).expect("serialize credential");
        assert_eq!(
            raw,
            r#"{"accessToken":"T1","expiresAt":42,"tokenType":"Bearer"}"#
        );
    }
}
