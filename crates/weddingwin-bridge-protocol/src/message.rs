use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attempt::AttemptId;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "LOGIN_GOOGLE")]
    LoginGoogle,
    #[serde(rename = "WINDOW_OPEN")]
    WindowOpen,
}

/// Request posted from the hosted page to the shell. Sent once per user
/// initiated action and consumed once; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub url: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<AttemptId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl BridgeMessage {
    pub fn login_google(url: impl Into<String>, attempt_id: AttemptId) -> Self {
        Self {
            kind: MessageType::LoginGoogle,
            url: url.into(),
            timestamp: now_millis(),
            attempt_id: Some(attempt_id),
            client_id: None,
            redirect_uri: None,
        }
    }

    pub fn window_open(url: impl Into<String>) -> Self {
        Self {
            kind: MessageType::WindowOpen,
            url: url.into(),
            timestamp: now_millis(),
            attempt_id: None,
            client_id: None,
            redirect_uri: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// String form for channels that only accept text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Structured form for channels that accept objects.
    pub fn to_value(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_str(raw)?;
        message.validate()?;
        Ok(message)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let message: Self = serde_json::from_value(value)?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        let trimmed = self.url.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyUrl);
        }
        match url::Url::parse(trimmed) {
            Ok(parsed) if !parsed.cannot_be_a_base() => Ok(()),
            _ => Err(ProtocolError::RelativeUrl {
                url: self.url.clone(),
            }),
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn login_message_uses_wire_field_names() {
        let mut message = BridgeMessage::login_google(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc",
            AttemptId::from("a-1"),
        );
        message.timestamp = 1_700_000_000_000;

        let value = message.to_value().expect("encode message");
        assert_eq!(
            value,
            json!({
                "type": "LOGIN_GOOGLE",
                "url": "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc",
                "timestamp": 1_700_000_000_000_i64,
                "attemptId": "a-1",
            })
        );
    }

    #[test]
    fn decodes_legacy_message_without_attempt_id() {
        let raw = r#"{"type":"LOGIN_GOOGLE","url":"https://accounts.google.com/o/oauth2/auth","timestamp":12,"clientId":"cid","redirectUri":"weddingwin://cb"}"#;
        let message = BridgeMessage::from_json(raw).expect("decode message");
        assert_eq!(message.kind, MessageType::LoginGoogle);
        assert_eq!(message.attempt_id, None);
        assert_eq!(message.client_id.as_deref(), Some("cid"));
        assert_eq!(message.redirect_uri.as_deref(), Some("weddingwin://cb"));
    }

    #[test]
    fn window_open_round_trips_through_text() {
        let message = BridgeMessage::window_open("https://www.weddingwin.ca/vendors");
        let raw = message.to_json().expect("encode");
        assert!(raw.contains("\"WINDOW_OPEN\""));
        assert_eq!(BridgeMessage::from_json(&raw).expect("decode"), message);
    }

    #[test]
    fn rejects_relative_and_empty_urls() {
        let relative = r#"{"type":"WINDOW_OPEN","url":"/webapp/login","timestamp":1}"#;
        assert!(matches!(
            BridgeMessage::from_json(relative),
            Err(ProtocolError::RelativeUrl { .. })
        ));

        let empty = r#"{"type":"WINDOW_OPEN","url":"  ","timestamp":1}"#;
        assert!(matches!(
            BridgeMessage::from_json(empty),
            Err(ProtocolError::EmptyUrl)
        ));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let raw = r#"{"type":"LOGOUT","url":"https://example.com","timestamp":1}"#;
        assert!(matches!(
            BridgeMessage::from_json(raw),
            Err(ProtocolError::Json(_))
        ));
    }
}
