//! Redeeming authorization codes at the provider's token endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use weddingwin_bridge_protocol::SessionCredential;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token endpoint rejected the code: {error}")]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("token response carried no access_token or id_token")]
    MissingToken,
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Http(error) => !error.is_decode() && !error.is_builder(),
            ExchangeError::Status { status, .. } => *status >= 500 || *status == 429,
            ExchangeError::Rejected { .. } | ExchangeError::MissingToken => false,
        }
    }

    /// Machine-readable reason handed to the page.
    pub fn reason(&self) -> String {
        match self {
            ExchangeError::Rejected { error, .. } => error.clone(),
            ExchangeError::Status { status, .. } => format!("http_{status}"),
            ExchangeError::Http(_) => "network_error".to_string(),
            ExchangeError::MissingToken => "missing_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn into_credential(self, now_ms: i64) -> Result<SessionCredential, ExchangeError> {
        let access_token = self
            .access_token
            .or_else(|| self.id_token.clone())
            .filter(|token| !token.is_empty())
            .ok_or(ExchangeError::MissingToken)?;
        let mut credential = SessionCredential::bearer(access_token);
        if let Some(refresh_token) = self.refresh_token {
            credential = credential.with_refresh_token(refresh_token);
        }
        if let Some(id_token) = self.id_token {
            credential = credential.with_id_token(id_token);
        }
        if let Some(token_type) = self.token_type {
            credential = credential.with_token_type(token_type);
        }
        if let Some(expires_at) = self
            .expires_in
            .filter(|seconds| *seconds >= 0)
            .and_then(|seconds| seconds.checked_mul(1000))
            .and_then(|millis| now_ms.checked_add(millis))
        {
            credential = credential.with_expires_at(expires_at);
        }
        Ok(credential)
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
pub trait CodeExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError>;
}

/// Form-POST exchange against an OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct HttpCodeExchanger {
    client: reqwest::Client,
    token_endpoint: Url,
    client_id: Option<String>,
    redirect_uri: String,
    attempts: u32,
    backoff: Duration,
}

impl HttpCodeExchanger {
    pub fn new(token_endpoint: Url, redirect_uri: impl Into<String>) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            token_endpoint,
            client_id: None,
            redirect_uri: redirect_uri.into(),
            attempts: 1,
            backoff: Duration::ZERO,
        })
    }

    /// Builds an exchanger when the config names a token endpoint.
    pub fn from_config(config: &BridgeConfig) -> Result<Option<Self>, BridgeError> {
        let Some(endpoint) = &config.token_endpoint else {
            return Ok(None);
        };
        let token_endpoint =
            Url::parse(endpoint).map_err(|source| BridgeError::invalid_url(endpoint, source))?;
        let mut exchanger = Self::new(token_endpoint, config.callback_url.clone())?
            .with_retry(config.exchange_attempts, config.exchange_backoff());
        if let Some(client_id) = &config.client_id {
            exchanger = exchanger.with_client_id(client_id.clone());
        }
        Ok(Some(exchanger))
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// `attempts` is clamped to at least one; the wait before retry `n` is
    /// `backoff * n`.
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    async fn exchange_once(&self, code: &str) -> Result<TokenResponse, ExchangeError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(client_id) = &self.client_id {
            form.push(("client_id", client_id.as_str()));
        }

        let response = self
            .client
            .post(self.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<TokenResponse>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() && status.as_u16() != 429 {
            if let Ok(error) = serde_json::from_str::<TokenErrorBody>(&body) {
                return Err(ExchangeError::Rejected {
                    error: error.error,
                    description: error.error_description,
                });
            }
        }
        Err(ExchangeError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CodeExchanger for HttpCodeExchanger {
    async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError> {
        let mut attempt = 1;
        loop {
            match self.exchange_once(code).await {
                Ok(response) => {
                    tracing::info!(attempt, "authorization code exchanged");
                    return Ok(response);
                }
                Err(error) if error.is_retryable() && attempt < self.attempts => {
                    tracing::warn!(attempt, %error, "token exchange failed; retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(attempt, %error, "token exchange failed");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    /// Serves the canned `(status, body)` responses, one per connection, and
    /// reports each request body.
    async fn token_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (Url, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let (bodies, received) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.expect("accept");
                let request = read_request(&mut stream).await;
                let _ = bodies.send(request);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.expect("write reply");
                stream.shutdown().await.ok();
            }
        });
        let url = Url::parse(&format!("http://{address}/token")).expect("url");
        (url, received)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await.expect("read");
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if body.len() >= length {
                    return body.to_string();
                }
            }
        }
        String::new()
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (endpoint, mut received) = token_server(vec![
            (503, r#"{"error":"unavailable"}"#),
            (200, r#"{"access_token":"A","refresh_token":"R","expires_in":60}"#),
        ])
        .await;
        let exchanger =
            HttpCodeExchanger::new(endpoint, "https://www.weddingwin.ca/auth/native-callback")
                .expect("client")
            .with_client_id("cid")
            .with_retry(3, Duration::from_millis(1));

        let response = exchanger.exchange("the-code").await.expect("exchange");
        let credential = response.into_credential(1_000).expect("credential");
        assert_eq!(credential.access_token, "A");
        assert_eq!(credential.refresh_token.as_deref(), Some("R"));
        assert_eq!(credential.expires_at, Some(61_000));

        let first = received.recv().await.expect("first request");
        assert!(first.contains("grant_type=authorization_code"));
        assert!(first.contains("code=the-code"));
        assert!(first.contains("client_id=cid"));
        assert!(received.recv().await.is_some());
    }

    #[tokio::test]
    async fn provider_rejection_is_not_retried() {
        let (endpoint, mut received) = token_server(vec![
            (400, r#"{"error":"invalid_grant","error_description":"expired"}"#),
            (200, r#"{"access_token":"never"}"#),
        ])
        .await;
        let exchanger = HttpCodeExchanger::new(endpoint, "https://www.weddingwin.ca/cb")
            .expect("client")
            .with_retry(3, Duration::from_millis(1));

        let error = exchanger.exchange("stale").await.expect_err("rejected");
        assert_eq!(error.reason(), "invalid_grant");
        assert!(!error.is_retryable());
        assert!(received.recv().await.is_some());
        assert!(received.try_recv().is_err());
    }

    #[test]
    fn token_response_without_tokens_is_an_error() {
        let error = TokenResponse::default()
            .into_credential(0)
            .expect_err("missing token");
        assert!(matches!(error, ExchangeError::MissingToken));
    }

    #[test]
    fn status_retry_policy() {
        let status = |status| ExchangeError::Status {
            status,
            body: String::new(),
        };
        assert!(status(502).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(401).is_retryable());
    }

    #[test]
    fn no_exchanger_without_endpoint() {
        let exchanger = HttpCodeExchanger::from_config(&BridgeConfig::default()).expect("config");
        assert!(exchanger.is_none());
    }
}
