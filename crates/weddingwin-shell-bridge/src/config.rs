//! Shell bridge configuration.
//!
//! Stored as camelCase JSON. Every field has a default, so a missing file or
//! a partial file both produce a usable config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use weddingwin_bridge_protocol::{GOOGLE_SIGN_IN_PATTERNS, SignInMatcher};

pub const DEFAULT_START_URL: &str = "https://www.weddingwin.ca/webapp";
pub const DEFAULT_CALLBACK_URL: &str = "https://www.weddingwin.ca/auth/native-callback";
pub const DEFAULT_INJECTION_NAMESPACE: &str = "window.weddingwinAuthBridge";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Page loaded into the embedded surface.
    #[serde(default = "default_start_url")]
    pub start_url: String,

    /// HTTPS address the provider redirects to. Must belong to the shell's
    /// own domain; private URI schemes are rejected.
    #[serde(default = "default_callback_url")]
    pub callback_url: String,

    /// Substrings that identify a sign-in entry point. The shell opens an
    /// external session only for URLs that match one.
    #[serde(default = "default_sign_in_patterns")]
    pub sign_in_patterns: Vec<String>,

    /// Filled into the authorization request when the page left it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// When set, authorization codes are redeemed here before delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default = "default_exchange_attempts")]
    pub exchange_attempts: u32,

    #[serde(default = "default_exchange_backoff_ms")]
    pub exchange_backoff_ms: u64,

    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// How many finished attempt ids are remembered for duplicate detection.
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,

    /// JS object that exposes `notifySuccess`/`notifyError` in the page.
    #[serde(default = "default_injection_namespace")]
    pub injection_namespace: String,
}

fn default_start_url() -> String {
    DEFAULT_START_URL.to_string()
}

fn default_callback_url() -> String {
    DEFAULT_CALLBACK_URL.to_string()
}

fn default_sign_in_patterns() -> Vec<String> {
    GOOGLE_SIGN_IN_PATTERNS
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}

fn default_exchange_attempts() -> u32 {
    3
}

fn default_exchange_backoff_ms() -> u64 {
    250
}

fn default_session_timeout_secs() -> u64 {
    600
}

fn default_dedupe_capacity() -> usize {
    32
}

fn default_injection_namespace() -> String {
    DEFAULT_INJECTION_NAMESPACE.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            start_url: default_start_url(),
            callback_url: default_callback_url(),
            sign_in_patterns: default_sign_in_patterns(),
            client_id: None,
            token_endpoint: None,
            exchange_attempts: default_exchange_attempts(),
            exchange_backoff_ms: default_exchange_backoff_ms(),
            session_timeout_secs: default_session_timeout_secs(),
            dedupe_capacity: default_dedupe_capacity(),
            injection_namespace: default_injection_namespace(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_https("callbackUrl", &self.callback_url)?;
        if let Some(endpoint) = &self.token_endpoint {
            require_https("tokenEndpoint", endpoint)?;
        }
        if Url::parse(&self.start_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "startUrl is not an absolute url: {}",
                self.start_url
            )));
        }
        if self.exchange_attempts == 0 {
            return Err(ConfigError::Invalid(
                "exchangeAttempts must be at least 1".to_string(),
            ));
        }
        if self.dedupe_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dedupeCapacity must be at least 1".to_string(),
            ));
        }
        if self.injection_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "injectionNamespace must not be empty".to_string(),
            ));
        }
        if self.sign_in_matcher().is_empty() {
            return Err(ConfigError::Invalid(
                "signInPatterns must name at least one pattern".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sign_in_matcher(&self) -> SignInMatcher {
        SignInMatcher::new(&self.sign_in_patterns)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn exchange_backoff(&self) -> Duration {
        Duration::from_millis(self.exchange_backoff_ms)
    }
}

fn require_https(field: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw).map_err(|error| {
        ConfigError::Invalid(format!("{field} is not a valid url ({error}): {raw}"))
    })?;
    if parsed.scheme() != "https" {
        return Err(ConfigError::Invalid(format!(
            "{field} must use https, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::Invalid(format!("{field} must name a host")));
    }
    Ok(())
}

/// Loads and validates the config at `path`. A missing file yields defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig, ConfigError> {
    let path = path.as_ref();
    let config = match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no bridge config file; using defaults");
            BridgeConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    config.validate()?;
    Ok(config)
}
