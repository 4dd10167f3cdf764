use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attempt::AttemptId;
use crate::credential::SessionCredential;
use crate::error::ProtocolError;

pub const CANCELLED_REASON: &str = "cancelled";

/// Why an attempt failed. Hosted UI uses the kind to decide between
/// silently resetting (`Cancelled`, `Superseded`) and showing an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The authorization provider returned an explicit `error` parameter.
    Provider,
    /// The user dismissed the external session.
    Cancelled,
    /// The callback carried none of the expected parameters.
    MalformedCallback,
    /// The sign-in URL could not be prepared for the external session.
    InvalidRequest,
    /// The platform could not open an external session.
    SessionUnavailable,
    Timeout,
    /// A newer attempt replaced this one before it finished.
    Superseded,
    /// Redeeming an authorization code failed.
    Exchange,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Provider => "provider",
            FailureKind::Cancelled => "cancelled",
            FailureKind::MalformedCallback => "malformed_callback",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::SessionUnavailable => "session_unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::Superseded => "superseded",
            FailureKind::Exchange => "exchange",
        }
    }

    /// Failures the page should reset from without an error banner.
    pub fn is_silent(self) -> bool {
        matches!(self, FailureKind::Cancelled | FailureKind::Superseded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    pub kind: FailureKind,
    /// Machine-readable reason. For provider failures this is the provider's
    /// `error` value verbatim.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AuthFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            description: None,
        }
    }

    pub fn provider(code: impl Into<String>, description: Option<String>) -> Self {
        Self {
            kind: FailureKind::Provider,
            reason: code.into(),
            description,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, CANCELLED_REASON)
    }

    pub fn superseded() -> Self {
        Self::new(FailureKind::Superseded, "superseded")
    }

    pub fn malformed_callback(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedCallback, "malformed_callback").with_description(detail)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(
                f,
                "{} ({}): {description}",
                self.reason,
                self.kind.as_str()
            ),
            None => write!(f, "{} ({})", self.reason, self.kind.as_str()),
        }
    }
}

/// Terminal result of one attempt, sent from the shell into the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    #[serde(rename_all = "camelCase")]
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt_id: Option<AttemptId>,
        credential: SessionCredential,
    },
    #[serde(rename_all = "camelCase")]
    Failure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt_id: Option<AttemptId>,
        failure: AuthFailure,
    },
}

impl Delivery {
    pub fn success(attempt_id: Option<AttemptId>, credential: SessionCredential) -> Self {
        Delivery::Success {
            attempt_id,
            credential,
        }
    }

    pub fn failure(attempt_id: Option<AttemptId>, failure: AuthFailure) -> Self {
        Delivery::Failure {
            attempt_id,
            failure,
        }
    }

    pub fn attempt_id(&self) -> Option<&AttemptId> {
        match self {
            Delivery::Success { attempt_id, .. } | Delivery::Failure { attempt_id, .. } => {
                attempt_id.as_ref()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Delivery::Success { .. })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}
