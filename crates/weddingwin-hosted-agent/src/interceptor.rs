//! Decisions for the page's popup, link and form primitives.
//!
//! Everything here is a pure function of its inputs. The agent turns a
//! `Delegated` decision into a posted message; the page glue applies the
//! rest (suppress the default action, retarget, or navigate in place).

use weddingwin_bridge_protocol::AttemptId;
pub use weddingwin_bridge_protocol::{GOOGLE_SIGN_IN_PATTERNS, SignInMatcher};

const BLANK_PAGE: &str = "about:blank";
const NEW_CONTEXT_TARGET: &str = "_blank";

/// The closest anchor to a click, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickTarget {
    pub href: Option<String>,
    pub target: Option<String>,
}

impl ClickTarget {
    pub fn anchor(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn opens_new_context(&self) -> bool {
        opens_new_context(self.target.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormTarget {
    pub action: Option<String>,
    pub target: Option<String>,
}

/// Outcome of the `window.open` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenDecision {
    /// Sign-in handed to the shell; the page does nothing else.
    Delegated { attempt_id: AttemptId },
    /// Not hosted: leave the browser's own behavior alone.
    DefaultBehavior,
    /// Load the URL in the current surface instead of a new one.
    NavigateSameWindow { url: String },
    /// Nothing worth opening (`about:blank`, empty URL).
    Suppress,
}

/// Outcome of the capturing click observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDecision {
    /// Default action suppressed; sign-in handed to the shell.
    Delegated { attempt_id: AttemptId },
    /// Rewrite the anchor's `target` to `_self` and let the click proceed.
    RetargetSelf,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitDecision {
    RetargetSelf,
    PassThrough,
}

pub(crate) fn opens_new_context(target: Option<&str>) -> bool {
    target.is_some_and(|target| target.trim().eq_ignore_ascii_case(NEW_CONTEXT_TARGET))
}

pub(crate) fn is_blank(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with(BLANK_PAGE)
}

pub(crate) fn click_fallback(target: &ClickTarget) -> ClickDecision {
    if target.opens_new_context() {
        ClickDecision::RetargetSelf
    } else {
        ClickDecision::PassThrough
    }
}

pub(crate) fn submit_decision(form: &FormTarget) -> SubmitDecision {
    if opens_new_context(form.target.as_deref()) {
        SubmitDecision::RetargetSelf
    } else {
        SubmitDecision::PassThrough
    }
}
