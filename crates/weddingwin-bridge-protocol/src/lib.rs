//! Wire contract between the hosted page agent and the native shell bridge.
//!
//! The two sides run in separate single-threaded contexts and only exchange
//! JSON: the page posts a [`BridgeMessage`] to the shell, and the shell answers
//! with a [`Delivery`] that it injects back into the page. Every login attempt
//! carries an [`AttemptId`] from the request all the way to its terminal
//! delivery so late completions cannot be credited to a newer attempt.

mod attempt;
mod credential;
mod delivery;
mod error;
mod message;
mod sign_in;

pub use attempt::AttemptId;
pub use credential::{DEFAULT_TOKEN_TYPE, SessionCredential};
pub use delivery::{AuthFailure, CANCELLED_REASON, Delivery, FailureKind};
pub use error::ProtocolError;
pub use message::{BridgeMessage, MessageType, now_millis};
pub use sign_in::{GOOGLE_SIGN_IN_PATTERNS, SignInMatcher};
