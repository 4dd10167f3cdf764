//! Native shell side of the WeddingWin OAuth bridge.
//!
//! The hosted page posts a `LOGIN_GOOGLE` message; [`ShellBridge`] rewrites
//! the authorization URL to the shell's HTTPS callback, runs an external
//! authentication session through an [`ExternalAuthSession`], and delivers
//! the parsed result back into the page through a [`PageSink`]. Redirects
//! that arrive through the OS deep-link mechanism go through the same
//! finishing transition, so each attempt is delivered exactly once.

mod bridge;
mod callback;
mod config;
mod deep_link;
mod error;
mod exchange;
pub mod ffi;
mod redirect;
mod script;
mod session;
mod tracker;

pub use bridge::{MessageDisposition, ShellBridge};
pub use callback::{AUTHORIZATION_CODE_TOKEN_TYPE, CallbackOutcome, CallbackParams, parse_callback};
pub use config::{BridgeConfig, ConfigError, DEFAULT_CALLBACK_URL, DEFAULT_START_URL, load_config};
pub use deep_link::{IncomingLink, LinkDisposition, classify_incoming};
pub use error::BridgeError;
pub use exchange::{CodeExchanger, ExchangeError, HttpCodeExchanger, TokenResponse};
pub use redirect::{CallbackTarget, rewrite_redirect_uri};
pub use script::{ScriptSink, render_delivery_script};
pub use session::{ExternalAuthSession, PageSink, SessionCompletion, SessionError, SinkError};
pub use tracker::{AttemptPhase, AttemptTracker, Claim, RequestOutcome};

pub use weddingwin_bridge_protocol as protocol;
