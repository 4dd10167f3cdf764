//! Hosted page agent for the WeddingWin OAuth bridge.
//!
//! Runs inside the embedded web content. It is handed an explicit
//! [`Channel`] capability by the embedding layer, routes Google sign-in
//! attempts to the surrounding shell instead of opening popups, and fans the
//! shell's answers out to observers registered in a [`CallbackRegistry`].
//!
//! ```
//! use weddingwin_hosted_agent::{CallbackRegistry, Channel, HostedAgent, LoginStart};
//!
//! let mut agent = HostedAgent::new(Channel::absent(), CallbackRegistry::new());
//! agent.registry_mut().initialize();
//! let start = agent.begin_google_login("https://accounts.google.com/o/oauth2/v2/auth");
//! assert_eq!(start, LoginStart::NotHosted);
//! ```

mod agent;
mod channel;
mod environment;
mod interceptor;
mod pending;
mod registry;

pub use agent::{HostedAgent, LoginStart};
pub use channel::{Channel, Payload, Transport, TransportError};
pub use environment::{
    ChannelKind, Encoding, EnvironmentDescriptor, HostScope, ProbedScope, detect,
};
pub use interceptor::{
    ClickDecision, ClickTarget, FormTarget, GOOGLE_SIGN_IN_PATTERNS, OpenDecision, SignInMatcher,
    SubmitDecision,
};
pub use pending::PendingSlot;
pub use registry::{Audience, AuthCallback, AuthOutcome, CallbackRegistry};

pub use weddingwin_bridge_protocol as protocol;
