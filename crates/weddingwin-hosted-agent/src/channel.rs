//! The message channel capability handed to the agent at construction.

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use weddingwin_bridge_protocol::{BridgeMessage, ProtocolError};

use crate::environment::{ChannelKind, Encoding, EnvironmentDescriptor};

/// Encoded message, in the form the concrete channel accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    Text(&'a str),
    Structured(&'a Value),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel rejected message: {0}")]
    Rejected(String),
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// A concrete host transport (post-message call, bridge object, handler map).
pub trait Transport {
    fn post(&self, payload: Payload<'_>) -> Result<(), TransportError>;
}

/// Either a live host channel or nothing.
///
/// The embedding layer decides this once per page load; the agent never
/// probes globals itself.
pub struct Channel {
    kind: ChannelKind,
    transport: Option<Box<dyn Transport>>,
}

impl Channel {
    pub fn absent() -> Self {
        Self {
            kind: ChannelKind::None,
            transport: None,
        }
    }

    pub fn present(kind: ChannelKind, transport: Box<dyn Transport>) -> Self {
        if kind == ChannelKind::None {
            return Self::absent();
        }
        Self {
            kind,
            transport: Some(transport),
        }
    }

    /// Builds the capability from a detection result and the transport for it.
    pub fn from_environment(
        environment: EnvironmentDescriptor,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        match (environment.is_hosted, transport) {
            (true, Some(transport)) => Self::present(environment.channel, transport),
            _ => Self::absent(),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_present(&self) -> bool {
        self.transport.is_some()
    }

    pub fn environment(&self) -> EnvironmentDescriptor {
        EnvironmentDescriptor::hosted(self.kind)
    }

    /// Hands `message` to the host. Returns `false`, without touching any
    /// transport, when no channel exists; encode and transport failures are
    /// logged and also reported as `false`.
    pub fn send(&self, message: &BridgeMessage) -> bool {
        let (Some(transport), Some(encoding)) = (self.transport.as_ref(), self.kind.encoding())
        else {
            tracing::debug!("no host channel; staying with embedded default behavior");
            return false;
        };

        let result = match encoding {
            Encoding::Text => message
                .to_json()
                .map_err(TransportError::from)
                .and_then(|text| transport.post(Payload::Text(&text))),
            Encoding::Structured => message
                .to_value()
                .map_err(TransportError::from)
                .and_then(|value| transport.post(Payload::Structured(&value))),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    channel = self.kind.label(),
                    kind = ?message.kind,
                    "posted bridge message"
                );
                true
            }
            Err(error) => {
                tracing::error!(
                    channel = self.kind.label(),
                    %error,
                    "failed to post bridge message"
                );
                false
            }
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.kind)
            .field("present", &self.is_present())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use weddingwin_bridge_protocol::AttemptId;

    use super::*;

    #[derive(Default, Clone)]
    struct Recorder {
        posts: Rc<RefCell<Vec<String>>>,
    }

    impl Transport for Recorder {
        fn post(&self, payload: Payload<'_>) -> Result<(), TransportError> {
            let entry = match payload {
                Payload::Text(text) => format!("text:{text}"),
                Payload::Structured(value) => format!("structured:{value}"),
            };
            self.posts.borrow_mut().push(entry);
            Ok(())
        }
    }

    struct Refusing;

    impl Transport for Refusing {
        fn post(&self, _payload: Payload<'_>) -> Result<(), TransportError> {
            Err(TransportError::Rejected("bridge torn down".to_string()))
        }
    }

    fn login() -> BridgeMessage {
        BridgeMessage::login_google(
            "https://accounts.google.com/o/oauth2/v2/auth",
            AttemptId::from("a-1"),
        )
    }

    #[test]
    fn absent_channel_returns_false() {
        let channel = Channel::absent();
        assert!(!channel.send(&login()));
        assert!(!channel.environment().is_hosted);
    }

    #[test]
    fn present_with_none_kind_collapses_to_absent() {
        let recorder = Recorder::default();
        let channel = Channel::present(ChannelKind::None, Box::new(recorder.clone()));
        assert!(!channel.send(&login()));
        assert!(recorder.posts.borrow().is_empty());
    }

    #[test]
    fn text_channels_receive_json_strings() {
        for kind in [ChannelKind::MessagePost, ChannelKind::NamedBridge] {
            let recorder = Recorder::default();
            let channel = Channel::present(kind, Box::new(recorder.clone()));
            assert!(channel.send(&login()));
            let posts = recorder.posts.borrow();
            assert_eq!(posts.len(), 1);
            assert!(posts[0].starts_with("text:{\"type\":\"LOGIN_GOOGLE\""));
        }
    }

    #[test]
    fn handler_channel_receives_structured_value() {
        let recorder = Recorder::default();
        let channel = Channel::present(ChannelKind::MessageHandler, Box::new(recorder.clone()));
        assert!(channel.send(&login()));
        assert!(recorder.posts.borrow()[0].starts_with("structured:"));
    }

    #[test]
    fn transport_failure_is_reported_not_raised() {
        let channel = Channel::present(ChannelKind::NamedBridge, Box::new(Refusing));
        assert!(!channel.send(&login()));
    }

    #[test]
    fn environment_without_transport_is_absent() {
        let env = EnvironmentDescriptor::hosted(ChannelKind::MessagePost);
        let channel = Channel::from_environment(env, None);
        assert!(!channel.is_present());
    }
}
