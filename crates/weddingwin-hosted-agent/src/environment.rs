//! Shell detection from inside the hosted content.

use serde::Serialize;

/// Which host-provided message channel the page can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    None,
    /// Generic message-post channel (`ReactNativeWebView.postMessage`).
    #[serde(rename = "hosted-a")]
    MessagePost,
    /// Named bridge object injected by the shell (`Android.postMessage`).
    #[serde(rename = "hosted-b")]
    NamedBridge,
    /// Platform message-handler map (`webkit.messageHandlers.nativeHandler`).
    #[serde(rename = "hosted-c")]
    MessageHandler,
}

/// How a channel wants its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Text,
    Structured,
}

impl ChannelKind {
    pub fn encoding(self) -> Option<Encoding> {
        match self {
            ChannelKind::None => None,
            ChannelKind::MessagePost | ChannelKind::NamedBridge => Some(Encoding::Text),
            ChannelKind::MessageHandler => Some(Encoding::Structured),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::None => "none",
            ChannelKind::MessagePost => "hosted-a",
            ChannelKind::NamedBridge => "hosted-b",
            ChannelKind::MessageHandler => "hosted-c",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDescriptor {
    pub is_hosted: bool,
    pub channel: ChannelKind,
}

impl EnvironmentDescriptor {
    pub const NOT_HOSTED: Self = Self {
        is_hosted: false,
        channel: ChannelKind::None,
    };

    pub fn hosted(channel: ChannelKind) -> Self {
        Self {
            is_hosted: channel != ChannelKind::None,
            channel,
        }
    }
}

/// Read-only view of the page's global scope, as far as shell detection
/// cares about it.
pub trait HostScope {
    fn has_message_post(&self) -> bool;
    fn has_named_bridge(&self) -> bool;
    fn has_message_handler(&self) -> bool;
}

/// Presence flags captured once by the embedding layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbedScope {
    pub message_post: bool,
    pub named_bridge: bool,
    pub message_handler: bool,
}

impl HostScope for ProbedScope {
    fn has_message_post(&self) -> bool {
        self.message_post
    }

    fn has_named_bridge(&self) -> bool {
        self.named_bridge
    }

    fn has_message_handler(&self) -> bool {
        self.message_handler
    }
}

/// First channel present, in fixed priority order. Pure and idempotent.
pub fn detect(scope: &impl HostScope) -> EnvironmentDescriptor {
    let channel = if scope.has_message_post() {
        ChannelKind::MessagePost
    } else if scope.has_named_bridge() {
        ChannelKind::NamedBridge
    } else if scope.has_message_handler() {
        ChannelKind::MessageHandler
    } else {
        ChannelKind::None
    };
    EnvironmentDescriptor::hosted(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(message_post: bool, named_bridge: bool, message_handler: bool) -> ProbedScope {
        ProbedScope {
            message_post,
            named_bridge,
            message_handler,
        }
    }

    #[test]
    fn detects_each_channel_shape() {
        let cases = [
            (scope(false, false, false), ChannelKind::None),
            (scope(true, false, false), ChannelKind::MessagePost),
            (scope(false, true, false), ChannelKind::NamedBridge),
            (scope(false, false, true), ChannelKind::MessageHandler),
        ];
        for (probe, expected) in cases {
            let descriptor = detect(&probe);
            assert_eq!(descriptor.channel, expected);
            assert_eq!(descriptor.is_hosted, expected != ChannelKind::None);
        }
    }

    #[test]
    fn priority_order_is_fixed() {
        assert_eq!(detect(&scope(true, true, true)).channel, ChannelKind::MessagePost);
        assert_eq!(detect(&scope(false, true, true)).channel, ChannelKind::NamedBridge);
    }

    #[test]
    fn detection_is_idempotent() {
        let probe = scope(false, true, true);
        let first = detect(&probe);
        for _ in 0..3 {
            assert_eq!(detect(&probe), first);
        }
    }

    #[test]
    fn encoding_follows_channel_shape() {
        assert_eq!(ChannelKind::MessagePost.encoding(), Some(Encoding::Text));
        assert_eq!(ChannelKind::NamedBridge.encoding(), Some(Encoding::Text));
        assert_eq!(
            ChannelKind::MessageHandler.encoding(),
            Some(Encoding::Structured)
        );
        assert_eq!(ChannelKind::None.encoding(), None);
    }

    #[test]
    fn descriptor_serializes_channel_label() {
        let raw = serde_json::to_string(&EnvironmentDescriptor::hosted(ChannelKind::NamedBridge))
            .expect("serialize descriptor");
        assert_eq!(raw, r#"{"isHosted":true,"channel":"hosted-b"}"#);
    }
}
