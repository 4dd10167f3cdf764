use weddingwin_bridge_protocol::{
    AttemptId, AuthFailure, BridgeMessage, CANCELLED_REASON, Delivery, FailureKind, ProtocolError,
    SessionCredential,
};

use crate::channel::Channel;
use crate::environment::EnvironmentDescriptor;
use crate::interceptor::{
    ClickDecision, ClickTarget, FormTarget, OpenDecision, SignInMatcher, SubmitDecision,
    click_fallback, is_blank, submit_decision,
};
use crate::registry::{Audience, AuthOutcome, CallbackRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStart {
    /// No shell around us; the page should run its normal web OAuth flow.
    NotHosted,
    Delegated { attempt_id: AttemptId },
    /// A shell exists but refused the message.
    ChannelFailed,
}

/// Tracks the single attempt the page considers in flight.
#[derive(Debug, Default)]
struct AttemptLedger {
    in_flight: Option<AttemptId>,
}

impl AttemptLedger {
    fn begin(&mut self) -> (AttemptId, Option<AttemptId>) {
        let attempt_id = AttemptId::generate();
        let previous = self.in_flight.replace(attempt_id.clone());
        (attempt_id, previous)
    }

    fn abandon(&mut self, attempt_id: &AttemptId, previous: Option<AttemptId>) {
        if self.in_flight.as_ref() == Some(attempt_id) {
            self.in_flight = previous;
        }
    }

    /// Decides who may see an outcome and retires the in-flight attempt when
    /// the outcome belongs to it.
    fn resolve(&mut self, attempt_id: Option<&AttemptId>) -> Audience {
        match (attempt_id, self.in_flight.as_ref()) {
            (Some(incoming), Some(current)) if incoming != current => Audience::AttemptScopedOnly,
            _ => {
                self.in_flight = None;
                Audience::Everyone
            }
        }
    }
}

/// The page-side half of the bridge.
///
/// Holds the channel capability and the application's observer registry,
/// both injected at construction. All methods run on the page's event loop.
#[derive(Debug)]
pub struct HostedAgent {
    channel: Channel,
    matcher: SignInMatcher,
    registry: CallbackRegistry,
    ledger: AttemptLedger,
}

impl HostedAgent {
    pub fn new(channel: Channel, registry: CallbackRegistry) -> Self {
        Self {
            channel,
            matcher: SignInMatcher::default(),
            registry,
            ledger: AttemptLedger::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: SignInMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn environment(&self) -> EnvironmentDescriptor {
        self.channel.environment()
    }

    pub fn is_hosted(&self) -> bool {
        self.channel.is_present()
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.registry
    }

    pub fn in_flight_attempt(&self) -> Option<&AttemptId> {
        self.ledger.in_flight.as_ref()
    }

    /// Hands a sign-in URL to the shell under a fresh attempt id.
    pub fn begin_google_login(&mut self, auth_url: &str) -> LoginStart {
        if !self.channel.is_present() {
            tracing::info!("not hosted by a shell; using the web sign-in flow");
            return LoginStart::NotHosted;
        }

        let (attempt_id, previous) = self.ledger.begin();
        if let Some(previous) = &previous {
            tracing::info!(
                %previous,
                attempt_id = %attempt_id,
                "superseding in-flight sign-in attempt"
            );
        }

        let message = BridgeMessage::login_google(auth_url, attempt_id.clone());
        if self.channel.send(&message) {
            tracing::info!(attempt_id = %attempt_id, "sign-in delegated to shell");
            LoginStart::Delegated { attempt_id }
        } else {
            self.ledger.abandon(&attempt_id, previous);
            LoginStart::ChannelFailed
        }
    }

    /// Override for `window.open`. Never yields a second visible surface
    /// while hosted.
    pub fn open_window(&mut self, url: &str) -> OpenDecision {
        if !self.is_hosted() {
            return OpenDecision::DefaultBehavior;
        }
        if is_blank(url) {
            return OpenDecision::Suppress;
        }
        if self.matcher.matches(url) {
            return match self.begin_google_login(url) {
                LoginStart::Delegated { attempt_id } => OpenDecision::Delegated { attempt_id },
                LoginStart::NotHosted => OpenDecision::DefaultBehavior,
                LoginStart::ChannelFailed => OpenDecision::NavigateSameWindow {
                    url: url.to_string(),
                },
            };
        }
        OpenDecision::NavigateSameWindow {
            url: url.to_string(),
        }
    }

    /// Capturing click observer.
    pub fn click(&mut self, target: &ClickTarget) -> ClickDecision {
        if !self.is_hosted() {
            return ClickDecision::PassThrough;
        }
        if let Some(href) = target.href.as_deref().filter(|href| self.matcher.matches(href)) {
            let href = href.to_string();
            if let LoginStart::Delegated { attempt_id } = self.begin_google_login(&href) {
                return ClickDecision::Delegated { attempt_id };
            }
        }
        click_fallback(target)
    }

    pub fn submit(&self, form: &FormTarget) -> SubmitDecision {
        if !self.is_hosted() {
            return SubmitDecision::PassThrough;
        }
        submit_decision(form)
    }

    /// Asks the shell to load `url` in the embedded surface.
    pub fn request_window_open(&self, url: &str) -> bool {
        self.channel.send(&BridgeMessage::window_open(url))
    }

    /// Success entry point for shells that do not tag deliveries.
    pub fn notify_success(&mut self, credential: SessionCredential) -> usize {
        self.deliver(AuthOutcome::success(None, credential))
    }

    /// Success entry point taking whatever text the shell injected.
    pub fn notify_success_raw(&mut self, payload: &str) -> usize {
        self.notify_success(SessionCredential::from_notifier_payload(payload))
    }

    /// Error entry point for shells that do not tag deliveries. Without a
    /// `kind`, only the bare `"cancelled"` reason is told apart from a
    /// provider error.
    pub fn notify_error(&mut self, message: impl Into<String>, kind: Option<FailureKind>) -> usize {
        let message = message.into();
        let kind = kind.unwrap_or(if message == CANCELLED_REASON {
            FailureKind::Cancelled
        } else {
            FailureKind::Provider
        });
        tracing::warn!(reason = %message, kind = kind.as_str(), "sign-in failed in shell");
        self.deliver(AuthOutcome::failure(None, AuthFailure::new(kind, message)))
    }

    /// Entry point for tagged deliveries.
    pub fn receive(&mut self, delivery: Delivery) -> usize {
        self.deliver(AuthOutcome::from(delivery))
    }

    pub fn receive_json(&mut self, raw: &str) -> Result<usize, ProtocolError> {
        let delivery = Delivery::from_json(raw)?;
        Ok(self.receive(delivery))
    }

    /// Page teardown: no observer may fire after this.
    pub fn teardown(&mut self) {
        self.registry.clear();
        self.ledger = AttemptLedger::default();
    }

    fn deliver(&mut self, outcome: AuthOutcome) -> usize {
        let audience = self.ledger.resolve(outcome.attempt_id.as_ref());
        if audience == Audience::AttemptScopedOnly {
            tracing::warn!(
                attempt_id = ?outcome.attempt_id,
                in_flight = ?self.ledger.in_flight,
                "outcome for a superseded attempt; limiting to its own observers"
            );
        }
        self.registry.dispatch(outcome, audience)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::channel::{Payload, Transport, TransportError};
    use crate::environment::ChannelKind;

    #[derive(Clone, Default)]
    struct Outbox {
        sent: Rc<RefCell<Vec<BridgeMessage>>>,
    }

    impl Transport for Outbox {
        fn post(&self, payload: Payload<'_>) -> Result<(), TransportError> {
            let message = match payload {
                Payload::Text(text) => BridgeMessage::from_json(text)?,
                Payload::Structured(value) => BridgeMessage::from_value(value.clone())?,
            };
            self.sent.borrow_mut().push(message);
            Ok(())
        }
    }

    fn hosted() -> (HostedAgent, Outbox) {
        let outbox = Outbox::default();
        let channel = Channel::present(ChannelKind::MessagePost, Box::new(outbox.clone()));
        let mut registry = CallbackRegistry::new();
        registry.initialize();
        (HostedAgent::new(channel, registry), outbox)
    }

    const GOOGLE: &str = "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc";

    #[test]
    fn not_hosted_leaves_browser_alone() {
        let mut agent = HostedAgent::new(Channel::absent(), CallbackRegistry::new());
        assert_eq!(agent.begin_google_login(GOOGLE), LoginStart::NotHosted);
        assert_eq!(agent.open_window(GOOGLE), OpenDecision::DefaultBehavior);
        assert_eq!(
            agent.click(&ClickTarget::anchor(GOOGLE).with_target("_blank")),
            ClickDecision::PassThrough
        );
        assert_eq!(agent.in_flight_attempt(), None);
    }

    #[test]
    fn google_anchor_click_sends_exactly_one_login_message() {
        let (mut agent, outbox) = hosted();
        let decision = agent.click(&ClickTarget::anchor(GOOGLE).with_target("_blank"));

        let ClickDecision::Delegated { attempt_id } = decision else {
            panic!("expected delegated click");
        };
        let sent = outbox.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, GOOGLE);
        assert_eq!(sent[0].attempt_id.as_ref(), Some(&attempt_id));
        assert_eq!(agent.in_flight_attempt(), Some(&attempt_id));
    }

    #[test]
    fn non_auth_popup_navigates_in_place() {
        let (mut agent, outbox) = hosted();
        assert_eq!(
            agent.open_window("https://www.weddingwin.ca/vendors/42"),
            OpenDecision::NavigateSameWindow {
                url: "https://www.weddingwin.ca/vendors/42".to_string()
            }
        );
        assert_eq!(agent.open_window("about:blank"), OpenDecision::Suppress);
        assert!(outbox.sent.borrow().is_empty());
    }

    #[test]
    fn request_window_open_posts_window_open_message() {
        let (agent, outbox) = hosted();
        assert!(agent.request_window_open("https://www.weddingwin.ca/gallery"));
        assert_eq!(
            outbox.sent.borrow()[0].kind,
            weddingwin_bridge_protocol::MessageType::WindowOpen
        );
    }

    #[test]
    fn failed_attempt_leaves_agent_ready_to_retry() {
        let (mut agent, outbox) = hosted();
        let LoginStart::Delegated { attempt_id } = agent.begin_google_login(GOOGLE) else {
            panic!("expected delegation");
        };
        agent.receive(Delivery::failure(
            Some(attempt_id),
            AuthFailure::provider("access_denied", None),
        ));
        assert_eq!(agent.in_flight_attempt(), None);

        assert!(matches!(
            agent.begin_google_login(GOOGLE),
            LoginStart::Delegated { .. }
        ));
        assert_eq!(outbox.sent.borrow().len(), 2);
    }

    #[test]
    fn legacy_cancel_string_maps_to_cancelled_kind() {
        let (mut agent, _) = hosted();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        agent.registry_mut().register("ui", move |outcome| {
            if let Some(failure) = outcome.failure_ref() {
                sink.borrow_mut().push(failure.kind);
            }
            Ok(())
        });
        agent.notify_error("cancelled", None);
        agent.notify_error("access_denied", None);
        assert_eq!(
            *seen.borrow(),
            vec![FailureKind::Cancelled, FailureKind::Provider]
        );
    }

    #[test]
    fn explicit_failure_kind_is_kept() {
        let (mut agent, _) = hosted();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        agent.registry_mut().register("ui", move |outcome| {
            if let Some(failure) = outcome.failure_ref() {
                sink.borrow_mut().push((failure.kind, failure.reason.clone()));
            }
            Ok(())
        });
        agent.notify_error("superseded", Some(FailureKind::Superseded));
        agent.notify_error("timeout", Some(FailureKind::Timeout));
        agent.notify_error("cancelled", Some(FailureKind::Provider));
        assert_eq!(
            *seen.borrow(),
            vec![
                (FailureKind::Superseded, "superseded".to_string()),
                (FailureKind::Timeout, "timeout".to_string()),
                (FailureKind::Provider, "cancelled".to_string()),
            ]
        );
    }

    #[test]
    fn teardown_silences_observers() {
        let (mut agent, _) = hosted();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        agent.registry_mut().register("ui", move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        agent.teardown();
        agent.notify_success_raw("T1");
        assert_eq!(*calls.borrow(), 0);
    }
}
