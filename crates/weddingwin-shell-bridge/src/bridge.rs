use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use weddingwin_bridge_protocol::{
    AttemptId, AuthFailure, BridgeMessage, Delivery, FailureKind, MessageType, SignInMatcher,
    now_millis,
};

use crate::callback::{CallbackOutcome, parse_callback};
use crate::config::BridgeConfig;
use crate::deep_link::{IncomingLink, LinkDisposition, classify_incoming};
use crate::error::BridgeError;
use crate::exchange::{CodeExchanger, HttpCodeExchanger};
use crate::redirect::{CallbackTarget, ensure_state, rewrite_redirect_uri};
use crate::session::{ExternalAuthSession, PageSink, SessionCompletion};
use crate::tracker::{AttemptPhase, AttemptTracker, Claim, RecentSet, RequestOutcome};

/// What the shell should do after a message from the page was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    /// The login flow returned; the attempt is in this phase now.
    LoginFinished(AttemptPhase),
    /// Load this URL in the embedded surface.
    NavigateInPage(String),
}

#[derive(Debug)]
struct BridgeState {
    tracker: AttemptTracker,
    page_ready: bool,
    /// Delivery waiting for the page to load. A newer one replaces it.
    outbox: Option<Delivery>,
    handled_links: RecentSet<String>,
}

/// Shell-side coordinator for sign-in attempts.
///
/// The redirect returned by the external session and a redirect delivered
/// through the OS deep-link mechanism both end in the same claim on the
/// attempt tracker, so the page sees exactly one result per attempt.
pub struct ShellBridge {
    config: BridgeConfig,
    target: CallbackTarget,
    matcher: SignInMatcher,
    session: Arc<dyn ExternalAuthSession>,
    sink: Arc<dyn PageSink>,
    exchanger: Option<Arc<dyn CodeExchanger>>,
    state: Mutex<BridgeState>,
}

impl std::fmt::Debug for ShellBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellBridge")
            .field("target", &self.target.as_str())
            .field("exchanger", &self.exchanger.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ShellBridge {
    /// Validates `config` and sets up a code exchanger when it names a token
    /// endpoint.
    pub fn new(
        config: BridgeConfig,
        session: Arc<dyn ExternalAuthSession>,
        sink: Arc<dyn PageSink>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let target = CallbackTarget::parse(&config.callback_url)?;
        let matcher = config.sign_in_matcher();
        let exchanger = HttpCodeExchanger::from_config(&config)?
            .map(|exchanger| Arc::new(exchanger) as Arc<dyn CodeExchanger>);
        let state = BridgeState {
            tracker: AttemptTracker::new(config.dedupe_capacity),
            page_ready: false,
            outbox: None,
            handled_links: RecentSet::new(config.dedupe_capacity),
        };
        Ok(Self {
            config,
            target,
            matcher,
            session,
            sink,
            exchanger,
            state: Mutex::new(state),
        })
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn CodeExchanger>) -> Self {
        self.exchanger = Some(exchanger);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn callback_target(&self) -> &CallbackTarget {
        &self.target
    }

    pub fn phase(&self) -> AttemptPhase {
        self.state.lock().tracker.phase()
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.state.lock().tracker.current_id().cloned()
    }

    /// Decodes and handles one message posted by the page.
    pub async fn handle_message_json(&self, raw: &str) -> Result<MessageDisposition, BridgeError> {
        let message = BridgeMessage::from_json(raw).inspect_err(|error| {
            tracing::warn!(%error, "dropping undecodable bridge message");
        })?;
        Ok(self.handle_message(message).await)
    }

    pub async fn handle_message(&self, message: BridgeMessage) -> MessageDisposition {
        match message.kind {
            MessageType::LoginGoogle => {
                let client_id = message.client_id.as_deref();
                let phase = self
                    .start_google_login(message.attempt_id, &message.url, client_id)
                    .await;
                MessageDisposition::LoginFinished(phase)
            }
            MessageType::WindowOpen => {
                tracing::debug!(url = %message.url, "page asked to open a window in place");
                MessageDisposition::NavigateInPage(message.url)
            }
        }
    }

    /// Handles a message on the runtime without making the caller wait for
    /// the external session.
    pub fn spawn_message(self: &Arc<Self>, raw: String) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            match bridge.handle_message_json(&raw).await {
                Ok(disposition) => tracing::debug!(?disposition, "bridge message handled"),
                Err(error) => tracing::warn!(%error, "bridge message rejected"),
            }
        })
    }

    /// Runs one sign-in attempt through the external session.
    ///
    /// Returns the attempt's phase when the session call returns; this is
    /// still `SessionOpen` when the platform defers to the deep-link path.
    pub async fn start_google_login(
        &self,
        attempt: Option<AttemptId>,
        auth_url: &str,
        client_id: Option<&str>,
    ) -> AttemptPhase {
        let attempt_id = attempt.unwrap_or_else(AttemptId::generate);
        let client_id = client_id.or(self.config.client_id.as_deref());
        let rewritten = rewrite_redirect_uri(auth_url, &self.target, client_id).map(|mut url| {
            let oauth_state = ensure_state(&mut url, attempt_id.as_str());
            (url, oauth_state)
        });
        let oauth_state = rewritten.as_ref().ok().map(|(_, state)| state.clone());

        let outcome = self.state.lock().tracker.request(attempt_id.clone(), oauth_state);
        match outcome {
            RequestOutcome::Duplicate => {
                tracing::warn!(%attempt_id, "ignoring repeated sign-in request");
                return self.phase();
            }
            RequestOutcome::Accepted { superseded } => {
                tracing::info!(%attempt_id, "sign-in requested");
                if let Some(previous) = superseded {
                    self.dispatch(Delivery::failure(Some(previous), AuthFailure::superseded()));
                }
            }
        }

        let url = match rewritten {
            Ok((url, _)) => url,
            Err(error) => {
                tracing::error!(%attempt_id, %error, "sign-in url cannot be prepared");
                let failure = AuthFailure::new(FailureKind::InvalidRequest, "invalid_auth_url")
                    .with_description(error.to_string());
                self.complete(Some(&attempt_id), None, Delivery::failure(None, failure));
                return self.phase();
            }
        };
        if !self.matcher.matches(auth_url) {
            tracing::warn!(
                %attempt_id,
                host = url.host_str().unwrap_or_default(),
                "refusing non sign-in url"
            );
            let failure = AuthFailure::new(FailureKind::InvalidRequest, "not_a_sign_in_url");
            self.complete(Some(&attempt_id), None, Delivery::failure(None, failure));
            return self.phase();
        }

        self.state.lock().tracker.open_session(&attempt_id);
        tracing::info!(
            %attempt_id,
            host = url.host_str().unwrap_or_default(),
            "opening external session"
        );

        let completion = tokio::time::timeout(
            self.config.session_timeout(),
            self.session.authenticate(&url, &self.target),
        )
        .await;

        match completion {
            Ok(Ok(SessionCompletion::Redirected(raw))) => {
                self.complete_with_callback(Some(&attempt_id), &raw).await;
            }
            Ok(Ok(SessionCompletion::Dismissed)) => {
                tracing::info!(%attempt_id, "external session dismissed");
                self.complete(
                    Some(&attempt_id),
                    None,
                    Delivery::failure(None, AuthFailure::cancelled()),
                );
            }
            Ok(Ok(SessionCompletion::DeferredToDeepLink)) => {
                tracing::debug!(%attempt_id, "waiting for the redirect through a deep link");
            }
            Ok(Err(error)) => {
                tracing::error!(%attempt_id, %error, "external session failed");
                let failure =
                    AuthFailure::new(FailureKind::SessionUnavailable, "session_unavailable")
                        .with_description(error.to_string());
                self.complete(Some(&attempt_id), None, Delivery::failure(None, failure));
            }
            Err(_) => {
                tracing::warn!(
                    %attempt_id,
                    timeout_secs = self.config.session_timeout_secs,
                    "external session timed out"
                );
                self.complete(
                    Some(&attempt_id),
                    None,
                    Delivery::failure(None, AuthFailure::new(FailureKind::Timeout, "timeout")),
                );
            }
        }
        self.phase()
    }

    /// Finishes an attempt from a callback URL. `attempt` is known on the
    /// redirect path; the deep-link path passes `None` and relies on the
    /// callback's `state`.
    pub async fn complete_with_callback(
        &self,
        attempt: Option<&AttemptId>,
        raw: &str,
    ) -> LinkDisposition {
        let link_key = Url::parse(raw.trim())
            .map(String::from)
            .unwrap_or_else(|_| raw.trim().to_string());
        if self.state.lock().handled_links.contains(&link_key) {
            tracing::debug!("callback url already handled");
            return LinkDisposition::Duplicate;
        }

        let outcome = parse_callback(raw, now_millis());
        let claim = {
            let mut state = self.state.lock();
            let claim = state.tracker.claim(attempt, outcome.state());
            if claim.is_some() {
                state.handled_links.insert(link_key);
            }
            claim
        };
        let Some(claim) = claim else {
            tracing::info!(?attempt, "callback has no open attempt to finish; dropping");
            return LinkDisposition::Duplicate;
        };

        let delivery = self.resolve(outcome).await;
        self.finish(&claim, delivery);
        LinkDisposition::Consumed
    }

    /// Entry point for URLs delivered by the OS link mechanism, including
    /// the one that launched the process.
    pub async fn handle_incoming_url(&self, raw: &str) -> LinkDisposition {
        match classify_incoming(raw, &self.target) {
            IncomingLink::Callback(url) => {
                tracing::info!(path = url.path(), "sign-in callback arrived as a deep link");
                self.complete_with_callback(None, url.as_str()).await
            }
            IncomingLink::Unrelated | IncomingLink::Unparseable => LinkDisposition::Ignored,
        }
    }

    /// Consumes the deep-link feed until it closes, handling `launch` first.
    pub async fn run_deep_links(
        self: Arc<Self>,
        launch: Option<String>,
        mut links: mpsc::Receiver<String>,
    ) {
        if let Some(launch) = launch {
            let disposition = self.handle_incoming_url(&launch).await;
            tracing::debug!(?disposition, "launch url handled");
        }
        while let Some(link) = links.recv().await {
            let disposition = self.handle_incoming_url(&link).await;
            tracing::debug!(?disposition, "incoming url handled");
        }
        tracing::debug!("deep-link feed closed");
    }

    /// Marks the page ready and flushes a delivery that arrived before it.
    /// Returns whether something was flushed.
    pub fn page_loaded(&self) -> bool {
        let pending = {
            let mut state = self.state.lock();
            state.page_ready = true;
            state.outbox.take()
        };
        match pending {
            Some(delivery) => {
                tracing::info!(
                    attempt_id = ?delivery.attempt_id(),
                    "flushing delivery held for page load"
                );
                self.dispatch(delivery);
                true
            }
            None => false,
        }
    }

    /// Deliveries are held again until the next [`ShellBridge::page_loaded`].
    pub fn page_unloaded(&self) {
        self.state.lock().page_ready = false;
    }

    async fn resolve(&self, outcome: CallbackOutcome) -> Delivery {
        match outcome {
            CallbackOutcome::Credential { credential, .. } => Delivery::success(None, credential),
            CallbackOutcome::AuthorizationCode { code, .. } => match &self.exchanger {
                Some(exchanger) => match exchanger.exchange(&code).await {
                    Ok(response) => match response.into_credential(now_millis()) {
                        Ok(credential) => Delivery::success(None, credential),
                        Err(error) => Delivery::failure(None, exchange_failure(&error)),
                    },
                    Err(error) => Delivery::failure(None, exchange_failure(&error)),
                },
                None => Delivery::success(None, CallbackOutcome::code_credential(&code)),
            },
            CallbackOutcome::ProviderError { failure, .. } => {
                tracing::warn!(reason = %failure.reason, "provider returned an error");
                Delivery::failure(None, failure)
            }
            CallbackOutcome::Malformed { failure } => Delivery::failure(None, failure),
        }
    }

    /// Claims `attempt` and delivers `delivery` for it, unless another path
    /// already did.
    fn complete(&self, attempt: Option<&AttemptId>, state: Option<&str>, delivery: Delivery) {
        let claim = self.state.lock().tracker.claim(attempt, state);
        match claim {
            Some(claim) => self.finish(&claim, delivery),
            None => tracing::debug!(?attempt, "attempt already finished; dropping result"),
        }
    }

    /// Tags `delivery` with the claimed attempt, records the terminal phase
    /// and hands it to the page.
    fn finish(&self, claim: &Claim, delivery: Delivery) {
        let delivery = tag(delivery, claim.attempt_id.clone());
        let terminal = terminal_phase(&delivery);
        self.state.lock().tracker.finish(claim, terminal);
        tracing::info!(
            attempt_id = ?claim.attempt_id,
            phase = ?terminal,
            "sign-in attempt finished"
        );
        self.dispatch(delivery);
    }

    fn dispatch(&self, delivery: Delivery) {
        {
            let mut state = self.state.lock();
            if !state.page_ready {
                if let Some(displaced) = state.outbox.replace(delivery) {
                    tracing::warn!(
                        attempt_id = ?displaced.attempt_id(),
                        "replacing undelivered result held for page load"
                    );
                }
                return;
            }
        }
        if let Err(error) = self.sink.deliver(&delivery) {
            tracing::error!(
                %error,
                attempt_id = ?delivery.attempt_id(),
                "page delivery failed; holding for next load"
            );
            let mut state = self.state.lock();
            state.page_ready = false;
            state.outbox.get_or_insert(delivery);
        }
    }
}

fn exchange_failure(error: &crate::exchange::ExchangeError) -> AuthFailure {
    AuthFailure::new(FailureKind::Exchange, error.reason()).with_description(error.to_string())
}

fn tag(delivery: Delivery, attempt_id: Option<AttemptId>) -> Delivery {
    match delivery {
        Delivery::Success { credential, .. } => Delivery::Success {
            attempt_id,
            credential,
        },
        Delivery::Failure { failure, .. } => Delivery::Failure {
            attempt_id,
            failure,
        },
    }
}

fn terminal_phase(delivery: &Delivery) -> AttemptPhase {
    match delivery {
        Delivery::Success { .. } => AttemptPhase::Succeeded,
        Delivery::Failure { failure, .. } if failure.kind.is_silent() => AttemptPhase::Cancelled,
        Delivery::Failure { .. } => AttemptPhase::Failed,
    }
}
