//! Application-facing login observers.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use weddingwin_bridge_protocol::{AttemptId, AuthFailure, Delivery, SessionCredential};

use crate::pending::PendingSlot;

/// Result of one sign-in attempt as seen by application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub attempt_id: Option<AttemptId>,
    pub result: Result<SessionCredential, AuthFailure>,
}

impl AuthOutcome {
    pub fn success(attempt_id: Option<AttemptId>, credential: SessionCredential) -> Self {
        Self {
            attempt_id,
            result: Ok(credential),
        }
    }

    pub fn failure(attempt_id: Option<AttemptId>, failure: AuthFailure) -> Self {
        Self {
            attempt_id,
            result: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn credential(&self) -> Option<&SessionCredential> {
        self.result.as_ref().ok()
    }

    pub fn failure_ref(&self) -> Option<&AuthFailure> {
        self.result.as_ref().err()
    }
}

impl From<Delivery> for AuthOutcome {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Success {
                attempt_id,
                credential,
            } => Self::success(attempt_id, credential),
            Delivery::Failure {
                attempt_id,
                failure,
            } => Self::failure(attempt_id, failure),
        }
    }
}

/// Who may observe an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Outcome of the in-flight attempt: every observer.
    Everyone,
    /// Outcome of an attempt that is no longer in flight: only observers
    /// bound to that exact attempt.
    AttemptScopedOnly,
}

pub type AuthCallback = Box<dyn FnMut(&AuthOutcome) -> anyhow::Result<()>>;

struct Registration {
    id: String,
    scope: Option<AttemptId>,
    callback: AuthCallback,
}

impl Registration {
    fn accepts(&self, outcome: &AuthOutcome, audience: Audience) -> bool {
        match &self.scope {
            Some(scope) => outcome.attempt_id.as_ref() == Some(scope),
            None => audience == Audience::Everyone,
        }
    }
}

/// Observers keyed by registration id, plus the one-slot buffer for outcomes
/// that arrive before anyone is listening.
///
/// Owned by the application's session module and injected into the agent.
#[derive(Default)]
pub struct CallbackRegistry {
    registrations: Vec<Registration>,
    initialized: bool,
    pending: PendingSlot<(AuthOutcome, Audience)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `callback` under `id`, replacing any previous entry in place.
    pub fn register<F>(&mut self, id: impl Into<String>, callback: F)
    where
        F: FnMut(&AuthOutcome) -> anyhow::Result<()> + 'static,
    {
        self.insert(id.into(), None, Box::new(callback));
    }

    /// Like [`register`](Self::register), but only outcomes tagged with
    /// `attempt_id` reach this observer.
    pub fn register_for_attempt<F>(
        &mut self,
        id: impl Into<String>,
        attempt_id: AttemptId,
        callback: F,
    ) where
        F: FnMut(&AuthOutcome) -> anyhow::Result<()> + 'static,
    {
        self.insert(id.into(), Some(attempt_id), Box::new(callback));
    }

    fn insert(&mut self, id: String, scope: Option<AttemptId>, callback: AuthCallback) {
        match self.registrations.iter_mut().find(|entry| entry.id == id) {
            Some(existing) => {
                existing.scope = scope;
                existing.callback = callback;
            }
            None => self.registrations.push(Registration {
                id: id.clone(),
                scope,
                callback,
            }),
        }
        tracing::debug!(callback_id = %id, "registered login observer");
        self.flush_pending();
    }

    /// Removes the entry under `id`; absent ids are fine.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|entry| entry.id != id);
        let removed = self.registrations.len() != before;
        if removed {
            tracing::debug!(callback_id = %id, "unregistered login observer");
        }
        removed
    }

    /// Opens the registry for delivery. Idempotent.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        tracing::info!("login observer registry initialized");
        self.flush_pending();
    }

    /// Drops every observer and any buffered outcome.
    pub fn clear(&mut self) {
        self.registrations.clear();
        self.pending.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_ready(&self) -> bool {
        self.initialized && !self.registrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registrations.iter().any(|entry| entry.id == id)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_occupied()
    }

    /// Delivers `outcome` to every eligible observer, or buffers it when no
    /// observer is ready yet or none would accept it. Returns how many
    /// observers ran successfully.
    pub fn dispatch(&mut self, outcome: AuthOutcome, audience: Audience) -> usize {
        if !self.is_ready() {
            tracing::warn!(
                attempt_id = ?outcome.attempt_id,
                success = outcome.is_success(),
                "no login observer ready; holding outcome"
            );
            self.hold(outcome, audience);
            return 0;
        }
        if audience == Audience::Everyone && !self.has_observer_for(&outcome, audience) {
            tracing::warn!(
                attempt_id = ?outcome.attempt_id,
                "no login observer accepts outcome; holding it"
            );
            self.hold(outcome, audience);
            return 0;
        }
        self.fan_out(&outcome, audience)
    }

    fn flush_pending(&mut self) {
        if !self.is_ready() {
            return;
        }
        let Some((outcome, audience)) = self.pending.take() else {
            return;
        };
        if !self.has_observer_for(&outcome, audience) {
            self.pending.put((outcome, audience));
            return;
        }
        tracing::info!(attempt_id = ?outcome.attempt_id, "delivering held login outcome");
        self.fan_out(&outcome, audience);
    }

    fn hold(&mut self, outcome: AuthOutcome, audience: Audience) {
        if let Some((displaced, _)) = self.pending.put((outcome, audience)) {
            tracing::warn!(
                attempt_id = ?displaced.attempt_id,
                "discarding older undelivered login outcome"
            );
        }
    }

    fn has_observer_for(&self, outcome: &AuthOutcome, audience: Audience) -> bool {
        self.registrations
            .iter()
            .any(|entry| entry.accepts(outcome, audience))
    }

    fn fan_out(&mut self, outcome: &AuthOutcome, audience: Audience) -> usize {
        let mut delivered = 0;
        for entry in self
            .registrations
            .iter_mut()
            .filter(|entry| entry.accepts(outcome, audience))
        {
            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(outcome))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    tracing::error!(callback_id = %entry.id, %error, "login observer failed");
                }
                Err(_) => {
                    tracing::error!(callback_id = %entry.id, "login observer panicked");
                }
            }
        }
        if delivered == 0 {
            tracing::debug!(attempt_id = ?outcome.attempt_id, "no login observer handled outcome");
        }
        delivered
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field(
                "registrations",
                &self
                    .registrations
                    .iter()
                    .map(|entry| entry.id.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("initialized", &self.initialized)
            .field("pending", &self.pending.is_occupied())
            .finish()
    }
}
