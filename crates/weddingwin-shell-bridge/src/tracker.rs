use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use serde::Serialize;
use weddingwin_bridge_protocol::AttemptId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Idle,
    Requested,
    SessionOpen,
    /// A completion path has claimed the attempt and is delivering it.
    Completing,
    Succeeded,
    Failed,
    Cancelled,
}

impl AttemptPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptPhase::Succeeded | AttemptPhase::Failed | AttemptPhase::Cancelled
        )
    }

    fn is_open(self) -> bool {
        matches!(self, AttemptPhase::Requested | AttemptPhase::SessionOpen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted {
        /// The open attempt this request replaced, if any.
        superseded: Option<AttemptId>,
    },
    /// The id is already current or recently finished.
    Duplicate,
}

/// The exclusive right to deliver one terminal result.
///
/// `attempt_id` is `None` for a callback that arrived while no attempt was
/// tracked, e.g. a deep link that launched the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub attempt_id: Option<AttemptId>,
}

/// Bounded set of recently seen keys, evicting the oldest first.
#[derive(Debug)]
pub(crate) struct RecentSet<T> {
    limit: usize,
    seen: HashSet<T>,
    order: VecDeque<T>,
}

impl<T: Eq + Hash + Clone> RecentSet<T> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn contains(&self, key: &T) -> bool {
        self.seen.contains(key)
    }

    /// Returns false when the key was already present.
    pub(crate) fn insert(&mut self, key: T) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.limit {
            if let Some(dropped) = self.order.pop_front() {
                self.seen.remove(&dropped);
            }
        }
        true
    }
}

#[derive(Debug)]
struct Attempt {
    id: AttemptId,
    state: Option<String>,
    phase: AttemptPhase,
}

/// Per-attempt state machine shared by the redirect and deep-link paths.
///
/// Every terminal result goes through [`AttemptTracker::claim`], which moves
/// the attempt to `Completing` at most once. Whichever path claims first
/// delivers; the other gets `None`.
#[derive(Debug)]
pub struct AttemptTracker {
    current: Option<Attempt>,
    finished_ids: RecentSet<AttemptId>,
    finished_states: RecentSet<String>,
    /// A stateless callback was already handed out while nothing was tracked.
    orphan_claimed: bool,
}

impl AttemptTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            current: None,
            finished_ids: RecentSet::new(capacity),
            finished_states: RecentSet::new(capacity),
            orphan_claimed: false,
        }
    }

    pub fn phase(&self) -> AttemptPhase {
        self.current
            .as_ref()
            .map_or(AttemptPhase::Idle, |attempt| attempt.phase)
    }

    pub fn current_id(&self) -> Option<&AttemptId> {
        self.current.as_ref().map(|attempt| &attempt.id)
    }

    pub fn is_finished(&self, id: &AttemptId) -> bool {
        self.finished_ids.contains(id)
    }

    /// Starts tracking `id`. An attempt that is still open is superseded and
    /// recorded as cancelled; one already completing keeps its claim.
    pub fn request(&mut self, id: AttemptId, state: Option<String>) -> RequestOutcome {
        if self.finished_ids.contains(&id) || self.current_id() == Some(&id) {
            return RequestOutcome::Duplicate;
        }
        let superseded = match self.current.take() {
            Some(previous) if previous.phase.is_open() => {
                tracing::info!(
                    attempt_id = %previous.id,
                    replacement = %id,
                    "superseding open sign-in attempt"
                );
                self.record_finished(&previous);
                Some(previous.id)
            }
            Some(previous) => {
                self.record_finished(&previous);
                None
            }
            None => None,
        };
        self.current = Some(Attempt {
            id,
            state,
            phase: AttemptPhase::Requested,
        });
        RequestOutcome::Accepted { superseded }
    }

    pub fn open_session(&mut self, id: &AttemptId) -> bool {
        match self.current.as_mut() {
            Some(attempt) if &attempt.id == id && attempt.phase == AttemptPhase::Requested => {
                attempt.phase = AttemptPhase::SessionOpen;
                true
            }
            _ => false,
        }
    }

    /// Claims the right to deliver a result.
    ///
    /// An explicit `attempt` must be the open attempt. Without one, a `state`
    /// is matched against the open attempt's recorded state; a state that
    /// belongs to a finished attempt is stale. A callback without a state is
    /// only attributed to an open attempt that recorded none.
    ///
    /// Untagged claims are handed out only before any attempt was tracked:
    /// once per state, and once for a callback without one.
    pub fn claim(&mut self, attempt: Option<&AttemptId>, state: Option<&str>) -> Option<Claim> {
        if let Some(state) = state {
            if self.finished_states.contains(&state.to_string()) {
                tracing::debug!(state, "callback state belongs to a finished attempt");
                return None;
            }
        }

        let phase = self.phase();
        if !phase.is_open() {
            if attempt.is_some() || phase != AttemptPhase::Idle {
                tracing::debug!(?phase, "no open attempt to attribute the callback to");
                return None;
            }
            match state {
                Some(state) => {
                    self.finished_states.insert(state.to_string());
                }
                None if self.orphan_claimed => return None,
                None => self.orphan_claimed = true,
            }
            return Some(Claim { attempt_id: None });
        }
        let current = self.current.as_mut()?;

        let owned = match (attempt, state) {
            (Some(id), _) => &current.id == id,
            (None, Some(state)) => current.state.as_deref().is_none_or(|own| own == state),
            (None, None) => current.state.is_none(),
        };
        if !owned {
            tracing::debug!(
                attempt_id = %current.id,
                "callback does not belong to the open attempt"
            );
            return None;
        }

        current.phase = AttemptPhase::Completing;
        let id = current.id.clone();
        let recorded_state = current.state.clone();
        self.finished_ids.insert(id.clone());
        if let Some(state) = recorded_state.or_else(|| state.map(str::to_string)) {
            self.finished_states.insert(state);
        }
        Some(Claim {
            attempt_id: Some(id),
        })
    }

    /// Records the terminal phase of a claimed attempt. Returns false when the
    /// attempt was replaced while completing, or the claim was untagged.
    pub fn finish(&mut self, claim: &Claim, terminal: AttemptPhase) -> bool {
        debug_assert!(terminal.is_terminal());
        let Some(id) = &claim.attempt_id else {
            return false;
        };
        match self.current.as_mut() {
            Some(attempt) if &attempt.id == id && attempt.phase == AttemptPhase::Completing => {
                attempt.phase = terminal;
                true
            }
            _ => false,
        }
    }

    fn record_finished(&mut self, attempt: &Attempt) {
        self.finished_ids.insert(attempt.id.clone());
        if let Some(state) = &attempt.state {
            self.finished_states.insert(state.clone());
        }
    }
}
