//! Reducer behind the session gate.
//!
//! Every input (probe result, session event, freshness result, quiz
//! completion) goes through [`GateState::apply`]. The reducer never performs
//! I/O: when a new identity needs a freshness lookup it hands back a
//! [`FreshnessRequest`] and the caller runs it.

use crate::{
    error::{GateError, StoreFailure},
    freshness::FreshnessPolicy,
    models::{GateSnapshot, Identity, QuizCompletion, Session, SessionChange},
};
use chrono::{DateTime, Utc};

/// Quiz freshness for the identity currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No identity, nothing to look up.
    NotApplicable,
    /// A lookup is in flight for the current epoch.
    Pending,
    /// Lookup finished; `None` means the quiz was never completed.
    Resolved(Option<DateTime<Utc>>),
    /// Lookup errored or timed out. Read as "not fresh".
    Failed,
}

/// A freshness lookup the reducer wants performed. The result is only
/// committed if both `epoch` and `user_id` still match when it comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessRequest {
    pub epoch: u64,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub enum GateMessage {
    /// Result of a current-session probe issued when `session_seq` was `issued_seq`.
    Probed {
        issued_seq: u64,
        result: Result<Option<Session>, GateError>,
    },
    SessionChanged(SessionChange),
    FreshnessResolved {
        request: FreshnessRequest,
        result: Result<QuizCompletion, StoreFailure>,
    },
    QuizCompleted {
        user_id: String,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct GateState {
    identity: Option<Identity>,
    freshness: Freshness,
    session_resolved: bool,
    /// Bumped on every session input (probe or event).
    session_seq: u64,
    /// Bumped whenever the identity id changes or the freshness is set directly.
    epoch: u64,
    /// Bumped on every committed transition.
    revision: u64,
    disposed: bool,
}

impl Default for GateState {
    fn default() -> Self {
        Self::new()
    }
}

impl GateState {
    pub fn new() -> Self {
        Self {
            identity: None,
            freshness: Freshness::NotApplicable,
            session_resolved: false,
            session_seq: 0,
            epoch: 0,
            revision: 0,
            disposed: false,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn session_seq(&self) -> u64 {
        self.session_seq
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// After this every `apply` returns `Err(GateError::Disposed)`.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    /// apply
    ///
    /// Single entry point for state transitions. `Ok` means the transition
    /// was committed (and possibly asks for a freshness lookup);
    /// `Err(StaleResultDiscarded)` and `Err(Disposed)` leave state untouched.
    pub fn apply(&mut self, msg: GateMessage) -> Result<Option<FreshnessRequest>, GateError> {
        if self.disposed {
            return Err(GateError::Disposed);
        }

        let effect = match msg {
            GateMessage::Probed { issued_seq, result } => {
                // A session event landed after the probe was issued; it is newer.
                if issued_seq != self.session_seq {
                    return Err(GateError::StaleResultDiscarded);
                }
                match result {
                    Ok(session) => self.replace_session(session),
                    // A failed re-probe keeps whatever identity is already known.
                    Err(_) if self.session_resolved => return Err(GateError::StaleResultDiscarded),
                    Err(_) => self.replace_session(None),
                }
            }
            GateMessage::SessionChanged(change) => self.replace_session(change.session),
            GateMessage::FreshnessResolved { request, result } => {
                if request.epoch != self.epoch || !self.holds_user(&request.user_id) {
                    return Err(GateError::StaleResultDiscarded);
                }
                self.freshness = match result {
                    Ok(completion) => Freshness::Resolved(completion.completed_at),
                    Err(StoreFailure::NotFound) => Freshness::Resolved(None),
                    Err(StoreFailure::Other(_)) => Freshness::Failed,
                };
                None
            }
            GateMessage::QuizCompleted {
                user_id,
                completed_at,
            } => {
                if !self.holds_user(&user_id) {
                    return Err(GateError::StaleResultDiscarded);
                }
                // Invalidates any lookup still in flight: it read the row before this write.
                self.epoch += 1;
                self.freshness = Freshness::Resolved(Some(completed_at));
                None
            }
        };

        self.revision += 1;
        Ok(effect)
    }

    fn holds_user(&self, user_id: &str) -> bool {
        self.identity.as_ref().is_some_and(|i| i.id == user_id)
    }

    fn replace_session(&mut self, session: Option<Session>) -> Option<FreshnessRequest> {
        self.session_seq += 1;
        self.session_resolved = true;

        let next = session.as_ref().map(Identity::from);
        let same_user = self.identity.as_ref().map(|i| &i.id) == next.as_ref().map(|i| &i.id);
        self.identity = next;

        if same_user {
            return None;
        }

        self.epoch += 1;
        match &self.identity {
            None => {
                self.freshness = Freshness::NotApplicable;
                None
            }
            Some(identity) => {
                self.freshness = Freshness::Pending;
                Some(FreshnessRequest {
                    epoch: self.epoch,
                    user_id: identity.id.clone(),
                })
            }
        }
    }

    /// snapshot
    ///
    /// Freshness is evaluated against `now`, so answers age out while the
    /// gate sits idle.
    pub fn snapshot(&self, policy: &FreshnessPolicy, now: DateTime<Utc>) -> GateSnapshot {
        let is_fresh = self.identity.is_some()
            && matches!(self.freshness, Freshness::Resolved(at) if policy.is_fresh(at, now));

        GateSnapshot {
            identity: self.identity.clone(),
            role: self.identity.as_ref().map(|i| i.role).unwrap_or_default(),
            is_fresh,
            is_loading: !self.session_resolved
                || (self.identity.is_some() && self.freshness == Freshness::Pending),
        }
    }
}
