// State management module
//
// This module provides the StateManager which wraps the ScanSession with thread-safe
// access using Arc<RwLock<T>> and emits session events for front-ends.

use crate::models::{AcceptedCode, CameraCapabilities, CodeSource, ScanSession, ScanState, SessionId};
use crate::services::ScanError;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Events emitted when the session changes
///
/// These events notify interested parties (front-ends, the inventory form)
/// about session changes without requiring them to poll.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session moved between states
    StateChanged {
        session_id: Option<SessionId>,
        from: ScanState,
        to: ScanState,
    },

    /// A code was accepted. Emitted exactly once per session
    ScanComplete {
        session_id: SessionId,
        code: AcceptedCode,
        source: CodeSource,
    },

    /// The session failed; retry and manual entry are available
    ScanFailed {
        session_id: Option<SessionId>,
        error: ScanError,
    },

    /// Camera negotiation finished; drives the zoom control
    CapabilitiesKnown { capabilities: CameraCapabilities },

    /// Filter verdict counters changed
    AttemptsUpdated { accepted: u32, rejected: u32 },

    /// The scan UI was closed and the session cleared
    SessionReset,
}

/// Thread-safe session manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`ScanSession`] via `Arc<RwLock<T>>`
/// - Detects session changes and emits [`SessionEvent`]s
/// - Performs compare-and-set transitions so only one terminal transition
///   per session ever lands
///
/// # Usage
///
/// Always use `StateManager` instead of touching [`ScanSession`] directly:
/// - [`read()`](Self::read) for reading without cloning
/// - [`try_transition()`](Self::try_transition) for guarded mutations
/// - [`subscribe()`](Self::subscribe) for listening to session events
///
/// # Related Types
///
/// - [`crate::models::ScanSession`]: The underlying session structure
/// - [`crate::controller::ScanController`]: The only writer in the app
pub struct StateManager {
    /// The session protected by RwLock for thread-safe access
    state: Arc<RwLock<ScanSession>>,

    /// Broadcast channel for session events
    state_tx: broadcast::Sender<SessionEvent>,
}

impl StateManager {
    /// Create a new StateManager with an idle session
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ScanSession::default())),
            state_tx,
        }
    }

    /// Get a snapshot of the current session
    pub fn snapshot(&self) -> ScanSession {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the session
    ///
    /// # Example
    /// ```ignore
    /// let scanning = state_manager.read(|session| session.state == ScanState::Scanning);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScanSession) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the session unconditionally and emit change events
    ///
    /// Prefer [`try_transition`](Self::try_transition) for anything racing
    /// with the decoder or the user.
    pub fn update<F>(&self, update_fn: F) -> Vec<SessionEvent>
    where
        F: FnOnce(&mut ScanSession),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        self.publish(&changes);
        changes
    }

    /// Compare-and-set transition
    ///
    /// Applies `apply` only if the session is still `session_id` (when given)
    /// and its state is one of `allowed_from`. A within-session move that
    /// the transition table forbids is rolled back. `on_commit` then runs under
    /// the same write lock, before any event is published, so side effects
    /// like teardown are ordered ahead of observers.
    ///
    /// # Returns
    /// `None` when the guard failed and nothing changed, otherwise the
    /// emitted events
    pub fn try_transition<F, C>(
        &self,
        session_id: Option<SessionId>,
        allowed_from: &[ScanState],
        apply: F,
        on_commit: C,
    ) -> Option<Vec<SessionEvent>>
    where
        F: FnOnce(&mut ScanSession),
        C: FnOnce(&ScanSession),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if session_id.is_some() && state.session_id != session_id {
            return None;
        }
        if !allowed_from.contains(&state.state) {
            return None;
        }

        let old_state = state.clone();
        apply(&mut state);

        // A fresh session id means a new session began; only moves within
        // one session are checked against the transition table
        let same_session = old_state.session_id == state.session_id;
        if same_session
            && old_state.state != state.state
            && !old_state.state.can_transition_to(state.state)
        {
            tracing::error!(
                "Rejected illegal session transition {} -> {}",
                old_state.state,
                state.state
            );
            *state = old_state;
            return None;
        }

        on_commit(&state);

        let changes = Self::detect_changes(&old_state, &state);
        self.publish(&changes);
        Some(changes)
    }

    /// Clear the session back to `Idle`
    pub fn reset(&self) -> Vec<SessionEvent> {
        let mut changes = self.update(|session| session.reset());

        let reset_event = SessionEvent::SessionReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Subscribe to session events
    ///
    /// Returns a receiver that will get notified of all future events.
    /// Multiple subscribers can listen simultaneously.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state_tx.subscribe()
    }

    fn publish(&self, changes: &[SessionEvent]) {
        for change in changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }
    }

    /// Detect what changed between two sessions and generate events
    fn detect_changes(old: &ScanSession, new: &ScanSession) -> Vec<SessionEvent> {
        let mut changes = Vec::new();

        if old.state != new.state {
            changes.push(SessionEvent::StateChanged {
                session_id: new.session_id,
                from: old.state,
                to: new.state,
            });
        }

        if old.attempt_count != new.attempt_count || old.rejected_count != new.rejected_count {
            changes.push(SessionEvent::AttemptsUpdated {
                accepted: new.attempt_count,
                rejected: new.rejected_count,
            });
        }

        if old.capabilities != new.capabilities {
            if let Some(capabilities) = new.capabilities {
                changes.push(SessionEvent::CapabilitiesKnown { capabilities });
            }
        }

        if new.state == ScanState::Accepted && old.state != ScanState::Accepted {
            if let (Some(session_id), Some(code), Some(source)) =
                (new.session_id, &new.accepted_code, new.code_source)
            {
                changes.push(SessionEvent::ScanComplete {
                    session_id,
                    code: code.clone(),
                    source,
                });
            }
        }

        if new.state == ScanState::Failed && old.state != ScanState::Failed {
            if let Some(error) = &new.last_error {
                changes.push(SessionEvent::ScanFailed {
                    session_id: new.session_id,
                    error: error.clone(),
                });
            }
        }

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
