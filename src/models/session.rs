use crate::models::scan::{AcceptedCode, CameraCapabilities, Symbology};
use crate::services::ScanError;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle of a scan session.
///
/// ```text
/// Idle -> Starting -> Scanning -> Accepted | Stopped | Failed
///                                           Failed -> Starting (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Starting,
    Scanning,
    Accepted,
    Stopped,
    Failed,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Accepted | ScanState::Stopped | ScanState::Failed
        )
    }

    /// Camera resources may be held only in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Starting | ScanState::Scanning)
    }

    /// Transitions allowed within a single session.
    ///
    /// Starting a new session from a terminal state goes through
    /// [`ScanSession::begin`] instead.
    pub fn can_transition_to(&self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Idle, Accepted)
                | (Starting, Scanning)
                | (Starting, Stopped)
                | (Starting, Failed)
                | (Starting, Accepted)
                | (Scanning, Accepted)
                | (Scanning, Stopped)
                | (Scanning, Failed)
                | (Failed, Starting)
                | (Failed, Accepted)
                | (Stopped, Accepted)
        )
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Starting => "starting",
            ScanState::Scanning => "scanning",
            ScanState::Accepted => "accepted",
            ScanState::Stopped => "stopped",
            ScanState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Opaque identifier created at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Where an accepted code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Camera(Symbology),
    Manual,
}

/// The central scan entity.
///
/// Owned by [`crate::state::StateManager`]; never mutate it directly outside
/// of a state-manager transition.
#[derive(Clone, Debug, Default)]
pub struct ScanSession {
    pub session_id: Option<SessionId>,
    pub state: ScanState,
    pub accepted_code: Option<AcceptedCode>,
    pub code_source: Option<CodeSource>,
    pub last_error: Option<ScanError>,

    /// Candidates the confidence filter accepted while scanning
    pub attempt_count: u32,
    /// Candidates the confidence filter turned down
    pub rejected_count: u32,

    pub capabilities: Option<CameraCapabilities>,
    pub started_at: Option<Instant>,
}

impl ScanSession {
    /// Start a fresh session in `Starting`, discarding the previous one.
    pub fn begin(&mut self, session_id: SessionId) {
        *self = ScanSession {
            session_id: Some(session_id),
            state: ScanState::Starting,
            started_at: Some(Instant::now()),
            ..ScanSession::default()
        };
    }

    /// Back to `Idle` with no session.
    pub fn reset(&mut self) {
        *self = ScanSession::default();
    }

    pub fn has_result(&self) -> bool {
        self.accepted_code.is_some()
    }

    /// One-line description for logs and the status command.
    pub fn summary(&self) -> String {
        let id = self
            .session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut parts = vec![format!("session {} {}", id, self.state)];

        if let Some(code) = &self.accepted_code {
            parts.push(format!("code {}", code));
        }
        if let Some(error) = &self.last_error {
            parts.push(format!("error: {}", error));
        }
        if self.attempt_count > 0 || self.rejected_count > 0 {
            parts.push(format!(
                "{} accepted / {} rejected reads",
                self.attempt_count, self.rejected_count
            ));
        }

        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_idle() {
        let session = ScanSession::default();
        assert_eq!(session.state, ScanState::Idle);
        assert!(session.session_id.is_none());
        assert!(!session.has_result());
    }

    #[test]
    fn test_begin_resets_previous_result() {
        let mut session = ScanSession::default();
        session.begin(SessionId::new());
        session.state = ScanState::Accepted;
        session.accepted_code = AcceptedCode::parse("X1");
        session.attempt_count = 3;

        let next = SessionId::new();
        session.begin(next);

        assert_eq!(session.session_id, Some(next));
        assert_eq!(session.state, ScanState::Starting);
        assert!(session.accepted_code.is_none());
        assert_eq!(session.attempt_count, 0);
        assert!(session.started_at.is_some());
    }

    #[test]
    fn test_transition_table() {
        use ScanState::*;
        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Accepted));
        assert!(Failed.can_transition_to(Starting));

        assert!(!Accepted.can_transition_to(Accepted));
        assert!(!Accepted.can_transition_to(Starting));
        assert!(!Stopped.can_transition_to(Scanning));
        assert!(!Idle.can_transition_to(Scanning));
    }

    #[test]
    fn test_terminal_and_active() {
        assert!(ScanState::Accepted.is_terminal());
        assert!(ScanState::Failed.is_terminal());
        assert!(!ScanState::Scanning.is_terminal());
        assert!(ScanState::Starting.is_active());
        assert!(!ScanState::Idle.is_active());
    }

    #[test]
    fn test_summary_mentions_code() {
        let mut session = ScanSession::default();
        session.begin(SessionId::new());
        session.state = ScanState::Accepted;
        session.accepted_code = AcceptedCode::parse("7891234567895");
        session.attempt_count = 1;

        let summary = session.summary();
        assert!(summary.contains("accepted"));
        assert!(summary.contains("7891234567895"));
        assert!(summary.contains("1 accepted / 0 rejected"));
    }
}
