use crate::error::{EngineResult, SubmissionError};
use crate::model::SubmissionDeclaration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a submission stands in the deferred protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoPassState {
    /// Ready for a submit trigger
    AwaitingFirstPass,
    /// Prepared and deferred; only a client round trip moves it on
    AwaitingSecondPass,
    /// The exchange has been started (or the attempt failed)
    Resolved,
}

impl TwoPassState {
    pub fn is_waiting_for_round_trip(&self) -> bool {
        matches!(self, Self::AwaitingSecondPass)
    }
}

impl fmt::Display for TwoPassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingFirstPass => write!(f, "awaiting_first_pass"),
            Self::AwaitingSecondPass => write!(f, "awaiting_second_pass"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// Inputs of the two-pass state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassEvent {
    /// A new submit trigger arrived
    Start,
    /// First pass finished without network action
    Defer,
    /// The client round trip resumed the deferred submission
    Resume,
    /// The attempt ran (single pass) or failed
    Complete,
}

impl PassEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Defer => "defer",
            Self::Resume => "resume",
            Self::Complete => "complete",
        }
    }
}

/// Next state for `event`, or `None` when the transition is not allowed.
pub fn next_state(state: TwoPassState, event: PassEvent) -> Option<TwoPassState> {
    use PassEvent::*;
    use TwoPassState::*;

    match (state, event) {
        (AwaitingFirstPass | Resolved, Start) => Some(AwaitingFirstPass),
        (AwaitingFirstPass, Defer) => Some(AwaitingSecondPass),
        (AwaitingFirstPass, Complete) => Some(Resolved),
        (AwaitingSecondPass, Resume) => Some(Resolved),
        // A resumed attempt that fails is already resolved
        (Resolved, Complete) => Some(Resolved),
        _ => None,
    }
}

/// A registered `<submission>`: its declaration plus deferred-protocol state.
#[derive(Debug, Clone)]
pub struct ModelSubmission {
    pub id: String,
    pub model_id: String,
    pub declaration: Arc<SubmissionDeclaration>,
    state: TwoPassState,
}

impl ModelSubmission {
    pub fn new(
        id: impl Into<String>,
        model_id: impl Into<String>,
        declaration: SubmissionDeclaration,
    ) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            declaration: Arc::new(declaration),
            state: TwoPassState::AwaitingFirstPass,
        }
    }

    pub fn state(&self) -> TwoPassState {
        self.state
    }

    /// Apply a guarded transition.
    pub fn transition(&mut self, event: PassEvent) -> EngineResult<TwoPassState> {
        let next = next_state(self.state, event).ok_or_else(|| {
            SubmissionError::internal(format!(
                "invalid transition for submission '{}': {} on '{}'",
                self.id,
                self.state,
                event.event_type()
            ))
        })?;
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn submission() -> ModelSubmission {
        ModelSubmission::new("save", "model", SubmissionDeclaration::new())
    }

    #[test]
    fn test_deferred_lifecycle() {
        let mut submission = submission();
        assert_eq!(submission.state(), TwoPassState::AwaitingFirstPass);
        submission.transition(PassEvent::Start).unwrap();
        submission.transition(PassEvent::Defer).unwrap();
        assert!(submission.state().is_waiting_for_round_trip());
        assert_eq!(
            submission.transition(PassEvent::Resume).unwrap(),
            TwoPassState::Resolved
        );
        assert_eq!(
            submission.transition(PassEvent::Start).unwrap(),
            TwoPassState::AwaitingFirstPass
        );
    }

    #[test]
    fn test_guarded_transitions() {
        let mut submission = submission();
        let error = submission.transition(PassEvent::Resume).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Internal);
        assert_eq!(submission.state(), TwoPassState::AwaitingFirstPass);

        submission.transition(PassEvent::Defer).unwrap();
        assert!(submission.transition(PassEvent::Start).is_err());
        assert!(submission.transition(PassEvent::Defer).is_err());
        assert!(submission.transition(PassEvent::Complete).is_err());
    }

    #[test]
    fn test_display_matches_serde_names() {
        for state in [
            TwoPassState::AwaitingFirstPass,
            TwoPassState::AwaitingSecondPass,
            TwoPassState::Resolved,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }
}
