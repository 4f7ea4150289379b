//! # Submission Events
//!
//! Notifications the engine emits (submit-done, submit-error, insert, delete) and the
//! triggers that drive it (submit, client round trip, asynchronous result available).
//! Delivery goes through the [`EventDispatcher`] seam and is synchronous: observers have
//! seen a notification before `dispatch` returns.

pub mod publisher;

use crate::constants::events as names;
use crate::error::{EngineResult, ErrorKind, SubmissionError};
use crate::instance::NodeRef;
use crate::submission::SubmissionResult;
use serde::{Deserialize, Serialize};

pub use publisher::{EventPublisher, PublishedEvent, RecordingObserver, SubmissionObserver};

/// Context carried by a submit-done notification
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitDoneInfo {
    pub resource_uri: Option<String>,
    pub status_code: Option<u16>,
}

/// Context carried by a submit-error notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_uri: Option<String>,
    pub status_code: Option<u16>,
    /// Response body kept for diagnostics when it was textual
    pub response_body: Option<String>,
}

impl SubmitErrorInfo {
    pub fn from_error(error: &SubmissionError, response_body: Option<String>) -> Self {
        Self {
            kind: error.kind,
            message: error.message.clone(),
            resource_uri: error.resource_uri.clone(),
            status_code: error.status_code,
            response_body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionEvent {
    SubmitDone(SubmitDoneInfo),
    SubmitError(SubmitErrorInfo),
    Insert { instance_id: String, node: NodeRef },
    Delete { instance_id: String, node: NodeRef },
}

impl SubmissionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmitDone(_) => names::XFORMS_SUBMIT_DONE,
            Self::SubmitError(_) => names::XFORMS_SUBMIT_ERROR,
            Self::Insert { .. } => names::XFORMS_INSERT,
            Self::Delete { .. } => names::XFORMS_DELETE,
        }
    }

    pub fn is_submit_done(&self) -> bool {
        matches!(self, Self::SubmitDone(_))
    }

    pub fn is_submit_error(&self) -> bool {
        matches!(self, Self::SubmitError(_))
    }
}

/// Synchronous delivery of notifications to a target (submission or instance id).
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, target: &str, event: SubmissionEvent) -> EngineResult<()>;
}

/// What makes the orchestrator act
#[derive(Debug)]
pub enum SubmissionTrigger {
    /// `xforms-submit` / `xxforms-submit` on a registered submission
    Submit { submission_id: String },
    /// Synthetic round trip from the client that resumes a deferred submission
    ClientRoundTrip,
    /// A unit of work finished on the worker pool
    ResultAvailable(SubmissionResult),
}

impl SubmissionTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit { .. } => names::XFORMS_SUBMIT,
            Self::ClientRoundTrip => names::XXFORMS_SUBMIT,
            Self::ResultAvailable(_) => names::XXFORMS_SUBMIT_REPLACE,
        }
    }
}
