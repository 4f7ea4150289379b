//! # Submission Orchestration
//!
//! Per-session context, the two-pass state of each registered submission, the
//! document-to-submit rules and the orchestrator that ties strategies, replacers and
//! notifications together.

pub mod context;
pub mod orchestrator;
pub mod prepare;
pub mod result;
pub mod state;

pub use context::{SubmissionContext, SubmissionContextBuilder};
pub use orchestrator::{SubmissionOrchestrator, SubmitOutcome};
pub use prepare::document_to_submit;
pub use result::SubmissionResult;
pub use state::{ModelSubmission, PassEvent, TwoPassState};
