//! Loop-back strategy for test harnesses: `test:` resources answer with the request
//! body itself.

use super::{finish_exchange, reject, SubmissionStrategy};
use crate::constants::ECHO_SCHEME;
use crate::error::{EngineResult, SubmissionError};
use crate::model::ResolvedSubmission;
use crate::submission::{SubmissionContext, SubmissionResult};
use crate::transport::ConnectionResult;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoStrategy;

#[async_trait]
impl SubmissionStrategy for EchoStrategy {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn is_match(&self, _ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool {
        attempt.p2.resource.starts_with(ECHO_SCHEME)
            || reject(self.name(), attempt, "resource does not use the test: scheme")
    }

    async fn connect(
        &self,
        _ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let body = attempt.sp.message_body.clone().ok_or_else(|| {
            SubmissionError::resource("echo submission has no request body to send back")
                .with_resource(attempt.p2.resource.clone())
        })?;

        let connection = ConnectionResult::new(attempt.p2.resource.clone(), 200)
            .with_media_type(attempt.sp.actual_request_mediatype.clone())
            .with_body(body);
        Ok(Some(finish_exchange(attempt, connection)))
    }
}
