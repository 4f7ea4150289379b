//! GET with replace="all": nothing is fetched server-side, the client is told to load
//! the URL itself.

use super::{reject, SubmissionStrategy};
use crate::error::EngineResult;
use crate::model::ResolvedSubmission;
use crate::replacer::Replacer;
use crate::submission::{SubmissionContext, SubmissionResult};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientGetAllStrategy;

#[async_trait]
impl SubmissionStrategy for ClientGetAllStrategy {
    fn name(&self) -> &'static str {
        "client-get-all"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn is_match(&self, _ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool {
        attempt.p.is_handling_client_get_all
            || reject(self.name(), attempt, "not an optimized GET with replace=\"all\"")
    }

    async fn connect(
        &self,
        _ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let url = attempt.resource_with_query();
        Ok(Some(SubmissionResult::success(
            attempt,
            Replacer::ClientLoad { url },
            None,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubmissionConfig;
    use crate::model::SubmissionDeclaration;
    use crate::strategy::test_support::{context, resolve, servlet, CannedTransport};

    #[tokio::test]
    async fn test_client_loads_url_with_query() {
        let transport = CannedTransport::new(200, "text/html", "<html/>");
        let ctx = context(transport.clone(), servlet());
        let declaration = SubmissionDeclaration::new()
            .with("method", "get")
            .with("replace", "all")
            .with("resource", "http://example.org/search");
        let mut attempt = resolve(&declaration, &SubmissionConfig::default());
        attempt.sp.query_string = Some("term=rust".to_string());

        assert!(ClientGetAllStrategy.is_match(&ctx, &attempt));
        let result = ClientGetAllStrategy
            .connect(&ctx, Arc::new(attempt))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            result.outcome.unwrap(),
            Replacer::ClientLoad {
                url: "http://example.org/search?term=rust".to_string()
            }
        );
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_disabled_optimization_does_not_match() {
        let ctx = context(CannedTransport::new(200, "text/html", ""), servlet());
        let config = SubmissionConfig {
            optimize_get_all: false,
            ..SubmissionConfig::default()
        };
        let declaration = SubmissionDeclaration::new()
            .with("method", "get")
            .with("replace", "all")
            .with("resource", "http://example.org/search");
        let attempt = resolve(&declaration, &config);
        assert!(!ClientGetAllStrategy.is_match(&ctx, &attempt));
    }
}
