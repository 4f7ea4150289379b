//! Network strategy: the terminal fallback, accepts every attempt.

use super::{finish_exchange, outgoing_headers, SubmissionStrategy};
use crate::error::{EngineResult, TransportError};
use crate::execution::{submit_callable, UnitOfWork};
use crate::model::ResolvedSubmission;
use crate::serialization::resources::has_scheme;
use crate::submission::{SubmissionContext, SubmissionResult};
use crate::transport::{Credentials, Transport, TransportRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Copy, Default)]
pub struct RegularStrategy;

#[async_trait]
impl SubmissionStrategy for RegularStrategy {
    fn name(&self) -> &'static str {
        "regular"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn is_match(&self, _ctx: &SubmissionContext, _attempt: &ResolvedSubmission) -> bool {
        true
    }

    async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let request = build_request(ctx, &attempt)?;
        let transport = ctx.transport.clone();
        let unit_attempt = attempt.clone();
        let unit = UnitOfWork::new(attempt.clone(), async move {
            exchange(transport.as_ref(), request, unit_attempt).await
        });
        Ok(submit_callable(&ctx.sessions, &attempt, unit).await)
    }
}

/// Resolve a relative resource against the configured base URL.
pub(crate) fn absolute_uri(ctx: &SubmissionContext, uri: &str) -> EngineResult<String> {
    if has_scheme(uri) {
        return Ok(uri.to_string());
    }
    let Some(base) = &ctx.config.base_url else {
        return Ok(uri.to_string());
    };
    Url::parse(base)
        .and_then(|base| base.join(uri))
        .map(String::from)
        .map_err(|e| {
            TransportError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// The wire request for an attempt.
pub(crate) fn build_request(
    ctx: &SubmissionContext,
    attempt: &ResolvedSubmission,
) -> EngineResult<TransportRequest> {
    let uri = absolute_uri(ctx, &attempt.resource_with_query())?;
    let body = attempt.sp.message_body.clone();
    Ok(TransportRequest {
        method: attempt.p.actual_method,
        uri,
        headers: outgoing_headers(ctx, attempt),
        media_type: body
            .as_ref()
            .map(|_| attempt.sp.actual_request_mediatype.clone()),
        body,
        credentials: attempt.p2.username.clone().map(|username| Credentials {
            username,
            password: attempt.p2.password.clone(),
        }),
    })
}

/// Open the connection and turn whatever comes back into a result value.
pub(crate) async fn exchange(
    transport: &dyn Transport,
    request: TransportRequest,
    attempt: Arc<ResolvedSubmission>,
) -> SubmissionResult {
    let method = request.method;
    let uri = request.uri.clone();
    match transport.open(request).await {
        Ok(connection) => {
            info!(
                submission_id = %attempt.effective_id(),
                method = %method,
                uri = %uri,
                status_code = connection.status_code,
                "🌐 Submission exchange completed"
            );
            finish_exchange(attempt, connection)
        }
        Err(error) => SubmissionResult::failure(attempt, error, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubmissionConfig;
    use crate::error::ErrorKind;
    use crate::model::{HttpMethod, SubmissionDeclaration};
    use crate::replacer::Replacer;
    use crate::strategy::test_support::{resolve, servlet, CannedTransport};
    use bytes::Bytes;

    fn context_with(config: SubmissionConfig, transport: Arc<CannedTransport>) -> SubmissionContext {
        SubmissionContext::builder(servlet(), transport)
            .config(config)
            .executor(Arc::new(crate::execution::InlineExecutor))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_synchronous_exchange_with_credentials_and_body() {
        let transport = CannedTransport::new(200, "application/xml", "<saved/>");
        let config = SubmissionConfig {
            base_url: Some("http://example.org/app/".to_string()),
            ..SubmissionConfig::default()
        };
        let ctx = context_with(config.clone(), transport.clone());
        let declaration = SubmissionDeclaration::new()
            .with("method", "put")
            .with("replace", "instance")
            .with("resource", "orders/1")
            .with("xxf:username", "ada")
            .with("xxf:password", "secret");
        let mut attempt = resolve(&declaration, &config);
        attempt.sp.message_body = Some(Bytes::from_static(b"<order/>"));

        let result = RegularStrategy
            .connect(&ctx, Arc::new(attempt))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result.outcome, Ok(Replacer::Instance(_))));

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Put);
        assert_eq!(requests[0].uri, "http://example.org/app/orders/1");
        assert_eq!(requests[0].media_type.as_deref(), Some("application/xml"));
        assert_eq!(requests[0].credentials.as_ref().unwrap().username, "ada");
    }

    #[tokio::test]
    async fn test_asynchronous_exchange_goes_through_manager() {
        let transport = CannedTransport::new(200, "application/xml", "<saved/>");
        let ctx = context_with(SubmissionConfig::default(), transport.clone());
        let declaration = SubmissionDeclaration::new()
            .with("method", "get")
            .with("replace", "none")
            .with("mode", "asynchronous")
            .with("resource", "http://example.org/ping");
        let attempt = resolve(&declaration, &SubmissionConfig::default());

        let result = RegularStrategy.connect(&ctx, Arc::new(attempt)).await.unwrap();
        assert!(result.is_none());
        let manager = ctx.sessions.get("doc").unwrap();
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(manager.poll_completed().unwrap().effective_id, "search");
    }

    #[tokio::test]
    async fn test_error_status_is_captured_as_failure() {
        let transport = CannedTransport::new(503, "text/plain", "down");
        let ctx = context_with(SubmissionConfig::default(), transport);
        let declaration = SubmissionDeclaration::new()
            .with("method", "get")
            .with("replace", "instance")
            .with("resource", "http://example.org/data");
        let attempt = resolve(&declaration, &SubmissionConfig::default());

        let result = RegularStrategy
            .connect(&ctx, Arc::new(attempt))
            .await
            .unwrap()
            .unwrap();
        let error = result.outcome.as_ref().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Transport);
        assert_eq!(error.status_code, Some(503));
        assert!(result.connection.is_some());
    }
}
