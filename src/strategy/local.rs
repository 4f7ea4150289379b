//! In-process strategies: direct invocation of a same-process application and
//! container-mediated forward/include.

use super::{finish_exchange, outgoing_headers, reject, SubmissionStrategy};
use crate::constants::URL_TYPE_RESOURCE;
use crate::container::{
    ContainerType, DeploymentType, DispatchMode, LocalDispatcher, LocalRequest, ResponseSink,
};
use crate::error::{EngineResult, SubmissionError};
use crate::execution::{submit_callable, UnitOfWork};
use crate::model::{ReplaceMode, ResolvedSubmission};
use crate::serialization::resources::has_scheme;
use crate::submission::{SubmissionContext, SubmissionResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

fn local_request(ctx: &SubmissionContext, attempt: &ResolvedSubmission, path: String) -> LocalRequest {
    let body = attempt.sp.message_body.clone();
    LocalRequest {
        method: attempt.p.actual_method,
        path,
        headers: outgoing_headers(ctx, attempt),
        media_type: body
            .as_ref()
            .map(|_| attempt.sp.actual_request_mediatype.clone()),
        body,
    }
}

/// Portlet deployments call the embedding application directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDelegateStrategy;

#[async_trait]
impl SubmissionStrategy for DirectDelegateStrategy {
    fn name(&self) -> &'static str {
        "direct-delegate"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn is_match(&self, ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool {
        let name = self.name();
        if !ctx.container.is_portlet() {
            return reject(name, attempt, "not running in a portlet container");
        }
        if has_scheme(&attempt.p2.resource) {
            return reject(name, attempt, "resource is an absolute URI");
        }
        if ctx.container.deployment_type == DeploymentType::Separate {
            return reject(name, attempt, "deployment is separate");
        }
        if attempt.p.url_norewrite {
            return reject(name, attempt, "url-norewrite is set");
        }
        if attempt.p.url_type.as_deref() == Some(URL_TYPE_RESOURCE) {
            return reject(name, attempt, "url-type is resource");
        }
        if ctx.container.delegate.is_none() {
            return reject(name, attempt, "no local delegate available");
        }
        true
    }

    async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let Some(delegate) = ctx.container.delegate.clone() else {
            return Err(SubmissionError::internal(
                "direct-delegate strategy selected without a delegate",
            ));
        };
        let request = local_request(ctx, &attempt, attempt.resource_with_query());
        debug!(path = %request.path, "📨 Invoking local delegate");

        let unit_attempt = attempt.clone();
        let unit = UnitOfWork::new(attempt.clone(), async move {
            match delegate.invoke(request).await {
                Ok(connection) => finish_exchange(unit_attempt, connection),
                Err(error) => SubmissionResult::failure(unit_attempt, error, None),
            }
        });
        Ok(submit_callable(&ctx.sessions, &attempt, unit).await)
    }
}

/// Servlet forward (replace="all") or include (everything else). Always synchronous.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDispatcherStrategy;

impl RequestDispatcherStrategy {
    fn mode(attempt: &ResolvedSubmission) -> DispatchMode {
        if attempt.p.replace == ReplaceMode::All {
            DispatchMode::Forward
        } else {
            DispatchMode::Include
        }
    }

    fn path(ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> String {
        let resource = attempt.resource_with_query();
        if ctx.container.deployment_type == DeploymentType::Separate && !attempt.p.url_norewrite {
            format!("{}{}", ctx.container.context_path, resource)
        } else {
            resource
        }
    }

    /// Everything a local dispatch of `attempt` needs, detached from the context.
    pub(crate) fn local_dispatch(
        ctx: &SubmissionContext,
        attempt: &ResolvedSubmission,
    ) -> EngineResult<LocalDispatch> {
        let dispatcher = ctx.container.dispatcher.clone().ok_or_else(|| {
            SubmissionError::internal("request-dispatcher strategy selected without a dispatcher")
        })?;
        Ok(LocalDispatch {
            dispatcher,
            mode: Self::mode(attempt),
            request: local_request(ctx, attempt, Self::path(ctx, attempt)),
            response: ctx.container.response.clone(),
        })
    }
}

/// A forward or include ready to run
pub(crate) struct LocalDispatch {
    dispatcher: Arc<dyn LocalDispatcher>,
    mode: DispatchMode,
    request: LocalRequest,
    response: Arc<dyn ResponseSink>,
}

impl LocalDispatch {
    pub(crate) async fn run(self, attempt: Arc<ResolvedSubmission>) -> SubmissionResult {
        debug!(path = %self.request.path, mode = ?self.mode, "📨 Dispatching locally");
        match self
            .dispatcher
            .dispatch(self.mode, self.request, self.response)
            .await
        {
            Ok(connection) => finish_exchange(attempt, connection),
            Err(error) => SubmissionResult::failure(attempt, error, None),
        }
    }
}

#[async_trait]
impl SubmissionStrategy for RequestDispatcherStrategy {
    fn name(&self) -> &'static str {
        "request-dispatcher"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn is_match(&self, ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool {
        let name = self.name();
        if ctx.container.container_type != ContainerType::Servlet {
            return reject(name, attempt, "not running in a servlet container");
        }
        if has_scheme(&attempt.p2.resource) {
            return reject(name, attempt, "resource is an absolute URI");
        }
        if attempt.p.is_noscript {
            return reject(name, attempt, "noscript mode");
        }
        if attempt.p2.is_async {
            return reject(name, attempt, "asynchronous submission");
        }
        let enabled = match Self::mode(attempt) {
            DispatchMode::Forward => ctx.config.local_submission_forward,
            DispatchMode::Include => ctx.config.local_submission_include,
        };
        if !enabled {
            return reject(name, attempt, "local forward/include disabled by configuration");
        }
        if ctx.container.dispatcher.is_none() {
            return reject(name, attempt, "no request dispatcher available");
        }
        true
    }

    async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let dispatch = Self::local_dispatch(ctx, &attempt)?;
        Ok(Some(dispatch.run(attempt).await))
    }
}
