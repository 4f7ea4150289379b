//! Reads served from the process-wide shared instance cache.
//!
//! A miss performs the same exchange as the local or network strategies and stores the
//! parsed instance when the exchange yields one.

use super::local::{LocalDispatch, RequestDispatcherStrategy};
use super::regular::{absolute_uri, build_request, exchange};
use super::{reject, SubmissionStrategy};
use crate::cache::{CacheKey, CachedInstance, SharedInstanceCache};
use crate::error::EngineResult;
use crate::execution::{submit_callable, UnitOfWork};
use crate::model::ResolvedSubmission;
use crate::replacer::Replacer;
use crate::submission::{SubmissionContext, SubmissionResult};
use crate::transport::{Transport, TransportRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheableStrategy;

impl CacheableStrategy {
    fn key(ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> EngineResult<CacheKey> {
        let instance_id = attempt
            .p
            .destination
            .as_ref()
            .map_or(&attempt.p.bound_node.instance_id, |d| &d.instance_id);
        Ok(CacheKey::new(
            instance_id.clone(),
            attempt.p.model_id.clone(),
            absolute_uri(ctx, &attempt.resource_with_query())?,
            attempt.sp.message_body.as_deref(),
            attempt.p2.read_only,
        ))
    }

    /// The exchange a miss performs: local include when the dispatcher strategy would
    /// take the attempt, the network otherwise.
    fn fill_exchange(
        ctx: &SubmissionContext,
        attempt: &ResolvedSubmission,
    ) -> EngineResult<FillExchange> {
        if RequestDispatcherStrategy.is_match(ctx, attempt) {
            return Ok(FillExchange::Local(RequestDispatcherStrategy::local_dispatch(
                ctx, attempt,
            )?));
        }
        Ok(FillExchange::Network {
            transport: ctx.transport.clone(),
            request: build_request(ctx, attempt)?,
        })
    }
}

#[async_trait]
impl SubmissionStrategy for CacheableStrategy {
    fn name(&self) -> &'static str {
        "cacheable"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn is_match(&self, _ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool {
        if !attempt.p2.cache {
            return reject(self.name(), attempt, "caching not requested");
        }
        if !attempt.p.replaces_instance_root() {
            return reject(self.name(), attempt, "destination is not an instance root");
        }
        true
    }

    async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let key = Self::key(ctx, &attempt)?;

        if let Some(cached) = ctx.cache.get(&key) {
            debug!(uri = %key.uri, instance_id = %key.instance_id, "📦 Shared instance cache hit");
            return Ok(Some(SubmissionResult::success(
                attempt,
                Replacer::prefilled_instance(cached.root.clone()),
                None,
            )));
        }

        debug!(uri = %key.uri, instance_id = %key.instance_id, "Shared instance cache miss");
        let fill = CacheFill {
            exchange: Self::fill_exchange(ctx, &attempt)?,
            cache: ctx.cache.clone(),
            key,
            time_to_live: attempt.p2.time_to_live.or(ctx.config.default_cache_ttl()),
        };
        let unit_attempt = attempt.clone();
        let unit = UnitOfWork::new(attempt.clone(), fill.run(unit_attempt));
        Ok(submit_callable(&ctx.sessions, &attempt, unit).await)
    }
}

enum FillExchange {
    Local(LocalDispatch),
    Network {
        transport: Arc<dyn Transport>,
        request: TransportRequest,
    },
}

/// Everything a cache-miss unit of work owns
struct CacheFill {
    exchange: FillExchange,
    cache: Arc<SharedInstanceCache>,
    key: CacheKey,
    time_to_live: Option<Duration>,
}

impl CacheFill {
    async fn run(self, attempt: Arc<ResolvedSubmission>) -> SubmissionResult {
        let result = match self.exchange {
            FillExchange::Local(dispatch) => dispatch.run(attempt).await,
            FillExchange::Network { transport, request } => {
                exchange(transport.as_ref(), request, attempt).await
            }
        };

        if let Ok(Replacer::Instance(instance)) = &result.outcome {
            if let Some(root) = instance.document() {
                self.cache.insert(
                    self.key.clone(),
                    CachedInstance {
                        root: root.clone(),
                        source_uri: self.key.uri.clone(),
                        read_only: self.key.read_only,
                    },
                    self.time_to_live,
                );
                info!(uri = %self.key.uri, "📦 Shared instance cached");
            }
        }
        result
    }
}
