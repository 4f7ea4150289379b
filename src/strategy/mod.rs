//! # Submission Strategies
//!
//! Priority-ordered chain of interchangeable ways to perform an exchange.
//!
//! ## Priority System
//!
//! Strategies are tried in priority order (lower = checked first):
//! - 10: echo (`test:` loop-back)
//! - 20: client-get-all (the client loads a GET replace="all" itself)
//! - 30: direct-delegate (same-process application in a portlet container)
//! - 40: request-dispatcher (container forward/include)
//! - 50: cacheable (shared instance cache)
//! - 100: regular (network; always matches)
//!
//! `is_match` has no side effects beyond logging why a strategy was rejected, so for a
//! given attempt and context the same strategy is always selected.

pub mod cacheable;
pub mod client_get_all;
pub mod echo;
pub mod local;
pub mod regular;

use crate::error::{EngineResult, SubmissionError};
use crate::model::ResolvedSubmission;
use crate::replacer::select_replacer;
use crate::submission::{SubmissionContext, SubmissionResult};
use crate::transport::ConnectionResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

pub use cacheable::CacheableStrategy;
pub use client_get_all::ClientGetAllStrategy;
pub use echo::EchoStrategy;
pub use local::{DirectDelegateStrategy, RequestDispatcherStrategy};
pub use regular::RegularStrategy;

#[async_trait]
pub trait SubmissionStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> u32;

    fn is_match(&self, ctx: &SubmissionContext, attempt: &ResolvedSubmission) -> bool;

    /// Perform the exchange. `Ok(None)` means the result will arrive later through the
    /// asynchronous submission manager.
    async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>>;
}

#[derive(Debug, Default, Clone)]
pub struct StrategyChain {
    /// Strategies ordered by priority (lower priority = earlier in vec)
    strategies: Vec<Arc<dyn SubmissionStrategy>>,
}

impl StrategyChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in strategies in their fixed order.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_strategy(Arc::new(EchoStrategy))
            .with_strategy(Arc::new(ClientGetAllStrategy))
            .with_strategy(Arc::new(DirectDelegateStrategy))
            .with_strategy(Arc::new(RequestDispatcherStrategy))
            .with_strategy(Arc::new(CacheableStrategy))
            .with_strategy(Arc::new(RegularStrategy))
    }

    /// Add a strategy; the chain stays sorted by priority. Equal priorities keep
    /// insertion order.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn SubmissionStrategy>) -> Self {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.priority());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in priority order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First strategy, by priority, that accepts the attempt.
    pub fn select(
        &self,
        ctx: &SubmissionContext,
        attempt: &ResolvedSubmission,
    ) -> Option<Arc<dyn SubmissionStrategy>> {
        self.strategies
            .iter()
            .find(|strategy| strategy.is_match(ctx, attempt))
            .cloned()
    }

    #[instrument(skip(self, ctx, attempt), fields(submission_id = %attempt.effective_id()))]
    pub async fn connect(
        &self,
        ctx: &SubmissionContext,
        attempt: Arc<ResolvedSubmission>,
    ) -> EngineResult<Option<SubmissionResult>> {
        let strategy = self.select(ctx, &attempt).ok_or_else(|| {
            SubmissionError::internal(format!(
                "no submission strategy accepted '{}'",
                attempt.effective_id()
            ))
        })?;

        debug!(strategy = strategy.name(), resource = %attempt.p2.resource, "🧭 Strategy selected");
        strategy.connect(ctx, attempt).await
    }
}

/// Log why `strategy` declined an attempt.
pub(crate) fn reject(strategy: &str, attempt: &ResolvedSubmission, reason: &str) -> bool {
    debug!(
        strategy = strategy,
        submission_id = %attempt.effective_id(),
        reason = reason,
        "Skipping strategy"
    );
    false
}

/// Turn a finished exchange into a result: select the replacer and parse the body.
pub(crate) fn finish_exchange(
    attempt: Arc<ResolvedSubmission>,
    connection: ConnectionResult,
) -> SubmissionResult {
    let replacer = select_replacer(&attempt.p, &connection).and_then(|mut replacer| {
        replacer.deserialize(&connection)?;
        Ok(replacer)
    });
    match replacer {
        Ok(replacer) => SubmissionResult::success(attempt, replacer, Some(connection)),
        Err(error) => SubmissionResult::failure(attempt, error, Some(connection)),
    }
}

/// Incoming headers allowed through by configuration, then the declared custom headers.
pub(crate) fn outgoing_headers(
    ctx: &SubmissionContext,
    attempt: &ResolvedSubmission,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = ctx
        .container
        .request_headers
        .iter()
        .filter(|(name, _)| ctx.config.forwards_header(name))
        .filter(|(name, _)| {
            !attempt
                .p2
                .headers
                .iter()
                .any(|(custom, _)| custom.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect();
    headers.extend(attempt.p2.headers.iter().cloned());
    headers
}
