use crate::cache::SharedInstanceCache;
use crate::config::SubmissionConfig;
use crate::container::ContainerContext;
use crate::error::{EngineResult, SubmissionError};
use crate::events::{EventDispatcher, EventPublisher};
use crate::execution::{SessionSubmissionStore, SubmissionExecutor, TokioExecutor};
use crate::serialization::{FileResourceResolver, ResourceResolver};
use crate::strategy::StrategyChain;
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

/// Collaborators shared by every attempt of one session.
///
/// Built once per session and handed to the orchestrator; strategies only ever see it
/// by reference.
pub struct SubmissionContext {
    pub config: Arc<SubmissionConfig>,
    pub container: ContainerContext,
    pub transport: Arc<dyn Transport>,
    pub cache: Arc<SharedInstanceCache>,
    pub sessions: Arc<SessionSubmissionStore>,
    pub dispatcher: Arc<dyn EventDispatcher>,
    pub resolver: Arc<dyn ResourceResolver>,
    pub strategies: StrategyChain,
}

impl SubmissionContext {
    pub fn builder(
        container: ContainerContext,
        transport: Arc<dyn Transport>,
    ) -> SubmissionContextBuilder {
        SubmissionContextBuilder::new(container, transport)
    }
}

impl fmt::Debug for SubmissionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionContext")
            .field("container", &self.container.container_type)
            .field("strategies", &self.strategies.strategy_names())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Builder pattern for creating submission contexts with fluent API
pub struct SubmissionContextBuilder {
    container: ContainerContext,
    transport: Arc<dyn Transport>,
    config: Option<SubmissionConfig>,
    executor: Option<Arc<dyn SubmissionExecutor>>,
    sessions: Option<Arc<SessionSubmissionStore>>,
    cache: Option<Arc<SharedInstanceCache>>,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    strategies: Option<StrategyChain>,
}

impl SubmissionContextBuilder {
    pub fn new(container: ContainerContext, transport: Arc<dyn Transport>) -> Self {
        Self {
            container,
            transport,
            config: None,
            executor: None,
            sessions: None,
            cache: None,
            dispatcher: None,
            resolver: None,
            strategies: None,
        }
    }

    pub fn config(mut self, config: SubmissionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Executor for asynchronous units; defaults to spawning on the current runtime.
    pub fn executor(mut self, executor: Arc<dyn SubmissionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Reuse an existing session store; takes precedence over [`executor`](Self::executor).
    pub fn sessions(mut self, sessions: Arc<SessionSubmissionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Defaults to the process-wide cache.
    pub fn cache(mut self, cache: Arc<SharedInstanceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn strategies(mut self, strategies: StrategyChain) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Validate the configuration and fill in defaults.
    pub fn build(self) -> EngineResult<SubmissionContext> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(|e| {
            SubmissionError::configuration(format!("invalid submission configuration: {e}"))
                .with_source(e)
        })?;

        let sessions = match self.sessions {
            Some(sessions) => sessions,
            None => {
                let executor = match self.executor {
                    Some(executor) => executor,
                    None => Arc::new(TokioExecutor::current()?),
                };
                Arc::new(SessionSubmissionStore::new(executor))
            }
        };

        let strategies = self.strategies.unwrap_or_else(StrategyChain::standard);
        if strategies.is_empty() {
            return Err(SubmissionError::configuration(
                "at least one submission strategy is required",
            ));
        }

        Ok(SubmissionContext {
            cache: self
                .cache
                .unwrap_or_else(|| SharedInstanceCache::global(&config.cache)),
            dispatcher: self
                .dispatcher
                .unwrap_or_else(|| Arc::new(EventPublisher::default())),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(FileResourceResolver::new())),
            config: Arc::new(config),
            container: self.container,
            transport: self.transport,
            sessions,
            strategies,
        })
    }
}
