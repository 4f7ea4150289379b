//! Shared helpers for the integration tests: a scripted transport and a session harness.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use submission_core::cache::SharedInstanceCache;
use submission_core::container::{BufferedResponse, ContainerContext};
use submission_core::events::{EventPublisher, RecordingObserver, SubmissionEvent, SubmissionObserver};
use submission_core::execution::{InlineExecutor, SubmissionExecutor, TokioExecutor};
use submission_core::instance::{Element, InMemoryDocument, Instance};
use submission_core::model::SubmissionDeclaration;
use submission_core::serialization::{InMemoryResources, ResourceResolver};
use submission_core::submission::{ModelSubmission, SubmissionContext, SubmissionOrchestrator};
use submission_core::transport::{ConnectionResult, Transport, TransportRequest};
use submission_core::{EngineResult, SubmissionError};

/// Canned answer for one URI
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub media_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl ScriptedResponse {
    pub fn ok(media_type: &str, body: &str) -> Self {
        Self::status(200, media_type, body)
    }

    pub fn status(status: u16, media_type: &str, body: &str) -> Self {
        Self {
            status,
            media_type: Some(media_type.to_string()),
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Transport answering from a per-URI script and recording every request
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, ScriptedResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, uri: &str, response: ScriptedResponse) {
        self.script.lock().insert(uri.to_string(), response);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: TransportRequest) -> EngineResult<ConnectionResult> {
        let uri = request.uri.clone();
        self.requests.lock().push(request);
        let response = self
            .script
            .lock()
            .get(&uri)
            .cloned()
            .unwrap_or_else(|| ScriptedResponse::status(404, "text/plain", "not found"));

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }

        let mut connection = ConnectionResult::new(uri, response.status).with_body(response.body);
        if let Some(media_type) = response.media_type {
            connection = connection.with_media_type(media_type);
        }
        for (name, value) in response.headers {
            connection = connection.with_header(name, value);
        }
        Ok(connection)
    }
}

/// Observer rejecting one kind of notification, after the recorder has seen it
#[derive(Debug)]
pub struct FailingObserver {
    pub event: &'static str,
}

impl SubmissionObserver for FailingObserver {
    fn on_event(&self, _target: &str, event: &SubmissionEvent) -> EngineResult<()> {
        if event.name() == self.event {
            return Err(SubmissionError::internal(format!("listener for {} failed", self.event)));
        }
        Ok(())
    }
}

/// One session: orchestrator, document and everything the assertions look at
pub struct Session {
    pub orchestrator: SubmissionOrchestrator,
    pub doc: InMemoryDocument,
    pub transport: Arc<ScriptedTransport>,
    pub observer: Arc<RecordingObserver>,
    pub response: Arc<BufferedResponse>,
    pub resources: Arc<InMemoryResources>,
    pub cache: Arc<SharedInstanceCache>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn register(&mut self, id: &str, declaration: SubmissionDeclaration) {
        self.orchestrator
            .register(ModelSubmission::new(id, "model", declaration));
    }

    pub fn events(&self) -> Vec<(String, SubmissionEvent)> {
        self.observer.events()
    }

    pub fn count(&self, name: &str) -> usize {
        self.observer.count(name)
    }

    pub fn main_root(&self) -> &Element {
        use submission_core::instance::DocumentModel;
        &self.doc.instance("main").expect("main instance").root
    }
}

#[derive(Default)]
pub struct SessionBuilder {
    spawn_units: bool,
    fail_on: Option<&'static str>,
}

impl SessionBuilder {
    /// Run asynchronous units on the tokio runtime instead of inline.
    pub fn spawning(mut self) -> Self {
        self.spawn_units = true;
        self
    }

    /// Make event dispatch fail for notifications named `event`.
    pub fn failing_on(mut self, event: &'static str) -> Self {
        self.fail_on = Some(event);
        self
    }

    pub fn build(self) -> Session {
        let transport = ScriptedTransport::new();
        let response = Arc::new(BufferedResponse::new());
        let observer = Arc::new(RecordingObserver::new());
        let publisher = EventPublisher::default();
        publisher.add_observer(observer.clone());
        if let Some(event) = self.fail_on {
            publisher.add_observer(Arc::new(FailingObserver { event }));
        }
        let resources = Arc::new(InMemoryResources::new());
        let cache = Arc::new(SharedInstanceCache::new(64));

        let executor: Arc<dyn SubmissionExecutor> = if self.spawn_units {
            Arc::new(TokioExecutor::current().expect("tokio runtime"))
        } else {
            Arc::new(InlineExecutor)
        };
        let resolver: Arc<dyn ResourceResolver> = resources.clone();

        let ctx = SubmissionContext::builder(
            ContainerContext::servlet(response.clone()),
            transport.clone(),
        )
        .executor(executor)
        .cache(cache.clone())
        .dispatcher(Arc::new(publisher))
        .resolver(resolver)
        .build()
        .expect("submission context");

        Session {
            orchestrator: SubmissionOrchestrator::new(ctx),
            doc: order_document(),
            transport,
            observer,
            response,
            resources,
            cache,
        }
    }
}

/// A non-initializing document with a `main` order instance and an empty `results`
/// instance, both in model `model`.
pub fn order_document() -> InMemoryDocument {
    InMemoryDocument::new("doc-1")
        .with_instance(Instance::new(
            "main",
            "model",
            Element::new("order")
                .with_child(Element::new("id").with_text("7"))
                .with_child(Element::new("status").with_text("new")),
        ))
        .with_instance(Instance::new("results", "model", Element::new("results")))
}

pub fn declaration(method: &str, replace: &str, resource: &str) -> SubmissionDeclaration {
    SubmissionDeclaration::new()
        .with("method", method)
        .with("replace", replace)
        .with("resource", resource)
}
