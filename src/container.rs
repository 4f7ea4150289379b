//! # Container
//!
//! The hosting container as seen by the submission engine: its kind and deployment
//! topology, the incoming request headers, the original response sink, and the optional
//! in-process shortcuts (forward/include dispatcher, same-process delegate).

use crate::error::EngineResult;
use crate::model::HttpMethod;
use crate::transport::ConnectionResult;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Servlet,
    Portlet,
}

/// How the forms runtime is deployed relative to the application it serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    /// Runtime and application share a web context
    Integrated,
    /// Runtime lives in its own context; local paths need the application context path
    Separate,
    Plain,
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrated => write!(f, "integrated"),
            Self::Separate => write!(f, "separate"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

/// The original response, written by replace="all" and redirects
pub trait ResponseSink: Send + Sync + fmt::Debug {
    fn set_status(&self, status_code: u16);
    fn set_media_type(&self, media_type: &str);
    fn add_header(&self, name: &str, value: &str);
    fn write_body(&self, body: &[u8]);
    /// Whether anything was written yet
    fn is_committed(&self) -> bool;
}

#[derive(Debug, Default, Clone)]
struct BufferedState {
    status_code: Option<u16>,
    media_type: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    committed: bool,
}

/// In-memory response sink
#[derive(Debug, Default)]
pub struct BufferedResponse {
    state: Mutex<BufferedState>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.state.lock().status_code
    }

    pub fn media_type(&self) -> Option<String> {
        self.state.lock().media_type.clone()
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.state.lock().headers.clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    pub fn body(&self) -> Vec<u8> {
        self.state.lock().body.clone()
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&self, status_code: u16) {
        let mut state = self.state.lock();
        state.status_code = Some(status_code);
        state.committed = true;
    }

    fn set_media_type(&self, media_type: &str) {
        let mut state = self.state.lock();
        state.media_type = Some(media_type.to_string());
        state.committed = true;
    }

    fn add_header(&self, name: &str, value: &str) {
        let mut state = self.state.lock();
        state.headers.push((name.to_string(), value.to_string()));
        state.committed = true;
    }

    fn write_body(&self, body: &[u8]) {
        let mut state = self.state.lock();
        state.body.extend_from_slice(body);
        state.committed = true;
    }

    fn is_committed(&self) -> bool {
        self.state.lock().committed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The target writes the response straight to the client
    Forward,
    /// The target's response is buffered and handed back
    Include,
}

/// Request handed to an in-process target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRequest {
    pub method: HttpMethod,
    /// Path within the container, query string included
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub media_type: Option<String>,
}

/// Container-mediated forward/include.
///
/// A forward writes into `response` and returns a result marked
/// `dont_handle_response`; an include returns the buffered response.
#[async_trait]
pub trait LocalDispatcher: Send + Sync + fmt::Debug {
    async fn dispatch(
        &self,
        mode: DispatchMode,
        request: LocalRequest,
        response: Arc<dyn ResponseSink>,
    ) -> EngineResult<ConnectionResult>;
}

/// Same-process application invoked directly, bypassing the network
#[async_trait]
pub trait LocalDelegate: Send + Sync + fmt::Debug {
    async fn invoke(&self, request: LocalRequest) -> EngineResult<ConnectionResult>;
}

#[derive(Debug, Clone)]
pub struct ContainerContext {
    pub container_type: ContainerType,
    pub deployment_type: DeploymentType,
    /// Context path of the application, e.g. `/orders`
    pub context_path: String,
    pub request_headers: Vec<(String, String)>,
    pub response: Arc<dyn ResponseSink>,
    pub dispatcher: Option<Arc<dyn LocalDispatcher>>,
    pub delegate: Option<Arc<dyn LocalDelegate>>,
}

impl ContainerContext {
    pub fn new(container_type: ContainerType, response: Arc<dyn ResponseSink>) -> Self {
        Self {
            container_type,
            deployment_type: DeploymentType::Plain,
            context_path: String::new(),
            request_headers: Vec::new(),
            response,
            dispatcher: None,
            delegate: None,
        }
    }

    pub fn servlet(response: Arc<dyn ResponseSink>) -> Self {
        Self::new(ContainerType::Servlet, response)
    }

    pub fn portlet(response: Arc<dyn ResponseSink>) -> Self {
        Self::new(ContainerType::Portlet, response)
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment_type: DeploymentType) -> Self {
        self.deployment_type = deployment_type;
        self
    }

    #[must_use]
    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    #[must_use]
    pub fn with_request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn LocalDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn LocalDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn is_portlet(&self) -> bool {
        self.container_type == ContainerType::Portlet
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_response_records_writes() {
        let response = BufferedResponse::new();
        assert!(!response.is_committed());

        response.set_status(201);
        response.set_media_type("text/html");
        response.add_header("X-Test", "1");
        response.write_body(b"<html/>");

        assert!(response.is_committed());
        assert_eq!(response.status_code(), Some(201));
        assert_eq!(response.media_type().as_deref(), Some("text/html"));
        assert_eq!(response.header("x-test").as_deref(), Some("1"));
        assert_eq!(response.body(), b"<html/>");
    }

    #[test]
    fn test_context_builder() {
        let context = ContainerContext::portlet(Arc::new(BufferedResponse::new()))
            .with_deployment(DeploymentType::Separate)
            .with_context_path("/app")
            .with_request_header("Cookie", "a=b");
        assert!(context.is_portlet());
        assert_eq!(context.deployment_type.to_string(), "separate");
        assert_eq!(context.request_header("cookie"), Some("a=b"));
        assert!(context.dispatcher.is_none());
    }
}
