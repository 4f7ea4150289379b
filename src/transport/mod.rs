//! # Transport
//!
//! The connection primitive strategies use to perform an exchange, and the normalized
//! [`ConnectionResult`] every exchange produces.

pub mod http;

use crate::error::EngineResult;
use crate::model::HttpMethod;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub use http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// One outgoing exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Content type of `body`
    pub media_type: Option<String>,
    pub credentials: Option<Credentials>,
}

impl TransportRequest {
    pub fn new(method: HttpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
            media_type: None,
            credentials: None,
        }
    }
}

/// Normalized result of an exchange.
///
/// Owned by one consumer at a time. [`close`](Self::close) releases the buffered body
/// and may be called any number of times.
#[derive(Debug)]
pub struct ConnectionResult {
    pub resource_uri: String,
    pub status_code: u16,
    pub media_type: Option<String>,
    pub headers: Vec<(String, String)>,
    /// The response was already written to the client and must not be read again
    pub dont_handle_response: bool,
    body: Mutex<Option<Bytes>>,
    closed: AtomicBool,
}

impl ConnectionResult {
    pub fn new(resource_uri: impl Into<String>, status_code: u16) -> Self {
        Self {
            resource_uri: resource_uri.into(),
            status_code,
            media_type: None,
            headers: Vec::new(),
            dont_handle_response: false,
            body: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Result of an exchange whose response already went straight to the client.
    pub fn direct_response(resource_uri: impl Into<String>, status_code: u16) -> Self {
        Self {
            dont_handle_response: true,
            ..Self::new(resource_uri, status_code)
        }
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        *self.body.lock() = Some(body.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Only 301 and 302 count; other 3xx codes are error statuses.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status_code, 301 | 302)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether a non-empty body can still be read
    pub fn has_content(&self) -> bool {
        !self.is_closed() && self.body.lock().as_ref().is_some_and(|body| !body.is_empty())
    }

    /// Cheap clone of the body without consuming it.
    pub fn peek_body(&self) -> Option<Bytes> {
        if self.is_closed() {
            return None;
        }
        self.body.lock().clone()
    }

    pub fn take_body(&self) -> Option<Bytes> {
        self.body.lock().take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the response. Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.body.lock().take();
        true
    }
}

#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn open(&self, request: TransportRequest) -> EngineResult<ConnectionResult>;
}
