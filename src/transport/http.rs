//! reqwest-backed network transport.

use super::{ConnectionResult, Transport, TransportRequest};
use crate::config::SubmissionConfig;
use crate::constants::headers;
use crate::error::{EngineResult, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &SubmissionConfig) -> EngineResult<Self> {
        Self::with_timeout(config.http_timeout())
    }

    /// Redirects are surfaced to the caller, never followed.
    pub fn with_timeout(timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: TransportRequest) -> EngineResult<ConnectionResult> {
        let url = Url::parse(&request.uri).map_err(|e| TransportError::InvalidUri {
            uri: request.uri.clone(),
            reason: e.to_string(),
        })?;

        debug!(method = %request.method, uri = %url, "🌐 Opening HTTP connection");

        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        if let Some(body) = request.body {
            if let Some(media_type) = &request.media_type {
                builder = builder.header(headers::CONTENT_TYPE, media_type.as_str());
            }
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|source| TransportError::Request {
            uri: request.uri.clone(),
            source,
        })?;

        let status_code = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|source| TransportError::Body {
            uri: request.uri.clone(),
            source,
        })?;

        debug!(
            uri = %request.uri,
            status_code = status_code,
            bytes = body.len(),
            "🌐 HTTP response received"
        );

        let mut result = ConnectionResult::new(request.uri, status_code).with_body(body);
        result.media_type = media_type;
        result.headers = response_headers;
        Ok(result)
    }
}
