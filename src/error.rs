//! # Submission Errors
//!
//! Every failure raised while preparing, serializing, connecting or replacing is carried
//! as a [`SubmissionError`] tagged with a closed [`ErrorKind`]. The orchestrator turns
//! exactly one of these into a submit-error notification per failed attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of submission failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Binding missing or of the wrong kind, pending uploads
    Preparation,
    /// Incompatible combination of declaration hints
    Configuration,
    /// Unsupported or failed encoding of the instance
    Serialization,
    /// Destination expression did not resolve to a usable node
    Target,
    /// Response body missing or not of a usable media type
    Resource,
    /// Document to submit fails required/valid checks
    Validation,
    /// Network or status-code failure
    Transport,
    /// Anything unanticipated
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation-error",
            Self::Configuration => "configuration-error",
            Self::Serialization => "serialization-error",
            Self::Target => "target-error",
            Self::Resource => "resource-error",
            Self::Validation => "validation-error",
            Self::Transport => "transport-error",
            Self::Internal => "internal-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparation-error" => Ok(Self::Preparation),
            "configuration-error" => Ok(Self::Configuration),
            "serialization-error" => Ok(Self::Serialization),
            "target-error" => Ok(Self::Target),
            "resource-error" => Ok(Self::Resource),
            "validation-error" => Ok(Self::Validation),
            "transport-error" => Ok(Self::Transport),
            "internal-error" => Ok(Self::Internal),
            _ => Err(format!("Invalid submission error kind: {s}")),
        }
    }
}

/// A submission failure with the structured context needed to build a submit-error event.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct SubmissionError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_uri: Option<String>,
    pub status_code: Option<u16>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl SubmissionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resource_uri: None,
            status_code: None,
            source: None,
        }
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Preparation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn target(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Target, message)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn with_resource(mut self, uri: impl Into<String>) -> Self {
        self.resource_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

pub type EngineResult<T> = std::result::Result<T, SubmissionError>;

/// Failures raised by the reqwest-backed transport before a status code is available.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid request URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("HTTP request to '{uri}' failed: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read response body from '{uri}': {source}")]
    Body {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl TransportError {
    fn uri(&self) -> Option<&str> {
        match self {
            Self::InvalidUri { uri, .. } | Self::Request { uri, .. } | Self::Body { uri, .. } => {
                Some(uri)
            }
            Self::ClientBuild(_) => None,
        }
    }
}

impl From<TransportError> for SubmissionError {
    fn from(error: TransportError) -> Self {
        let message = error.to_string();
        let uri = error.uri().map(str::to_string);
        let mut converted = SubmissionError::transport(message).with_source(error);
        converted.resource_uri = uri;
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_kind_display_round_trip() {
        for kind in [
            ErrorKind::Preparation,
            ErrorKind::Configuration,
            ErrorKind::Serialization,
            ErrorKind::Target,
            ErrorKind::Resource,
            ErrorKind::Validation,
            ErrorKind::Transport,
            ErrorKind::Internal,
        ] {
            let parsed: ErrorKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("bogus".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_submission_error_context() {
        let error = SubmissionError::transport("error code received when submitting instance")
            .with_resource("http://example.org/data")
            .with_status(500);

        assert_eq!(error.kind, ErrorKind::Transport);
        assert_eq!(error.status_code, Some(500));
        assert_eq!(error.resource_uri.as_deref(), Some("http://example.org/data"));
        assert_eq!(
            error.to_string(),
            "transport-error: error code received when submitting instance"
        );
        assert!(error.source().is_none());
    }

    #[test]
    fn test_transport_error_conversion_keeps_uri() {
        let error = TransportError::InvalidUri {
            uri: "::bad".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        let converted: SubmissionError = error.into();
        assert!(converted.is_transport());
        assert_eq!(converted.resource_uri.as_deref(), Some("::bad"));
        assert!(converted.source().is_some());
    }
}
