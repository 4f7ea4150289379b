//! # Serialization
//!
//! Turns the pruned, validated document to submit into a request payload plus the
//! concrete media type to send it with.

pub mod binary;
pub mod multipart;
pub mod resources;
pub mod urlencoded;
pub mod xml;

use crate::constants::media;
use crate::error::{EngineResult, SubmissionError};
use crate::instance::Element;
use crate::model::HttpMethod;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use multipart::{FormPart, MultipartForm, PartBody};
pub use resources::{FileResourceResolver, InMemoryResources, ResourceResolver};
pub use xml::{OutputMethod, XmlOutputOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationKind {
    /// No content leaves the document
    None,
    UrlEncoded,
    Xml,
    Html,
    Xhtml,
    Text,
    MultipartFormData,
    /// Requested by `multipart-post`; recognised but not supported
    MultipartRelated,
    Binary,
}

impl SerializationKind {
    /// Parse an explicit `serialization` attribute value.
    pub fn from_declared(serialization: &str) -> Option<Self> {
        let value = serialization.trim();
        if value == "none" {
            return Some(Self::None);
        }
        match media::base_type(value).as_str() {
            media::URLENCODED => Some(Self::UrlEncoded),
            media::APPLICATION_XML | media::TEXT_XML => Some(Self::Xml),
            media::TEXT_HTML => Some(Self::Html),
            media::APPLICATION_XHTML => Some(Self::Xhtml),
            media::TEXT_PLAIN => Some(Self::Text),
            media::MULTIPART_FORM_DATA => Some(Self::MultipartFormData),
            media::MULTIPART_RELATED => Some(Self::MultipartRelated),
            media::OCTET_STREAM => Some(Self::Binary),
            _ => None,
        }
    }

    /// Serialization implied by a declared method when none is given.
    pub fn default_for_method(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "post" | "put" => Some(Self::Xml),
            "get" | "delete" | "urlencoded-post" => Some(Self::UrlEncoded),
            "form-data-post" => Some(Self::MultipartFormData),
            "multipart-post" => Some(Self::MultipartRelated),
            _ => None,
        }
    }

    pub fn default_media_type(&self) -> &'static str {
        match self {
            Self::None | Self::Xml => media::APPLICATION_XML,
            Self::UrlEncoded => media::URLENCODED,
            Self::Html => media::TEXT_HTML,
            Self::Xhtml => media::APPLICATION_XHTML,
            Self::Text => media::TEXT_PLAIN,
            Self::MultipartFormData => media::MULTIPART_FORM_DATA,
            Self::MultipartRelated => media::MULTIPART_RELATED,
            Self::Binary => media::OCTET_STREAM,
        }
    }

    pub fn output_method(&self) -> Option<OutputMethod> {
        match self {
            Self::Xml => Some(OutputMethod::Xml),
            Self::Html => Some(OutputMethod::Html),
            Self::Xhtml => Some(OutputMethod::Xhtml),
            Self::Text => Some(OutputMethod::Text),
            _ => None,
        }
    }
}

/// Payload of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationParameters {
    pub message_body: Option<Bytes>,
    pub query_string: Option<String>,
    pub actual_request_mediatype: String,
}

impl SerializationParameters {
    pub fn empty(kind: SerializationKind, resolved_mediatype: Option<&str>) -> Self {
        Self {
            message_body: None,
            query_string: None,
            actual_request_mediatype: resolved_mediatype
                .map_or_else(|| kind.default_media_type().to_string(), str::to_string),
        }
    }
}

/// Inputs to [`serialize`]
#[derive(Debug, Clone, Copy)]
pub struct SerializationRequest<'a> {
    pub kind: SerializationKind,
    pub document: Option<&'a Element>,
    pub method: HttpMethod,
    pub options: &'a XmlOutputOptions,
    pub separator: &'a str,
    pub resolved_mediatype: Option<&'a str>,
    pub resolver: &'a dyn ResourceResolver,
}

pub fn serialize(request: SerializationRequest<'_>) -> EngineResult<SerializationParameters> {
    let kind = request.kind;
    let empty = SerializationParameters::empty(kind, request.resolved_mediatype);

    if kind == SerializationKind::MultipartRelated {
        return Err(SubmissionError::serialization(format!(
            "unsupported serialization '{}'",
            media::MULTIPART_RELATED
        )));
    }

    let document = match (kind, request.document) {
        (SerializationKind::None, _) | (_, None) => return Ok(empty),
        (_, Some(document)) => document,
    };

    match kind {
        SerializationKind::UrlEncoded => {
            let encoded = urlencoded::encode_leaves(document, request.separator);
            if request.method.uses_query_string() {
                Ok(SerializationParameters {
                    query_string: Some(encoded),
                    ..empty
                })
            } else {
                Ok(SerializationParameters {
                    message_body: Some(Bytes::from(encoded)),
                    ..empty
                })
            }
        }
        SerializationKind::Xml
        | SerializationKind::Html
        | SerializationKind::Xhtml
        | SerializationKind::Text => {
            let mut options = request.options.clone();
            if let Some(method) = kind.output_method() {
                options.method = method;
            }
            let body = xml::write_document(document, &options)?;
            Ok(SerializationParameters {
                message_body: Some(Bytes::from(body)),
                ..empty
            })
        }
        SerializationKind::MultipartFormData => {
            let form = MultipartForm::from_document(document, request.resolver)?;
            Ok(SerializationParameters {
                message_body: Some(form.encode()),
                query_string: None,
                actual_request_mediatype: form.content_type(),
            })
        }
        SerializationKind::Binary => Ok(SerializationParameters {
            message_body: Some(binary::passthrough(document, request.resolver)?),
            ..empty
        }),
        SerializationKind::None | SerializationKind::MultipartRelated => Ok(empty),
    }
}
