//! multipart/form-data encoding of instance leaves.

use super::resources::ResourceResolver;
use crate::constants::media;
use crate::error::{EngineResult, SubmissionError};
use crate::instance::{Datatype, Element};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Text(String),
    Binary(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub body: PartBody,
}

impl FormPart {
    pub fn is_binary(&self) -> bool {
        matches!(self.body, PartBody::Binary(_))
    }
}

#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<FormPart>,
}

impl MultipartForm {
    /// One part per leaf of `root`, in document order.
    pub fn from_document(root: &Element, resolver: &dyn ResourceResolver) -> EngineResult<Self> {
        let parts = root
            .leaves()
            .into_iter()
            .map(|leaf| part_for_leaf(leaf, resolver))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            boundary: format!("----submission-{}", Uuid::new_v4().simple()),
            parts,
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Request content type; must be sent verbatim since it carries the boundary.
    pub fn content_type(&self) -> String {
        format!("{}; boundary={}", media::MULTIPART_FORM_DATA, self.boundary)
    }

    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        for part in &self.parts {
            body.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!(
                "Content-Disposition: form-data; name=\"{}\"",
                escape_quoted(&part.name)
            );
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", escape_quoted(filename)));
            }
            body.put_slice(disposition.as_bytes());
            body.put_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                body.put_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.put_slice(b"\r\n");
            match &part.body {
                PartBody::Text(text) => body.put_slice(text.as_bytes()),
                PartBody::Binary(bytes) => body.put_slice(bytes),
            }
            body.put_slice(b"\r\n");
        }
        body.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body.freeze()
    }
}

fn part_for_leaf(leaf: &Element, resolver: &dyn ResourceResolver) -> EngineResult<FormPart> {
    let annotations = &leaf.annotations;
    let name = leaf.local_name().to_string();
    let binary_type = || {
        Some(
            annotations
                .mediatype
                .clone()
                .unwrap_or_else(|| media::OCTET_STREAM.to_string()),
        )
    };

    let uri = leaf.text.trim();
    match annotations.datatype {
        Some(Datatype::AnyUri) if annotations.valid && !uri.is_empty() => {
            let content = resolver.resolve(uri).map_err(|e| {
                SubmissionError::serialization(format!(
                    "cannot stream resource for part '{name}': {}",
                    e.message
                ))
                .with_resource(uri)
            })?;
            Ok(FormPart {
                filename: annotations.filename.clone(),
                content_type: binary_type(),
                body: PartBody::Binary(content),
                name,
            })
        }
        Some(Datatype::Base64Binary) if annotations.valid => {
            let compact: String = leaf.text.split_whitespace().collect();
            let decoded = STANDARD.decode(compact).map_err(|e| {
                SubmissionError::serialization(format!("invalid base64 content in '{name}': {e}"))
            })?;
            Ok(FormPart {
                filename: annotations.filename.clone(),
                content_type: binary_type(),
                body: PartBody::Binary(Bytes::from(decoded)),
                name,
            })
        }
        _ => Ok(FormPart {
            name,
            filename: None,
            content_type: None,
            body: PartBody::Text(leaf.text.clone()),
        }),
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('"', "%22").replace(['\r', '\n'], " ")
}
