//! application/octet-stream passthrough of a URI-typed instance root.

use super::resources::ResourceResolver;
use crate::error::{EngineResult, SubmissionError};
use crate::instance::{Datatype, Element};
use bytes::Bytes;

pub fn passthrough(root: &Element, resolver: &dyn ResourceResolver) -> EngineResult<Bytes> {
    if root.annotations.datatype != Some(Datatype::AnyUri) {
        return Err(SubmissionError::serialization(format!(
            "binary serialization requires '{}' to be of type anyURI",
            root.name
        )));
    }

    let uri = root.text.trim();
    if uri.is_empty() {
        return Err(SubmissionError::serialization(format!(
            "binary serialization of '{}' has no resource to send",
            root.name
        )));
    }

    resolver.resolve(uri).map_err(|e| {
        SubmissionError::serialization(format!("cannot read binary resource: {}", e.message))
            .with_resource(uri)
    })
}
