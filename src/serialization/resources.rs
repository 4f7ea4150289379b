//! Resolution of URI-typed leaves (uploaded files, binary attachments).

use crate::error::{EngineResult, SubmissionError};
use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::path::PathBuf;

/// Fetch the bytes a URI-typed node refers to.
pub trait ResourceResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, uri: &str) -> EngineResult<Bytes>;
}

/// Reads `file:` URIs and plain paths, relative paths against an optional base directory.
#[derive(Debug, Clone, Default)]
pub struct FileResourceResolver {
    base_dir: Option<PathBuf>,
}

impl FileResourceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, uri: &str) -> EngineResult<PathBuf> {
        if uri.starts_with("file:") {
            let parsed = url::Url::parse(uri)
                .map_err(|e| SubmissionError::resource(format!("invalid file URI '{uri}': {e}")))?;
            return parsed
                .to_file_path()
                .map_err(|()| SubmissionError::resource(format!("not a local file URI: '{uri}'")));
        }
        if has_scheme(uri) {
            return Err(SubmissionError::resource(format!(
                "unsupported resource scheme in '{uri}'"
            )));
        }
        let path = PathBuf::from(uri);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        })
    }
}

impl ResourceResolver for FileResourceResolver {
    fn resolve(&self, uri: &str) -> EngineResult<Bytes> {
        let path = self.path_for(uri)?;
        std::fs::read(&path).map(Bytes::from).map_err(|e| {
            SubmissionError::resource(format!("cannot read '{}'", path.display()))
                .with_resource(uri)
                .with_source(e)
        })
    }
}

/// Map-backed resources, e.g. uploads held in memory by the host.
#[derive(Debug, Default)]
pub struct InMemoryResources {
    entries: DashMap<String, Bytes>,
}

impl InMemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, content: impl Into<Bytes>) {
        self.entries.insert(uri.into(), content.into());
    }

    pub fn remove(&self, uri: &str) -> Option<Bytes> {
        self.entries.remove(uri).map(|(_, content)| content)
    }
}

impl ResourceResolver for InMemoryResources {
    fn resolve(&self, uri: &str) -> EngineResult<Bytes> {
        self.entries
            .get(uri)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                SubmissionError::resource(format!("unknown resource '{uri}'")).with_resource(uri)
            })
    }
}

/// Whether `uri` starts with a URI scheme such as `http:` or `file:`.
pub fn has_scheme(uri: &str) -> bool {
    match uri.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            scheme.len() > 1
                && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}
