//! Submission declarations.
//!
//! A declaration is the raw attribute set of a submission element. The typed view
//! ([`ExtractedDeclaration`]) is derived on first use and then reused for the lifetime
//! of the declaration.

use crate::constants::attributes as attr;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Default)]
pub struct SubmissionDeclaration {
    attributes: HashMap<String, String>,
    headers: Vec<(String, String)>,
    extracted: OnceLock<ExtractedDeclaration>,
}

impl Clone for SubmissionDeclaration {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            headers: self.headers.clone(),
            extracted: OnceLock::new(),
        }
    }
}

/// Typed view of the declaration. Values that may contain attribute value templates are
/// kept as templates; they are evaluated per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDeclaration {
    pub avt_method: String,
    /// `resource`, falling back to `action`
    pub avt_resource: Option<String>,
    pub avt_serialization: Option<String>,
    pub replace: String,
    pub avt_mediatype: Option<String>,
    pub ref_expr: Option<String>,
    pub instance: Option<String>,
    pub xxf_instance: Option<String>,
    pub targetref: Option<String>,
    pub avt_validate: Option<String>,
    pub avt_relevant: Option<String>,
    pub avt_mode: Option<String>,
    pub avt_version: Option<String>,
    pub avt_encoding: Option<String>,
    pub avt_separator: Option<String>,
    pub avt_indent: Option<String>,
    pub avt_omit_xml_declaration: Option<String>,
    pub avt_standalone: Option<String>,
    pub avt_username: Option<String>,
    pub avt_password: Option<String>,
    pub avt_readonly: Option<String>,
    pub avt_cache: Option<String>,
    pub avt_shared: Option<String>,
    pub avt_ttl: Option<String>,
    pub url_norewrite: bool,
    pub url_type: Option<String>,
    /// Custom request headers: name and value template
    pub headers: Vec<(String, String)>,
}

impl SubmissionDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw attribute, e.g. `with("method", "post")`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add a custom request header whose value is an attribute value template.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value_template: impl Into<String>) -> Self {
        self.headers.push((name.into(), value_template.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The typed view, computed once.
    pub fn extract(&self) -> &ExtractedDeclaration {
        self.extracted.get_or_init(|| {
            let get = |name: &str| self.attribute(name).map(str::to_string);
            ExtractedDeclaration {
                avt_method: get(attr::METHOD).unwrap_or_else(|| "get".to_string()),
                avt_resource: get(attr::RESOURCE).or_else(|| get(attr::ACTION)),
                avt_serialization: get(attr::SERIALIZATION),
                replace: get(attr::REPLACE).unwrap_or_else(|| "all".to_string()),
                avt_mediatype: get(attr::MEDIATYPE),
                ref_expr: get(attr::REF),
                instance: get(attr::INSTANCE),
                xxf_instance: get(attr::XXF_INSTANCE),
                targetref: get(attr::TARGETREF),
                avt_validate: get(attr::VALIDATE),
                avt_relevant: get(attr::RELEVANT),
                avt_mode: get(attr::MODE),
                avt_version: get(attr::VERSION),
                avt_encoding: get(attr::ENCODING),
                avt_separator: get(attr::SEPARATOR),
                avt_indent: get(attr::INDENT),
                avt_omit_xml_declaration: get(attr::OMIT_XML_DECLARATION),
                avt_standalone: get(attr::STANDALONE),
                avt_username: get(attr::XXF_USERNAME),
                avt_password: get(attr::XXF_PASSWORD),
                avt_readonly: get(attr::XXF_READONLY),
                avt_cache: get(attr::XXF_CACHE),
                avt_shared: get(attr::XXF_SHARED),
                avt_ttl: get(attr::XXF_TTL),
                url_norewrite: self.attribute(attr::URL_NOREWRITE) == Some("true"),
                url_type: get(attr::URL_TYPE),
                headers: self.headers.clone(),
            }
        })
    }
}
