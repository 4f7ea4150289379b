//! Per-attempt parameter sets.
//!
//! First-pass parameters depend on the live binding and are computed when the submit
//! trigger is handled. Second-pass parameters are evaluated only against the binding
//! snapshot captured by the first pass, so a document that changes while a submission
//! is in flight cannot alter it.

use super::{ExtractedDeclaration, HttpMethod, ReplaceMode};
use crate::config::SubmissionConfig;
use crate::constants::media;
use crate::error::{EngineResult, SubmissionError};
use crate::instance::{evaluate_avt, resolve_in_document, DocumentModel, Element, NodeRef, ResolvedNode};
use crate::serialization::{SerializationKind, SerializationParameters, XmlOutputOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which leg of the submission protocol an attempt runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPass {
    /// Not deferred: prepare, connect and replace in one go
    Single,
    /// Full-page submission: prepare only, then wait for a client round trip
    DeferredFirst,
    /// Full-page submission resumed by the client round trip
    DeferredSecond,
}

/// Where replace="instance"/"text" puts the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceDestination {
    pub instance_id: String,
    pub node: NodeRef,
}

impl ReplaceDestination {
    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Locate the replace instance (`xxf:instance`, `instance`, the bound instance, the
    /// model's default instance, in that order) and the destination node inside it.
    pub fn resolve(
        doc: &dyn DocumentModel,
        declaration: &ExtractedDeclaration,
        bound_node: &NodeRef,
        model_id: &str,
    ) -> EngineResult<Self> {
        let explicit = declaration
            .xxf_instance
            .as_deref()
            .or(declaration.instance.as_deref());

        let instance_id = match explicit {
            Some(id) => {
                let instance = doc.instance(id).ok_or_else(|| {
                    SubmissionError::target(format!(
                        "instance attribute doesn't point to an existing instance: '{id}'"
                    ))
                })?;
                if declaration.xxf_instance.is_none() && instance.model_id != model_id {
                    return Err(SubmissionError::target(format!(
                        "instance '{id}' does not belong to model '{model_id}'"
                    )));
                }
                instance.id.clone()
            }
            None => match doc.instance(&bound_node.instance_id) {
                Some(instance) => instance.id.clone(),
                None => doc
                    .default_instance(model_id)
                    .map(|instance| instance.id.clone())
                    .ok_or_else(|| {
                        SubmissionError::target(format!("model '{model_id}' has no instance"))
                    })?,
            },
        };

        let root = NodeRef::root(instance_id.clone());
        let node = match &declaration.targetref {
            None => root,
            Some(expr) => {
                let context = if explicit.is_some() { &root } else { bound_node };
                let resolved = resolve_in_document(doc, context, expr)
                    .map_err(|e| SubmissionError::target(e.message))?;
                match resolved {
                    Some(ResolvedNode::Element(node)) => node,
                    Some(ResolvedNode::Attribute { .. }) => {
                        return Err(SubmissionError::target(format!(
                            "targetref '{expr}' must point to an element"
                        )))
                    }
                    None => {
                        return Err(SubmissionError::target(format!(
                            "targetref '{expr}' did not resolve to a node"
                        )))
                    }
                }
            }
        };

        Ok(Self {
            instance_id: node.instance_id.clone(),
            node,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FirstPassParameters {
    pub effective_id: String,
    pub model_id: String,
    pub bound_node: NodeRef,
    /// Copy of the bound element taken when the attempt started
    pub binding_snapshot: Element,
    pub resolved_method: String,
    pub actual_method: HttpMethod,
    pub replace: ReplaceMode,
    pub resolved_mediatype: Option<String>,
    pub serialization: SerializationKind,
    pub serialize: bool,
    pub validate: bool,
    pub relevant: bool,
    pub is_noscript: bool,
    /// GET replace="all" handed to the client as a plain page load
    pub is_handling_client_get_all: bool,
    pub pass: SubmissionPass,
    pub url_norewrite: bool,
    pub url_type: Option<String>,
    /// Destination as seen at preparation time; `None` when not replacing into the
    /// document or when it cannot be resolved yet
    pub destination: Option<ReplaceDestination>,
}

impl FirstPassParameters {
    pub fn compute(
        doc: &dyn DocumentModel,
        effective_id: &str,
        model_id: &str,
        declaration: &ExtractedDeclaration,
        is_round_trip: bool,
        config: &SubmissionConfig,
    ) -> EngineResult<Self> {
        let default_instance = doc.default_instance(model_id).ok_or_else(|| {
            SubmissionError::preparation(format!("model '{model_id}' has no instance to submit"))
        })?;
        let context = NodeRef::root(default_instance.id.clone());

        let bound_node = match &declaration.ref_expr {
            None => context,
            Some(expr) => match resolve_in_document(doc, &context, expr)? {
                Some(ResolvedNode::Element(node)) => node,
                Some(ResolvedNode::Attribute { .. }) => {
                    return Err(SubmissionError::preparation(
                        "single-node binding must refer to a document node or an element",
                    ))
                }
                None => {
                    return Err(SubmissionError::preparation(format!(
                        "empty single-node binding on submission '{effective_id}'"
                    )))
                }
            },
        };

        let binding_snapshot = doc.element(&bound_node).cloned().ok_or_else(|| {
            SubmissionError::preparation(format!(
                "empty single-node binding on submission '{effective_id}'"
            ))
        })?;

        let resolved_method = evaluate_avt(&declaration.avt_method, &binding_snapshot)?;
        let actual_method = HttpMethod::from_declared(&resolved_method).ok_or_else(|| {
            SubmissionError::configuration(format!(
                "invalid submission method requested: '{resolved_method}'"
            ))
        })?;

        let replace: ReplaceMode = declaration
            .replace
            .parse()
            .map_err(|e: String| SubmissionError::configuration(e))?;

        let resolved_mediatype = evaluate_optional(&declaration.avt_mediatype, &binding_snapshot)?;

        let serialization = match evaluate_optional(&declaration.avt_serialization, &binding_snapshot)? {
            Some(declared) => SerializationKind::from_declared(&declared).ok_or_else(|| {
                SubmissionError::serialization(format!("unsupported serialization '{declared}'"))
            })?,
            None => SerializationKind::default_for_method(&resolved_method).ok_or_else(|| {
                SubmissionError::configuration(format!(
                    "invalid submission method requested: '{resolved_method}'"
                ))
            })?,
        };

        let serialize = serialization != SerializationKind::None;
        let validate = serialize
            && evaluate_optional(&declaration.avt_validate, &binding_snapshot)?.as_deref()
                != Some("false");
        let relevant = serialize
            && evaluate_optional(&declaration.avt_relevant, &binding_snapshot)?.as_deref()
                != Some("false");

        let is_noscript = config.noscript;
        let is_handling_client_get_all = config.optimize_get_all
            && actual_method == HttpMethod::Get
            && replace == ReplaceMode::All
            && resolved_mediatype
                .as_deref()
                .map_or(true, |mt| !mt.starts_with(media::SOAP_XML))
            && declaration.avt_username.is_none();

        let allow_deferred =
            config.allow_deferred_submission && !is_noscript && !doc.is_initializing();
        let deferred = allow_deferred && replace == ReplaceMode::All && !is_handling_client_get_all;
        let pass = match (deferred, is_round_trip) {
            (false, _) => SubmissionPass::Single,
            (true, false) => SubmissionPass::DeferredFirst,
            (true, true) => SubmissionPass::DeferredSecond,
        };

        let destination = matches!(replace, ReplaceMode::Instance | ReplaceMode::Text)
            .then(|| ReplaceDestination::resolve(doc, declaration, &bound_node, model_id).ok())
            .flatten();

        Ok(Self {
            effective_id: effective_id.to_string(),
            model_id: model_id.to_string(),
            bound_node,
            binding_snapshot,
            resolved_method,
            actual_method,
            replace,
            resolved_mediatype,
            serialization,
            serialize,
            validate,
            relevant,
            is_noscript,
            is_handling_client_get_all,
            pass,
            url_norewrite: declaration.url_norewrite,
            url_type: declaration.url_type.clone(),
            destination,
        })
    }

    pub fn is_replace_all(&self) -> bool {
        self.replace == ReplaceMode::All
    }

    pub fn is_deferred_first_pass(&self) -> bool {
        self.pass == SubmissionPass::DeferredFirst
    }

    pub fn is_deferred_second_pass(&self) -> bool {
        self.pass == SubmissionPass::DeferredSecond
    }

    /// Whether replacement, if any, swaps out a whole instance rather than a node in it.
    pub fn replaces_instance_root(&self) -> bool {
        self.destination.as_ref().map_or(true, ReplaceDestination::is_root)
    }
}

#[derive(Debug, Clone)]
pub struct SecondPassParameters {
    pub resource: String,
    pub output: XmlOutputOptions,
    pub separator: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub read_only: bool,
    pub cache: bool,
    /// `None` keeps a cached entry until evicted
    pub time_to_live: Option<Duration>,
    pub is_async: bool,
    pub headers: Vec<(String, String)>,
}

impl SecondPassParameters {
    pub fn compute(
        p: &FirstPassParameters,
        declaration: &ExtractedDeclaration,
        config: &SubmissionConfig,
    ) -> EngineResult<Self> {
        let snapshot = &p.binding_snapshot;
        let eval = |template: &Option<String>| evaluate_optional(template, snapshot);

        let template = declaration.avt_resource.as_ref().ok_or_else(|| {
            SubmissionError::preparation("mandatory resource or action attribute is missing")
        })?;
        let resource = evaluate_avt(template, snapshot)?;
        if resource.trim().is_empty() {
            return Err(SubmissionError::preparation(format!(
                "mandatory resource or action evaluated to an empty value for '{template}'"
            )));
        }
        let resource = encode_hrri(resource.trim());

        let output = XmlOutputOptions {
            method: p
                .serialization
                .output_method()
                .unwrap_or(crate::serialization::OutputMethod::Xml),
            version: eval(&declaration.avt_version)?.unwrap_or_else(|| "1.0".to_string()),
            encoding: eval(&declaration.avt_encoding)?.unwrap_or_else(|| "UTF-8".to_string()),
            indent: eval(&declaration.avt_indent)?.as_deref() == Some("true"),
            omit_xml_declaration: eval(&declaration.avt_omit_xml_declaration)?.as_deref()
                == Some("true"),
            standalone: match eval(&declaration.avt_standalone)?.as_deref() {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            },
        };

        let separator =
            eval(&declaration.avt_separator)?.unwrap_or_else(|| config.default_separator.clone());

        let read_only = eval(&declaration.avt_readonly)?.as_deref() == Some("true");
        let cache = eval(&declaration.avt_cache)?.as_deref() == Some("true")
            || eval(&declaration.avt_shared)?.as_deref() == Some("application");

        let time_to_live = match eval(&declaration.avt_ttl)? {
            None => config.default_cache_ttl(),
            Some(raw) => {
                let millis: i64 = raw.trim().parse().map_err(|_| {
                    SubmissionError::configuration(format!("invalid xxf:ttl value '{raw}'"))
                })?;
                u64::try_from(millis).ok().map(Duration::from_millis)
            }
        };

        let is_async = match eval(&declaration.avt_mode)?.as_deref() {
            None | Some("synchronous") => false,
            Some("asynchronous") if p.is_replace_all() => {
                return Err(SubmissionError::configuration(
                    "asynchronous mode is not supported with replace=\"all\"",
                ))
            }
            Some("asynchronous") => true,
            Some(other) => {
                return Err(SubmissionError::configuration(format!(
                    "invalid submission mode '{other}'"
                )))
            }
        };

        if cache {
            if !matches!(
                p.actual_method,
                HttpMethod::Get | HttpMethod::Post | HttpMethod::Put
            ) {
                return Err(SubmissionError::configuration(format!(
                    "xxf:cache=\"true\" or xxf:shared=\"application\" can be set only with method GET, POST or PUT, not {}",
                    p.actual_method
                )));
            }
            if p.replace != ReplaceMode::Instance {
                return Err(SubmissionError::configuration(
                    "xxf:cache=\"true\" or xxf:shared=\"application\" can be set only with replace=\"instance\"",
                ));
            }
            if !p.replaces_instance_root() {
                return Err(SubmissionError::target(
                    "targetref attribute must point to an instance root element when using cached/shared instance replacement",
                ));
            }
        }

        if read_only {
            if p.replace != ReplaceMode::Instance {
                return Err(SubmissionError::configuration(
                    "xxf:readonly=\"true\" can be set only with replace=\"instance\"",
                ));
            }
            if !p.replaces_instance_root() {
                return Err(SubmissionError::configuration(
                    "xxf:readonly=\"true\" requires the destination to be an instance root",
                ));
            }
        }

        let headers = declaration
            .headers
            .iter()
            .map(|(name, template)| Ok((name.clone(), evaluate_avt(template, snapshot)?)))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            resource,
            output,
            separator,
            username: eval(&declaration.avt_username)?,
            password: eval(&declaration.avt_password)?,
            read_only,
            cache,
            time_to_live,
            is_async,
            headers,
        })
    }
}

/// Everything a strategy needs to perform one attempt
#[derive(Debug, Clone)]
pub struct ResolvedSubmission {
    pub document_uuid: String,
    pub p: FirstPassParameters,
    pub p2: SecondPassParameters,
    pub sp: SerializationParameters,
}

impl ResolvedSubmission {
    pub fn effective_id(&self) -> &str {
        &self.p.effective_id
    }

    /// Resource with the serialized query string appended, if any.
    pub fn resource_with_query(&self) -> String {
        match &self.sp.query_string {
            Some(query) if !query.is_empty() => {
                let joiner = if self.p2.resource.contains('?') {
                    self.p2.separator.as_str()
                } else {
                    "?"
                };
                format!("{}{joiner}{query}", self.p2.resource)
            }
            _ => self.p2.resource.clone(),
        }
    }
}

fn evaluate_optional(template: &Option<String>, snapshot: &Element) -> EngineResult<Option<String>> {
    match template {
        None => Ok(None),
        Some(template) => {
            let value = evaluate_avt(template, snapshot)?;
            Ok((!value.is_empty()).then_some(value))
        }
    }
}

/// Percent-encode spaces, controls and non-ASCII characters of a human-readable URI.
fn encode_hrri(uri: &str) -> String {
    let mut encoded = String::with_capacity(uri.len());
    for c in uri.chars() {
        if c.is_ascii() && !c.is_ascii_control() && c != ' ' {
            encoded.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}
