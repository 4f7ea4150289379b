//! # Submission Constants
//!
//! Event names, declaration attribute names, media types and header policies shared
//! across the submission engine.

/// Names of the events produced and consumed by the submission engine
pub mod events {
    // Triggers
    pub const XFORMS_SUBMIT: &str = "xforms-submit";
    pub const XXFORMS_SUBMIT: &str = "xxforms-submit";
    pub const XXFORMS_SUBMIT_REPLACE: &str = "xxforms-submit-replace";

    // Notifications
    pub const XFORMS_SUBMIT_DONE: &str = "xforms-submit-done";
    pub const XFORMS_SUBMIT_ERROR: &str = "xforms-submit-error";
    pub const XFORMS_INSERT: &str = "xforms-insert";
    pub const XFORMS_DELETE: &str = "xforms-delete";
}

/// Attribute names read from a submission declaration
pub mod attributes {
    pub const METHOD: &str = "method";
    pub const RESOURCE: &str = "resource";
    pub const ACTION: &str = "action";
    pub const SERIALIZATION: &str = "serialization";
    pub const REPLACE: &str = "replace";
    pub const MEDIATYPE: &str = "mediatype";
    pub const REF: &str = "ref";
    pub const INSTANCE: &str = "instance";
    pub const XXF_INSTANCE: &str = "xxf:instance";
    pub const TARGETREF: &str = "targetref";
    pub const VALIDATE: &str = "validate";
    pub const RELEVANT: &str = "relevant";
    pub const MODE: &str = "mode";
    pub const VERSION: &str = "version";
    pub const ENCODING: &str = "encoding";
    pub const SEPARATOR: &str = "separator";
    pub const INDENT: &str = "indent";
    pub const OMIT_XML_DECLARATION: &str = "omit-xml-declaration";
    pub const STANDALONE: &str = "standalone";
    pub const XXF_USERNAME: &str = "xxf:username";
    pub const XXF_PASSWORD: &str = "xxf:password";
    pub const XXF_READONLY: &str = "xxf:readonly";
    pub const XXF_CACHE: &str = "xxf:cache";
    pub const XXF_SHARED: &str = "xxf:shared";
    pub const XXF_TTL: &str = "xxf:ttl";
    pub const URL_NOREWRITE: &str = "f:url-norewrite";
    pub const URL_TYPE: &str = "f:url-type";
}

/// Media types and media type predicates
pub mod media {
    pub const APPLICATION_XML: &str = "application/xml";
    pub const TEXT_XML: &str = "text/xml";
    pub const APPLICATION_XHTML: &str = "application/xhtml+xml";
    pub const TEXT_HTML: &str = "text/html";
    pub const TEXT_PLAIN: &str = "text/plain";
    pub const URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
    pub const MULTIPART_RELATED: &str = "multipart/related";
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const SOAP_XML: &str = "application/soap+xml";

    /// Strip parameters (`; charset=...`) and normalize case.
    pub fn base_type(media_type: &str) -> String {
        media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    pub fn is_xml(media_type: &str) -> bool {
        let base = base_type(media_type);
        base == APPLICATION_XML || base == TEXT_XML || base.ends_with("+xml")
    }

    pub fn is_text(media_type: &str) -> bool {
        base_type(media_type).starts_with("text/")
    }
}

/// Header forwarding policy
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const LOCATION: &str = "location";

    /// Response headers never copied onto the original response by a full-page replacement
    pub const NOT_FORWARDED: &[&str] = &[
        "connection",
        "content-length",
        "keep-alive",
        "transfer-encoding",
        "upgrade",
    ];

    pub fn is_forwardable(name: &str) -> bool {
        !NOT_FORWARDED
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(name))
    }
}

/// Prefix of loop-back resources answered by the echo strategy
pub const ECHO_SCHEME: &str = "test:";

/// `f:url-type` value that keeps a submission off the direct-delegate path
pub const URL_TYPE_RESOURCE: &str = "resource";

/// Separator used by url-encoded serialization when none is configured or declared
pub const DEFAULT_SEPARATOR: &str = "&";
