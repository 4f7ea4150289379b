//! # Submission Model
//!
//! The immutable declaration of a submission and the parameter sets derived from it
//! for each attempt.

pub mod declaration;
pub mod parameters;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use declaration::{ExtractedDeclaration, SubmissionDeclaration};
pub use parameters::{
    FirstPassParameters, ReplaceDestination, ResolvedSubmission, SecondPassParameters,
    SubmissionPass,
};

/// HTTP verb actually used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Map a declared method (`get`, `form-data-post`, ...) to its HTTP verb.
    pub fn from_declared(method: &str) -> Option<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" | "multipart-post" | "form-data-post" | "urlencoded-post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// GET and DELETE carry url-encoded data in the query string.
    pub fn uses_query_string(&self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// What happens to the document or response after a successful exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceMode {
    All,
    Instance,
    Text,
    None,
}

impl fmt::Display for ReplaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Instance => write!(f, "instance"),
            Self::Text => write!(f, "text"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ReplaceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "instance" => Ok(Self::Instance),
            "text" => Ok(Self::Text),
            "none" => Ok(Self::None),
            _ => Err(format!("Invalid replace mode: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_methods_map_to_verbs() {
        assert_eq!(HttpMethod::from_declared("GET"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::from_declared("form-data-post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::from_declared("urlencoded-post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::from_declared("delete"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::from_declared("patch"), None);
        assert!(HttpMethod::Delete.uses_query_string());
        assert!(!HttpMethod::Put.uses_query_string());
    }

    #[test]
    fn test_replace_mode_parsing() {
        assert_eq!("instance".parse::<ReplaceMode>().unwrap(), ReplaceMode::Instance);
        assert_eq!(ReplaceMode::All.to_string(), "all");
        assert!("everything".parse::<ReplaceMode>().is_err());
    }
}
