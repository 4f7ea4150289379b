#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Submission Core
//!
//! Form-submission engine: serializes an instance document, sends it through one of
//! several interchangeable transport strategies and reintegrates the response into the
//! running document.
//!
//! ## Overview
//!
//! A submission is declared once (resource, method, serialization, replace mode and
//! hints) and triggered many times. Each attempt computes two tiers of parameters,
//! prepares and serializes the document, picks a strategy and applies the result with
//! a replacer. Full-page replacements run in two passes: the first pass only prepares,
//! and an explicit client round trip triggers the exchange.
//!
//! ## Module Organization
//!
//! - [`model`] - Declarations and per-attempt parameters
//! - [`instance`] - Element trees, the [`instance::DocumentModel`] seam and path evaluation
//! - [`serialization`] - url-encoded, XML family, multipart and binary encodings
//! - [`strategy`] - Priority-ordered transport strategies
//! - [`execution`] - Units of work and the per-session asynchronous manager
//! - [`replacer`] - Application of responses to the document or the original response
//! - [`submission`] - Context, two-pass state and the orchestrator
//! - [`cache`] - Process-wide shared instance cache
//! - [`events`] - Notifications and the observer bus
//! - [`transport`] / [`container`] - Network and in-process collaborators
//! - [`config`] / [`logging`] / [`error`] - Ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use submission_core::config::SubmissionConfig;
//! use submission_core::container::{BufferedResponse, ContainerContext};
//! use submission_core::instance::{Element, InMemoryDocument, Instance};
//! use submission_core::model::SubmissionDeclaration;
//! use submission_core::submission::{ModelSubmission, SubmissionContext, SubmissionOrchestrator};
//! use submission_core::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SubmissionConfig::default();
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let container = ContainerContext::servlet(Arc::new(BufferedResponse::new()));
//! let ctx = SubmissionContext::builder(container, transport).config(config).build()?;
//!
//! let mut orchestrator = SubmissionOrchestrator::new(ctx);
//! orchestrator.register(ModelSubmission::new(
//!     "save",
//!     "model",
//!     SubmissionDeclaration::new()
//!         .with("method", "post")
//!         .with("replace", "instance")
//!         .with("resource", "https://example.org/orders"),
//! ));
//!
//! let mut doc = InMemoryDocument::new("doc-1")
//!     .with_instance(Instance::new("main", "model", Element::new("order")));
//! orchestrator.submit(&mut doc, "save").await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod events;
pub mod execution;
pub mod instance;
pub mod logging;
pub mod model;
pub mod replacer;
pub mod serialization;
pub mod strategy;
pub mod submission;
pub mod transport;

pub use error::{EngineResult, ErrorKind, SubmissionError};
pub use submission::{SubmissionContext, SubmissionOrchestrator, SubmitOutcome};
