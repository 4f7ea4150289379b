//! # End-to-end submission scenarios
//!
//! Cached reads, deferred full-page replacement, redirects on instance replacement and
//! multipart uploads, driven through the orchestrator.

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::{declaration, ScriptedResponse, Session};
use std::sync::Arc;
use submission_core::cache::{CacheKey, CachedInstance, SharedInstanceCache};
use submission_core::container::ResponseSink;
use submission_core::events::SubmissionEvent;
use submission_core::instance::{Datatype, DocumentModel, Element, Instance};
use submission_core::serialization::{MultipartForm, PartBody};
use submission_core::{ErrorKind, SubmitOutcome};

const COUNTRIES: &str = "http://example.org/countries";

#[tokio::test]
async fn scenario_a_cache_miss_then_hit() -> Result<()> {
    let mut session = Session::builder().build();
    session.transport.respond(
        COUNTRIES,
        ScriptedResponse::ok("application/xml", "<countries><c>fr</c><c>ch</c></countries>"),
    );
    session.register(
        "load",
        declaration("get", "instance", COUNTRIES)
            .with("xxf:cache", "true")
            .with("instance", "results")
            .with("serialization", "none"),
    );

    let first = session.orchestrator.submit(&mut session.doc, "load").await?;
    assert_eq!(first, SubmitOutcome::Completed);
    assert_eq!(session.transport.calls(), 1);
    let results = &session.doc.instance("results").unwrap().root;
    assert_eq!(results.name, "countries");
    assert_eq!(results.children.len(), 2);

    // Wipe the instance so the hit is observable
    session
        .doc
        .replace_instance(Instance::new("results", "model", Element::new("results")))?;

    let second = session.orchestrator.submit(&mut session.doc, "load").await?;
    assert_eq!(second, SubmitOutcome::Completed);
    assert_eq!(session.transport.calls(), 1, "cache hit must not touch the network");
    assert_eq!(session.doc.instance("results").unwrap().root.name, "countries");
    assert_eq!(session.cache.stats().hits, 1);
    assert_eq!(session.count("xforms-submit-done"), 2);
    Ok(())
}

#[tokio::test]
async fn scenario_a_different_body_misses() -> Result<()> {
    let mut session = Session::builder().build();
    session.transport.respond(
        "http://example.org/quote",
        ScriptedResponse::ok("application/xml", "<quote><price>10</price></quote>"),
    );
    session.register(
        "quote",
        declaration("post", "instance", "http://example.org/quote")
            .with("xxf:cache", "true")
            .with("instance", "results"),
    );

    session.orchestrator.submit(&mut session.doc, "quote").await?;
    session.orchestrator.submit(&mut session.doc, "quote").await?;
    assert_eq!(session.transport.calls(), 1);

    // Same resource, different serialized body
    let mut changed = session.main_root().clone();
    changed.children[1].text = "urgent".to_string();
    session
        .doc
        .replace_instance(Instance::new("main", "model", changed))?;

    let outcome = session.orchestrator.submit(&mut session.doc, "quote").await?;
    assert_eq!(outcome, SubmitOutcome::Completed);
    assert_eq!(session.transport.calls(), 2);
    assert_ne!(
        session.transport.requests()[0].body,
        session.transport.requests()[1].body
    );
    Ok(())
}

#[tokio::test]
async fn scenario_a_cached_replacement_requires_instance_root() -> Result<()> {
    let mut session = Session::builder().build();
    session.transport.respond(
        "http://example.org/status",
        ScriptedResponse::ok("application/xml", "<status>shipped</status>"),
    );
    session.register(
        "status",
        declaration("get", "instance", "http://example.org/status")
            .with("xxf:cache", "true")
            .with("targetref", "status"),
    );

    let outcome = session.orchestrator.submit(&mut session.doc, "status").await?;

    assert_eq!(outcome, SubmitOutcome::Failed(ErrorKind::Target));
    assert_eq!(session.transport.calls(), 0);
    assert!(session.cache.is_empty());
    let events = session.events();
    assert_eq!(events.len(), 1);
    match &events[0].1 {
        SubmissionEvent::SubmitError(info) => assert_eq!(
            info.message,
            "targetref attribute must point to an instance root element when using cached/shared instance replacement"
        ),
        other => panic!("expected submit-error, got {other:?}"),
    }
    assert_eq!(session.main_root().children[1].text, "new");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_a_concurrent_fills_respect_capacity() -> Result<()> {
    let cache = Arc::new(SharedInstanceCache::new(16));

    let fills = (0..8)
        .map(|task| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for n in 0..25 {
                    let uri = format!("http://example.org/countries/{task}/{n}");
                    cache.insert(
                        CacheKey::new("results", "model", uri.clone(), None, false),
                        CachedInstance {
                            root: Element::new("countries"),
                            source_uri: uri,
                            read_only: false,
                        },
                        None,
                    );
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect::<Vec<_>>();
    for fill in fills {
        fill.await?;
    }

    let stats = cache.stats();
    assert_eq!(stats.insertions, 200);
    assert!(stats.entries <= 16, "{} entries in a cache of 16", stats.entries);
    Ok(())
}

#[tokio::test]
async fn scenario_b_deferred_replace_all() -> Result<()> {
    let mut session = Session::builder().build();
    session.transport.respond(
        "http://example.org/report",
        ScriptedResponse::ok("text/html; charset=UTF-8", "<html>report</html>")
            .with_header("Content-Type", "text/html; charset=UTF-8")
            .with_header("X-Report", "42"),
    );
    session.register("report", declaration("post", "all", "http://example.org/report"));

    let first = session.orchestrator.submit(&mut session.doc, "report").await?;
    assert_eq!(first, SubmitOutcome::Deferred);
    assert_eq!(session.transport.calls(), 0, "first pass must not connect");
    assert_eq!(session.doc.active_deferred_submission(), Some("report"));
    assert!(!session.response.is_committed());

    let second = session
        .orchestrator
        .handle_client_round_trip(&mut session.doc)
        .await?;
    assert_eq!(second, SubmitOutcome::Completed);
    assert_eq!(session.transport.calls(), 1);
    assert_eq!(session.doc.active_deferred_submission(), None);
    assert!(session.doc.got_submission_replace_all());

    assert_eq!(session.response.status_code(), Some(200));
    assert_eq!(
        session.response.media_type().as_deref(),
        Some("text/html; charset=UTF-8")
    );
    assert_eq!(session.response.body(), b"<html>report</html>".to_vec());
    assert_eq!(session.response.header("X-Report").as_deref(), Some("42"));
    // The second pass of a full-page replacement has no document left to notify
    assert_eq!(session.count("xforms-submit-done"), 0);
    assert_eq!(session.count("xforms-submit-error"), 0);
    Ok(())
}

#[tokio::test]
async fn scenario_c_redirect_with_replace_instance() -> Result<()> {
    let mut session = Session::builder().build();
    session.transport.respond(
        "http://example.org/moved",
        ScriptedResponse::status(302, "application/xml", "<order><id>99</id></order>")
            .with_header("Location", "http://example.org/elsewhere"),
    );
    session.register("save", declaration("post", "instance", "http://example.org/moved"));

    let outcome = session.orchestrator.submit(&mut session.doc, "save").await?;
    assert_eq!(outcome, SubmitOutcome::Failed(ErrorKind::Transport));

    let events = session.events();
    assert_eq!(events.len(), 1);
    match &events[0].1 {
        SubmissionEvent::SubmitError(info) => {
            assert_eq!(info.message, "redirect code received with replace=\"instance\"");
            assert_eq!(info.status_code, Some(302));
        }
        other => panic!("expected submit-error, got {other:?}"),
    }
    // Nothing was deserialized into the document
    assert_eq!(session.main_root().children[0].text, "7");
    Ok(())
}

#[tokio::test]
async fn scenario_d_multipart_with_uri_leaf() -> Result<()> {
    let mut session = Session::builder().build();
    session
        .resources
        .insert("upload:receipt", Bytes::from_static(b"0123456789"));
    session.doc = session.doc.clone().with_instance(Instance::new(
        "upload",
        "model",
        Element::new("claim")
            .with_child(
                Element::new("receipt")
                    .with_text("upload:receipt")
                    .with_datatype(Datatype::AnyUri)
                    .with_upload_info(Some("application/pdf"), Some("receipt.pdf")),
            )
            .with_child(Element::new("comment").with_text("taxi")),
    ));

    let claim = session.doc.instance("upload").unwrap().root.clone();
    let form = MultipartForm::from_document(&claim, session.resources.as_ref())?;
    assert_eq!(form.parts().len(), 2);
    assert_eq!(
        form.parts()[0].body,
        PartBody::Binary(Bytes::from_static(b"0123456789"))
    );
    assert_eq!(form.parts()[1].body, PartBody::Text("taxi".to_string()));

    session.transport.respond(
        "http://example.org/claims",
        ScriptedResponse::status(204, "text/plain", ""),
    );
    session.register(
        "claim",
        declaration("post", "none", "http://example.org/claims")
            .with("ref", "instance('upload')")
            .with("serialization", "multipart/form-data"),
    );

    let outcome = session.orchestrator.submit(&mut session.doc, "claim").await?;
    assert_eq!(outcome, SubmitOutcome::Completed);

    let request = &session.transport.requests()[0];
    let media_type = request.media_type.clone().unwrap_or_default();
    assert!(media_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(request.body.as_deref().unwrap_or_default()).into_owned();
    assert_eq!(body.matches("Content-Disposition: form-data").count(), 2);
    assert!(body.contains("filename=\"receipt.pdf\""));
    assert!(body.contains("0123456789"));
    assert!(body.contains("taxi"));
    Ok(())
}
