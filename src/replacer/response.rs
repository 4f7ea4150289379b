//! Replacers that write to the original response.

use super::{done_unless_second_pass, FinishNotification, ReplaceContext};
use crate::constants::headers;
use crate::error::{EngineResult, SubmissionError};
use tracing::info;

/// replace="all": the fetched response becomes the response to the client.
///
/// The whole body is buffered before anything is written, so a failure never leaves a
/// half-sent page behind.
pub fn replace_all(mut ctx: ReplaceContext<'_>) -> EngineResult<FinishNotification> {
    let connection = ctx.connection.ok_or_else(|| {
        SubmissionError::resource("no response available for replace=\"all\"")
    })?;
    let body = connection.peek_body().ok_or_else(|| {
        SubmissionError::resource("response body is no longer available")
            .with_resource(connection.resource_uri.clone())
    })?;

    let sink = &ctx.container.response;
    sink.set_status(connection.status_code);
    if let Some(media_type) = &connection.media_type {
        sink.set_media_type(media_type);
    }
    for (name, value) in &connection.headers {
        if headers::is_forwardable(name) && !name.eq_ignore_ascii_case(headers::CONTENT_TYPE) {
            sink.add_header(name, value);
        }
    }
    sink.write_body(&body);

    info!(
        submission_id = %ctx.attempt.effective_id(),
        status_code = connection.status_code,
        bytes = body.len(),
        "📄 Full-page response written"
    );

    ctx.doc.mark_submission_replace_all();
    Ok(done_unless_second_pass(&ctx))
}

/// Redirect with replace="all": status and headers go to the client, no body.
pub fn redirect(mut ctx: ReplaceContext<'_>) -> EngineResult<FinishNotification> {
    let connection = ctx
        .connection
        .ok_or_else(|| SubmissionError::resource("no response available for redirect"))?;

    let sink = &ctx.container.response;
    sink.set_status(connection.status_code);
    for (name, value) in &connection.headers {
        if headers::is_forwardable(name) {
            sink.add_header(name, value);
        }
    }

    info!(
        submission_id = %ctx.attempt.effective_id(),
        status_code = connection.status_code,
        location = connection.header(headers::LOCATION),
        "↪️ Redirect forwarded to client"
    );

    ctx.doc.mark_submission_replace_all();
    Ok(done_unless_second_pass(&ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BufferedResponse, ContainerContext};
    use crate::instance::DocumentModel;
    use crate::model::SubmissionDeclaration;
    use crate::replacer::test_support::{attempt, document};
    use crate::replacer::Replacer;
    use crate::transport::ConnectionResult;
    use std::sync::Arc;

    fn declaration() -> SubmissionDeclaration {
        SubmissionDeclaration::new()
            .with("method", "post")
            .with("replace", "all")
            .with("resource", "http://example.org/page")
    }

    #[test]
    fn test_replace_all_writes_everything_to_sink() {
        let mut doc = document();
        let declaration = declaration();
        let attempt = attempt(&doc, &declaration, true);
        let sink = Arc::new(BufferedResponse::new());
        let container = ContainerContext::servlet(sink.clone());
        let connection = ConnectionResult::new("http://example.org/page", 200)
            .with_media_type("text/html")
            .with_header("Content-Type", "text/html")
            .with_header("Content-Length", "13")
            .with_header("X-Page", "1")
            .with_body("<html></html>");

        let finish = Replacer::All
            .replace(ReplaceContext {
                doc: &mut doc,
                container: &container,
                declaration: declaration.extract(),
                attempt: &attempt,
                connection: Some(&connection),
            })
            .unwrap();

        assert_eq!(sink.status_code(), Some(200));
        assert_eq!(sink.media_type().as_deref(), Some("text/html"));
        assert_eq!(sink.body(), b"<html></html>");
        assert_eq!(sink.headers(), vec![("X-Page".to_string(), "1".to_string())]);
        assert!(doc.got_submission_replace_all());
        // Deferred second pass: nothing left to notify
        assert!(finish.is_empty());
    }

    #[test]
    fn test_redirect_forwards_location_without_body() {
        let mut doc = document();
        doc.set_initializing(true);
        let declaration = declaration();
        let attempt = attempt(&doc, &declaration, false);
        let sink = Arc::new(BufferedResponse::new());
        let container = ContainerContext::servlet(sink.clone());
        let connection = ConnectionResult::new("http://example.org/page", 302)
            .with_header("Location", "http://example.org/next");

        let finish = Replacer::Redirect
            .replace(ReplaceContext {
                doc: &mut doc,
                container: &container,
                declaration: declaration.extract(),
                attempt: &attempt,
                connection: Some(&connection),
            })
            .unwrap();

        assert_eq!(sink.status_code(), Some(302));
        assert_eq!(sink.header("location").as_deref(), Some("http://example.org/next"));
        assert!(sink.body().is_empty());
        assert_eq!(finish.events().len(), 1);
    }
}
