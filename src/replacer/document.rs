//! Replacers that write into the document: replace="instance" and replace="text".

use super::{FinishNotification, ReplaceContext};
use crate::constants::media;
use crate::error::{EngineResult, SubmissionError};
use crate::events::SubmissionEvent;
use crate::instance::{parse_document, Element, Instance};
use crate::model::ReplaceDestination;
use crate::transport::ConnectionResult;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceReplacer {
    document: Option<Element>,
}

impl InstanceReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefilled(document: Element) -> Self {
        Self {
            document: Some(document),
        }
    }

    pub fn document(&self) -> Option<&Element> {
        self.document.as_ref()
    }

    /// Parse the body as XML; the document is untouched until [`replace`](Self::replace).
    pub fn deserialize(&mut self, connection: &ConnectionResult) -> EngineResult<()> {
        if let Some(media_type) = &connection.media_type {
            if !media::is_xml(media_type) {
                return Err(SubmissionError::resource(format!(
                    "body received with non-XML media type for replace=\"instance\": {media_type}"
                ))
                .with_resource(connection.resource_uri.clone()));
            }
        }
        let body = connection.peek_body().ok_or_else(|| {
            SubmissionError::resource("no body received for replace=\"instance\"")
                .with_resource(connection.resource_uri.clone())
        })?;
        let document = parse_document(&body)
            .map_err(|e| e.with_resource(connection.resource_uri.clone()))?;
        self.document = Some(document);
        Ok(())
    }

    pub fn replace(self, mut ctx: ReplaceContext<'_>) -> EngineResult<FinishNotification> {
        let document = self.document.ok_or_else(|| {
            SubmissionError::resource("replacement document was never deserialized")
        })?;
        let attempt = ctx.attempt;
        let destination =
            ReplaceDestination::resolve(&*ctx.doc, ctx.declaration, &attempt.p.bound_node, &attempt.p.model_id)?;

        if attempt.p2.read_only && !destination.is_root() {
            return Err(SubmissionError::target(
                "xxf:readonly=\"true\" requires the destination to be an instance root",
            ));
        }

        let instance_model = ctx
            .doc
            .instance(&destination.instance_id)
            .map(|instance| instance.model_id.clone())
            .unwrap_or_else(|| attempt.p.model_id.clone());

        let finish = FinishNotification::submit_done(attempt.effective_id(), ctx.done_info());
        let finish = if destination.is_root() {
            let replacement = Instance::new(
                destination.instance_id.clone(),
                instance_model.clone(),
                document,
            )
            .read_only(attempt.p2.read_only)
            .with_source_uri(attempt.p2.resource.clone());
            ctx.doc.replace_instance(replacement)?;
            debug!(instance_id = %destination.instance_id, "🔁 Instance replaced");

            finish.preceded_by(
                destination.instance_id.clone(),
                SubmissionEvent::Insert {
                    instance_id: destination.instance_id.clone(),
                    node: destination.node.clone(),
                },
            )
        } else {
            let inserted = ctx.doc.insert_before(&destination.node, document)?;
            let original = inserted.next_sibling().ok_or_else(|| {
                SubmissionError::internal("inserted node has no following sibling")
            })?;
            ctx.doc.delete(&original)?;
            debug!(instance_id = %destination.instance_id, path = ?destination.node.path, "🔁 Node replaced");

            finish
                .preceded_by(
                    destination.instance_id.clone(),
                    SubmissionEvent::Insert {
                        instance_id: destination.instance_id.clone(),
                        node: inserted,
                    },
                )
                .preceded_by(
                    destination.instance_id.clone(),
                    SubmissionEvent::Delete {
                        instance_id: destination.instance_id.clone(),
                        node: original,
                    },
                )
        };

        ctx.doc.mark_structural_change(&instance_model);
        Ok(finish)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextReplacer {
    text: Option<String>,
}

impl TextReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Accept textual and XML bodies only.
    pub fn deserialize(&mut self, connection: &ConnectionResult) -> EngineResult<()> {
        let media_type = connection.media_type.as_deref().unwrap_or_default();
        if !(media::is_text(media_type) || media::is_xml(media_type)) {
            return Err(SubmissionError::resource(format!(
                "mediatype is neither text nor XML for replace=\"text\": {media_type}"
            ))
            .with_resource(connection.resource_uri.clone()));
        }
        let body = connection.peek_body().unwrap_or_default();
        let text = String::from_utf8(body.to_vec()).map_err(|e| {
            SubmissionError::resource(format!("response body is not valid UTF-8: {e}"))
                .with_resource(connection.resource_uri.clone())
        })?;
        self.text = Some(text);
        Ok(())
    }

    pub fn replace(self, mut ctx: ReplaceContext<'_>) -> EngineResult<FinishNotification> {
        let text = self.text.unwrap_or_default();
        let attempt = ctx.attempt;
        let destination =
            ReplaceDestination::resolve(&*ctx.doc, ctx.declaration, &attempt.p.bound_node, &attempt.p.model_id)?;
        ctx.doc.set_value(&destination.node, &text)?;

        let instance_model = ctx
            .doc
            .instance(&destination.instance_id)
            .map_or_else(|| attempt.p.model_id.clone(), |instance| instance.model_id.clone());
        ctx.doc.mark_structural_change(&instance_model);

        Ok(FinishNotification::submit_done(
            attempt.effective_id(),
            ctx.done_info(),
        ))
    }
}
