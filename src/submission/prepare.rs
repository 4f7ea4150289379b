//! Building the document that actually gets serialized.

use crate::error::{EngineResult, SubmissionError};
use crate::instance::Element;

/// Copy of `bound` with non-relevant nodes removed (when `prune`) and checked for
/// validity and requiredness (when `validate`).
pub fn document_to_submit(bound: &Element, prune: bool, validate: bool) -> EngineResult<Element> {
    let mut document = bound.clone();
    if prune {
        if !document.annotations.relevant {
            return Err(SubmissionError::validation(
                "the bound node of the submission is not relevant",
            ));
        }
        prune_non_relevant(&mut document);
    }
    if validate {
        if let Some(offending) = first_invalid(&document) {
            return Err(SubmissionError::validation(format!(
                "instance to submit does not satisfy validity and/or required constraints (at <{}>)",
                offending.name
            )));
        }
    }
    Ok(document)
}

fn prune_non_relevant(element: &mut Element) {
    element.children.retain(|child| child.annotations.relevant);
    for child in &mut element.children {
        prune_non_relevant(child);
    }
}

fn first_invalid(element: &Element) -> Option<&Element> {
    let missing = element.annotations.required && element.is_leaf() && element.text.trim().is_empty();
    if !element.annotations.valid || missing {
        return Some(element);
    }
    element.children.iter().find_map(first_invalid)
}
