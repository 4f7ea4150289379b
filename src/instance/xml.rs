//! XML parsing into [`Element`] trees.

use super::Element;
use crate::error::{EngineResult, SubmissionError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Parse a complete XML document. Comments, processing instructions and the doctype are
/// dropped; whitespace-only text between elements is ignored.
pub fn parse_document(bytes: &[u8]) -> EngineResult<Element> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            SubmissionError::resource(format!(
                "failed to parse XML at position {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SubmissionError::resource("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| SubmissionError::resource(format!("invalid text content: {e}")))?;
                push_text(&mut stack, &value)?;
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_text(&mut stack, &value)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(SubmissionError::resource("document ended with unclosed elements"));
    }
    root.ok_or_else(|| SubmissionError::resource("document has no root element"))
}

fn element_from_start(start: &BytesStart<'_>) -> EngineResult<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute
            .map_err(|e| SubmissionError::resource(format!("malformed attribute: {e}")))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| SubmissionError::resource(format!("invalid attribute value: {e}")))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> EngineResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err(SubmissionError::resource("document has more than one root element"));
    } else {
        *root = Some(element);
    }
    Ok(())
}

fn push_text(stack: &mut [Element], value: &str) -> EngineResult<()> {
    match stack.last_mut() {
        Some(current) => {
            current.text.push_str(value);
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(SubmissionError::resource("text content outside of the root element")),
    }
}
