//! XML, HTML, XHTML and text output of an instance subtree.

use crate::error::{EngineResult, SubmissionError};
use crate::instance::Element;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMethod {
    Xml,
    Html,
    Xhtml,
    Text,
}

/// Output options resolved from the declaration's formatting attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlOutputOptions {
    pub method: OutputMethod,
    pub version: String,
    pub encoding: String,
    pub indent: bool,
    pub omit_xml_declaration: bool,
    pub standalone: Option<bool>,
}

impl Default for XmlOutputOptions {
    fn default() -> Self {
        Self {
            method: OutputMethod::Xml,
            version: "1.0".to_string(),
            encoding: "UTF-8".to_string(),
            indent: false,
            omit_xml_declaration: false,
            standalone: None,
        }
    }
}

impl XmlOutputOptions {
    #[must_use]
    pub fn with_method(mut self, method: OutputMethod) -> Self {
        self.method = method;
        self
    }
}

pub fn write_document(root: &Element, options: &XmlOutputOptions) -> EngineResult<Vec<u8>> {
    if !options.encoding.eq_ignore_ascii_case("utf-8") {
        return Err(SubmissionError::serialization(format!(
            "unsupported output encoding '{}'",
            options.encoding
        )));
    }

    if options.method == OutputMethod::Text {
        return Ok(root.text_content().into_bytes());
    }

    let mut writer = if options.indent {
        Writer::new_with_indent(Vec::new(), b' ', 2)
    } else {
        Writer::new(Vec::new())
    };

    let declare = matches!(options.method, OutputMethod::Xml | OutputMethod::Xhtml)
        && !options.omit_xml_declaration;
    if declare {
        let standalone = options.standalone.map(|s| if s { "yes" } else { "no" });
        writer
            .write_event(Event::Decl(BytesDecl::new(
                &options.version,
                Some(&options.encoding),
                standalone,
            )))
            .map_err(write_error)?;
    }

    write_element(&mut writer, root, options.method == OutputMethod::Html)?;
    Ok(writer.into_inner())
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    html: bool,
) -> EngineResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    // HTML output never self-closes elements
    if element.children.is_empty() && element.text.is_empty() && !html {
        return writer.write_event(Event::Empty(start)).map_err(write_error);
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(write_error)?;
    }
    for child in &element.children {
        write_element(writer, child, html)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_error)
}

fn write_error(error: impl std::fmt::Display) -> SubmissionError {
    SubmissionError::serialization(format!("failed to write XML: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::parse_document;

    fn sample() -> Element {
        Element::new("person")
            .with_attribute("id", "7")
            .with_child(Element::new("name").with_text("Grace & co"))
            .with_child(Element::new("note"))
    }

    #[test]
    fn test_xml_output_round_trips_through_parser() {
        let bytes = write_document(&sample(), &XmlOutputOptions::default()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(text.contains("Grace &amp; co"));
        assert!(text.contains("<note/>"));
        assert_eq!(parse_document(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_declaration_options() {
        let options = XmlOutputOptions {
            standalone: Some(true),
            ..XmlOutputOptions::default()
        };
        let text = String::from_utf8(write_document(&sample(), &options).unwrap()).unwrap();
        assert!(text.contains(r#"standalone="yes""#));

        let options = XmlOutputOptions {
            omit_xml_declaration: true,
            ..XmlOutputOptions::default()
        };
        let text = String::from_utf8(write_document(&sample(), &options).unwrap()).unwrap();
        assert!(text.starts_with("<person"));
    }

    #[test]
    fn test_html_and_text_methods() {
        let html = XmlOutputOptions::default().with_method(OutputMethod::Html);
        let text = String::from_utf8(write_document(&sample(), &html).unwrap()).unwrap();
        assert!(!text.starts_with("<?xml"));
        assert!(text.contains("<note></note>"));

        let plain = XmlOutputOptions::default().with_method(OutputMethod::Text);
        assert_eq!(write_document(&sample(), &plain).unwrap(), b"Grace & co".to_vec());
    }

    #[test]
    fn test_unsupported_encoding() {
        let options = XmlOutputOptions {
            encoding: "ISO-8859-1".to_string(),
            ..XmlOutputOptions::default()
        };
        assert!(write_document(&sample(), &options).is_err());
    }
}
