//! # Instance Data
//!
//! The structured documents a submission serializes from and replaces into. Elements
//! carry the model item annotations (type, relevance, validity, requiredness, upload
//! metadata) that serialization and validation consult.

pub mod document;
pub mod path;
pub mod xml;

use serde::{Deserialize, Serialize};

pub use document::{DocumentModel, InMemoryDocument};
pub use path::{evaluate_avt, resolve_in_document, PathExpr, ResolvedNode};
pub use xml::parse_document;

/// Declared datatype of an element's value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    String,
    AnyUri,
    Base64Binary,
    Other(String),
}

/// Model item properties attached to an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAnnotations {
    pub datatype: Option<Datatype>,
    pub relevant: bool,
    pub valid: bool,
    pub required: bool,
    /// Media type of an uploaded resource referenced by this node
    pub mediatype: Option<String>,
    /// Client file name of an uploaded resource referenced by this node
    pub filename: Option<String>,
}

impl Default for NodeAnnotations {
    fn default() -> Self {
        Self {
            datatype: None,
            relevant: true,
            valid: true,
            required: false,
            mediatype: None,
            filename: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Text content; only meaningful for leaves
    pub text: String,
    pub children: Vec<Element>,
    pub annotations: NodeAnnotations,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.annotations.datatype = Some(datatype);
        self
    }

    #[must_use]
    pub fn with_relevant(mut self, relevant: bool) -> Self {
        self.annotations.relevant = relevant;
        self
    }

    #[must_use]
    pub fn with_valid(mut self, valid: bool) -> Self {
        self.annotations.valid = valid;
        self
    }

    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.annotations.required = required;
        self
    }

    #[must_use]
    pub fn with_upload_info(
        mut self,
        mediatype: Option<impl Into<String>>,
        filename: Option<impl Into<String>>,
    ) -> Self {
        self.annotations.mediatype = mediatype.map(Into::into);
        self.annotations.filename = filename.map(Into::into);
        self
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn descendant(&self, path: &[usize]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |current, &index| current.children.get(index))
    }

    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        path.iter()
            .try_fold(self, |current, &index| current.children.get_mut(index))
    }

    /// Leaf elements in document order, including `self` when it has no children.
    pub fn leaves(&self) -> Vec<&Element> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Element>) {
        if self.is_leaf() {
            leaves.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(leaves);
            }
        }
    }

    /// Concatenated text of this element and all of its descendants.
    pub fn text_content(&self) -> String {
        let mut content = self.text.clone();
        for child in &self.children {
            content.push_str(&child.text_content());
        }
        content
    }

    /// Visit every element depth-first, stopping at the first `false` returned.
    pub fn all(&self, predicate: &mut impl FnMut(&Element) -> bool) -> bool {
        predicate(self) && self.children.iter().all(|child| child.all(predicate))
    }
}

/// Address of an element inside an instance: child indices from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub instance_id: String,
    pub path: Vec<usize>,
}

impl NodeRef {
    pub fn root(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            path: Vec::new(),
        }
    }

    pub fn new(instance_id: impl Into<String>, path: Vec<usize>) -> Self {
        Self {
            instance_id: instance_id.into(),
            path,
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Self::new(self.instance_id.clone(), path)
    }

    /// The position the current node moves to once a sibling is inserted before it.
    pub fn next_sibling(&self) -> Option<Self> {
        let (last, parent) = self.path.split_last()?;
        let mut path = parent.to_vec();
        path.push(last + 1);
        Some(Self::new(self.instance_id.clone(), path))
    }
}

/// A named document held by a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub model_id: String,
    pub root: Element,
    pub read_only: bool,
    /// Where the content came from, when it was loaded by a submission
    pub source_uri: Option<String>,
}

impl Instance {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>, root: Element) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            root,
            read_only: false,
            source_uri: None,
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> Element {
        Element::new("form")
            .with_child(Element::new("name").with_text("Ada"))
            .with_child(
                Element::new("address")
                    .with_child(Element::new("city").with_text("London"))
                    .with_child(Element::new("zip")),
            )
    }

    #[test]
    fn test_leaves_in_document_order() {
        let root = form();
        let names: Vec<&str> = root.leaves().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["name", "city", "zip"]);
        assert_eq!(root.text_content(), "AdaLondon");
    }

    #[test]
    fn test_descendant_navigation() {
        let mut root = form();
        assert_eq!(root.descendant(&[1, 0]).unwrap().text, "London");
        assert!(root.descendant(&[3]).is_none());
        root.descendant_mut(&[1, 1]).unwrap().text = "N1".to_string();
        assert_eq!(root.descendant(&[1, 1]).unwrap().text, "N1");
    }

    #[test]
    fn test_node_ref_siblings() {
        let node = NodeRef::new("main", vec![1, 0]);
        assert_eq!(node.next_sibling().unwrap().path, vec![1, 1]);
        assert!(NodeRef::root("main").next_sibling().is_none());
        assert!(NodeRef::root("main").is_root());
    }

    #[test]
    fn test_local_name_strips_prefix() {
        assert_eq!(Element::new("xh:div").local_name(), "div");
        assert_eq!(Element::new("div").local_name(), "div");
    }
}
