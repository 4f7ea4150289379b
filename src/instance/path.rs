//! Path expressions and attribute value templates.
//!
//! A deliberately small location-path language covering what submission declarations
//! use: `instance('id')`, absolute `/root/child`, relative `a/b`, `.`, `..`, `*`,
//! positional `name[2]` and a trailing `@attribute`.

use super::{DocumentModel, Element, NodeRef};
use crate::error::{EngineResult, SubmissionError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    SelfNode,
    Parent,
    Child {
        name: Option<String>,
        position: usize,
    },
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    instance: Option<String>,
    absolute: bool,
    steps: Vec<Step>,
}

/// What a path expression selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedNode {
    Element(NodeRef),
    Attribute { owner: NodeRef, name: String },
}

impl ResolvedNode {
    pub fn as_element(&self) -> Option<&NodeRef> {
        match self {
            Self::Element(node) => Some(node),
            Self::Attribute { .. } => None,
        }
    }
}

enum Selection {
    Element(Vec<usize>),
    Attribute(Vec<usize>, String),
}

impl PathExpr {
    pub fn parse(expr: &str) -> EngineResult<Self> {
        let invalid = |reason: &str| {
            SubmissionError::configuration(format!("invalid path expression '{expr}': {reason}"))
        };

        let mut rest = expr.trim();
        let mut instance = None;
        let mut absolute = false;

        if let Some(after) = rest.strip_prefix("instance(") {
            let close = after.find(')').ok_or_else(|| invalid("unterminated instance()"))?;
            let id = after[..close].trim().trim_matches(|c| c == '\'' || c == '"');
            instance = Some(id.to_string());
            rest = &after[close + 1..];
            if !rest.is_empty() {
                rest = rest
                    .strip_prefix('/')
                    .ok_or_else(|| invalid("expected '/' after instance()"))?;
            }
        } else if let Some(after) = rest.strip_prefix('/') {
            absolute = true;
            rest = after;
        }

        let mut steps = Vec::new();
        if !rest.is_empty() {
            let segments: Vec<&str> = rest.split('/').collect();
            let last = segments.len() - 1;
            for (index, segment) in segments.into_iter().enumerate() {
                let segment = segment.trim();
                let step = match segment {
                    "" => return Err(invalid("empty step")),
                    "." => Step::SelfNode,
                    ".." => Step::Parent,
                    _ if segment.starts_with('@') => {
                        if index != last {
                            return Err(invalid("attribute step must be last"));
                        }
                        Step::Attribute(segment[1..].to_string())
                    }
                    _ => Self::parse_child(segment).ok_or_else(|| invalid("bad step"))?,
                };
                steps.push(step);
            }
        }

        Ok(Self {
            instance,
            absolute,
            steps,
        })
    }

    fn parse_child(segment: &str) -> Option<Step> {
        let (name, position) = match segment.split_once('[') {
            Some((name, predicate)) => {
                let position: usize = predicate.strip_suffix(']')?.trim().parse().ok()?;
                if position == 0 {
                    return None;
                }
                (name, position)
            }
            None => (segment, 1),
        };
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '(') {
            return None;
        }
        Some(Step::Child {
            name: (name != "*").then(|| name.to_string()),
            position,
        })
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Walk the steps from `start` inside the tree rooted at `root`.
    fn select(&self, root: &Element, start: &[usize]) -> Option<Selection> {
        let mut path = start.to_vec();
        let mut steps = self.steps.as_slice();

        if self.absolute {
            path.clear();
            if let Some((first, remaining)) = steps.split_first() {
                match first {
                    Step::Child { name, position: 1 }
                        if name.as_deref().map_or(true, |n| n == root.name) => {}
                    _ => return None,
                }
                steps = remaining;
            }
        } else if self.instance.is_some() {
            path.clear();
        }

        for step in steps {
            match step {
                Step::SelfNode => {}
                Step::Parent => {
                    path.pop()?;
                }
                Step::Child { name, position } => {
                    let current = root.descendant(&path)?;
                    let index = current
                        .children
                        .iter()
                        .enumerate()
                        .filter(|(_, child)| name.as_deref().map_or(true, |n| child.name == n))
                        .nth(position - 1)
                        .map(|(index, _)| index)?;
                    path.push(index);
                }
                Step::Attribute(name) => {
                    let current = root.descendant(&path)?;
                    current.attribute(name)?;
                    return Some(Selection::Attribute(path, name.clone()));
                }
            }
        }

        root.descendant(&path)?;
        Some(Selection::Element(path))
    }

    /// String value of the selection relative to a standalone element.
    pub fn value_in(&self, context: &Element) -> Option<String> {
        if self.instance.is_some() {
            return None;
        }
        match self.select(context, &[])? {
            Selection::Element(path) => context.descendant(&path).map(Element::text_content),
            Selection::Attribute(path, name) => context
                .descendant(&path)
                .and_then(|element| element.attribute(&name))
                .map(str::to_string),
        }
    }
}

/// Resolve `expr` against the live document, relative to `context`.
///
/// Returns `Ok(None)` when the expression is well formed but selects nothing.
pub fn resolve_in_document(
    doc: &dyn DocumentModel,
    context: &NodeRef,
    expr: &str,
) -> EngineResult<Option<ResolvedNode>> {
    let parsed = PathExpr::parse(expr)?;
    let instance_id = parsed.instance().unwrap_or(&context.instance_id);
    let Some(instance) = doc.instance(instance_id) else {
        return Ok(None);
    };

    let resolved = parsed
        .select(&instance.root, &context.path)
        .map(|selection| match selection {
            Selection::Element(path) => ResolvedNode::Element(NodeRef::new(instance_id, path)),
            Selection::Attribute(path, name) => ResolvedNode::Attribute {
                owner: NodeRef::new(instance_id, path),
                name,
            },
        });
    Ok(resolved)
}

/// Evaluate an attribute value template against a binding snapshot.
///
/// `{expr}` segments are replaced by the string value of `expr` evaluated relative to
/// `context` (an empty string when nothing is selected). Quoted literals such as
/// `{'text'}` are inserted verbatim and `{{`/`}}` escape braces.
pub fn evaluate_avt(template: &str, context: &Element) -> EngineResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                output.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                output.push('}');
            }
            '{' => {
                let mut expr = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(inner) => expr.push(inner),
                        None => {
                            return Err(SubmissionError::configuration(format!(
                                "unterminated expression in attribute value template '{template}'"
                            )))
                        }
                    }
                }
                output.push_str(&evaluate_expression(expr.trim(), context)?);
            }
            '}' => {
                return Err(SubmissionError::configuration(format!(
                    "unbalanced '}}' in attribute value template '{template}'"
                )))
            }
            _ => output.push(c),
        }
    }

    Ok(output)
}

fn evaluate_expression(expr: &str, context: &Element) -> EngineResult<String> {
    let quoted = |q: char| expr.len() >= 2 && expr.starts_with(q) && expr.ends_with(q);
    if quoted('\'') || quoted('"') {
        return Ok(expr[1..expr.len() - 1].to_string());
    }
    let parsed = PathExpr::parse(expr)?;
    if parsed.instance().is_some() {
        return Err(SubmissionError::configuration(format!(
            "instance() is not available in attribute value templates: '{expr}'"
        )));
    }
    Ok(parsed.value_in(context).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{InMemoryDocument, Instance};

    fn order() -> Element {
        Element::new("order")
            .with_attribute("id", "42")
            .with_child(Element::new("item").with_text("apple"))
            .with_child(Element::new("item").with_text("pear"))
            .with_child(Element::new("endpoint").with_text("http://example.org/orders"))
    }

    fn document() -> InMemoryDocument {
        InMemoryDocument::new("doc-1")
            .with_instance(Instance::new("main", "model", order()))
            .with_instance(Instance::new(
                "other",
                "model",
                Element::new("data").with_child(Element::new("value").with_text("7")),
            ))
    }

    #[test]
    fn test_resolves_absolute_relative_and_instance_paths() {
        let doc = document();
        let root = NodeRef::root("main");

        let second = resolve_in_document(&doc, &root, "/order/item[2]").unwrap();
        assert_eq!(second, Some(ResolvedNode::Element(NodeRef::new("main", vec![1]))));

        let relative = resolve_in_document(&doc, &root, "endpoint").unwrap();
        assert_eq!(relative, Some(ResolvedNode::Element(NodeRef::new("main", vec![2]))));

        let other = resolve_in_document(&doc, &root, "instance('other')/value").unwrap();
        assert_eq!(other, Some(ResolvedNode::Element(NodeRef::new("other", vec![0]))));

        let parent =
            resolve_in_document(&doc, &NodeRef::new("main", vec![0]), "..").unwrap();
        assert_eq!(parent, Some(ResolvedNode::Element(root.clone())));
    }

    #[test]
    fn test_attribute_and_missing_selections() {
        let doc = document();
        let root = NodeRef::root("main");

        let attribute = resolve_in_document(&doc, &root, "@id").unwrap().unwrap();
        assert!(attribute.as_element().is_none());

        assert_eq!(resolve_in_document(&doc, &root, "missing").unwrap(), None);
        assert_eq!(resolve_in_document(&doc, &root, "/wrong").unwrap(), None);
        assert_eq!(resolve_in_document(&doc, &root, "instance('nope')").unwrap(), None);
        assert!(resolve_in_document(&doc, &root, "a//b").is_err());
        assert!(resolve_in_document(&doc, &root, "@id/x").is_err());
    }

    #[test]
    fn test_avt_evaluation_against_snapshot() {
        let snapshot = order();
        assert_eq!(
            evaluate_avt("{endpoint}/{@id}?first={item}", &snapshot).unwrap(),
            "http://example.org/orders/42?first=apple"
        );
        assert_eq!(evaluate_avt("{'lit'}{{x}}", &snapshot).unwrap(), "lit{x}");
        assert_eq!(evaluate_avt("{missing}", &snapshot).unwrap(), "");
        assert!(evaluate_avt("{endpoint", &snapshot).is_err());
        assert!(evaluate_avt("{instance('main')}", &snapshot).is_err());
    }
}
