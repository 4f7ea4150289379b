//! application/x-www-form-urlencoded encoding of instance leaves.

use crate::instance::Element;
use url::form_urlencoded::byte_serialize;

/// `name=value` for every leaf with non-empty text, joined by `separator`.
pub fn encode_leaves(root: &Element, separator: &str) -> String {
    root.leaves()
        .into_iter()
        .filter(|leaf| !leaf.text.is_empty())
        .map(|leaf| {
            format!(
                "{}={}",
                byte_serialize(leaf.local_name().as_bytes()).collect::<String>(),
                byte_serialize(leaf.text.as_bytes()).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaves_are_form_encoded() {
        let root = Element::new("query")
            .with_child(Element::new("q").with_text("rust & xml"))
            .with_child(Element::new("empty"))
            .with_child(
                Element::new("filters").with_child(Element::new("lang").with_text("en/fr")),
            );

        assert_eq!(encode_leaves(&root, "&"), "q=rust+%26+xml&lang=en%2Ffr");
        assert_eq!(encode_leaves(&root, ";"), "q=rust+%26+xml;lang=en%2Ffr");
    }

    #[test]
    fn test_root_leaf_and_empty_document() {
        assert_eq!(encode_leaves(&Element::new("v").with_text("1"), "&"), "v=1");
        assert_eq!(encode_leaves(&Element::new("v"), "&"), "");
    }
}
