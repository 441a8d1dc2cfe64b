use std::collections::BTreeMap;

use crate::node::ResourceKind;

/// Snapshot of an element subtree as handed to insertion observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The kind of load this element itself starts, if any.
    pub fn trackable_kind(&self) -> Option<ResourceKind> {
        match self.tag.as_str() {
            "img" => Some(ResourceKind::Image),
            "link" if self.is_stylesheet_link() => Some(ResourceKind::Stylesheet),
            "script" if self.attribute("src").is_some() => Some(ResourceKind::Script),
            _ => None,
        }
    }

    fn is_stylesheet_link(&self) -> bool {
        self.attribute("href").is_some()
            && self.attribute("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
    }

    /// Whether this element or any descendant references a trackable asset.
    pub fn references_resource(&self) -> bool {
        self.trackable_kind().is_some() || self.children.iter().any(Element::references_resource)
    }

    /// Trackable kinds in document order (pre-order).
    pub fn trackable_kinds(&self) -> Vec<ResourceKind> {
        let mut out = Vec::new();
        self.collect_kinds(&mut out);
        out
    }

    fn collect_kinds(&self, out: &mut Vec<ResourceKind>) {
        if let Some(kind) = self.trackable_kind() {
            out.push(kind);
        }
        for child in &self.children {
            child.collect_kinds(out);
        }
    }
}

/// A batch of subtree insertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub added: Vec<Element>,
}

impl MutationRecord {
    pub fn new(added: Vec<Element>) -> Self {
        Self { added }
    }

    pub fn references_resource(&self) -> bool {
        self.added.iter().any(Element::references_resource)
    }
}

#[cfg(test)]
mod tests {
    use super::{Element, MutationRecord};
    use crate::node::ResourceKind;

    #[test]
    fn classifies_asset_elements() {
        assert_eq!(
            Element::new("IMG").with_attr("src", "/a.png").trackable_kind(),
            Some(ResourceKind::Image)
        );
        assert_eq!(
            Element::new("link")
                .with_attr("rel", "preload stylesheet")
                .with_attr("href", "/a.css")
                .trackable_kind(),
            Some(ResourceKind::Stylesheet)
        );
        assert_eq!(
            Element::new("link")
                .with_attr("rel", "icon")
                .with_attr("href", "/favicon.ico")
                .trackable_kind(),
            None
        );
        assert_eq!(Element::new("script").trackable_kind(), None);
        assert_eq!(
            Element::new("script")
                .with_attr("src", "/a.js")
                .trackable_kind(),
            Some(ResourceKind::Script)
        );
    }

    #[test]
    fn finds_nested_references() {
        let card = Element::new("section").with_child(
            Element::new("div").with_child(Element::new("img").with_attr("src", "/hero.jpg")),
        );
        assert!(card.references_resource());
        assert_eq!(card.trackable_kinds(), vec![ResourceKind::Image]);

        let text = Element::new("p").with_child(Element::new("span"));
        assert!(!text.references_resource());
        assert!(!MutationRecord::new(vec![text]).references_resource());
    }
}
