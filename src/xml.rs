// 🌳 Record subtree - owned element tree for one XML record
//
// The streaming pipeline builds one `Element` per record from pull-parser
// events, normalizes it, hands it to a mapper and drops it.

use quick_xml::events::BytesStart;
use std::collections::BTreeSet;

// ============================================================================
// ELEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Tag as written in the source (`lei:LEI`) until normalized (`LEI`)
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated character data directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: append a child
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Builder: set text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder: add attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Read the element name and attributes off a start tag
    pub fn from_start(start: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// First direct child with this tag
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with this tag
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated path of child tags
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .try_fold(self, |element, step| element.child(step))
    }

    /// All elements matching a path; the last step may match many
    pub fn find_all<'a>(&'a self, path: &'a str) -> Vec<&'a Element> {
        let (parent, last) = match path.rsplit_once('/') {
            Some((parent, last)) => (self.find(parent), last),
            None => (Some(self), path),
        };
        parent
            .map(|p| p.children_named(last).collect())
            .unwrap_or_default()
    }

    /// Trimmed text at a path; absent element or blank text is None
    pub fn findtext(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(Element::text)
    }

    /// Trimmed text of this element, None when blank
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// ============================================================================
// TREE BUILDER
// ============================================================================

/// Assembles one subtree from start/text/end events
///
/// Push the record's own start tag first; `end` returns the finished tree
/// once the matching end tag arrives.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    stack: Vec<Element>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder { stack: Vec::new() }
    }

    pub fn is_building(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn start(&mut self, element: Element) {
        self.stack.push(element);
    }

    /// Self-closing element (`<EndDate/>`)
    pub fn empty(&mut self, element: Element) -> Option<Element> {
        self.start(element);
        self.end()
    }

    pub fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.text.push_str(text);
        }
    }

    pub fn end(&mut self) -> Option<Element> {
        let finished = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(finished);
                None
            }
            None => Some(finished),
        }
    }
}

// ============================================================================
// RECORD NORMALIZER
// ============================================================================

/// Local part of a qualified name (`lei:LEI` → `LEI`)
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Rewrite every tag to its local name and prune namespace declarations
/// no attribute prefix needs any more.
///
/// Idempotent; must run once per record before any lookup by tag.
pub fn strip_namespaces(root: &mut Element) {
    rename_local(root);

    let mut used = BTreeSet::new();
    collect_attribute_prefixes(root, &mut used);
    prune_declarations(root, &used);
}

fn rename_local(element: &mut Element) {
    if element.name.contains(':') {
        element.name = local_name(&element.name).to_string();
    }
    for child in &mut element.children {
        rename_local(child);
    }
}

fn collect_attribute_prefixes(element: &Element, used: &mut BTreeSet<String>) {
    for (key, _) in &element.attributes {
        if let Some((prefix, _)) = key.split_once(':') {
            if prefix != "xmlns" {
                used.insert(prefix.to_string());
            }
        }
    }
    for child in &element.children {
        collect_attribute_prefixes(child, used);
    }
}

fn prune_declarations(element: &mut Element, used: &BTreeSet<String>) {
    element.attributes.retain(|(key, _)| {
        if key == "xmlns" {
            return false;
        }
        match key.strip_prefix("xmlns:") {
            Some(prefix) => used.contains(prefix),
            None => true,
        }
    });
    for child in &mut element.children {
        prune_declarations(child, used);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element::new("lei:LEIRecord")
            .with_attribute("xmlns:lei", "http://www.gleif.org/data/schema/leidata/2016")
            .with_attribute("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")
            .with_attribute("xmlns:gleif", "http://www.gleif.org/concatenated-file/header-extension/2.0")
            .with_child(Element::new("lei:LEI").with_text("5493001KJTIIGC8Y1R12"))
            .with_child(
                Element::new("lei:Entity")
                    .with_child(
                        Element::new("lei:LegalName")
                            .with_attribute("xml:lang", "de")
                            .with_text("  Example AG "),
                    )
                    .with_child(
                        Element::new("lei:LegalAddress").with_attribute("xsi:nil", "false"),
                    ),
            )
    }

    #[test]
    fn test_strip_namespaces_rewrites_tags() {
        let mut record = sample();
        strip_namespaces(&mut record);

        assert_eq!(record.name, "LEIRecord");
        assert_eq!(record.findtext("LEI"), Some("5493001KJTIIGC8Y1R12"));
        assert_eq!(record.findtext("Entity/LegalName"), Some("Example AG"));
    }

    #[test]
    fn test_strip_namespaces_prunes_unused_declarations() {
        let mut record = sample();
        strip_namespaces(&mut record);

        assert_eq!(record.attribute("xmlns:lei"), None);
        assert_eq!(record.attribute("xmlns:gleif"), None);
        // still referenced by xsi:nil
        assert!(record.attribute("xmlns:xsi").is_some());
        // xml: is reserved, left alone
        assert_eq!(record.find("Entity/LegalName").unwrap().attribute("xml:lang"), Some("de"));
    }

    #[test]
    fn test_strip_namespaces_is_idempotent() {
        let mut once = sample();
        strip_namespaces(&mut once);
        let mut twice = once.clone();
        strip_namespaces(&mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_find_all_and_missing_paths() {
        let record = Element::new("Relationship").with_child(
            Element::new("RelationshipPeriods")
                .with_child(Element::new("RelationshipPeriod").with_text("a"))
                .with_child(Element::new("RelationshipPeriod").with_text("b")),
        );

        assert_eq!(record.find_all("RelationshipPeriods/RelationshipPeriod").len(), 2);
        assert!(record.find_all("Nope/RelationshipPeriod").is_empty());
        assert!(record.find("RelationshipPeriods/Nope").is_none());
        assert_eq!(record.findtext("Missing"), None);
    }

    #[test]
    fn test_tree_builder_nests_children() {
        let mut builder = TreeBuilder::new();
        builder.start(Element::new("a"));
        builder.start(Element::new("b"));
        builder.text("hello");
        assert!(builder.end().is_none());
        assert!(builder.empty(Element::new("c")).is_none());
        let root = builder.end().unwrap();

        assert!(!builder.is_building());
        assert_eq!(root.findtext("b"), Some("hello"));
        assert!(root.child("c").is_some());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("rr:RelationshipRecord"), "RelationshipRecord");
        assert_eq!(local_name("LEI"), "LEI");
    }
}
