//! Minimal element tree over `quick-xml` events.
//!
//! SEFAZ payloads are small and namespace-heavy; callers only need to look
//! elements up by local name, so namespaces and prefixes are dropped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// XML could not be parsed into a tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML parse error: {0}")]
pub struct XmlError(pub String);

impl XmlError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// An element with its attributes, concatenated text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name (prefix removed)
    pub name: String,
    /// Attributes by local name, in document order
    pub attributes: Vec<(String, String)>,
    /// Unescaped text directly inside this element
    pub text: String,
    /// Child elements in document order
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse `xml` and return its root element.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError`] for malformed XML, mismatched tags, or input
    /// without exactly one root element.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(element(&start)?),
                Ok(Event::Empty(start)) => {
                    let node = element(&start)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| XmlError::new("closing tag without opening tag"))?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(text)) => {
                    let value = text.unescape().map_err(|e| XmlError::new(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(XmlError::new(format!(
                        "at position {}: {e}",
                        reader.error_position()
                    )));
                }
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::new("unexpected end of document"));
        }
        root.ok_or_else(|| XmlError::new("document has no root element"))
    }

    /// First direct child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for the first element named `name`, starting with `self`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Attribute value by local name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text of this element, `None` when empty.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Trimmed text of the element reached by following `path` from `self`.
    #[must_use]
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(self, |node, name| node.child(name))
            .and_then(XmlNode::text)
    }
}

fn element(start: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::new(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::new(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlNode {
        name,
        attributes,
        ..XmlNode::default()
    })
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(XmlError::new("multiple root elements")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_prefixes_and_keeps_text() {
        let root = XmlNode::parse(
            r#"<soap:Envelope xmlns:soap="urn:x"><soap:Body><a n="1">x &amp; y</a><b/></soap:Body></soap:Envelope>"#,
        )
        .unwrap();

        assert_eq!(root.name, "Envelope");
        let a = root.find("a").unwrap();
        assert_eq!(a.text(), Some("x & y"));
        assert_eq!(a.attribute("n"), Some("1"));
        assert!(root.find("b").is_some());
        assert_eq!(root.text_at(&["Body", "a"]), Some("x & y"));
    }

    #[test]
    fn test_declaration_is_ignored() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?><r><c>1</c></r>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.text_at(&["c"]), Some("1"));
    }

    #[test]
    fn test_mismatched_tags_fail() {
        assert!(XmlNode::parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_truncated_document_fails() {
        assert!(XmlNode::parse("<a><b>text</b>").is_err());
    }

    #[test]
    fn test_empty_input_has_no_root() {
        assert!(XmlNode::parse("").is_err());
        assert!(XmlNode::parse("just text").is_err());
    }

    #[test]
    fn test_children_named() {
        let root = XmlNode::parse("<l><d>1</d><x/><d>2</d></l>").unwrap();
        let texts: Vec<_> = root.children_named("d").filter_map(XmlNode::text).collect();
        assert_eq!(texts, vec!["1", "2"]);
    }
}
