//! Generic XML tree and its flattened mapping form.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

use crate::error::Result;

/// Key under which element attributes are stored in the flattened form.
pub const ATTRIBUTES_KEY: &str = "@attributes";

/// An XML element with its attributes, children and text content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    pub(crate) text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    /// Follows child tags from this element, taking the first match at each
    /// step.
    pub(crate) fn descend(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |current, name| {
            current.children.iter().find(|child| child.name == *name)
        })
    }

    /// Flattens the element: attributes under [`ATTRIBUTES_KEY`], child tag
    /// to child value, repeated tags to an ordered list. A leaf with text
    /// becomes that trimmed text.
    pub(crate) fn to_value(&self) -> Value {
        let mut map = Map::new();
        if !self.attributes.is_empty() {
            let attributes = self
                .attributes
                .iter()
                .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                .collect();
            map.insert(ATTRIBUTES_KEY.to_string(), Value::Object(attributes));
        }

        if self.children.is_empty() {
            let text = self.text.trim();
            if !text.is_empty() {
                return Value::String(text.to_string());
            }
            return Value::Object(map);
        }

        for child in &self.children {
            let value = child.to_value();
            match map.get_mut(&child.name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(child.name.clone(), value);
                }
            }
        }
        Value::Object(map)
    }
}

/// Parses an XML document into its root element.
pub(crate) fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref start) => stack.push(Element::open(start)?),
            Event::Empty(ref start) => {
                let element = Element::open(start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(ref text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(ref data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(quick_xml::Error::UnexpectedEof(open.name.clone()).into());
    }
    root.ok_or_else(|| quick_xml::Error::UnexpectedEof("document has no root element".into()).into())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parses XML and returns it flattened as `{root_tag: value}`.
///
/// # Errors
///
/// Returns [`XmlError`](crate::ExtractError::XmlError) for malformed input.
///
/// # Examples
///
/// ```
/// use codearts_migrate_extract::xml::flatten_document;
///
/// let doc = flatten_document(
///     r#"<project><scm class="git"><url> https://x/a.git </url></scm><b>1</b><b>2</b></project>"#,
/// )
/// .unwrap();
/// assert_eq!(doc["project"]["scm"]["@attributes"]["class"], "git");
/// assert_eq!(doc["project"]["scm"]["url"], "https://x/a.git");
/// assert_eq!(doc["project"]["b"][1], "2");
/// ```
pub fn flatten_document(xml: &str) -> Result<Value> {
    let root = parse(xml)?;
    let mut document = Map::new();
    document.insert(root.name.clone(), root.to_value());
    Ok(Value::Object(document))
}

/// A flattened value as a list: arrays yield their items, anything else
/// yields itself.
pub fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Follows `path` through nested objects. Lists along the way resolve to
/// their first item.
pub fn lookup<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, key| {
        let current = match current {
            Value::Array(items) => items.first()?,
            other => other,
        };
        current.get(*key)
    })
}

/// Text of the value at `path`, when it is a non-empty leaf.
pub fn lookup_text<'v>(value: &'v Value, path: &[&str]) -> Option<&'v str> {
    lookup(value, path)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// The `class` attribute of a flattened element.
pub fn class_of(value: &Value) -> Option<&str> {
    value.get(ATTRIBUTES_KEY)?.get("class")?.as_str()
}

/// Every value stored under `key` at any depth, in document order.
pub fn find_all<'v>(value: &'v Value, key: &str) -> Vec<&'v Value> {
    let mut found = Vec::new();
    collect(value, key, &mut found);
    found
}

fn collect<'v>(value: &'v Value, key: &str, found: &mut Vec<&'v Value>) {
    match value {
        Value::Object(map) => {
            for (name, child) in map {
                if name == key {
                    found.extend(as_list(child));
                } else {
                    collect(child, key, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, key, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_with_attributes_and_text_keeps_text() {
        let doc = flatten_document(r#"<a><b plugin="x@1">value</b></a>"#).unwrap();
        assert_eq!(doc["a"]["b"], "value");
    }

    #[test]
    fn test_empty_leaf_keeps_attributes() {
        let doc = flatten_document(r#"<a><b class="c"/></a>"#).unwrap();
        assert_eq!(class_of(&doc["a"]["b"]), Some("c"));
    }

    #[test]
    fn test_repeated_tags_become_list_in_order() {
        let doc = flatten_document("<a><s>1</s><t/><s>2</s><s>3</s></a>").unwrap();
        let items: Vec<_> = as_list(&doc["a"]["s"]).into_iter().filter_map(Value::as_str).collect();
        assert_eq!(items, ["1", "2", "3"]);
    }

    #[test]
    fn test_entities_and_cdata() {
        let doc = flatten_document("<a><c>echo &quot;x&quot; &amp;&amp; ls</c><d><![CDATA[a < b]]></d></a>").unwrap();
        assert_eq!(doc["a"]["c"], "echo \"x\" && ls");
        assert_eq!(doc["a"]["d"], "a < b");
    }

    #[test]
    fn test_unclosed_document_is_error() {
        assert!(flatten_document("<project><builders>").is_err());
        assert!(flatten_document("").is_err());
    }

    #[test]
    fn test_find_all_descends_lists() {
        let doc = flatten_document(
            "<p><x><execCommand>a</execCommand></x><x><y><execCommand>b</execCommand></y></x></p>",
        )
        .unwrap();
        let found: Vec<_> = find_all(&doc, "execCommand").into_iter().filter_map(Value::as_str).collect();
        assert_eq!(found, ["a", "b"]);
    }

    #[test]
    fn test_descend_keeps_child_order() {
        let root = parse("<a><b><s>1</s><t/><s>2</s></b></a>").unwrap();
        let b = root.descend(&["b"]).unwrap();
        let names: Vec<&str> = b.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["s", "t", "s"]);
        assert!(root.descend(&["b", "missing"]).is_none());
    }

    #[test]
    fn test_lookup_through_list() {
        let doc = flatten_document("<p><r><u>first</u></r><r><u>second</u></r></p>").unwrap();
        assert_eq!(lookup_text(&doc, &["p", "r", "u"]), Some("first"));
        assert_eq!(lookup_text(&doc, &["p", "missing"]), None);
    }
}
