//! Generic response tree: XML conversion, response-path narrowing and
//! record-list detection.
//!
//! Both JSON and XML bodies end up as a `serde_json::Value`. Object keys keep
//! insertion order, which is what makes discovered columns follow the order
//! of the first record.

use crate::error::{DiscoveryError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

/// Key holding non-blank text of an element that also has children.
pub const TEXT_KEY: &str = "#text";

/// True if a response should be treated as XML.
pub fn looks_like_xml(content_type: Option<&str>, body: &str) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("xml"))
        || body.trim_start().starts_with('<')
}

struct Element {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn new(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            children: Map::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> Value {
        let text = self.text.trim();
        if self.children.is_empty() {
            return Value::String(text.to_string());
        }
        let mut children = self.children;
        if !text.is_empty() {
            children.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
        }
        Value::Object(children)
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }
}

/// Converts an XML document into a nested map/list tree.
///
/// Attributes are ignored and namespace prefixes dropped. Repeated sibling
/// elements become arrays; text-only elements become strings. The result is
/// an object keyed by the root element name.
///
/// # Example
/// ```rust
/// use sourceprobe_core::connectors::http::tree::xml_to_value;
///
/// let tree = xml_to_value("<r><u><id>1</id></u><u><id>2</id></u></r>").unwrap();
/// assert_eq!(tree["r"]["u"][1]["id"], "2");
/// ```
///
/// # Errors
/// Returns `Parse` for malformed or empty documents
pub fn xml_to_value(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            DiscoveryError::parse(format!(
                "malformed XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => stack.push(Element::new(&start)),
            Event::Empty(start) => {
                let element = Element::new(&start);
                attach(&mut stack, &mut root, element.name.clone(), element.into_value());
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| DiscoveryError::parse("unbalanced XML end tag"))?;
                let name = element.name.clone();
                attach(&mut stack, &mut root, name, element.into_value());
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| DiscoveryError::parse(format!("invalid XML text: {}", e)))?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(DiscoveryError::parse("unexpected end of XML document"));
    }

    let (name, value) = root.ok_or_else(|| DiscoveryError::parse("XML document has no root element"))?;
    let mut tree = Map::new();
    tree.insert(name, value);
    Ok(Value::Object(tree))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<(String, Value)>,
    name: String,
    value: Value,
) {
    match stack.last_mut() {
        Some(parent) => parent.push_child(name, value),
        None => {
            if root.is_none() {
                *root = Some((name, value));
            }
        }
    }
}

/// Outcome of walking a response path.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrowed<'a> {
    /// Deepest node reached
    pub node: &'a Value,
    /// Segments that resolved, in order
    pub resolved: Vec<String>,
    /// First segment that did not resolve, if any
    pub missing: Option<String>,
}

/// Walks a dot-separated path through `tree`.
///
/// Numeric segments index into arrays. When a segment does not resolve the
/// walk stops and the last resolved node is returned with `missing` set;
/// the caller decides whether to proceed.
pub fn narrow<'a>(tree: &'a Value, path: Option<&str>) -> Narrowed<'a> {
    let mut node = tree;
    let mut resolved = Vec::new();

    let segments = path
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.split('.').map(str::trim).filter(|s| !s.is_empty()))
        .into_iter()
        .flatten();

    for segment in segments {
        let next = match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(child) => {
                node = child;
                resolved.push(segment.to_string());
            }
            None => {
                return Narrowed {
                    node,
                    resolved,
                    missing: Some(segment.to_string()),
                };
            }
        }
    }

    Narrowed {
        node,
        resolved,
        missing: None,
    }
}

/// Locates the record list inside a narrowed node.
///
/// - an array is used as is
/// - an object yields its first array-valued entry, or itself as a single record
/// - a scalar yields no records
pub fn find_records(node: &Value) -> Vec<&Value> {
    match node {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.values().find(|v| v.is_array()) {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![node],
        },
        _ => Vec::new(),
    }
}

/// Field names of a record: object keys in insertion order.
pub fn record_fields(record: &Value) -> Vec<String> {
    match record {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_narrow_full_path() {
        let tree = json!({"data": {"results": [{"a": 1, "b": 2}]}});
        let narrowed = narrow(&tree, Some("data.results"));

        assert_eq!(narrowed.missing, None);
        assert_eq!(narrowed.resolved, vec!["data", "results"]);
        let records = find_records(narrowed.node);
        assert_eq!(record_fields(records[0]), vec!["a", "b"]);
    }

    #[test]
    fn test_narrow_falls_back_to_deepest_node() {
        let tree = json!({"data": {"items": [{"x": 1}]}});
        let narrowed = narrow(&tree, Some("data.results.rows"));

        assert_eq!(narrowed.resolved, vec!["data"]);
        assert_eq!(narrowed.missing.as_deref(), Some("results"));
        assert_eq!(narrowed.node, &json!({"items": [{"x": 1}]}));

        // the object's first array still yields records
        let records = find_records(narrowed.node);
        assert_eq!(record_fields(records[0]), vec!["x"]);
    }

    #[test]
    fn test_narrow_without_path() {
        let tree = json!([{"id": 1}]);
        assert_eq!(narrow(&tree, None).node, &tree);
        assert_eq!(narrow(&tree, Some("  ")).node, &tree);
    }

    #[test]
    fn test_narrow_indexes_arrays() {
        let tree = json!({"pages": [{"users": [{"uid": "a"}]}]});
        let narrowed = narrow(&tree, Some("pages.0.users"));
        assert_eq!(narrowed.missing, None);
        assert_eq!(record_fields(find_records(narrowed.node)[0]), vec!["uid"]);
    }

    #[test]
    fn test_find_records_variants() {
        let single = json!({"id": 1, "name": "x"});
        assert_eq!(find_records(&single), vec![&single]);

        let wrapped = json!({"total": 2, "users": [{"id": 1}], "groups": [{"gid": 2}]});
        assert_eq!(find_records(&wrapped), vec![&json!({"id": 1})]);

        assert!(find_records(&json!("scalar")).is_empty());
        assert!(find_records(&json!([])).is_empty());
    }

    #[test]
    fn test_record_fields_keep_insertion_order() {
        let record: Value = serde_json::from_str(r#"{"zeta":1,"alpha":2,"mid":3}"#).unwrap();
        assert_eq!(record_fields(&record), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_xml_to_value_soap_envelope() {
        let xml = r#"<?xml version="1.0"?>
            <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
              <soap:Body>
                <GetUsersResponse xmlns="urn:iam">
                  <user id="1"><login>ada</login><mail>ada@example.com</mail></user>
                  <user id="2"><login>bob</login><mail>bob@example.com</mail></user>
                </GetUsersResponse>
              </soap:Body>
            </soap:Envelope>"#;
        let tree = xml_to_value(xml).unwrap();

        let narrowed = narrow(&tree, Some("Envelope.Body.GetUsersResponse.user"));
        assert_eq!(narrowed.missing, None);
        let records = find_records(narrowed.node);
        assert_eq!(records.len(), 2);
        assert_eq!(record_fields(records[0]), vec!["login", "mail"]);
        assert_eq!(records[1]["login"], "bob");
    }

    #[test]
    fn test_xml_text_empty_and_cdata() {
        let tree = xml_to_value("<a><b/><c><![CDATA[x < y]]></c><d>&amp;</d></a>").unwrap();
        assert_eq!(tree, json!({"a": {"b": "", "c": "x < y", "d": "&"}}));
    }

    #[test]
    fn test_xml_mixed_content_keeps_text() {
        let tree = xml_to_value("<a>note<b>1</b></a>").unwrap();
        assert_eq!(tree["a"][TEXT_KEY], "note");
        assert_eq!(tree["a"]["b"], "1");
    }

    #[test]
    fn test_xml_malformed() {
        assert!(xml_to_value("<a><b></a>").is_err());
        assert!(xml_to_value("<a>").is_err());
        assert!(xml_to_value("").is_err());
    }

    #[test]
    fn test_looks_like_xml() {
        assert!(looks_like_xml(Some("text/xml; charset=utf-8"), "{}"));
        assert!(looks_like_xml(Some("application/soap+xml"), ""));
        assert!(looks_like_xml(None, "  <root/>"));
        assert!(!looks_like_xml(Some("application/json"), "{\"a\":1}"));
    }
}
