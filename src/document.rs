//! Canonical pointers and the per-run document index.
//!
//! Every mapping (and boolean) node of every supplied document is indexed
//! under its canonical pointer, `<document-id>#<json-pointer>`. The root
//! document's id is the empty string, so its pointers read like the
//! fragments of an ordinary `$ref` (`#/definitions/Pet`). External documents
//! are keyed by their path relative to the root document's directory.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaSource;

/// Location of a sub-schema: document id plus RFC 6901 JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPointer(String);

impl CanonicalPointer {
    /// Pointer to the root of `document`.
    pub fn root(document: &str) -> Self {
        Self(format!("{document}#"))
    }

    /// Build a pointer from a document id and an already-escaped fragment
    /// (`""` or a string starting with `/`).
    pub fn from_parts(document: &str, fragment: &str) -> Self {
        Self(format!("{document}#{fragment}"))
    }

    /// Parse a pointer previously produced by [`Display`](fmt::Display).
    pub fn parse(s: &str) -> Self {
        if s.contains('#') {
            Self(s.to_string())
        } else {
            Self::root(s)
        }
    }

    /// The document id part (empty for the root document).
    pub fn document(&self) -> &str {
        self.0.split_once('#').map_or("", |(doc, _)| doc)
    }

    /// The escaped JSON pointer part (empty for a document root).
    pub fn fragment(&self) -> &str {
        self.0.split_once('#').map_or("", |(_, frag)| frag)
    }

    /// Pointer to a child member or element of this location.
    pub fn child(&self, token: &str) -> Self {
        Self(format!("{}/{}", self.0, escape_token(token)))
    }

    /// Unescaped reference tokens, root first.
    pub fn tokens(&self) -> Vec<String> {
        let fragment = self.fragment();
        if fragment.is_empty() {
            return Vec::new();
        }
        fragment
            .trim_start_matches('/')
            .split('/')
            .map(unescape_token)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// One sub-schema: its canonical pointer and the raw keyword data.
#[derive(Debug, Clone)]
pub struct SchemaNode<'a> {
    pointer: CanonicalPointer,
    value: &'a Value,
}

impl<'a> SchemaNode<'a> {
    pub fn new(pointer: CanonicalPointer, value: &'a Value) -> Self {
        Self { pointer, value }
    }

    pub fn pointer(&self) -> &CanonicalPointer {
        &self.pointer
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Raw value of a keyword, if the node is a mapping that has it.
    pub fn get(&self, keyword: &str) -> Option<&'a Value> {
        self.value.as_object().and_then(|map| map.get(keyword))
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// Descend through member names / array indices, tracking the pointer.
    pub fn child(&self, tokens: &[&str]) -> Option<SchemaNode<'a>> {
        let mut pointer = self.pointer.clone();
        let mut value = self.value;
        for token in tokens {
            value = match value {
                Value::Object(map) => map.get(*token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
            pointer = pointer.child(token);
        }
        Some(SchemaNode { pointer, value })
    }

    /// Members of a mapping-valued keyword (`properties`, `definitions`, ...)
    /// as child nodes, in document order.
    pub fn members(&self, keyword: &str) -> Vec<(&'a str, SchemaNode<'a>)> {
        let Some(Value::Object(map)) = self.get(keyword) else {
            return Vec::new();
        };
        let base = self.pointer.child(keyword);
        map.iter()
            .map(|(name, value)| (name.as_str(), SchemaNode::new(base.child(name), value)))
            .collect()
    }

    /// Elements of an array-valued keyword (`allOf`, `anyOf`, ...).
    pub fn elements(&self, keyword: &str) -> Vec<SchemaNode<'a>> {
        let Some(Value::Array(items)) = self.get(keyword) else {
            return Vec::new();
        };
        let base = self.pointer.child(keyword);
        items
            .iter()
            .enumerate()
            .map(|(i, value)| SchemaNode::new(base.child(&i.to_string()), value))
            .collect()
    }

    /// The `$ref` string, when present.
    pub fn reference(&self) -> Option<&'a str> {
        self.get("$ref").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&'a str> {
        self.get("title").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&'a str> {
        self.get("description").and_then(Value::as_str)
    }

    /// Names listed in the `required` keyword.
    pub fn required(&self) -> Vec<&'a str> {
        match self.get("required") {
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// O(1) lookup of any sub-schema by canonical pointer.
#[derive(Debug, Default)]
pub struct DocumentIndex<'a> {
    documents: IndexMap<&'a str, &'a Value>,
    nodes: HashMap<CanonicalPointer, &'a Value>,
    /// Id other documents use for the root document.
    root_alias: Option<String>,
}

impl<'a> DocumentIndex<'a> {
    /// Index a set of `(document id, parsed document)` pairs.
    pub fn new<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut index = Self::default();
        for (id, root) in documents {
            index.documents.insert(id, root);
            index.walk(CanonicalPointer::root(id), root);
        }
        index
    }

    /// Index every document of a [`SchemaSource`].
    pub fn from_source(source: &'a SchemaSource) -> Self {
        let mut index = Self::new(
            source
                .documents()
                .iter()
                .map(|(id, value)| (id.as_str(), value)),
        );
        index.root_alias = source.root_document_id();
        index
    }

    fn walk(&mut self, pointer: CanonicalPointer, value: &'a Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    self.walk(pointer.child(key), child);
                }
                self.nodes.insert(pointer, value);
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.walk(pointer.child(&i.to_string()), child);
                }
            }
            Value::Bool(_) => {
                self.nodes.insert(pointer, value);
            }
            _ => {}
        }
    }

    pub fn get(&self, pointer: &CanonicalPointer) -> Option<SchemaNode<'a>> {
        self.nodes
            .get(pointer)
            .map(|value| SchemaNode::new(pointer.clone(), value))
    }

    /// Root node of a supplied document.
    pub fn root(&self, document: &str) -> Option<SchemaNode<'a>> {
        self.documents
            .get(document)
            .map(|value| SchemaNode::new(CanonicalPointer::root(document), value))
    }

    /// `pointer` with the root document's file name replaced by the root id.
    pub fn canonical(&self, pointer: CanonicalPointer) -> CanonicalPointer {
        match &self.root_alias {
            Some(alias) if !alias.is_empty() && pointer.document() == alias => {
                CanonicalPointer::from_parts("", pointer.fragment())
            }
            _ => pointer,
        }
    }
}

/// Split a `$ref` string into its document part and decoded fragment.
///
/// `"#/definitions/A"` → `("", "/definitions/A")`,
/// `"common.yaml#/B"` → `("common.yaml", "/B")`, `"common.yaml"` → `("common.yaml", "")`.
pub fn split_reference(reference: &str) -> (&str, String) {
    match reference.split_once('#') {
        Some((doc, fragment)) => (doc, percent_decode(fragment)),
        None => (reference, String::new()),
    }
}

/// Resolve a relative document reference against the id of the referencing
/// document. Absolute references (`scheme://...` or `/...`) are kept as-is.
pub fn join_document_id(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    if relative.contains("://") || relative.starts_with('/') {
        return normalize_path(relative);
    }
    let dir = match base.rfind('/') {
        Some(pos) => &base[..=pos],
        None => "",
    };
    normalize_path(&format!("{dir}{relative}"))
}

fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." && !last.is_empty() => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

fn percent_decode(s: &str) -> String {
    if !s.contains('%') {
        return s.to_string();
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}
