//! Schema dialects, in-memory schema sources, loading, and downloading.
//!
//! A [`SchemaSource`] is the already-parsed input of one generation run: the
//! root document plus any external documents its `$ref`s point at, keyed by
//! document id (the root is `""`, others are paths relative to the root
//! document's directory). Loading reads JSON with `serde_json` and YAML with
//! `serde_yaml`, preserving mapping order in both cases.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::Value;

use crate::document::{CanonicalPointer, join_document_id, split_reference};
use crate::error::{Error, Result};

/// Which vocabulary the root document is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// A JSON Schema document; the root and every `definitions`/`$defs`
    /// entry become top-level types.
    JsonSchema,
    /// An OpenAPI 3.x document; every `components.schemas` entry becomes a
    /// top-level type.
    OpenApi,
}

impl Dialect {
    /// Top-level definitions of `root`, as `(definition name, pointer)` pairs
    /// in document order.
    pub fn root_definitions(&self, root: &Value) -> Result<Vec<(String, CanonicalPointer)>> {
        let base = CanonicalPointer::root("");
        match self {
            Dialect::JsonSchema => {
                let mut roots = vec![("Root".to_string(), base.clone())];
                for container in ["definitions", "$defs"] {
                    if let Some(Value::Object(defs)) = root.get(container) {
                        let ptr = base.child(container);
                        roots.extend(defs.keys().map(|name| (name.clone(), ptr.child(name))));
                    }
                }
                Ok(roots)
            }
            Dialect::OpenApi => {
                let version = root.get("openapi").and_then(Value::as_str).unwrap_or("");
                if !version.starts_with("3.") {
                    return Err(Error::Document(format!(
                        "OpenAPI version '{version}' not supported (expected 3.x)"
                    )));
                }
                let Some(schemas) = root.pointer("/components/schemas") else {
                    tracing::warn!("OpenAPI document has no components.schemas section");
                    return Ok(Vec::new());
                };
                let Value::Object(schemas) = schemas else {
                    return Err(Error::Document(
                        "components.schemas must be a mapping".to_string(),
                    ));
                };
                let ptr = base.child("components").child("schemas");
                Ok(schemas
                    .keys()
                    .map(|name| (name.clone(), ptr.child(name)))
                    .collect())
            }
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json_schema" | "json-schema" | "jsonschema" => Ok(Dialect::JsonSchema),
            "openapi" => Ok(Dialect::OpenApi),
            other => Err(Error::UnknownDialect(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::JsonSchema => "json_schema",
            Dialect::OpenApi => "openapi",
        })
    }
}

/// The parsed input of one generation run.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    dialect: Dialect,
    documents: IndexMap<String, Value>,
    origin: Option<PathBuf>,
}

impl SchemaSource {
    /// A source consisting of just the root document.
    pub fn new(dialect: Dialect, root: Value) -> Self {
        let mut documents = IndexMap::new();
        documents.insert(String::new(), root);
        Self {
            dialect,
            documents,
            origin: None,
        }
    }

    /// Add an external document that `$ref`s may point into.
    pub fn with_document(mut self, id: impl Into<String>, document: Value) -> Self {
        self.documents.insert(id.into(), document);
        self
    }

    /// Remember where the root document was loaded from.
    pub fn with_origin(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin = Some(path.into());
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn documents(&self) -> &IndexMap<String, Value> {
        &self.documents
    }

    pub fn root(&self) -> &Value {
        &self.documents[0]
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// The id sibling documents use when they refer back to the root: its
    /// file name.
    pub fn root_document_id(&self) -> Option<String> {
        self.origin
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Human-readable label for generated file headers.
    pub fn label(&self) -> String {
        self.root_document_id()
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

/// Parse schema text. JSON when `path` ends in `.json`, YAML otherwise
/// (YAML also accepts plain JSON).
pub fn parse_document(text: &str, path: &Path) -> Result<Value> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return Ok(serde_json::from_str(text)?);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    yaml_to_json(yaml)
}

/// Read and parse one schema document from disk.
pub fn load_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_document(&content, path)
}

/// Load a schema from disk together with every relative document its
/// `$ref`s reach, transitively.
///
/// Absolute (`scheme://`) references are left for the resolver, which reports
/// them as unresolved unless the caller supplied them.
pub fn load_schema(path: &Path, dialect: Dialect) -> Result<SchemaSource> {
    let root = load_document(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let mut pending = external_documents("", &root);
    let mut source = SchemaSource::new(dialect, root).with_origin(path);
    let root_id = source.root_document_id();

    while let Some(id) = pending.pop() {
        if source.documents.contains_key(&id)
            || id.contains("://")
            || root_id.as_deref() == Some(id.as_str())
        {
            continue;
        }
        let document = load_document(&base_dir.join(&id))?;
        tracing::debug!(document = %id, "loaded referenced document");
        pending.extend(external_documents(&id, &document));
        source.documents.insert(id, document);
    }

    Ok(source)
}

/// Ids of the documents referenced from `document` (other than itself).
fn external_documents(document_id: &str, document: &Value) -> Vec<String> {
    fn walk(document_id: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let (doc, _) = split_reference(reference);
                    if !doc.is_empty() {
                        let id = join_document_id(document_id, doc);
                        if id != document_id && !out.contains(&id) {
                            out.push(id);
                        }
                    }
                }
                for child in map.values() {
                    walk(document_id, child, out);
                }
            }
            Value::Array(items) => {
                for child in items {
                    walk(document_id, child, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(document_id, document, &mut out);
    out
}

/// Convert a YAML tree into a JSON tree, stringifying scalar mapping keys
/// (OpenAPI response codes are commonly unquoted integers).
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| Error::Document(format!("non-finite number {f} in YAML")))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = serde_json::Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => {
                        return Err(Error::Document(format!(
                            "unsupported YAML mapping key: {other:?}"
                        )));
                    }
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Download a schema document and save it to disk.
///
/// Validates that the response parses (JSON or YAML, judged by the
/// output path's extension) before writing.
#[cfg(feature = "download")]
pub async fn download_schema(url: &str, output_path: &Path) -> Result<()> {
    tracing::info!("Downloading schema from {url}");

    let response = reqwest::get(url)
        .await
        .map_err(|e| Error::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "GET {url} returned {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::Download(format!("reading response body: {e}")))?;

    // Validate before writing.
    parse_document(&body, output_path)?;

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::write(output_path, &body).map_err(|e| Error::Write {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    tracing::info!("Saved schema to {}", output_path.display());
    Ok(())
}
