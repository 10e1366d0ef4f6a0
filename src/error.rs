//! Error types for the schema-typegen crate.

use std::path::PathBuf;

use crate::document::CanonicalPointer;

/// Errors that can occur while resolving a schema, constructing runtime
/// instances, or writing generated artifacts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `$ref` points at a location that no supplied document contains.
    #[error("unresolved reference '{reference}' at {pointer}")]
    UnresolvedReference {
        pointer: CanonicalPointer,
        reference: String,
    },

    /// A chain of `$ref`s loops back on itself without ever reaching a schema
    /// that defines a type.
    #[error("reference at {pointer} loops back on itself without defining a type")]
    CircularReference { pointer: CanonicalPointer },

    /// Two `allOf` branches give the same field incompatible types.
    #[error(
        "allOf at {pointer} merges field '{field}' with incompatible types from {first} and {second}"
    )]
    AmbiguousMerge {
        pointer: CanonicalPointer,
        field: String,
        first: CanonicalPointer,
        second: CanonicalPointer,
    },

    /// A schema uses a keyword combination the resolver does not model.
    ///
    /// Only returned in strict mode; otherwise recorded on the type graph.
    #[error("unsupported keyword '{keyword}' at {pointer}")]
    UnsupportedKeyword {
        pointer: CanonicalPointer,
        keyword: String,
    },

    /// The document is structurally unusable for the selected dialect.
    #[error("invalid document: {0}")]
    Document(String),

    /// The dialect selector is neither `json_schema` nor `openapi`.
    #[error("unknown schema dialect '{0}' (expected 'json_schema' or 'openapi')")]
    UnknownDialect(String),

    /// No generated type carries the requested name.
    #[error("no generated type named '{0}'")]
    UnknownType(String),

    /// A required field is absent from the constructor input.
    #[error("{location}: missing required field '{field}' for {type_name}")]
    MissingField {
        type_name: String,
        field: String,
        location: String,
    },

    /// The constructor input has the wrong JSON shape for the target type.
    #[error("{location}: expected {expected}, found {found}")]
    UnexpectedShape {
        expected: String,
        found: String,
        location: String,
    },

    /// The constructor input carries a key the closed object does not allow.
    #[error("{location}: additional property '{property}' is not allowed for {type_name}")]
    UnexpectedProperty {
        type_name: String,
        property: String,
        location: String,
    },

    /// Refused to overwrite an existing artifact.
    #[error("{path} already exists (use --force to overwrite)")]
    OutputExists { path: PathBuf },

    /// Failed to write generated files.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read a file from disk.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON parse error with context.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error with context.
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Network error during schema download.
    #[cfg(feature = "download")]
    #[error("download failed: {0}")]
    Download(String),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
