//! Deterministic type names and legal field identifiers.
//!
//! # Preferred names
//!
//! | Schema location | Preferred name |
//! |-----------------|----------------|
//! | `title: "Pet record"` | `PetRecord` (title always wins) |
//! | `#/definitions/pet_status`, `#/components/schemas/pet_status` | `PetStatus` |
//! | `.../properties/owner` | `Owner` |
//! | `.../properties/tags/items` | `TagsItem` |
//! | `.../properties/labels/additionalProperties` | `LabelsValue` |
//! | `.../properties/labels/patternProperties` (several patterns) | `LabelsValue` |
//! | `.../properties/shape/oneOf/1` | `ShapeOption2` |
//! | `#` (root document) | `Root` |
//! | `common/defs.yaml#` | `Defs` |
//!
//! The [`NameRegistry`] hands each preferred name out once; later claimants
//! get `Name2`, `Name3`, ... and every such collision is recorded.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::CanonicalPointer;

/// Keywords whose members are named sub-schemas.
const CONTAINERS: &[&str] = &[
    "definitions",
    "$defs",
    "schemas",
    "properties",
    "patternProperties",
];

/// Composition keywords whose elements are positional sub-schemas.
const COMPOSITIONS: &[&str] = &["anyOf", "oneOf", "allOf"];

/// Names the stub module itself declares or imports.
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "SchemaBasedObject",
    "Any",
    "Dict",
    "List",
    "Literal",
    "Optional",
    "Union",
];

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Parameter names the generated `__init__` uses itself.
const STUB_PARAMETERS: &[&str] = &["self", "kwargs"];

/// A name that could not be handed out plain and was disambiguated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCollision {
    pub pointer: CanonicalPointer,
    pub preferred: String,
    pub assigned: String,
}

impl fmt::Display for NameCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name '{}' already taken; {} named '{}'",
            self.preferred, self.pointer, self.assigned
        )
    }
}

/// Per-run registry of assigned type names.
///
/// Owned by the builder for one generation run, so separate runs never share
/// naming state.
#[derive(Debug)]
pub struct NameRegistry {
    assigned: IndexMap<CanonicalPointer, String>,
    taken: HashSet<String>,
    collisions: Vec<NameCollision>,
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NameRegistry {
    /// A registry with the stub module's own names and Python keywords reserved.
    pub fn new() -> Self {
        Self::with_reserved(RESERVED_TYPE_NAMES.iter().chain(PYTHON_KEYWORDS).copied())
    }

    /// A registry that never hands out any of `reserved` plain.
    pub fn with_reserved<'s>(reserved: impl IntoIterator<Item = &'s str>) -> Self {
        Self {
            assigned: IndexMap::new(),
            taken: reserved.into_iter().map(str::to_string).collect(),
            collisions: Vec::new(),
        }
    }

    /// Assign a unique name to the type at `pointer`.
    ///
    /// Idempotent per pointer. The first claimant of a preferred name keeps it;
    /// subsequent claimants get the smallest free numeric suffix starting at 2.
    pub fn assign(&mut self, pointer: &CanonicalPointer, preferred: &str) -> String {
        if let Some(name) = self.assigned.get(pointer) {
            return name.clone();
        }

        let name = if self.taken.contains(preferred) {
            let mut n = 2usize;
            let mut candidate = format!("{preferred}{n}");
            while self.taken.contains(&candidate) {
                n += 1;
                candidate = format!("{preferred}{n}");
            }
            let collision = NameCollision {
                pointer: pointer.clone(),
                preferred: preferred.to_string(),
                assigned: candidate.clone(),
            };
            tracing::warn!("{collision}");
            self.collisions.push(collision);
            candidate
        } else {
            preferred.to_string()
        };

        self.taken.insert(name.clone());
        self.assigned.insert(pointer.clone(), name.clone());
        name
    }

    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    pub fn into_collisions(self) -> Vec<NameCollision> {
        self.collisions
    }
}

/// Derive the preferred type name for a schema from its title or location.
pub fn preferred_name(pointer: &CanonicalPointer, title: Option<&str>) -> String {
    if let Some(title) = title {
        let name = to_pascal_case(title);
        if !name.is_empty() {
            return name;
        }
    }
    let name = name_from_tokens(pointer.document(), &pointer.tokens());
    if name.is_empty() {
        "Type".to_string()
    } else {
        name
    }
}

fn name_from_tokens(document: &str, tokens: &[String]) -> String {
    let Some((last, parent)) = tokens.split_last() else {
        return document_name(document);
    };
    let container = parent.last().map(String::as_str);

    if let (Some(keyword), Ok(index)) = (container, last.parse::<usize>()) {
        if COMPOSITIONS.contains(&keyword) {
            let owner = name_from_tokens(document, &parent[..parent.len() - 1]);
            return format!("{owner}Option{}", index + 1);
        }
    }
    if container.is_some_and(|c| CONTAINERS.contains(&c)) {
        return to_pascal_case(last);
    }
    match last.as_str() {
        "items" => format!("{}Item", name_from_tokens(document, parent)),
        "additionalProperties" | "patternProperties" => {
            format!("{}Value", name_from_tokens(document, parent))
        }
        other => to_pascal_case(other),
    }
}

fn document_name(document: &str) -> String {
    if document.is_empty() {
        return "Root".to_string();
    }
    let file = document.rsplit('/').next().unwrap_or(document);
    let stem = file.split('.').next().unwrap_or(file);
    let name = to_pascal_case(stem);
    if name.is_empty() {
        "Root".to_string()
    } else {
        name
    }
}

/// Convert a schema key or title to PascalCase.
///
/// Any non-alphanumeric character separates words; existing capitals are kept.
/// - `"network_endpoint"` → `"NetworkEndpoint"`
/// - `"petId"` → `"PetId"`
/// - `"win/win-service"` → `"WinWinService"`
/// - `"3d point"` → `"T3dPoint"`
pub fn to_pascal_case(s: &str) -> String {
    let name: String = s
        .split(|c: char| !c.is_alphanumeric())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_uppercase().to_string() + chars.as_str(),
            }
        })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("T{name}")
    } else {
        name
    }
}

/// Convert a property name to a legal Python identifier.
///
/// - `"$ref"` → `"dollar_ref"`
/// - `"x-rate-limit"` → `"x_rate_limit"`
/// - `"200"` → `"field_200"`
/// - `"class"` → `"class_"`
/// - `"self"` → `"self_"`
pub fn to_identifier(name: &str) -> String {
    let mut ident = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
        } else if c == '$' && i == 0 {
            ident.push_str("dollar_");
        } else {
            ident.push('_');
        }
    }
    if ident.is_empty() {
        ident.push_str("field");
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "field_");
    }
    if PYTHON_KEYWORDS.contains(&ident.as_str()) || STUB_PARAMETERS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// [`to_identifier`], suffixed `_2`, `_3`, ... until unique within `taken`.
pub fn unique_identifier(name: &str, taken: &mut HashSet<String>) -> String {
    let base = to_identifier(name);
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
