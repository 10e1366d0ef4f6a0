//! Composition rules: one schema node to one [`TypeDescriptor`].
//!
//! Rules are tried in a fixed precedence order:
//!
//! 1. boolean schemas (`true` is open, `false` is unsupported)
//! 2. `not` / `if` / `then` / `else` (unsupported)
//! 3. `enum` / `const`
//! 4. `allOf` (merged into one object)
//! 5. `anyOf` / `oneOf` (union)
//! 6. `type` lists (nullable collapse or primitive union)
//! 7. objects and maps, arrays, primitives
//!
//! Sub-schemas are resolved through the [`Subschemas`] sink, which the graph
//! builder implements, so memoization and cycle cutting stay in one place.
//! Anything this module does not model is reported to the sink and becomes
//! [`TypeDescriptor::Unresolved`].

use std::collections::HashSet;

use indexmap::IndexSet;
use serde_json::Value;

use crate::document::{CanonicalPointer, SchemaNode};
use crate::error::{Error, Result};
use crate::graph::{
    AdditionalProperties, ArrayType, EnumType, Field, MapType, ObjectType, PrimitiveType,
    TypeDescriptor, TypeGraph, TypeId, UnionOrigin, UnionType, UnresolvedType,
};
use crate::naming::unique_identifier;

/// Where composition sends the sub-schemas it needs resolved.
pub trait Subschemas<'a> {
    /// Resolve a child schema to its (memoized) type.
    fn resolve(&mut self, node: SchemaNode<'a>) -> Result<TypeId>;

    /// Add a type that no schema location describes on its own, such as one
    /// member of a `type: [string, integer]` union.
    fn synthesize(&mut self, pointer: CanonicalPointer, descriptor: TypeDescriptor) -> TypeId;

    /// Record a keyword combination that is not modelled.
    fn unsupported(&mut self, pointer: &CanonicalPointer, keyword: &str);

    fn graph(&self) -> &TypeGraph;
}

/// Outcome of composing one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Composed {
    /// The node has a shape of its own.
    Shape(TypeDescriptor),
    /// The node stands for another type (single-branch unions, lone
    /// substantive `allOf` branches).
    Alias(TypeId),
}

/// Compose the node whose type slot is `owner`.
pub fn compose<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    owner: TypeId,
) -> Result<Composed> {
    match node.value() {
        Value::Bool(true) => return Ok(Composed::Shape(any())),
        Value::Bool(false) => return Ok(unsupported(sink, node, "false")),
        Value::Object(_) => {}
        _ => return Ok(unsupported(sink, node, "non-schema value")),
    }

    for keyword in ["not", "if", "then", "else"] {
        if node.has(keyword) {
            return Ok(unsupported(sink, node, keyword));
        }
    }

    if let Some(values) = node.get("enum") {
        return Ok(match values {
            Value::Array(values) => Composed::Shape(TypeDescriptor::Enum(EnumType {
                values: values.clone(),
            })),
            _ => unsupported(sink, node, "enum"),
        });
    }
    if let Some(value) = node.get("const") {
        return Ok(Composed::Shape(TypeDescriptor::Enum(EnumType {
            values: vec![value.clone()],
        })));
    }

    let any_of = node.has("anyOf");
    let one_of = node.has("oneOf");
    if node.has("allOf") {
        if any_of || one_of {
            return Ok(unsupported(sink, node, "allOf with anyOf/oneOf"));
        }
        return compose_all_of(sink, node, owner);
    }
    match (any_of, one_of) {
        (true, true) => return Ok(unsupported(sink, node, "anyOf with oneOf")),
        (true, false) => return compose_union(sink, node, "anyOf", UnionOrigin::AnyOf),
        (false, true) => return compose_union(sink, node, "oneOf", UnionOrigin::OneOf),
        (false, false) => {}
    }

    compose_typed(sink, node, owner)
}

fn any() -> TypeDescriptor {
    TypeDescriptor::Primitive(PrimitiveType::Any)
}

fn unsupported<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    keyword: &str,
) -> Composed {
    sink.unsupported(node.pointer(), keyword);
    Composed::Shape(TypeDescriptor::Unresolved(UnresolvedType {
        keyword: keyword.to_string(),
    }))
}

// ── type-driven rules ───────────────────────────────────────────────────────

fn compose_typed<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    owner: TypeId,
) -> Result<Composed> {
    let types: Vec<&str> = match node.get("type") {
        None => Vec::new(),
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            if names.is_empty() {
                return Ok(unsupported(sink, node, "type"));
            }
            names
        }
        Some(_) => return Ok(unsupported(sink, node, "type")),
    };

    let non_null: Vec<&str> = types.iter().copied().filter(|t| *t != "null").collect();
    let kind = match non_null.as_slice() {
        [] if types.is_empty() => inferred_kind(node),
        [] => "null",
        [single] => single,
        _ => return compose_type_list(sink, node, &types),
    };

    match kind {
        "object" => compose_object(sink, node, owner),
        "array" => compose_array(sink, node),
        "any" => Ok(Composed::Shape(any())),
        other => Ok(match PrimitiveType::from_type_name(other) {
            Some(primitive) => Composed::Shape(TypeDescriptor::Primitive(primitive)),
            None => unsupported(sink, node, &format!("type: {other}")),
        }),
    }
}

/// Shape implied by structural keywords when `type` is absent.
fn inferred_kind(node: &SchemaNode<'_>) -> &'static str {
    if ["properties", "additionalProperties", "patternProperties"]
        .iter()
        .any(|k| node.has(k))
    {
        "object"
    } else if node.has("items") {
        "array"
    } else {
        "any"
    }
}

fn compose_type_list<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    types: &[&str],
) -> Result<Composed> {
    if types.iter().any(|t| *t == "object" || *t == "array") {
        return Ok(unsupported(sink, node, "type"));
    }
    let base = node.pointer().child("type");
    let mut alternatives = Vec::with_capacity(types.len());
    for (i, name) in types.iter().enumerate() {
        let Some(primitive) = PrimitiveType::from_type_name(name) else {
            return Ok(unsupported(sink, node, &format!("type: {name}")));
        };
        alternatives.push(sink.synthesize(
            base.child(&i.to_string()),
            TypeDescriptor::Primitive(primitive),
        ));
    }
    Ok(Composed::Shape(TypeDescriptor::Union(UnionType {
        alternatives,
        origin: UnionOrigin::TypeList,
    })))
}

fn compose_object<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    owner: TypeId,
) -> Result<Composed> {
    if !node.has("properties") {
        let values = match additional_policy(sink, node)? {
            AdditionalProperties::Typed(id) => Some(id),
            AdditionalProperties::Forbidden | AdditionalProperties::Any => None,
        };
        return Ok(Composed::Shape(TypeDescriptor::Map(MapType { values })));
    }

    let mut fields = own_fields(sink, node, owner)?;
    let mut taken = HashSet::new();
    for field in &mut fields {
        field.ident = unique_identifier(&field.name, &mut taken);
    }
    let additional = additional_policy(sink, node)?;
    Ok(Composed::Shape(TypeDescriptor::Object(ObjectType {
        fields,
        additional,
    })))
}

/// Fields declared directly under `properties`, with `required` applied.
/// Identifiers are left empty for the caller to assign.
fn own_fields<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    owner: TypeId,
) -> Result<Vec<Field>> {
    let required = node.required();
    let mut fields = Vec::new();
    for (name, child) in node.members("properties") {
        let default = child.get("default").cloned();
        let description = child.description().map(str::to_string);
        let ty = sink.resolve(child)?;
        fields.push(Field {
            name: name.to_string(),
            ident: String::new(),
            owner,
            ty,
            required: required.contains(&name),
            default,
            description,
        });
    }
    Ok(fields)
}

fn additional_policy<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
) -> Result<AdditionalProperties> {
    let patterns = node.members("patternProperties");
    if !patterns.is_empty() {
        let mut alternatives = Vec::with_capacity(patterns.len());
        for (_, pattern) in patterns {
            alternatives.push(sink.resolve(pattern)?);
        }
        let id = match alternatives.as_slice() {
            [single] => *single,
            _ => sink.synthesize(
                node.pointer().child("patternProperties"),
                TypeDescriptor::Union(UnionType {
                    alternatives,
                    origin: UnionOrigin::PatternProperties,
                }),
            ),
        };
        return Ok(AdditionalProperties::Typed(id));
    }

    Ok(match node.get("additionalProperties") {
        Some(Value::Bool(false)) => AdditionalProperties::Forbidden,
        Some(Value::Object(_)) => match node.child(&["additionalProperties"]) {
            Some(child) => AdditionalProperties::Typed(sink.resolve(child)?),
            None => AdditionalProperties::Any,
        },
        _ => AdditionalProperties::Any,
    })
}

fn compose_array<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
) -> Result<Composed> {
    let items = match node.get("items") {
        Some(Value::Array(_)) => return Ok(unsupported(sink, node, "items (tuple form)")),
        Some(_) => match node.child(&["items"]) {
            Some(child) => sink.resolve(child)?,
            None => sink.synthesize(node.pointer().child("items"), any()),
        },
        None => sink.synthesize(node.pointer().child("items"), any()),
    };
    Ok(Composed::Shape(TypeDescriptor::Array(ArrayType { items })))
}

// ── anyOf / oneOf ───────────────────────────────────────────────────────────

fn compose_union<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    keyword: &str,
    origin: UnionOrigin,
) -> Result<Composed> {
    let branches = node.elements(keyword);
    if branches.is_empty() {
        return Ok(unsupported(sink, node, keyword));
    }
    if node.has("properties") {
        tracing::debug!(pointer = %node.pointer(), "properties next to {keyword} ignored");
    }

    let mut alternatives = Vec::with_capacity(branches.len());
    for branch in branches {
        alternatives.push(sink.resolve(branch)?);
    }
    if let [single] = alternatives.as_slice() {
        return Ok(Composed::Alias(*single));
    }
    Ok(Composed::Shape(TypeDescriptor::Union(UnionType {
        alternatives,
        origin,
    })))
}

// ── allOf ───────────────────────────────────────────────────────────────────

/// Fields contributed by one `allOf` branch, with the branch location for
/// conflict reports.
struct Contribution {
    source: CanonicalPointer,
    fields: Vec<Field>,
}

fn compose_all_of<'a, S: Subschemas<'a>>(
    sink: &mut S,
    node: &SchemaNode<'a>,
    owner: TypeId,
) -> Result<Composed> {
    let mut required: IndexSet<String> =
        node.required().into_iter().map(str::to_string).collect();
    let mut contributions = Vec::new();
    let mut others = Vec::new();
    let mut inherited = AdditionalProperties::Any;
    let mut has_object = node.has("properties");

    for branch in node.elements("allOf") {
        let source = branch.pointer().clone();
        required.extend(branch.required().into_iter().map(str::to_string));
        let id = sink.resolve(branch)?;

        let graph = sink.graph();
        if matches!(graph.descriptor(id), TypeDescriptor::Reference(_)) {
            return Ok(unsupported(sink, node, "allOf (recursive branch)"));
        }
        match graph.descriptor(graph.follow(id)).clone() {
            TypeDescriptor::Object(object) => {
                has_object = true;
                if let (AdditionalProperties::Any, AdditionalProperties::Typed(_)) =
                    (inherited, object.additional)
                {
                    inherited = object.additional;
                }
                contributions.push(Contribution {
                    source,
                    fields: object.fields,
                });
            }
            TypeDescriptor::Union(_) => {
                return Ok(unsupported(sink, node, "allOf (union branch)"));
            }
            TypeDescriptor::Primitive(PrimitiveType::Any)
            | TypeDescriptor::Map(MapType { values: None })
            | TypeDescriptor::Unresolved(_) => {}
            _ => others.push(id),
        }
    }

    if !has_object {
        return Ok(match others.as_slice() {
            [] => Composed::Shape(any()),
            [first, rest @ ..] if rest.iter().all(|o| sink.graph().compatible(*first, *o)) => {
                Composed::Alias(*first)
            }
            _ => unsupported(sink, node, "allOf (incompatible branches)"),
        });
    }
    if !others.is_empty() {
        return Ok(unsupported(sink, node, "allOf (object and non-object branches)"));
    }

    if node.has("properties") {
        let fields = own_fields(sink, node, owner)?;
        contributions.push(Contribution {
            source: node.pointer().clone(),
            fields,
        });
    }
    let additional = if ["additionalProperties", "patternProperties"]
        .iter()
        .any(|k| node.has(k))
    {
        additional_policy(sink, node)?
    } else {
        inherited
    };

    let mut fields = merge_fields(sink.graph(), node.pointer(), contributions)?;
    let mut taken = HashSet::new();
    for field in &mut fields {
        field.owner = owner;
        field.required |= required.contains(&field.name);
        field.ident = unique_identifier(&field.name, &mut taken);
    }
    Ok(Composed::Shape(TypeDescriptor::Object(ObjectType {
        fields,
        additional,
    })))
}

/// Union fields by name in first-seen order.
fn merge_fields(
    graph: &TypeGraph,
    pointer: &CanonicalPointer,
    contributions: Vec<Contribution>,
) -> Result<Vec<Field>> {
    let mut merged: Vec<Field> = Vec::new();
    let mut sources: Vec<CanonicalPointer> = Vec::new();

    for Contribution { source, fields } in contributions {
        for field in fields {
            let Some(i) = merged.iter().position(|m| m.name == field.name) else {
                merged.push(field);
                sources.push(source.clone());
                continue;
            };
            let existing = &mut merged[i];
            if !graph.compatible(existing.ty, field.ty) {
                return Err(Error::AmbiguousMerge {
                    pointer: pointer.clone(),
                    field: field.name,
                    first: sources[i].clone(),
                    second: source,
                });
            }
            if is_open(graph, existing.ty) {
                existing.ty = field.ty;
            }
            existing.required |= field.required;
            if existing.default.is_none() {
                existing.default = field.default;
            }
            if existing.description.is_none() {
                existing.description = field.description;
            }
        }
    }
    Ok(merged)
}

fn is_open(graph: &TypeGraph, id: TypeId) -> bool {
    matches!(
        graph.descriptor(graph.follow(id)),
        TypeDescriptor::Primitive(PrimitiveType::Any) | TypeDescriptor::Unresolved(_)
    )
}
