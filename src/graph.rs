//! The synthesized type graph.
//!
//! Types live in an arena indexed by [`TypeId`]; relationships between them
//! (fields, elements, alternatives) are ids, not pointers, so self-referential
//! schemas are represented by an explicit [`TypeDescriptor::Reference`]
//! back-edge rather than by unrolling. Both emitters read this one graph.
//!
//! The graph is serializable: the runtime manifest written next to the stubs
//! is this structure as JSON.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::CanonicalPointer;
use crate::error::{Error, Result};
use crate::naming::NameCollision;

/// Recursion bound for structural comparison of cyclic shapes.
const MAX_COMPARE_DEPTH: usize = 32;

/// Index of a type in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(usize);

impl TypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The synthesized shape of one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "shape", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Object(ObjectType),
    Array(ArrayType),
    Map(MapType),
    Union(UnionType),
    Primitive(PrimitiveType),
    Enum(EnumType),
    Reference(ReferenceType),
    Unresolved(UnresolvedType),
}

impl TypeDescriptor {
    /// Whether this shape is emitted as a standalone, named type.
    pub fn is_nameable(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Object(_) | TypeDescriptor::Union(_) | TypeDescriptor::Enum(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Object(_) => "object",
            TypeDescriptor::Array(_) => "array",
            TypeDescriptor::Map(_) => "map",
            TypeDescriptor::Union(_) => "union",
            TypeDescriptor::Primitive(p) => p.as_str(),
            TypeDescriptor::Enum(_) => "enum",
            TypeDescriptor::Reference(_) => "reference",
            TypeDescriptor::Unresolved(_) => "unresolved",
        }
    }

    /// Directly referenced types, in declaration order.
    pub fn children(&self) -> Vec<TypeId> {
        match self {
            TypeDescriptor::Object(obj) => {
                let mut ids: Vec<TypeId> = obj.fields.iter().map(|f| f.ty).collect();
                if let AdditionalProperties::Typed(id) = obj.additional {
                    ids.push(id);
                }
                ids
            }
            TypeDescriptor::Array(arr) => vec![arr.items],
            TypeDescriptor::Map(map) => map.values.into_iter().collect(),
            TypeDescriptor::Union(union) => union.alternatives.clone(),
            TypeDescriptor::Reference(reference) => vec![reference.target],
            TypeDescriptor::Primitive(_)
            | TypeDescriptor::Enum(_)
            | TypeDescriptor::Unresolved(_) => Vec::new(),
        }
    }
}

/// An object with declared fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectType {
    /// Fields in schema order (first-seen order for merged `allOf` objects).
    pub fields: Vec<Field>,
    pub additional: AdditionalProperties,
}

impl ObjectType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The field a data key belongs to. Schema names win; an identifier only
    /// matches when no field is named that way.
    pub fn field_for_key(&self, key: &str) -> Option<&Field> {
        self.field(key)
            .or_else(|| self.fields.iter().find(|f| f.ident == key))
    }
}

/// What an object does with keys it does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalProperties {
    /// `additionalProperties: false`.
    Forbidden,
    /// Kept as raw values.
    Any,
    /// Constructed as the given type (`additionalProperties` schema or
    /// `patternProperties`).
    Typed(TypeId),
}

/// One declared property of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Property name exactly as written in the schema.
    pub name: String,
    /// Legal identifier used by the stubs, unique within the owner.
    pub ident: String,
    pub owner: TypeId,
    pub ty: TypeId,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayType {
    pub items: TypeId,
}

/// A property-less object used as a dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapType {
    /// Value type; `None` for free-form objects.
    pub values: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionType {
    pub alternatives: Vec<TypeId>,
    pub origin: UnionOrigin,
}

/// The schema construct a union was synthesized from.
///
/// `oneOf` and `anyOf` produce the same shape; the distinction is kept for
/// documentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionOrigin {
    AnyOf,
    OneOf,
    TypeList,
    PatternProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    /// Open / unknown: anything goes.
    Any,
}

impl PrimitiveType {
    /// Map a JSON Schema `type` name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => PrimitiveType::String,
            "integer" => PrimitiveType::Integer,
            "number" => PrimitiveType::Number,
            "boolean" => PrimitiveType::Boolean,
            "null" => PrimitiveType::Null,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
            PrimitiveType::Any => "any",
        }
    }

    /// Shape check of a decoded value against this primitive.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PrimitiveType::String => value.is_string(),
            PrimitiveType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            PrimitiveType::Number => value.is_number(),
            PrimitiveType::Boolean => value.is_boolean(),
            PrimitiveType::Null => value.is_null(),
            PrimitiveType::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub values: Vec<Value>,
}

/// Back-edge to a type that was still being resolved when it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceType {
    pub target: TypeId,
}

/// A schema the resolver does not model; values pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedType {
    pub keyword: String,
}

/// A schema location the resolver marked unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsupported {
    pub pointer: CanonicalPointer,
    pub keyword: String,
}

impl Unsupported {
    pub fn to_error(&self) -> Error {
        Error::UnsupportedKeyword {
            pointer: self.pointer.clone(),
            keyword: self.keyword.clone(),
        }
    }
}

/// One arena slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub pointer: CanonicalPointer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub descriptor: TypeDescriptor,
}

/// Every type synthesized from one schema source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeGraph {
    pub(crate) nodes: Vec<TypeNode>,
    pub(crate) pointers: IndexMap<CanonicalPointer, TypeId>,
    pub(crate) roots: Vec<TypeId>,
    pub(crate) definitions: IndexMap<String, TypeId>,
    pub(crate) named: Vec<TypeId>,
    #[serde(default)]
    pub(crate) collisions: Vec<NameCollision>,
    #[serde(default)]
    pub(crate) unsupported: Vec<Unsupported>,
}

impl TypeGraph {
    pub(crate) fn push(&mut self, node: TypeNode) -> TypeId {
        let id = TypeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn node_mut(&mut self, id: TypeId) -> &mut TypeNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` did not come from this graph.
    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.0]
    }

    pub fn descriptor(&self, id: TypeId) -> &TypeDescriptor {
        &self.nodes[id.0].descriptor
    }

    pub fn name(&self, id: TypeId) -> Option<&str> {
        self.nodes[id.0].name.as_deref()
    }

    /// The type memoized for a canonical pointer.
    pub fn lookup(&self, pointer: &CanonicalPointer) -> Option<TypeId> {
        self.pointers.get(pointer).copied()
    }

    /// The named type called `name`.
    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.named
            .iter()
            .copied()
            .find(|id| self.name(*id) == Some(name))
    }

    /// Top-level types in document order.
    pub fn roots(&self) -> &[TypeId] {
        &self.roots
    }

    /// Top-level definition names (`definitions`/`components.schemas` keys)
    /// and the types they resolve to.
    pub fn definitions(&self) -> &IndexMap<String, TypeId> {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<TypeId> {
        self.definitions.get(name).copied()
    }

    /// Named types in naming order.
    pub fn named(&self) -> &[TypeId] {
        &self.named
    }

    /// `(id, name)` of every named type, in naming order.
    pub fn named_types(&self) -> impl Iterator<Item = (TypeId, &str)> + '_ {
        self.named
            .iter()
            .filter_map(|id| self.name(*id).map(|name| (*id, name)))
    }

    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    pub fn unsupported(&self) -> &[Unsupported] {
        &self.unsupported
    }

    /// Fail with the first recorded unsupported-keyword diagnostic, if any.
    pub fn ensure_resolved(&self) -> Result<()> {
        match self.unsupported.first() {
            Some(unsupported) => Err(unsupported.to_error()),
            None => Ok(()),
        }
    }

    /// Follow `Reference` back-edges to the type they stand for.
    pub fn follow(&self, id: TypeId) -> TypeId {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            match self.descriptor(current) {
                TypeDescriptor::Reference(reference) => current = reference.target,
                _ => return current,
            }
        }
        current
    }

    /// Short human description of a type, for error messages.
    pub fn describe(&self, id: TypeId) -> String {
        let id = self.follow(id);
        match self.name(id) {
            Some(name) => format!("{} {name}", self.descriptor(id).kind_name()),
            None => self.descriptor(id).kind_name().to_string(),
        }
    }

    /// Whether two types describe compatible shapes, as required when
    /// `allOf` branches declare the same field.
    pub fn compatible(&self, a: TypeId, b: TypeId) -> bool {
        self.compatible_at(a, b, 0)
    }

    fn compatible_at(&self, a: TypeId, b: TypeId, depth: usize) -> bool {
        use TypeDescriptor as D;

        let (a, b) = (self.follow(a), self.follow(b));
        if a == b || depth > MAX_COMPARE_DEPTH {
            return true;
        }
        match (self.descriptor(a), self.descriptor(b)) {
            (D::Primitive(PrimitiveType::Any), _) | (_, D::Primitive(PrimitiveType::Any)) => true,
            (D::Unresolved(_), _) | (_, D::Unresolved(_)) => true,
            (D::Primitive(x), D::Primitive(y)) => {
                x == y
                    || matches!(
                        (x, y),
                        (PrimitiveType::Integer, PrimitiveType::Number)
                            | (PrimitiveType::Number, PrimitiveType::Integer)
                    )
            }
            (D::Enum(x), D::Enum(y)) => x.values == y.values,
            (D::Enum(e), D::Primitive(p)) | (D::Primitive(p), D::Enum(e)) => {
                e.values.iter().all(|v| p.accepts(v))
            }
            (D::Array(x), D::Array(y)) => self.compatible_at(x.items, y.items, depth + 1),
            (D::Map(x), D::Map(y)) => match (x.values, y.values) {
                (Some(p), Some(q)) => self.compatible_at(p, q, depth + 1),
                _ => true,
            },
            (D::Union(x), D::Union(y)) => {
                x.alternatives.len() == y.alternatives.len()
                    && x
                        .alternatives
                        .iter()
                        .zip(&y.alternatives)
                        .all(|(p, q)| self.compatible_at(*p, *q, depth + 1))
            }
            (D::Object(x), D::Object(y)) => {
                x.fields.len() == y.fields.len()
                    && x.fields.iter().all(|f| {
                        y.field(&f.name).is_some_and(|g| {
                            g.required == f.required && self.compatible_at(f.ty, g.ty, depth + 1)
                        })
                    })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(ptr: &str, descriptor: TypeDescriptor) -> TypeNode {
        TypeNode {
            pointer: CanonicalPointer::parse(ptr),
            name: None,
            title: None,
            description: None,
            descriptor,
        }
    }

    fn prim(p: PrimitiveType) -> TypeDescriptor {
        TypeDescriptor::Primitive(p)
    }

    #[test]
    fn follow_resolves_back_edges() {
        let mut graph = TypeGraph::default();
        let target = graph.push(node("#/a", prim(PrimitiveType::String)));
        let back = graph.push(node(
            "#/b",
            TypeDescriptor::Reference(ReferenceType { target }),
        ));
        assert_eq!(graph.follow(back), target);
        assert_eq!(graph.follow(target), target);
    }

    #[test]
    fn follow_terminates_on_reference_loops() {
        let mut graph = TypeGraph::default();
        let a = graph.push(node("#/a", prim(PrimitiveType::Any)));
        let b = graph.push(node("#/b", TypeDescriptor::Reference(ReferenceType { target: a })));
        graph.node_mut(a).descriptor = TypeDescriptor::Reference(ReferenceType { target: b });
        // Must return rather than spin.
        let _ = graph.follow(a);
    }

    #[test]
    fn primitive_compatibility() {
        let mut graph = TypeGraph::default();
        let s1 = graph.push(node("#/s1", prim(PrimitiveType::String)));
        let s2 = graph.push(node("#/s2", prim(PrimitiveType::String)));
        let n = graph.push(node("#/n", prim(PrimitiveType::Number)));
        let i = graph.push(node("#/i", prim(PrimitiveType::Integer)));
        let any = graph.push(node("#/any", prim(PrimitiveType::Any)));
        let e = graph.push(node(
            "#/e",
            TypeDescriptor::Enum(EnumType {
                values: vec![json!("a"), json!("b")],
            }),
        ));

        assert!(graph.compatible(s1, s2));
        assert!(!graph.compatible(s1, n));
        assert!(graph.compatible(i, n));
        assert!(graph.compatible(any, n));
        assert!(graph.compatible(e, s1));
        assert!(!graph.compatible(e, n));
    }

    #[test]
    fn array_compatibility_is_structural() {
        let mut graph = TypeGraph::default();
        let s = graph.push(node("#/s", prim(PrimitiveType::String)));
        let b = graph.push(node("#/b", prim(PrimitiveType::Boolean)));
        let arr_s = graph.push(node("#/as", TypeDescriptor::Array(ArrayType { items: s })));
        let arr_s2 = graph.push(node("#/as2", TypeDescriptor::Array(ArrayType { items: s })));
        let arr_b = graph.push(node("#/ab", TypeDescriptor::Array(ArrayType { items: b })));
        assert!(graph.compatible(arr_s, arr_s2));
        assert!(!graph.compatible(arr_s, arr_b));
        assert!(!graph.compatible(arr_s, s));
    }

    #[test]
    fn integer_accepts_whole_floats() {
        assert!(PrimitiveType::Integer.accepts(&json!(3)));
        assert!(PrimitiveType::Integer.accepts(&json!(3.0)));
        assert!(!PrimitiveType::Integer.accepts(&json!(3.5)));
        assert!(!PrimitiveType::Integer.accepts(&json!("3")));
        assert!(PrimitiveType::Number.accepts(&json!(3.5)));
        assert!(PrimitiveType::Any.accepts(&json!({"x": 1})));
    }

    #[test]
    fn ensure_resolved_reports_first_unsupported() {
        let mut graph = TypeGraph::default();
        assert!(graph.ensure_resolved().is_ok());
        graph.unsupported.push(Unsupported {
            pointer: CanonicalPointer::parse("#/definitions/A"),
            keyword: "not".to_string(),
        });
        let err = graph.ensure_resolved().unwrap_err().to_string();
        assert!(err.contains("not"));
        assert!(err.contains("#/definitions/A"));
    }

    #[test]
    fn descriptor_serializes_with_kind_tag() {
        let desc = TypeDescriptor::Array(ArrayType { items: TypeId(3) });
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json, json!({"kind": "array", "shape": {"items": 3}}));
        let back: TypeDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }
}
