//! Runtime construction of typed instances from decoded JSON values.
//!
//! [`RuntimeTypeEmitter`] turns a [`TypeGraph`] into a registry of named
//! constructors. One generic constructor walks the tagged descriptors; there
//! is no per-type code. The same graph, serialized, is the manifest written
//! next to the stubs, so a registry can be rebuilt later with
//! [`RuntimeTypes::from_manifest`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::graph::{
    AdditionalProperties, Field, ObjectType, TypeDescriptor, TypeGraph, TypeId, UnionType,
};

/// Recursion bound for union shape checks over cyclic types.
const MAX_ACCEPT_DEPTH: usize = 32;

pub struct RuntimeTypeEmitter;

impl RuntimeTypeEmitter {
    /// One constructor per named type, in naming order.
    pub fn emit(graph: Arc<TypeGraph>) -> RuntimeTypes {
        let constructors = graph
            .named_types()
            .map(|(id, name)| (name.to_string(), id))
            .collect();
        RuntimeTypes {
            graph,
            constructors,
        }
    }
}

/// Registry of runtime constructors over one shared graph.
#[derive(Debug, Clone)]
pub struct RuntimeTypes {
    graph: Arc<TypeGraph>,
    constructors: IndexMap<String, TypeId>,
}

impl RuntimeTypes {
    /// Rebuild a registry from a manifest written by [`RuntimeTypes::to_manifest`].
    pub fn from_manifest(text: &str) -> Result<Self> {
        let graph: TypeGraph = serde_json::from_str(text)?;
        check_manifest(&graph)?;
        Ok(RuntimeTypeEmitter::emit(Arc::new(graph)))
    }

    pub fn to_manifest(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self.graph.as_ref())?;
        text.push('\n');
        Ok(text)
    }

    pub fn graph(&self) -> &Arc<TypeGraph> {
        &self.graph
    }

    pub fn get(&self, name: &str) -> Option<TypeConstructor<'_>> {
        self.constructors
            .get_key_value(name)
            .map(|(name, id)| TypeConstructor {
                graph: &self.graph,
                name,
                id: *id,
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn constructors(&self) -> impl Iterator<Item = TypeConstructor<'_>> {
        self.constructors.iter().map(|(name, id)| TypeConstructor {
            graph: &self.graph,
            name,
            id: *id,
        })
    }

    /// Construct an instance of the named type.
    pub fn construct(&self, name: &str, value: &Value) -> Result<Instance> {
        self.get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))?
            .construct(value)
    }

    /// Construct through a top-level definition name, which may resolve to
    /// an unnamed shape (an array, a primitive).
    pub fn construct_definition(&self, definition: &str, value: &Value) -> Result<Instance> {
        let id = self
            .graph
            .definition(definition)
            .ok_or_else(|| Error::UnknownType(definition.to_string()))?;
        Constructor { graph: &self.graph }.construct(id, value, "$")
    }
}

/// Every id in a deserialized graph must point into its arena.
fn check_manifest(graph: &TypeGraph) -> Result<()> {
    let len = graph.len();
    let out_of_range = |id: &TypeId| id.index() >= len;
    let bad = graph
        .nodes
        .iter()
        .flat_map(|node| node.descriptor.children())
        .chain(graph.roots.iter().copied())
        .chain(graph.definitions.values().copied())
        .chain(graph.named.iter().copied())
        .chain(graph.pointers.values().copied())
        .find(|id| out_of_range(id));
    match bad {
        Some(id) => Err(Error::Document(format!(
            "manifest refers to type {id} but has only {len} types"
        ))),
        None => Ok(()),
    }
}

/// Constructor for one named type.
#[derive(Debug, Clone, Copy)]
pub struct TypeConstructor<'r> {
    graph: &'r Arc<TypeGraph>,
    name: &'r str,
    id: TypeId,
}

impl<'r> TypeConstructor<'r> {
    pub fn name(&self) -> &'r str {
        self.name
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// `object`, `union` or `enum`.
    pub fn kind(&self) -> &'static str {
        self.graph.descriptor(self.id).kind_name()
    }

    /// Declared fields; empty for non-object types.
    pub fn fields(&self) -> &'r [Field] {
        match self.graph.descriptor(self.id) {
            TypeDescriptor::Object(obj) => &obj.fields,
            _ => &[],
        }
    }

    /// Build an instance from decoded data. `null` is accepted wherever a
    /// value is, including for required fields the stubs type as non-optional.
    pub fn construct(&self, value: &Value) -> Result<Instance> {
        Constructor { graph: self.graph }.construct(self.id, value, "$")
    }

    /// Shape check used to pick union alternatives.
    pub fn accepts(&self, value: &Value) -> bool {
        accepts(self.graph, self.id, value, 0)
    }
}

// ── construction ────────────────────────────────────────────────────────────

struct Constructor<'g> {
    graph: &'g Arc<TypeGraph>,
}

impl Constructor<'_> {
    fn construct(&self, id: TypeId, value: &Value, location: &str) -> Result<Instance> {
        let id = self.graph.follow(id);
        if value.is_null() {
            return Ok(Instance::Value(Value::Null));
        }
        match self.graph.descriptor(id) {
            TypeDescriptor::Object(obj) => match value {
                Value::Object(map) => self.construct_object(id, obj, map, location),
                other => Err(self.shape_error(id, other, location)),
            },
            TypeDescriptor::Array(arr) => match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.construct(arr.items, item, &format!("{location}[{i}]")))
                    .collect::<Result<Vec<_>>>()
                    .map(Instance::Array),
                other => Err(self.shape_error(id, other, location)),
            },
            TypeDescriptor::Map(map) => match (value, map.values) {
                (Value::Object(entries), Some(values)) => entries
                    .iter()
                    .map(|(key, v)| {
                        let instance = self.construct(values, v, &format!("{location}.{key}"))?;
                        Ok((key.clone(), instance))
                    })
                    .collect::<Result<IndexMap<_, _>>>()
                    .map(Instance::Map),
                (Value::Object(_), None) => Ok(Instance::Value(value.clone())),
                (other, _) => Err(self.shape_error(id, other, location)),
            },
            TypeDescriptor::Union(union) => self.construct_union(id, union, value, location),
            TypeDescriptor::Primitive(_)
            | TypeDescriptor::Enum(_)
            | TypeDescriptor::Reference(_)
            | TypeDescriptor::Unresolved(_) => Ok(Instance::Value(value.clone())),
        }
    }

    fn construct_object(
        &self,
        id: TypeId,
        obj: &ObjectType,
        map: &Map<String, Value>,
        location: &str,
    ) -> Result<Instance> {
        let type_name = self.graph.name(id).unwrap_or("object");

        let mut fields = IndexMap::new();
        for field in &obj.fields {
            let present = present_key(obj, field, map);
            match present {
                Some((key, v)) => {
                    let instance = self.construct(field.ty, v, &format!("{location}.{key}"))?;
                    fields.insert(field.name.clone(), instance);
                }
                None if field.required => {
                    return Err(Error::MissingField {
                        type_name: type_name.to_string(),
                        field: field.name.clone(),
                        location: location.to_string(),
                    });
                }
                None => {}
            }
        }

        let mut extra = IndexMap::new();
        for (key, v) in map.iter().filter(|(key, _)| !declares(obj, key)) {
            let instance = match obj.additional {
                AdditionalProperties::Forbidden => {
                    return Err(Error::UnexpectedProperty {
                        type_name: type_name.to_string(),
                        property: key.clone(),
                        location: location.to_string(),
                    });
                }
                AdditionalProperties::Any => Instance::Value(v.clone()),
                AdditionalProperties::Typed(ty) => {
                    self.construct(ty, v, &format!("{location}.{key}"))?
                }
            };
            extra.insert(key.clone(), instance);
        }

        Ok(Instance::Object(ObjectInstance {
            graph: Arc::clone(self.graph),
            ty: id,
            fields,
            extra,
        }))
    }

    fn construct_union(
        &self,
        id: TypeId,
        union: &UnionType,
        value: &Value,
        location: &str,
    ) -> Result<Instance> {
        let type_name = self.graph.name(id).map(str::to_string);
        for (i, alternative) in union.alternatives.iter().enumerate() {
            if !accepts(self.graph, *alternative, value, 0) {
                continue;
            }
            match self.construct(*alternative, value, location) {
                Ok(instance) => {
                    return Ok(Instance::Union(UnionInstance {
                        type_name,
                        alternative: Some(i),
                        value: Box::new(instance),
                    }));
                }
                Err(err) => tracing::trace!(%location, alternative = i, "rejected: {err}"),
            }
        }
        tracing::debug!(%location, "no union alternative matched; keeping raw value");
        Ok(Instance::Union(UnionInstance {
            type_name,
            alternative: None,
            value: Box::new(Instance::Value(value.clone())),
        }))
    }

    fn shape_error(&self, id: TypeId, found: &Value, location: &str) -> Error {
        Error::UnexpectedShape {
            expected: self.graph.describe(id),
            found: json_kind(found).to_string(),
            location: location.to_string(),
        }
    }
}

fn declares(obj: &ObjectType, key: &str) -> bool {
    obj.field_for_key(key).is_some()
}

/// The data entry for `field`, by schema name or else by identifier.
fn present_key<'m>(
    obj: &ObjectType,
    field: &Field,
    map: &'m Map<String, Value>,
) -> Option<(&'m String, &'m Value)> {
    map.get_key_value(&field.name).or_else(|| {
        match obj.field(&field.ident) {
            Some(_) => None,
            None => map.get_key_value(&field.ident),
        }
    })
}

fn accepts(graph: &TypeGraph, id: TypeId, value: &Value, depth: usize) -> bool {
    let id = graph.follow(id);
    if depth > MAX_ACCEPT_DEPTH {
        return true;
    }
    match graph.descriptor(id) {
        TypeDescriptor::Object(obj) => value.as_object().is_some_and(|map| {
            obj.fields
                .iter()
                .filter(|f| f.required)
                .all(|f| present_key(obj, f, map).is_some())
                && (obj.additional != AdditionalProperties::Forbidden
                    || map.keys().all(|key| declares(obj, key)))
        }),
        TypeDescriptor::Array(_) => value.is_array(),
        TypeDescriptor::Map(_) => value.is_object(),
        TypeDescriptor::Union(union) => union
            .alternatives
            .iter()
            .any(|alt| accepts(graph, *alt, value, depth + 1)),
        TypeDescriptor::Primitive(primitive) => primitive.accepts(value),
        TypeDescriptor::Enum(e) => e.values.contains(value),
        TypeDescriptor::Reference(_) | TypeDescriptor::Unresolved(_) => true,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── instances ───────────────────────────────────────────────────────────────

/// A constructed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    Object(ObjectInstance),
    Array(Vec<Instance>),
    Map(IndexMap<String, Instance>),
    Union(UnionInstance),
    /// Primitives, enum members, free-form and unchecked values, as decoded.
    Value(Value),
}

impl Instance {
    /// Plain JSON projection.
    pub fn to_value(&self) -> Value {
        match self {
            Instance::Object(obj) => obj.to_value(),
            Instance::Array(items) => Value::Array(items.iter().map(Instance::to_value).collect()),
            Instance::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Instance::Union(union) => union.value.to_value(),
            Instance::Value(value) => value.clone(),
        }
    }

    /// The object inside, looking through union wrappers.
    pub fn as_object(&self) -> Option<&ObjectInstance> {
        match self {
            Instance::Object(obj) => Some(obj),
            Instance::Union(union) => union.value.as_object(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Instance]> {
        match self {
            Instance::Array(items) => Some(items),
            Instance::Union(union) => union.value.as_array(),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Instance::Value(value) => Some(value),
            Instance::Union(union) => union.value.as_value(),
            _ => None,
        }
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// The value of a union together with the alternative that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionInstance {
    /// Name of the union type, when it is named.
    pub type_name: Option<String>,
    /// Index of the winning alternative; `None` when none accepted the value.
    pub alternative: Option<usize>,
    pub value: Box<Instance>,
}

/// An instance of a named object type.
#[derive(Clone)]
pub struct ObjectInstance {
    graph: Arc<TypeGraph>,
    ty: TypeId,
    fields: IndexMap<String, Instance>,
    extra: IndexMap<String, Instance>,
}

impl ObjectInstance {
    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    pub fn type_name(&self) -> &str {
        self.graph.name(self.ty).unwrap_or("object")
    }

    fn object_type(&self) -> Option<&ObjectType> {
        match self.graph.descriptor(self.ty) {
            TypeDescriptor::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Look up a present value by schema name, field identifier, or extra key.
    pub fn get(&self, key: &str) -> Option<&Instance> {
        self.field(key).or_else(|| self.extra.get(key))
    }

    /// A declared field's value, by schema name or identifier.
    pub fn field(&self, name: &str) -> Option<&Instance> {
        if let Some(value) = self.fields.get(name) {
            return Some(value);
        }
        let declared = self.object_type()?.field_for_key(name)?;
        self.fields.get(&declared.name)
    }

    /// Keys the schema does not declare.
    pub fn extra(&self) -> &IndexMap<String, Instance> {
        &self.extra
    }

    pub fn additional_properties(&self) -> AdditionalProperties {
        self.object_type()
            .map_or(AdditionalProperties::Any, |obj| obj.additional)
    }

    /// Present declared fields, then extras.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.fields
            .iter()
            .chain(&self.extra)
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The schema `default` of a declared field. Absent fields are never
    /// filled in from it.
    pub fn default_of(&self, name: &str) -> Option<&Value> {
        self.object_type()?
            .field_for_key(name)?
            .default
            .as_ref()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.properties()
                .map(|(k, v)| (k.to_string(), v.to_value()))
                .collect(),
        )
    }
}

impl PartialEq for ObjectInstance {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.fields == other.fields && self.extra == other.extra
    }
}

impl fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.type_name())?;
        f.debug_map().entries(self.properties()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeGraphBuilder;
    use crate::schema::{Dialect, SchemaSource};
    use serde_json::json;

    fn runtime(doc: Value) -> RuntimeTypes {
        let graph =
            TypeGraphBuilder::build_source(&SchemaSource::new(Dialect::JsonSchema, doc)).unwrap();
        RuntimeTypeEmitter::emit(Arc::new(graph))
    }

    fn pets() -> RuntimeTypes {
        runtime(json!({
            "definitions": {
                "Owner": {
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "$id": { "type": "string" }
                    },
                    "additionalProperties": false
                },
                "Pet": {
                    "required": ["name", "owner"],
                    "properties": {
                        "name": { "type": "string" },
                        "owner": { "$ref": "#/definitions/Owner" },
                        "tags": { "type": "array", "items": { "type": "string" } },
                        "status": { "enum": ["available", "sold"], "default": "available" }
                    }
                }
            }
        }))
    }

    #[test]
    fn registry_lists_named_types() {
        let types = pets();
        assert_eq!(types.names().collect::<Vec<_>>(), ["Owner", "Pet", "Status"]);
        let pet = types.get("Pet").unwrap();
        assert_eq!(pet.kind(), "object");
        let fields: Vec<_> = pet.fields().iter().map(|f| (f.name.as_str(), f.required)).collect();
        assert_eq!(
            fields,
            [("name", true), ("owner", true), ("tags", false), ("status", false)]
        );
        assert!(types.get("Missing").is_none());
    }

    #[test]
    fn constructs_nested_objects() {
        let types = pets();
        let pet = types
            .construct(
                "Pet",
                &json!({ "name": "Rex", "owner": { "name": "Ann" }, "tags": ["good"], "chip": 42 }),
            )
            .unwrap();
        let pet = pet.as_object().unwrap();
        assert_eq!(pet.type_name(), "Pet");
        assert_eq!(pet.get("name").unwrap().as_value(), Some(&json!("Rex")));

        let owner = pet.get("owner").unwrap().as_object().unwrap();
        assert_eq!(owner.type_name(), "Owner");
        assert_eq!(pet.get("tags").unwrap().as_array().unwrap().len(), 1);

        // Optional absent fields stay absent; defaults are available but not applied.
        assert!(!pet.contains("status"));
        assert_eq!(pet.default_of("status"), Some(&json!("available")));

        // Undeclared keys are preserved.
        assert_eq!(pet.extra().get("chip").unwrap().as_value(), Some(&json!(42)));
        assert_eq!(
            pet.properties().map(|(k, _)| k).collect::<Vec<_>>(),
            ["name", "owner", "tags", "chip"]
        );
    }

    #[test]
    fn to_value_round_trips_input() {
        let types = pets();
        let input = json!({ "name": "Rex", "owner": { "name": "Ann" }, "status": "sold", "x": [1] });
        assert_eq!(types.construct("Pet", &input).unwrap().to_value(), input);
    }

    #[test]
    fn identifiers_are_accepted_as_keys() {
        let types = pets();
        let owner = types
            .construct("Owner", &json!({ "name": "Ann", "dollar_id": "u-1" }))
            .unwrap();
        let owner = owner.as_object().unwrap();
        assert_eq!(owner.field("$id").unwrap().as_value(), Some(&json!("u-1")));
        assert_eq!(owner.field("dollar_id").unwrap().as_value(), Some(&json!("u-1")));
        assert!(owner.extra().is_empty());
    }

    #[test]
    fn schema_names_win_over_identifiers() {
        let types = runtime(json!({
            "definitions": {
                "T": {
                    "properties": {
                        "a-b": { "type": "string" },
                        "a_b": { "type": "integer" }
                    }
                }
            }
        }));
        let t = types.get("T").unwrap();
        assert_eq!(
            t.fields().iter().map(|f| f.ident.as_str()).collect::<Vec<_>>(),
            ["a_b", "a_b_2"]
        );

        let input = json!({ "a_b": 5 });
        let instance = t.construct(&input).unwrap();
        assert_eq!(instance.to_value(), input);
        let obj = instance.as_object().unwrap();
        assert!(obj.field("a-b").is_none());
        assert_eq!(obj.field("a_b").unwrap().as_value(), Some(&json!(5)));
        assert_eq!(obj.field("a_b_2").unwrap().as_value(), Some(&json!(5)));

        // Identifier keys are stored under the schema name.
        let both = t.construct(&json!({ "a-b": "x", "a_b_2": 7 })).unwrap();
        assert_eq!(both.to_value(), json!({ "a-b": "x", "a_b": 7 }));
    }

    #[test]
    fn missing_required_field_reports_location() {
        let types = pets();
        let err = types
            .construct("Pet", &json!({ "name": "Rex", "owner": {} }))
            .unwrap_err();
        match err {
            Error::MissingField { type_name, field, location } => {
                assert_eq!(type_name, "Owner");
                assert_eq!(field, "name");
                assert_eq!(location, "$.owner");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn closed_objects_reject_extra_keys() {
        let types = pets();
        let err = types
            .construct("Owner", &json!({ "name": "Ann", "age": 3 }))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedProperty { ref property, .. } if property == "age"));
        assert_eq!(
            types.get("Owner").unwrap().construct(&json!({ "name": "Ann" })).unwrap().to_value(),
            json!({ "name": "Ann" })
        );
    }

    #[test]
    fn wrong_shape_is_an_error() {
        let types = pets();
        let err = types
            .construct("Pet", &json!({ "name": "Rex", "owner": "Ann" }))
            .unwrap_err();
        match err {
            Error::UnexpectedShape { expected, found, location } => {
                assert_eq!(expected, "object Owner");
                assert_eq!(found, "string");
                assert_eq!(location, "$.owner");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(types.construct("Pet", &json!([1, 2])).is_err());
    }

    #[test]
    fn nulls_pass_through() {
        let types = pets();
        let pet = types
            .construct("Pet", &json!({ "name": "Rex", "owner": null, "tags": null }))
            .unwrap();
        let pet = pet.as_object().unwrap();
        assert_eq!(pet.get("owner"), Some(&Instance::Value(Value::Null)));
    }

    #[test]
    fn typed_additional_properties_are_constructed() {
        let types = runtime(json!({
            "definitions": {
                "Point": { "required": ["x"], "properties": { "x": { "type": "number" } } },
                "Layer": {
                    "properties": { "name": { "type": "string" } },
                    "additionalProperties": { "$ref": "#/definitions/Point" }
                }
            }
        }));
        let layer = types
            .construct("Layer", &json!({ "name": "top", "a": { "x": 1 } }))
            .unwrap();
        let layer = layer.as_object().unwrap();
        assert_eq!(layer.extra()["a"].as_object().unwrap().type_name(), "Point");

        let err = types
            .construct("Layer", &json!({ "name": "top", "b": {} }))
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { ref location, .. } if location == "$.b"));
    }

    #[test]
    fn unions_pick_first_accepting_alternative() {
        let types = runtime(json!({
            "definitions": {
                "Circle": { "required": ["radius"], "properties": { "radius": { "type": "number" } } },
                "Square": { "required": ["side"], "properties": { "side": { "type": "number" } } },
                "Shape": {
                    "oneOf": [{ "$ref": "#/definitions/Circle" }, { "$ref": "#/definitions/Square" }]
                },
                "Drawing": {
                    "properties": { "shapes": { "type": "array", "items": { "$ref": "#/definitions/Shape" } } }
                }
            }
        }));
        let drawing = types
            .construct(
                "Drawing",
                &json!({ "shapes": [{ "side": 2 }, { "radius": 1 }, "dot"] }),
            )
            .unwrap();
        let shapes = drawing.as_object().unwrap().get("shapes").unwrap().as_array().unwrap();

        let Instance::Union(first) = &shapes[0] else {
            panic!("expected union instance");
        };
        assert_eq!(first.type_name.as_deref(), Some("Shape"));
        assert_eq!(first.alternative, Some(1));
        assert_eq!(shapes[0].as_object().unwrap().type_name(), "Square");

        assert_eq!(shapes[1].as_object().unwrap().type_name(), "Circle");

        let Instance::Union(raw) = &shapes[2] else {
            panic!("expected union instance");
        };
        assert_eq!(raw.alternative, None);
        assert_eq!(shapes[2].as_value(), Some(&json!("dot")));
    }

    #[test]
    fn recursive_types_construct_to_any_depth() {
        let types = runtime(json!({
            "definitions": {
                "Tree": {
                    "properties": {
                        "value": { "type": "integer" },
                        "children": { "type": "array", "items": { "$ref": "#/definitions/Tree" } }
                    }
                }
            }
        }));
        let input = json!({ "value": 1, "children": [{ "value": 2, "children": [{ "value": 3 }] }] });
        let tree = types.construct("Tree", &input).unwrap();
        let child = &tree.as_object().unwrap().get("children").unwrap().as_array().unwrap()[0];
        let grandchild = &child.as_object().unwrap().get("children").unwrap().as_array().unwrap()[0];
        assert_eq!(grandchild.as_object().unwrap().type_name(), "Tree");
        assert_eq!(tree.to_value(), input);
    }

    #[test]
    fn construct_by_definition_name() {
        let types = runtime(json!({
            "definitions": {
                "Names": { "type": "array", "items": { "type": "string" } }
            }
        }));
        assert!(types.get("Names").is_none());
        let names = types.construct_definition("Names", &json!(["a", "b"])).unwrap();
        assert_eq!(names.as_array().unwrap().len(), 2);
        assert!(matches!(
            types.construct_definition("Nope", &json!(1)),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn manifest_round_trip() {
        let types = pets();
        let manifest = types.to_manifest().unwrap();
        let restored = RuntimeTypes::from_manifest(&manifest).unwrap();
        assert_eq!(restored.graph().as_ref(), types.graph().as_ref());
        assert_eq!(
            restored.names().collect::<Vec<_>>(),
            types.names().collect::<Vec<_>>()
        );
        let input = json!({ "name": "Rex", "owner": { "name": "Ann" } });
        assert_eq!(
            restored.construct("Pet", &input).unwrap(),
            types.construct("Pet", &input).unwrap()
        );
    }

    #[test]
    fn manifest_with_dangling_ids_is_rejected() {
        let mut manifest: Value = serde_json::from_str(&pets().to_manifest().unwrap()).unwrap();
        manifest["roots"] = json!([999]);
        let err = RuntimeTypes::from_manifest(&manifest.to_string()).unwrap_err();
        assert!(err.to_string().contains("t999"));
    }

    #[test]
    fn unknown_type_name() {
        let err = pets().construct("Cat", &json!({})).unwrap_err();
        assert!(matches!(err, Error::UnknownType(ref name) if name == "Cat"));
    }
}
