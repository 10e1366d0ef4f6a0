//! End-to-end integration tests for schema-typegen.
//!
//! These tests use small embedded schemas to verify the complete pipeline:
//! schema loading → type graph → stubs + runtime manifest → construction.

use std::path::Path;

use serde_json::{Value, json};

use schema_typegen::codegen::{self, GenerateOptions};
use schema_typegen::error::Error;
use schema_typegen::runtime::{Instance, RuntimeTypes};
use schema_typegen::schema::{Dialect, SchemaSource, load_schema};
use schema_typegen::stubs::StubDeclaration;
use schema_typegen::{TypeDescriptor, TypeGraphBuilder};

const PETSTORE: &str = r##"
openapi: "3.0.3"
info:
  title: Pet store
  version: "1.0"
paths:
  /pets:
    get:
      responses:
        200:
          description: A list of pets.
components:
  schemas:
    Pet:
      type: object
      required: [id, name]
      properties:
        id:
          type: integer
        name:
          type: string
        tag:
          type: [string, "null"]
        owner:
          $ref: "common/people.yaml#/definitions/Person"
        status:
          type: string
          enum: [available, pending, sold]
    NewPet:
      allOf:
        - $ref: "#/components/schemas/Pet"
        - type: object
          required: [owner]
          properties:
            notes:
              type: string
    Pets:
      type: array
      items:
        $ref: "#/components/schemas/Pet"
    Error:
      type: object
      required: [code]
      properties:
        code:
          type: integer
        message:
          type: string
      additionalProperties: false
"##;

const PEOPLE: &str = r##"
definitions:
  Person:
    type: object
    required: [name]
    properties:
      name:
        type: string
      address:
        $ref: "#/definitions/Address"
  Address:
    type: object
    properties:
      street:
        type: string
      city:
        type: string
"##;

fn write_petstore(dir: &Path) -> std::path::PathBuf {
    std::fs::create_dir_all(dir.join("common")).unwrap();
    std::fs::write(dir.join("common/people.yaml"), PEOPLE).unwrap();
    let path = dir.join("petstore.yaml");
    std::fs::write(&path, PETSTORE).unwrap();
    path
}

fn petstore() -> SchemaSource {
    let dir = tempfile::tempdir().unwrap();
    let path = write_petstore(dir.path());
    load_schema(&path, Dialect::OpenApi).unwrap()
}

fn json_schema(doc: Value) -> SchemaSource {
    SchemaSource::new(Dialect::JsonSchema, doc)
}

#[test]
fn end_to_end_generate_from_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_petstore(dir.path());
    let source = load_schema(&path, Dialect::OpenApi).unwrap();
    assert_eq!(source.documents().len(), 2);

    let options = GenerateOptions::new(dir.path().join("generated"), "petstore");
    let stats = codegen::generate(&source, &options).unwrap();
    assert_eq!(stats.objects_generated, 5);
    assert_eq!(stats.enums_generated, 1);
    assert_eq!(stats.unsupported_keywords, 0);

    let stub = std::fs::read_to_string(options.stub_path()).unwrap();
    assert!(stub.starts_with("# Generated by schema-typegen from petstore.yaml."));
    assert!(stub.contains("class Pet(SchemaBasedObject):"));
    assert!(stub.contains("    tag: Optional[str] = ...\n"));
    assert!(stub.contains("    owner: Optional[Person] = ...\n"));
    assert!(stub.contains("Status = Literal[\"available\", \"pending\", \"sold\"]"));
    assert!(stub.contains("class Address(SchemaBasedObject):"));

    let manifest = std::fs::read_to_string(options.manifest_path()).unwrap();
    let types = RuntimeTypes::from_manifest(&manifest).unwrap();
    assert_eq!(
        types.names().collect::<Vec<_>>(),
        ["Pet", "NewPet", "Error", "Person", "Status", "Address"]
    );
}

#[test]
fn deterministic_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_petstore(dir.path());

    let mut outputs = Vec::new();
    for run in ["a", "b"] {
        let source = load_schema(&path, Dialect::OpenApi).unwrap();
        let options = GenerateOptions::new(dir.path().join(run), "petstore");
        codegen::generate(&source, &options).unwrap();
        outputs.push((
            std::fs::read(options.stub_path()).unwrap(),
            std::fs::read(options.manifest_path()).unwrap(),
        ));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn refuses_to_overwrite_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = petstore();
    let mut options = GenerateOptions::new(dir.path(), "petstore");
    codegen::generate(&source, &options).unwrap();

    let err = codegen::generate(&source, &options).unwrap_err();
    assert!(matches!(err, Error::OutputExists { .. }), "{err}");
    assert!(err.to_string().contains("--force"));

    options.force = true;
    codegen::generate(&source, &options).unwrap();
}

#[test]
fn references_to_one_pointer_resolve_once() {
    let generation = codegen::build(&petstore()).unwrap();
    let graph = &generation.graph;
    let pet = graph.definition("Pet").unwrap();

    let TypeDescriptor::Array(pets) = graph.descriptor(graph.definition("Pets").unwrap()) else {
        panic!("Pets should be an array");
    };
    assert_eq!(pets.items, pet);

    // The same external pointer reached from two documents is one type.
    let person = graph.by_name("Person").unwrap();
    let TypeDescriptor::Object(pet_obj) = graph.descriptor(pet) else {
        panic!("Pet should be an object");
    };
    assert_eq!(pet_obj.field("owner").unwrap().ty, person);
}

#[test]
fn recursive_schemas_terminate_and_construct() {
    let source = json_schema(json!({
        "definitions": {
            "Node": {
                "type": "object",
                "required": ["value"],
                "properties": {
                    "value": { "type": "integer" },
                    "next": { "$ref": "#/definitions/Node" }
                }
            }
        }
    }));
    let generation = codegen::build(&source).unwrap();
    assert_eq!(generation.stats().recursive_references, 1);

    let mut input = json!({ "value": 0 });
    for value in 1..50 {
        input = json!({ "value": value, "next": input });
    }
    let list = generation.runtime.construct("Node", &input).unwrap();

    let mut depth = 0;
    let mut current = list.as_object();
    while let Some(node) = current {
        assert_eq!(node.type_name(), "Node");
        depth += 1;
        current = node.get("next").and_then(Instance::as_object);
    }
    assert_eq!(depth, 50);

    let stub = generation.stubs.render("list.json");
    assert!(stub.contains("    next: Optional[Node] = ...\n"));
}

#[test]
fn stubs_and_runtime_agree() {
    let generation = codegen::build(&petstore()).unwrap();
    let runtime = &generation.runtime;

    let stub_names: Vec<&str> = generation
        .stubs
        .declarations
        .iter()
        .map(StubDeclaration::name)
        .collect();
    assert_eq!(stub_names, runtime.names().collect::<Vec<_>>());

    for class in generation.stubs.classes() {
        let constructor = runtime.get(&class.name).unwrap();
        assert_eq!(constructor.kind(), "object");
        let runtime_fields: Vec<_> = constructor
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), f.ident.as_str(), f.required))
            .collect();
        let stub_fields: Vec<_> = class
            .fields
            .iter()
            .map(|f| (f.schema_name.as_str(), f.ident.as_str(), f.required))
            .collect();
        assert_eq!(runtime_fields, stub_fields, "{}", class.name);
    }
}

#[test]
fn all_of_merges_fields_and_required_sets() {
    let generation = codegen::build(&petstore()).unwrap();
    let new_pet = generation.runtime.get("NewPet").unwrap();
    let fields: Vec<_> = new_pet
        .fields()
        .iter()
        .map(|f| (f.name.as_str(), f.required))
        .collect();
    assert_eq!(
        fields,
        [
            ("id", true),
            ("name", true),
            ("tag", false),
            ("owner", true),
            ("status", false),
            ("notes", false),
        ]
    );

    let err = new_pet
        .construct(&json!({ "id": 1, "name": "Rex" }))
        .unwrap_err();
    assert!(matches!(err, Error::MissingField { ref field, .. } if field == "owner"));

    let pet = new_pet
        .construct(&json!({ "id": 1, "name": "Rex", "owner": { "name": "Ann" }, "notes": "good" }))
        .unwrap();
    let pet = pet.as_object().unwrap();
    assert_eq!(pet.get("owner").unwrap().as_object().unwrap().type_name(), "Person");
}

#[test]
fn all_of_conflicts_are_reported() {
    let source = json_schema(json!({
        "definitions": {
            "A": { "properties": { "size": { "type": "string" } } },
            "B": { "properties": { "size": { "type": "array", "items": {} } } },
            "AB": { "allOf": [{ "$ref": "#/definitions/A" }, { "$ref": "#/definitions/B" }] }
        }
    }));
    let err = codegen::build(&source).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("'size'"), "{message}");
    assert!(message.contains("#/definitions/AB/allOf/0"), "{message}");
    assert!(message.contains("#/definitions/AB/allOf/1"), "{message}");
}

#[test]
fn one_of_and_any_of_construct_matching_alternative() {
    let source = json_schema(json!({
        "definitions": {
            "Email": {
                "type": "object",
                "required": ["address"],
                "properties": { "address": { "type": "string" } }
            },
            "Phone": {
                "type": "object",
                "required": ["number"],
                "properties": { "number": { "type": "string" } }
            },
            "Contact": {
                "oneOf": [{ "$ref": "#/definitions/Email" }, { "$ref": "#/definitions/Phone" }]
            },
            "Id": { "anyOf": [{ "type": "integer" }, { "type": "string" }] },
            "Card": {
                "type": "object",
                "properties": {
                    "contacts": { "type": "array", "items": { "$ref": "#/definitions/Contact" } },
                    "id": { "$ref": "#/definitions/Id" }
                }
            }
        }
    }));
    let generation = codegen::build(&source).unwrap();
    let card = generation
        .runtime
        .construct(
            "Card",
            &json!({ "contacts": [{ "number": "555" }, { "address": "a@b.c" }], "id": "x-1" }),
        )
        .unwrap();
    let card = card.as_object().unwrap();

    let contacts = card.get("contacts").unwrap().as_array().unwrap();
    assert_eq!(contacts[0].as_object().unwrap().type_name(), "Phone");
    assert_eq!(contacts[1].as_object().unwrap().type_name(), "Email");

    let Instance::Union(id) = card.get("id").unwrap() else {
        panic!("id should be a union instance");
    };
    assert_eq!(id.alternative, Some(1));

    let stub = generation.stubs.render("contacts.json");
    assert!(stub.contains("Contact = Union[Email, Phone]"));
    assert!(stub.contains("Id = Union[int, str]"));
}

#[test]
fn required_fields_are_enforced() {
    let generation = codegen::build(&petstore()).unwrap();
    let err = generation
        .runtime
        .construct("Pet", &json!({ "name": "Rex" }))
        .unwrap_err();
    match err {
        Error::MissingField {
            type_name,
            field,
            location,
        } => {
            assert_eq!(type_name, "Pet");
            assert_eq!(field, "id");
            assert_eq!(location, "$");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = generation
        .runtime
        .construct("Pet", &json!({ "id": 1, "name": "Rex", "owner": { "address": {} } }))
        .unwrap_err();
    assert!(err.to_string().starts_with("$.owner: missing required field 'name'"));

    let err = generation
        .runtime
        .construct("Error", &json!({ "code": 404, "detail": "nope" }))
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedProperty { ref property, .. } if property == "detail"));
}

#[test]
fn naming_collisions_are_suffixed_and_recorded() {
    let source = json_schema(json!({
        "definitions": {
            "Item": { "properties": { "sku": { "type": "string" } } },
            "Order": {
                "properties": {
                    "item": { "properties": { "quantity": { "type": "integer" } } }
                }
            },
            "Cart": {
                "properties": {
                    "item": { "properties": { "price": { "type": "number" } } }
                }
            }
        }
    }));
    let generation = codegen::build(&source).unwrap();
    let names: Vec<_> = generation.runtime.names().collect();
    assert_eq!(names, ["Item", "Order", "Cart", "Item2", "Item3"]);

    let collisions = generation.graph.collisions();
    assert_eq!(collisions.len(), 2);
    assert_eq!(
        collisions[1].pointer.as_str(),
        "#/definitions/Cart/properties/item"
    );
    assert_eq!(generation.stats().name_collisions, 2);

    let stub = generation.stubs.render("shop.json");
    assert!(stub.contains("class Item3(SchemaBasedObject):"));
    assert!(stub.contains("    item: Optional[Item3] = ..."));
}

#[test]
fn unresolved_reference_is_fatal_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = json_schema(json!({
        "properties": { "owner": { "$ref": "people.json#/definitions/Person" } }
    }));
    let options = GenerateOptions::new(dir.path(), "broken");
    let err = codegen::generate(&source, &options).unwrap_err();
    assert!(matches!(err, Error::UnresolvedReference { .. }), "{err}");
    assert!(!options.stub_path().exists());
    assert!(!options.manifest_path().exists());
}

#[test]
fn unsupported_keywords_pass_through_unless_strict() {
    let source = json_schema(json!({
        "definitions": {
            "Config": {
                "properties": {
                    "mode": { "not": { "type": "null" } },
                    "name": { "type": "string" }
                }
            }
        }
    }));
    let graph = TypeGraphBuilder::build_source(&source).unwrap();
    assert_eq!(graph.unsupported().len(), 1);

    let generation = codegen::build(&source).unwrap();
    let config = generation
        .runtime
        .construct("Config", &json!({ "mode": [1, 2], "name": "x" }))
        .unwrap();
    assert_eq!(
        config.as_object().unwrap().get("mode").unwrap().as_value(),
        Some(&json!([1, 2]))
    );

    let dir = tempfile::tempdir().unwrap();
    let mut options = GenerateOptions::new(dir.path(), "config");
    options.strict = true;
    let err = codegen::generate(&source, &options).unwrap_err();
    assert!(matches!(err, Error::UnsupportedKeyword { .. }), "{err}");
}

#[test]
fn json_schema_root_and_defs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&json!({
            "title": "Service config",
            "type": "object",
            "properties": {
                "listen": { "$ref": "#/$defs/Endpoint" },
                "upstreams": { "type": "array", "items": { "$ref": "#/$defs/Endpoint" } }
            },
            "$defs": {
                "Endpoint": {
                    "type": "object",
                    "required": ["port"],
                    "properties": { "host": { "type": "string" }, "port": { "type": "integer" } }
                }
            }
        }))
        .unwrap(),
    )
    .unwrap();

    let source = load_schema(&path, Dialect::JsonSchema).unwrap();
    let generation = codegen::build(&source).unwrap();
    assert_eq!(
        generation.runtime.names().collect::<Vec<_>>(),
        ["ServiceConfig", "Endpoint"]
    );
    let root = generation
        .runtime
        .construct_definition(
            "Root",
            &json!({ "listen": { "port": 80 }, "upstreams": [{ "host": "a", "port": 81 }] }),
        )
        .unwrap();
    assert_eq!(root.as_object().unwrap().type_name(), "ServiceConfig");
}

#[test]
fn openapi_requires_version_3() {
    let source = SchemaSource::new(
        Dialect::OpenApi,
        json!({ "swagger": "2.0", "definitions": {} }),
    );
    assert!(matches!(codegen::build(&source), Err(Error::Document(_))));
}
