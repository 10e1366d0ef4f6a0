//! Static type stubs (`.pyi`) for the named types of a [`TypeGraph`].
//!
//! The stub module mirrors what the runtime registry constructs: one class
//! per named object, one alias per named union or enum, in the graph's
//! naming order. Rendering is deterministic, so identical graphs produce
//! byte-identical stubs.

use std::fmt::Write;

use serde_json::Value;

use crate::graph::{AdditionalProperties, PrimitiveType, TypeDescriptor, TypeGraph, TypeId};

const PRELUDE: &str = "\
from __future__ import annotations
from typing import Any, Dict, List, Literal, Optional, Union

class SchemaBasedObject(object):
    def __init__(self, **properties: Any) -> None: ...
    def as_simple_dict(self) -> Dict[str, Any]: ...
    def get_all_properties(self) -> Dict[str, Any]: ...
    def get_additional_properties(self) -> Dict[str, Any]: ...
";

/// The declarations of one stub module.
#[derive(Debug, Clone, PartialEq)]
pub struct StubModule {
    pub declarations: Vec<StubDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StubDeclaration {
    Class(StubClass),
    Alias(StubAlias),
}

impl StubDeclaration {
    pub fn name(&self) -> &str {
        match self {
            StubDeclaration::Class(class) => &class.name,
            StubDeclaration::Alias(alias) => &alias.name,
        }
    }
}

/// `class Name(SchemaBasedObject)` for a named object.
#[derive(Debug, Clone, PartialEq)]
pub struct StubClass {
    pub name: String,
    pub doc: Option<String>,
    pub fields: Vec<StubField>,
    /// Whether `__init__` takes `**kwargs`.
    pub accepts_extra: bool,
    /// Return annotation of `__getitem__`; `None` when extra keys are forbidden.
    pub item_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StubField {
    pub ident: String,
    pub schema_name: String,
    /// Annotation without the `Optional[...]` wrapper.
    pub annotation: String,
    pub required: bool,
}

impl StubField {
    pub fn declared_annotation(&self) -> String {
        if self.required {
            self.annotation.clone()
        } else {
            format!("Optional[{}]", self.annotation)
        }
    }
}

/// `Name = ...` for a named union or enum.
#[derive(Debug, Clone, PartialEq)]
pub struct StubAlias {
    pub name: String,
    pub target: String,
}

pub struct StaticStubEmitter;

impl StaticStubEmitter {
    pub fn emit(graph: &TypeGraph) -> StubModule {
        let declarations = graph
            .named_types()
            .filter_map(|(id, name)| declaration(graph, id, name))
            .collect();
        StubModule { declarations }
    }
}

fn declaration(graph: &TypeGraph, id: TypeId, name: &str) -> Option<StubDeclaration> {
    let node = graph.node(id);
    match &node.descriptor {
        TypeDescriptor::Object(obj) => {
            let fields = obj
                .fields
                .iter()
                .map(|field| StubField {
                    ident: field.ident.clone(),
                    schema_name: field.name.clone(),
                    annotation: annotation(graph, field.ty),
                    required: field.required,
                })
                .collect();
            let item_annotation = match obj.additional {
                AdditionalProperties::Forbidden => None,
                AdditionalProperties::Any => Some("Any".to_string()),
                AdditionalProperties::Typed(ty) => Some(annotation(graph, ty)),
            };
            Some(StubDeclaration::Class(StubClass {
                name: name.to_string(),
                doc: node.description.clone().or_else(|| node.title.clone()),
                fields,
                accepts_extra: obj.additional != AdditionalProperties::Forbidden,
                item_annotation,
            }))
        }
        TypeDescriptor::Union(union) => {
            let mut members: Vec<String> = Vec::new();
            for alternative in &union.alternatives {
                let rendered = annotation(graph, *alternative);
                if !members.contains(&rendered) {
                    members.push(rendered);
                }
            }
            let target = if members.iter().any(|m| m == "Any") {
                "Any".to_string()
            } else if let [single] = members.as_slice() {
                single.clone()
            } else {
                format!("Union[{}]", members.join(", "))
            };
            Some(StubDeclaration::Alias(StubAlias {
                name: name.to_string(),
                target,
            }))
        }
        TypeDescriptor::Enum(e) => {
            let literals: Option<Vec<String>> = e.values.iter().map(literal).collect();
            let target = match literals {
                Some(literals) if !literals.is_empty() => {
                    format!("Literal[{}]", literals.join(", "))
                }
                _ => "Any".to_string(),
            };
            Some(StubDeclaration::Alias(StubAlias {
                name: name.to_string(),
                target,
            }))
        }
        _ => None,
    }
}

/// Python annotation for a field, element or alternative type.
pub fn annotation(graph: &TypeGraph, id: TypeId) -> String {
    let id = graph.follow(id);
    if let Some(name) = graph.name(id) {
        return name.to_string();
    }
    match graph.descriptor(id) {
        TypeDescriptor::Array(arr) => format!("List[{}]", annotation(graph, arr.items)),
        TypeDescriptor::Map(map) => match map.values {
            Some(values) => format!("Dict[str, {}]", annotation(graph, values)),
            None => "Dict[str, Any]".to_string(),
        },
        TypeDescriptor::Object(_) => "Dict[str, Any]".to_string(),
        TypeDescriptor::Primitive(primitive) => match primitive {
            PrimitiveType::String => "str",
            PrimitiveType::Integer => "int",
            PrimitiveType::Number => "float",
            PrimitiveType::Boolean => "bool",
            PrimitiveType::Null => "None",
            PrimitiveType::Any => "Any",
        }
        .to_string(),
        TypeDescriptor::Union(union) => {
            let members: Vec<String> = union
                .alternatives
                .iter()
                .map(|alt| annotation(graph, *alt))
                .collect();
            format!("Union[{}]", members.join(", "))
        }
        TypeDescriptor::Enum(_) | TypeDescriptor::Reference(_) | TypeDescriptor::Unresolved(_) => {
            "Any".to_string()
        }
    }
}

/// A `Literal[...]` member, when the value has a Python literal form.
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => serde_json::to_string(value).ok(),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Null => Some("None".to_string()),
        _ => None,
    }
}

impl StubModule {
    pub fn get(&self, name: &str) -> Option<&StubDeclaration> {
        self.declarations.iter().find(|d| d.name() == name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &StubClass> {
        self.declarations.iter().filter_map(|d| match d {
            StubDeclaration::Class(class) => Some(class),
            StubDeclaration::Alias(_) => None,
        })
    }

    /// Render the `.pyi` text. `source_label` names the schema in the header.
    pub fn render(&self, source_label: &str) -> String {
        let mut out = String::new();
        writeln!(out, "# Generated by schema-typegen from {source_label}. Do not edit.").unwrap();
        out.push_str(PRELUDE);

        for declaration in &self.declarations {
            writeln!(out).unwrap();
            match declaration {
                StubDeclaration::Class(class) => render_class(&mut out, class),
                StubDeclaration::Alias(alias) => {
                    writeln!(out, "{} = {}", alias.name, alias.target).unwrap();
                }
            }
        }
        out
    }
}

fn render_class(out: &mut String, class: &StubClass) {
    writeln!(out, "class {}(SchemaBasedObject):", class.name).unwrap();
    if let Some(doc) = &class.doc {
        writeln!(out, "    \"\"\"{}\"\"\"", doc_text(doc)).unwrap();
    }
    for field in &class.fields {
        writeln!(out, "    {}: {} = ...", field.ident, field.declared_annotation()).unwrap();
    }
    if !class.fields.is_empty() || class.doc.is_some() {
        writeln!(out).unwrap();
    }

    // Required parameters first, each group in declaration order.
    let mut parameters = vec!["self".to_string()];
    let (required, optional): (Vec<&StubField>, Vec<&StubField>) =
        class.fields.iter().partition(|f| f.required);
    parameters.extend(
        required
            .iter()
            .map(|f| format!("{}: {}", f.ident, f.annotation)),
    );
    parameters.extend(
        optional
            .iter()
            .map(|f| format!("{}: {} = None", f.ident, f.declared_annotation())),
    );
    if class.accepts_extra {
        parameters.push("**kwargs: Any".to_string());
    }
    writeln!(out, "    def __init__({}) -> None: ...", parameters.join(", ")).unwrap();

    if let Some(item) = &class.item_annotation {
        writeln!(out, "    def __getitem__(self, item: str) -> {item}: ...").unwrap();
    }
}

/// Keep a description on one docstring line without closing it early.
fn doc_text(doc: &str) -> String {
    doc.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\\', "\\\\")
        .replace("\"\"\"", "\\\"\\\"\\\"")
}
