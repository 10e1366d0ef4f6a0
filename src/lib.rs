//! Generate runtime types and static type stubs from JSON Schema and OpenAPI.
//!
//! `schema-typegen` resolves a JSON Schema or OpenAPI 3.x document into a
//! single [`graph::TypeGraph`] and emits two views of it that always agree:
//!
//! - a runtime registry ([`runtime::RuntimeTypes`]) that constructs typed
//!   instances from decoded JSON, persisted as a JSON manifest
//! - a static `.pyi` stub module ([`stubs::StubModule`]) for type checkers
//!
//! # Features
//!
//! - `$ref` resolution across documents, with every pointer resolved once
//! - Recursive schemas via explicit back-edges; traversal always terminates
//! - `allOf` merging, `anyOf`/`oneOf` unions, nullable type lists, enums
//! - Deterministic, collision-free type names
//! - Unsupported keywords are recorded and passed through, or fatal in
//!   strict mode
//! - Deterministic output: byte-identical across runs
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use schema_typegen::codegen::{self, GenerateOptions};
//! use schema_typegen::schema::{Dialect, load_schema};
//!
//! let source = load_schema(Path::new("petstore.yaml"), Dialect::OpenApi)?;
//! let stats = codegen::generate(&source, &GenerateOptions::new("out/", "petstore"))?;
//! eprintln!("Generated {} classes, {} unions", stats.objects_generated, stats.unions_generated);
//!
//! let generation = codegen::build(&source)?;
//! let pet = generation
//!     .runtime
//!     .construct("Pet", &serde_json::json!({ "id": 1, "name": "Rex" }))?;
//! # Ok::<(), schema_typegen::error::Error>(())
//! ```

pub mod builder;
pub mod codegen;
pub mod compose;
pub mod document;
pub mod error;
pub mod graph;
pub mod naming;
pub mod resolver;
pub mod runtime;
pub mod schema;
pub mod stubs;

pub use builder::TypeGraphBuilder;
pub use error::{Error, Result};
pub use graph::{TypeDescriptor, TypeGraph, TypeId};
pub use runtime::{Instance, RuntimeTypeEmitter, RuntimeTypes};
pub use schema::{Dialect, SchemaSource};
pub use stubs::{StaticStubEmitter, StubModule};
