//! Generation pipeline: schema source → type graph → stubs + runtime manifest.
//!
//! Both artifacts are rendered from one shared [`TypeGraph`]:
//! - `<package>.pyi`: static stubs for every named type
//! - `<package>.json`: the runtime manifest (the serialized graph), loadable
//!   with [`RuntimeTypes::from_manifest`]
//!
//! Everything is built in memory first. A fatal resolution error therefore
//! aborts the run before anything is written, and the two files are written
//! together or not at all.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::TypeGraphBuilder;
use crate::error::{Error, Result};
use crate::graph::{TypeDescriptor, TypeGraph};
use crate::runtime::{RuntimeTypeEmitter, RuntimeTypes};
use crate::schema::SchemaSource;
use crate::stubs::{StaticStubEmitter, StubModule};

/// Where and how to write generated artifacts.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub output_dir: PathBuf,
    /// File stem shared by the stub and the manifest.
    pub package_name: String,
    /// Overwrite existing artifacts.
    pub force: bool,
    /// Fail on the first unsupported keyword instead of passing it through.
    pub strict: bool,
}

impl GenerateOptions {
    pub fn new(output_dir: impl Into<PathBuf>, package_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            package_name: package_name.into(),
            force: false,
            strict: false,
        }
    }

    pub fn stub_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pyi", self.package_name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.package_name))
    }
}

/// Statistics collected during generation for reporting.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub objects_generated: usize,
    pub unions_generated: usize,
    pub enums_generated: usize,
    pub fields_generated: usize,
    pub recursive_references: usize,
    pub name_collisions: usize,
    pub unsupported_keywords: usize,
}

impl GenerationStats {
    pub fn from_graph(graph: &TypeGraph) -> Self {
        let mut stats = GenerationStats {
            name_collisions: graph.collisions().len(),
            unsupported_keywords: graph.unsupported().len(),
            ..Default::default()
        };
        for id in graph.named() {
            match graph.descriptor(*id) {
                TypeDescriptor::Object(obj) => {
                    stats.objects_generated += 1;
                    stats.fields_generated += obj.fields.len();
                }
                TypeDescriptor::Union(_) => stats.unions_generated += 1,
                TypeDescriptor::Enum(_) => stats.enums_generated += 1,
                _ => {}
            }
        }
        stats.recursive_references = count_back_edges(graph);
        stats
    }
}

/// Reachable back-edges. A back-edge shares its pointer with the type it
/// closes the loop to; alias slots do not.
fn count_back_edges(graph: &TypeGraph) -> usize {
    let mut count = 0;
    let mut seen = HashSet::new();
    let mut stack: Vec<_> = graph.roots().to_vec();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let node = graph.node(id);
        if let TypeDescriptor::Reference(reference) = &node.descriptor {
            if graph.node(reference.target).pointer == node.pointer {
                count += 1;
            }
        }
        stack.extend(node.descriptor.children());
    }
    count
}

/// The in-memory result of one run.
#[derive(Debug, Clone)]
pub struct Generation {
    pub graph: Arc<TypeGraph>,
    pub runtime: RuntimeTypes,
    pub stubs: StubModule,
}

impl Generation {
    pub fn stats(&self) -> GenerationStats {
        GenerationStats::from_graph(&self.graph)
    }
}

/// Resolve `source` and emit both representations from the same graph.
pub fn build(source: &SchemaSource) -> Result<Generation> {
    let graph = Arc::new(TypeGraphBuilder::build_source(source)?);
    let runtime = RuntimeTypeEmitter::emit(Arc::clone(&graph));
    let stubs = StaticStubEmitter::emit(&graph);
    Ok(Generation {
        graph,
        runtime,
        stubs,
    })
}

/// Generate the stub and manifest for `source` into `options.output_dir`.
///
/// Returns generation statistics for reporting.
pub fn generate(source: &SchemaSource, options: &GenerateOptions) -> Result<GenerationStats> {
    let generation = build(source)?;
    if options.strict {
        generation.graph.ensure_resolved()?;
    }

    let stub_path = options.stub_path();
    let manifest_path = options.manifest_path();
    if !options.force {
        for path in [&stub_path, &manifest_path] {
            if path.exists() {
                return Err(Error::OutputExists { path: path.clone() });
            }
        }
    }

    let stub_text = generation.stubs.render(&source.label());
    let manifest = generation.runtime.to_manifest()?;
    write_files(&[
        (stub_path.as_path(), stub_text.as_str()),
        (manifest_path.as_path(), manifest.as_str()),
    ])?;

    let stats = generation.stats();
    tracing::info!(
        stubs = %stub_path.display(),
        manifest = %manifest_path.display(),
        objects = stats.objects_generated,
        unions = stats.unions_generated,
        enums = stats.enums_generated,
        "generated"
    );
    Ok(stats)
}

/// Write every file or none: content goes to temporary siblings first and is
/// renamed into place once all of it is on disk.
fn write_files(files: &[(&Path, &str)]) -> Result<()> {
    let staged: Vec<(PathBuf, &Path)> = files
        .iter()
        .map(|(path, _)| (staging_path(path), *path))
        .collect();

    let written = files
        .iter()
        .zip(&staged)
        .try_for_each(|((_, content), (tmp, _))| write_file(tmp, content));
    if let Err(e) = written {
        discard(&staged);
        return Err(e);
    }

    for (tmp, path) in &staged {
        if let Err(e) = std::fs::rename(tmp, path) {
            discard(&staged);
            return Err(Error::Write {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn discard(staged: &[(PathBuf, &Path)]) {
    for (tmp, _) in staged {
        if tmp.exists() {
            let _ = std::fs::remove_file(tmp);
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
