//! Builds a [`TypeGraph`] from a schema source.
//!
//! Traversal is depth-first from the dialect's roots. Every schema location
//! is memoized by canonical pointer, so a sub-schema reached through several
//! `$ref`s is resolved once and every reference yields the same [`TypeId`].
//! Ids are reserved before a node's children are visited; reaching a node
//! that is still being composed produces a [`TypeDescriptor::Reference`]
//! back-edge, which is what keeps recursive schemas finite.
//!
//! Names are assigned afterwards, breadth-first from the roots, so they do
//! not depend on which path happened to reach a type first during traversal.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::compose::{Composed, Subschemas, compose};
use crate::document::{CanonicalPointer, DocumentIndex, SchemaNode};
use crate::error::{Error, Result};
use crate::graph::{
    PrimitiveType, ReferenceType, TypeDescriptor, TypeGraph, TypeId, TypeNode, Unsupported,
    UnresolvedType,
};
use crate::naming::{NameRegistry, preferred_name};
use crate::resolver::ReferenceResolver;
use crate::schema::SchemaSource;

pub struct TypeGraphBuilder<'i, 'a> {
    resolver: ReferenceResolver<'i, 'a>,
    graph: TypeGraph,
    /// One back-edge node per in-progress target.
    back_edges: HashMap<TypeId, TypeId>,
}

impl<'i, 'a> TypeGraphBuilder<'i, 'a> {
    pub fn new(index: &'i DocumentIndex<'a>) -> Self {
        Self {
            resolver: ReferenceResolver::new(index),
            graph: TypeGraph::default(),
            back_edges: HashMap::new(),
        }
    }

    /// Build the graph for every top-level definition of `source`.
    pub fn build_source(source: &SchemaSource) -> Result<TypeGraph> {
        let roots = source.dialect().root_definitions(source.root())?;
        let index = DocumentIndex::from_source(source);
        TypeGraphBuilder::new(&index).build(roots)
    }

    /// Resolve each `(definition name, pointer)` root, then name the result.
    pub fn build<I>(mut self, roots: I) -> Result<TypeGraph>
    where
        I: IntoIterator<Item = (String, CanonicalPointer)>,
    {
        for (name, pointer) in roots {
            let node = self
                .resolver
                .index()
                .get(&pointer)
                .ok_or_else(|| Error::Document(format!("no schema at {pointer}")))?;
            let id = self.resolve_node(node)?;
            if !self.graph.roots.contains(&id) {
                self.graph.roots.push(id);
            }
            self.graph.definitions.entry(name).or_insert(id);
        }

        self.assign_names();
        tracing::debug!(
            types = self.graph.len(),
            named = self.graph.named.len(),
            unsupported = self.graph.unsupported.len(),
            "type graph built"
        );
        Ok(self.graph)
    }

    /// Resolve one schema node to its type, memoized by pointer.
    pub fn resolve_node(&mut self, node: SchemaNode<'a>) -> Result<TypeId> {
        let pointer = node.pointer().clone();

        if let Some(id) = self.graph.lookup(&pointer) {
            if self.resolver.is_resolving(&pointer) {
                return Ok(self.back_edge(id, &pointer));
            }
            return Ok(id);
        }
        if self.resolver.is_resolving(&pointer) {
            return self.close_alias_cycle(node);
        }
        if let Some(reference) = node.reference() {
            return self.resolve_alias(&node, reference);
        }

        let id = self.graph.push(TypeNode {
            pointer: pointer.clone(),
            name: None,
            title: node.title().map(str::to_string),
            description: node.description().map(str::to_string),
            descriptor: TypeDescriptor::Primitive(PrimitiveType::Any),
        });
        self.graph.pointers.insert(pointer.clone(), id);

        self.resolver.enter(&pointer);
        let composed = compose(self, &node, id);
        self.resolver.exit(&pointer);

        match composed? {
            Composed::Shape(descriptor) => {
                tracing::debug!(%pointer, %id, kind = descriptor.kind_name(), "resolved");
                self.graph.node_mut(id).descriptor = descriptor;
                Ok(id)
            }
            Composed::Alias(target) if self.graph.follow(target) == id => {
                let keyword = "alias of itself";
                self.unsupported(&pointer, keyword);
                self.graph.node_mut(id).descriptor = TypeDescriptor::Unresolved(UnresolvedType {
                    keyword: keyword.to_string(),
                });
                Ok(id)
            }
            Composed::Alias(target) => {
                tracing::debug!(%pointer, %target, "resolved as alias");
                self.graph.node_mut(id).descriptor =
                    TypeDescriptor::Reference(ReferenceType { target });
                self.graph.pointers.insert(pointer, target);
                Ok(target)
            }
        }
    }

    fn resolve_alias(&mut self, node: &SchemaNode<'a>, reference: &str) -> Result<TypeId> {
        let pointer = node.pointer().clone();
        let target = self.resolver.resolve(&pointer, reference)?;
        if node.value().as_object().is_some_and(|map| map.len() > 1) {
            tracing::debug!(%pointer, "keywords next to $ref ignored");
        }

        self.resolver.enter(&pointer);
        let resolved = self.resolve_node(target);
        self.resolver.exit(&pointer);

        let id = resolved?;
        self.graph.pointers.insert(pointer, id);
        Ok(id)
    }

    /// A `$ref` reached again while it is still being followed. The chain
    /// leads to the typed node in progress, which gets a back-edge; a chain
    /// of references that never reaches a typed node is an error.
    fn close_alias_cycle(&mut self, node: SchemaNode<'a>) -> Result<TypeId> {
        let origin = node.pointer().clone();
        let mut visited = HashSet::new();
        let mut current = node;

        while let Some(reference) = current.reference() {
            if !visited.insert(current.pointer().clone()) {
                break;
            }
            let target = self.resolver.resolve(current.pointer(), reference)?;
            if let Some(id) = self.graph.lookup(target.pointer()) {
                if self.resolver.is_resolving(target.pointer()) {
                    return Ok(self.back_edge(id, target.pointer()));
                }
                return Ok(id);
            }
            current = target;
        }
        Err(Error::CircularReference { pointer: origin })
    }

    fn back_edge(&mut self, target: TypeId, pointer: &CanonicalPointer) -> TypeId {
        if let Some(id) = self.back_edges.get(&target) {
            return *id;
        }
        let id = self.graph.push(TypeNode {
            pointer: pointer.clone(),
            name: None,
            title: None,
            description: None,
            descriptor: TypeDescriptor::Reference(ReferenceType { target }),
        });
        self.back_edges.insert(target, id);
        tracing::debug!(%pointer, %target, "back-edge");
        id
    }

    /// Breadth-first from the roots in document order.
    fn assign_names(&mut self) {
        let mut registry = NameRegistry::new();
        let mut seen = HashSet::new();
        let mut named = Vec::new();
        let mut queue: VecDeque<TypeId> = self.graph.roots.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            let id = self.graph.follow(id);
            if !seen.insert(id) {
                continue;
            }
            let node = self.graph.node(id);
            if node.descriptor.is_nameable() {
                let preferred = preferred_name(&node.pointer, node.title.as_deref());
                let name = registry.assign(&node.pointer, &preferred);
                tracing::debug!(pointer = %node.pointer, %name, "named");
                self.graph.node_mut(id).name = Some(name);
                named.push(id);
            }
            queue.extend(self.graph.descriptor(id).children());
        }

        self.graph.named = named;
        self.graph.collisions = registry.into_collisions();
    }
}

impl<'a> Subschemas<'a> for TypeGraphBuilder<'_, 'a> {
    fn resolve(&mut self, node: SchemaNode<'a>) -> Result<TypeId> {
        self.resolve_node(node)
    }

    fn synthesize(&mut self, pointer: CanonicalPointer, descriptor: TypeDescriptor) -> TypeId {
        if let Some(id) = self.graph.lookup(&pointer) {
            return id;
        }
        let id = self.graph.push(TypeNode {
            pointer: pointer.clone(),
            name: None,
            title: None,
            description: None,
            descriptor,
        });
        self.graph.pointers.insert(pointer, id);
        id
    }

    fn unsupported(&mut self, pointer: &CanonicalPointer, keyword: &str) {
        tracing::warn!(%pointer, keyword, "unsupported schema construct; values pass through unchecked");
        self.graph.unsupported.push(Unsupported {
            pointer: pointer.clone(),
            keyword: keyword.to_string(),
        });
    }

    fn graph(&self) -> &TypeGraph {
        &self.graph
    }
}
