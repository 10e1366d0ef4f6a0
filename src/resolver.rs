//! `$ref` resolution and cycle bookkeeping.
//!
//! Resolution is pointer-based: a reference string is canonicalized against
//! the document it appears in and looked up in the [`DocumentIndex`], so two
//! references to the same location always yield the same node. The resolver
//! also tracks which pointers are currently being resolved; the builder
//! consults that set to cut cycles with a back-edge instead of recursing.

use indexmap::IndexSet;

use crate::document::{CanonicalPointer, DocumentIndex, SchemaNode, join_document_id, split_reference};
use crate::error::{Error, Result};

pub struct ReferenceResolver<'i, 'a> {
    index: &'i DocumentIndex<'a>,
    resolving: IndexSet<CanonicalPointer>,
}

impl<'i, 'a> ReferenceResolver<'i, 'a> {
    pub fn new(index: &'i DocumentIndex<'a>) -> Self {
        Self {
            index,
            resolving: IndexSet::new(),
        }
    }

    pub fn index(&self) -> &'i DocumentIndex<'a> {
        self.index
    }

    /// Canonical pointer named by `reference` when written at `from`.
    pub fn canonicalize(from: &CanonicalPointer, reference: &str) -> Option<CanonicalPointer> {
        let (document, fragment) = split_reference(reference);
        if !fragment.is_empty() && !fragment.starts_with('/') {
            // Plain-name fragments (`#foo`) are anchors, which this resolver
            // does not model.
            return None;
        }
        let document = join_document_id(from.document(), document);
        Some(CanonicalPointer::from_parts(&document, &fragment))
    }

    /// Resolve the `$ref` string found at `from` to its target node.
    pub fn resolve(&self, from: &CanonicalPointer, reference: &str) -> Result<SchemaNode<'a>> {
        Self::canonicalize(from, reference)
            .map(|target| self.index.canonical(target))
            .and_then(|target| self.index.get(&target))
            .ok_or_else(|| Error::UnresolvedReference {
                pointer: from.clone(),
                reference: reference.to_string(),
            })
    }

    /// Mark `pointer` as being resolved. Returns `false` if it already was.
    pub fn enter(&mut self, pointer: &CanonicalPointer) -> bool {
        self.resolving.insert(pointer.clone())
    }

    pub fn exit(&mut self, pointer: &CanonicalPointer) {
        self.resolving.shift_remove(pointer);
    }

    pub fn is_resolving(&self, pointer: &CanonicalPointer) -> bool {
        self.resolving.contains(pointer)
    }
}
