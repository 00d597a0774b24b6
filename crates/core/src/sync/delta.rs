use crate::cache::TypeCache;
use crate::change::SkippedElement;
use crate::error::{Result, SyncError};
use crate::graph::{ElementNode, FileNode};
use indexmap::IndexMap;
use modelsync_api::{GraphStore, ModelElement, ModelResource, NodeId, Signature};
use smol_str::SmolStr;
use std::collections::HashSet;

/// What the graph holds for one element of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredElement {
    pub node: NodeId,
    pub signature: Option<Signature>,
    pub type_node: NodeId,
}

#[derive(Debug)]
pub enum Delta {
    /// The file has never been indexed.
    FirstIndex,
    Changes(FileDelta),
}

/// Classification of a new parse against the stored elements of a file.
///
/// All sets keep parse order; `removed` keeps stored order.
#[derive(Debug)]
pub struct FileDelta {
    pub file_node: NodeId,
    pub stored_count: usize,
    pub added: Vec<ModelElement>,
    pub updated: Vec<(NodeId, ModelElement)>,
    pub retyped: Vec<(StoredElement, ModelElement)>,
    pub unchanged: Vec<(SmolStr, NodeId)>,
    pub removed: IndexMap<SmolStr, StoredElement>,
    pub duplicates: DuplicateFilter,
    pub skipped: Vec<SkippedElement>,
}

impl FileDelta {
    pub fn new(file_node: NodeId, stored_count: usize) -> Self {
        Self {
            file_node,
            stored_count,
            added: Vec::new(),
            updated: Vec::new(),
            retyped: Vec::new(),
            unchanged: Vec::new(),
            removed: IndexMap::new(),
            duplicates: DuplicateFilter::default(),
            skipped: Vec::new(),
        }
    }

    pub fn changed(&self) -> usize {
        self.added.len() + self.updated.len() + self.retyped.len() + self.removed.len()
    }

    /// Share of the stored elements touched by the change; `0.0` for a file
    /// with nothing stored.
    pub fn ratio(&self) -> f64 {
        if self.stored_count == 0 {
            0.0
        } else {
            self.changed() as f64 / self.stored_count as f64
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }
}

/// Drops repeated identifiers of one parse; the first occurrence wins.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen: HashSet<SmolStr>,
    pub duplicates: usize,
    /// References carried by dropped duplicates.
    pub unresolved_references: usize,
}

impl DuplicateFilter {
    pub fn admit(&mut self, element: &ModelElement) -> bool {
        if self.seen.insert(element.identifier.clone()) {
            return true;
        }
        let references: usize = element.references.values().map(|s| s.targets.len()).sum();
        let err = SyncError::MalformedResource(format!(
            "duplicate identifier `{}`",
            element.identifier
        ));
        tracing::warn!("{}; dropping it with {} references", err, references);
        self.duplicates += 1;
        self.unresolved_references += references;
        false
    }
}

/// Loads `identifier -> stored element` for every element of the file.
pub fn stored_elements<S: GraphStore + ?Sized>(
    store: &S,
    file_node: NodeId,
) -> Result<IndexMap<SmolStr, StoredElement>> {
    let mut stored = IndexMap::new();
    for node in FileNode::elements(store, file_node)? {
        let element = ElementNode(node);
        stored.insert(
            element.identifier(store)?,
            StoredElement {
                node,
                signature: element.signature(store)?,
                type_node: element.type_node(store)?,
            },
        );
    }
    Ok(stored)
}

/// Streams the resource once and sorts every element into a delta set.
pub fn compute<S: GraphStore + ?Sized>(
    store: &S,
    cache: &mut TypeCache,
    file_node: Option<NodeId>,
    resource: &dyn ModelResource,
) -> Result<Delta> {
    let Some(file_node) = file_node else {
        return Ok(Delta::FirstIndex);
    };

    let mut stored = stored_elements(store, file_node)?;
    let mut delta = FileDelta::new(file_node, stored.len());

    for element in resource.elements() {
        if !delta.duplicates.admit(&element) {
            continue;
        }
        let type_node = match cache.type_node(store, &element.type_ref) {
            Ok(node) => node,
            Err(e) if e.is_element_local() => {
                tracing::warn!("Skipping element {}: {}", element.identifier, e);
                delta.skipped.push(SkippedElement {
                    identifier: element.identifier.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(old) = stored.swap_remove(&element.identifier) else {
            delta.added.push(element);
            continue;
        };
        if old.signature == Some(element.signature) {
            delta.unchanged.push((element.identifier.clone(), old.node));
        } else if old.type_node == type_node {
            delta.updated.push((old.node, element));
        } else {
            delta.retyped.push((old, element));
        }
    }

    // swap_remove shuffles the tail; restore stored order
    stored.sort_by(|_, a, _, b| a.node.cmp(&b.node));
    delta.removed = stored;

    tracing::debug!(
        "Delta: {} added, {} updated, {} retyped, {} removed, {} unchanged of {} stored",
        delta.added.len(),
        delta.updated.len(),
        delta.retyped.len(),
        delta.removed.len(),
        delta.unchanged.len(),
        delta.stored_count
    );
    Ok(Delta::Changes(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelsync_api::{ModelElement, ReferenceSlot, ReferenceTarget, TypeRef};

    fn book(id: &str) -> ModelElement {
        ModelElement::builder(id, TypeRef::new("http://lib", "Book"))
            .reference("author", ReferenceSlot::to([ReferenceTarget::local("p1")]))
            .build()
    }

    #[test]
    fn ratio_of_an_empty_file_is_zero() {
        let delta = FileDelta::new(NodeId(1), 0);
        assert_eq!(delta.ratio(), 0.0);
        assert!(delta.is_noop());
    }

    #[test]
    fn duplicates_are_counted_with_their_references() {
        let mut filter = DuplicateFilter::default();
        assert!(filter.admit(&book("b1")));
        assert!(!filter.admit(&book("b1")));
        assert!(filter.admit(&book("b2")));
        assert_eq!(filter.duplicates, 1);
        assert_eq!(filter.unresolved_references, 1);
    }
}
