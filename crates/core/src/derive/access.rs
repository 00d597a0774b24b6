use crate::error::SyncError;
use crate::graph::{DerivedNode, DerivedState, ElementNode, TypeNode};
use modelsync_api::schema::{EDGE_PROP_DERIVED, INSTANCES_PROPERTY};
use modelsync_api::{
    AccessRecord, EvaluationError, GraphStore, ModelAccess, NodeId, PropertyValue, TypeRef,
};
use smol_str::SmolStr;
use std::collections::BTreeSet;

fn store_err(e: SyncError) -> EvaluationError {
    EvaluationError::Store(e.to_string())
}

/// Graph view for one evaluation that remembers everything it was asked.
pub struct RecordingAccess<'s, S: GraphStore + ?Sized> {
    store: &'s S,
    owner: NodeId,
    records: BTreeSet<AccessRecord>,
}

impl<'s, S: GraphStore + ?Sized> RecordingAccess<'s, S> {
    pub fn new(store: &'s S, owner: NodeId) -> Self {
        Self {
            store,
            owner,
            records: BTreeSet::new(),
        }
    }

    pub fn into_records(self) -> BTreeSet<AccessRecord> {
        self.records
    }

    fn record(&mut self, node: NodeId, property: &str) {
        self.records.insert(AccessRecord::new(node, property));
    }

    /// Value of another derived attribute, if it is fresh.
    fn derived_value(
        &self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<PropertyValue>, EvaluationError> {
        let Some(derived) = ElementNode(node)
            .derived_node(self.store, name)
            .map_err(store_err)?
        else {
            return Ok(None);
        };
        let derived = DerivedNode(derived);
        match derived.state(self.store).map_err(store_err)? {
            DerivedState::Fresh => derived.value(self.store).map_err(store_err),
            DerivedState::Computing => Err(EvaluationError::Cycle(name.to_string())),
            DerivedState::Dirty => Err(EvaluationError::Pending(name.to_string())),
        }
    }
}

impl<S: GraphStore + ?Sized> ModelAccess for RecordingAccess<'_, S> {
    fn self_node(&self) -> NodeId {
        self.owner
    }

    fn attribute(
        &mut self,
        node: NodeId,
        name: &str,
    ) -> Result<Option<PropertyValue>, EvaluationError> {
        self.record(node, name);
        if name.starts_with('_') {
            return Ok(None);
        }
        match self.store.property(node, name)? {
            Some(value) => Ok(Some(value)),
            None => self.derived_value(node, name),
        }
    }

    fn references(&mut self, node: NodeId, name: &str) -> Result<Vec<NodeId>, EvaluationError> {
        self.record(node, name);
        Ok(self
            .store
            .outgoing(node, Some(name))?
            .into_iter()
            .filter(|e| !e.flag(EDGE_PROP_DERIVED))
            .map(|e| e.target)
            .collect())
    }

    fn instances_of(&mut self, type_ref: &TypeRef) -> Result<Vec<NodeId>, EvaluationError> {
        let Some(ty) = TypeNode::find(self.store, type_ref).map_err(store_err)? else {
            return Ok(Vec::new());
        };
        self.record(ty, INSTANCES_PROPERTY);
        TypeNode::instances(self.store, ty).map_err(store_err)
    }

    fn identifier(&mut self, node: NodeId) -> Result<SmolStr, EvaluationError> {
        ElementNode(node).identifier(self.store).map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelsync_api::{NodeLabel, Properties};
    use modelsync_store::MemoryGraphStore;

    #[test]
    fn reads_are_recorded() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        let mut props = Properties::new();
        props.insert("title".into(), "Dune".into());
        let a = store.create_node(NodeLabel::Element, props).unwrap();
        let b = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        store.create_edge(a, b, "author", Properties::new()).unwrap();
        store.commit_tx().unwrap();

        let mut access = RecordingAccess::new(&store, a);
        assert_eq!(access.attribute(a, "title").unwrap(), Some("Dune".into()));
        assert_eq!(access.references(a, "author").unwrap(), vec![b]);
        assert_eq!(access.attribute(b, "missing").unwrap(), None);

        let records: Vec<_> = access.into_records().into_iter().collect();
        assert_eq!(
            records,
            vec![
                AccessRecord::new(a, "author"),
                AccessRecord::new(a, "title"),
                AccessRecord::new(b, "missing"),
            ]
        );
    }
}
