use crate::index::IndexTable;
use modelsync_api::{
    EdgeId, EdgeRecord, GraphStore, NodeId, NodeLabel, Properties, PropertyValue, StoreError,
    StoreMode, StoreResult,
};
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredNode {
    pub id: NodeId,
    pub label: NodeLabel,
    pub properties: Properties,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct StoredEdge {
    pub id: EdgeId,
    pub label: SmolStr,
    pub properties: Properties,
}

/// The persisted part of the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub topology: StableDiGraph<StoredNode, StoredEdge>,
    pub nodes: HashMap<NodeId, NodeIndex>,
    pub edges: HashMap<EdgeId, EdgeIndex>,
    pub next_node: u64,
    pub next_edge: u64,
    pub indexes: IndexTable,
}

/// Inverse of one write, replayed newest-first on rollback.
#[derive(Debug)]
enum Undo {
    NodeCreated(NodeId),
    NodeDeleted {
        node: StoredNode,
        /// `(source, target, edge)` for every edge touching the node.
        edges: Vec<(NodeId, NodeId, StoredEdge)>,
        /// `(index, key)` entries the node held.
        entries: Vec<(SmolStr, SmolStr)>,
    },
    PropertySet {
        node: NodeId,
        key: SmolStr,
        previous: Option<PropertyValue>,
    },
    EdgeCreated(EdgeId),
    EdgeDeleted {
        source: NodeId,
        target: NodeId,
        edge: StoredEdge,
    },
    IndexAdded {
        index: SmolStr,
        key: SmolStr,
        node: NodeId,
    },
    IndexRemoved {
        index: SmolStr,
        keys: Vec<SmolStr>,
        node: NodeId,
    },
}

/// Writes of the open transaction; its size follows the transaction, not
/// the store.
#[derive(Debug)]
struct UndoLog {
    entries: Vec<Undo>,
    next_node: u64,
    next_edge: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub commits: usize,
    pub rollbacks: usize,
    pub batch_sessions: usize,
}

/// Petgraph-backed graph store.
///
/// In transactional mode every write needs an open transaction. Batch mode
/// also accepts writes outside a transaction; such writes are immediately
/// durable and cannot be rolled back.
#[derive(Debug)]
pub struct MemoryGraphStore {
    pub(crate) state: StoreState,
    undo: Option<UndoLog>,
    mode: StoreMode,
    stats: StoreStats,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self {
            state: StoreState::default(),
            undo: None,
            mode: StoreMode::Transactional,
            stats: StoreStats::default(),
        }
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.undo.is_none() && self.mode == StoreMode::Transactional {
            return Err(StoreError::NoTransaction);
        }
        Ok(())
    }

    /// Batch writes outside a transaction are not recorded.
    fn record(&mut self, undo: Undo) {
        if let Some(log) = self.undo.as_mut() {
            log.entries.push(undo);
        }
    }

    fn add_edge_raw(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge: StoredEdge,
    ) -> StoreResult<()> {
        let from = self.node_index(source)?;
        let to = self.node_index(target)?;
        let id = edge.id;
        let idx = self.state.topology.add_edge(from, to, edge);
        self.state.edges.insert(id, idx);
        Ok(())
    }

    fn remove_edge_raw(&mut self, edge: EdgeId) -> Option<(NodeId, NodeId, StoredEdge)> {
        let idx = self.state.edges.remove(&edge)?;
        let (from, to) = self.state.topology.edge_endpoints(idx)?;
        let source = self.state.topology.node_weight(from)?.id;
        let target = self.state.topology.node_weight(to)?.id;
        let weight = self.state.topology.remove_edge(idx)?;
        Some((source, target, weight))
    }

    fn revert(&mut self, undo: Undo) -> StoreResult<()> {
        match undo {
            Undo::NodeCreated(node) => {
                if let Some(idx) = self.state.nodes.remove(&node) {
                    self.state.topology.remove_node(idx);
                }
                self.state.indexes.remove_node(node);
            }
            Undo::NodeDeleted {
                node,
                edges,
                entries,
            } => {
                let id = node.id;
                let idx = self.state.topology.add_node(node);
                self.state.nodes.insert(id, idx);
                for (source, target, edge) in edges {
                    self.add_edge_raw(source, target, edge)?;
                }
                for (index, key) in entries {
                    self.state.indexes.add(&index, &key, id);
                }
            }
            Undo::PropertySet {
                node,
                key,
                previous,
            } => {
                let properties = &mut self.stored_node_mut(node)?.properties;
                match previous {
                    Some(value) => {
                        properties.insert(key, value);
                    }
                    None => {
                        properties.remove(&key);
                    }
                }
            }
            Undo::EdgeCreated(edge) => {
                self.remove_edge_raw(edge);
            }
            Undo::EdgeDeleted {
                source,
                target,
                edge,
            } => self.add_edge_raw(source, target, edge)?,
            Undo::IndexAdded { index, key, node } => {
                self.state.indexes.remove(&index, Some(&key), node);
            }
            Undo::IndexRemoved { index, keys, node } => {
                for key in keys {
                    self.state.indexes.add(&index, &key, node);
                }
            }
        }
        Ok(())
    }

    fn node_index(&self, node: NodeId) -> StoreResult<NodeIndex> {
        self.state
            .nodes
            .get(&node)
            .copied()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn stored_node(&self, node: NodeId) -> StoreResult<&StoredNode> {
        let idx = self.node_index(node)?;
        self.state
            .topology
            .node_weight(idx)
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn stored_node_mut(&mut self, node: NodeId) -> StoreResult<&mut StoredNode> {
        let idx = self.node_index(node)?;
        self.state
            .topology
            .node_weight_mut(idx)
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn edges_of(
        &self,
        node: NodeId,
        direction: Direction,
        label: Option<&str>,
    ) -> StoreResult<Vec<EdgeRecord>> {
        let idx = self.node_index(node)?;
        let topology = &self.state.topology;
        let mut records = Vec::new();
        for edge in topology.edges_directed(idx, direction) {
            let weight = edge.weight();
            if label.is_some_and(|l| weight.label.as_str() != l) {
                continue;
            }
            let Some((from, to)) = topology.edge_endpoints(edge.id()) else {
                continue;
            };
            let (Some(source), Some(target)) = (topology.node_weight(from), topology.node_weight(to))
            else {
                continue;
            };
            records.push(EdgeRecord {
                id: weight.id,
                source: source.id,
                target: target.id,
                label: weight.label.clone(),
                properties: weight.properties.clone(),
            });
        }
        // Adjacency order of a stable graph is newest-first; callers expect creation order.
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

impl GraphStore for MemoryGraphStore {
    fn begin_tx(&mut self) -> StoreResult<()> {
        if self.undo.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.undo = Some(UndoLog {
            entries: Vec::new(),
            next_node: self.state.next_node,
            next_edge: self.state.next_edge,
        });
        Ok(())
    }

    fn commit_tx(&mut self) -> StoreResult<()> {
        if self.undo.take().is_none() {
            return Err(StoreError::NoTransaction);
        }
        self.stats.commits += 1;
        Ok(())
    }

    fn rollback_tx(&mut self) -> StoreResult<()> {
        let log = self.undo.take().ok_or(StoreError::NoTransaction)?;
        let writes = log.entries.len();
        for undo in log.entries.into_iter().rev() {
            self.revert(undo)?;
        }
        self.state.next_node = log.next_node;
        self.state.next_edge = log.next_edge;
        self.stats.rollbacks += 1;
        tracing::debug!("Rolled back transaction ({} writes)", writes);
        Ok(())
    }

    fn in_tx(&self) -> bool {
        self.undo.is_some()
    }

    fn mode(&self) -> StoreMode {
        self.mode
    }

    fn enter_batch_mode(&mut self) -> StoreResult<()> {
        if self.in_tx() {
            return Err(StoreError::ModeSwitchInTransaction);
        }
        if self.mode != StoreMode::Batch {
            self.mode = StoreMode::Batch;
            self.stats.batch_sessions += 1;
        }
        Ok(())
    }

    fn exit_batch_mode(&mut self) -> StoreResult<()> {
        if self.in_tx() {
            return Err(StoreError::ModeSwitchInTransaction);
        }
        self.mode = StoreMode::Transactional;
        Ok(())
    }

    fn create_node(&mut self, label: NodeLabel, properties: Properties) -> StoreResult<NodeId> {
        self.ensure_writable()?;
        let id = NodeId(self.state.next_node);
        self.state.next_node += 1;
        let idx = self.state.topology.add_node(StoredNode {
            id,
            label,
            properties,
        });
        self.state.nodes.insert(id, idx);
        self.record(Undo::NodeCreated(id));
        Ok(id)
    }

    fn delete_node(&mut self, node: NodeId) -> StoreResult<()> {
        self.ensure_writable()?;
        let idx = self.node_index(node)?;
        // a self-loop shows up in both directions
        let touching: BTreeSet<EdgeId> = self
            .state
            .topology
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.state.topology.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().id)
            .collect();
        let mut edges = Vec::with_capacity(touching.len());
        for edge in touching {
            if let Some(removed) = self.remove_edge_raw(edge) {
                edges.push(removed);
            }
        }
        let stored = self
            .state
            .topology
            .remove_node(idx)
            .ok_or(StoreError::NodeNotFound(node))?;
        self.state.nodes.remove(&node);
        let entries = self.state.indexes.remove_node(node);
        self.record(Undo::NodeDeleted {
            node: stored,
            edges,
            entries,
        });
        Ok(())
    }

    fn node_exists(&self, node: NodeId) -> bool {
        self.state.nodes.contains_key(&node)
    }

    fn node_label(&self, node: NodeId) -> StoreResult<NodeLabel> {
        Ok(self.stored_node(node)?.label)
    }

    fn nodes_with_label(&self, label: NodeLabel) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .state
            .topology
            .node_weights()
            .filter(|n| n.label == label)
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }

    fn property(&self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        Ok(self.stored_node(node)?.properties.get(key).cloned())
    }

    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> StoreResult<()> {
        self.ensure_writable()?;
        let key = SmolStr::new(key);
        let previous = self
            .stored_node_mut(node)?
            .properties
            .insert(key.clone(), value);
        self.record(Undo::PropertySet {
            node,
            key,
            previous,
        });
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        self.ensure_writable()?;
        let previous = self.stored_node_mut(node)?.properties.remove(key);
        if let Some(value) = &previous {
            self.record(Undo::PropertySet {
                node,
                key: SmolStr::new(key),
                previous: Some(value.clone()),
            });
        }
        Ok(previous)
    }

    fn property_keys(&self, node: NodeId) -> StoreResult<Vec<SmolStr>> {
        Ok(self.stored_node(node)?.properties.keys().cloned().collect())
    }

    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: &str,
        properties: Properties,
    ) -> StoreResult<EdgeId> {
        self.ensure_writable()?;
        let from = self.node_index(source)?;
        let to = self.node_index(target)?;
        let id = EdgeId(self.state.next_edge);
        self.state.next_edge += 1;
        let idx = self.state.topology.add_edge(
            from,
            to,
            StoredEdge {
                id,
                label: SmolStr::new(label),
                properties,
            },
        );
        self.state.edges.insert(id, idx);
        self.record(Undo::EdgeCreated(id));
        Ok(id)
    }

    fn delete_edge(&mut self, edge: EdgeId) -> StoreResult<()> {
        self.ensure_writable()?;
        let (source, target, edge) = self
            .remove_edge_raw(edge)
            .ok_or(StoreError::EdgeNotFound(edge))?;
        self.record(Undo::EdgeDeleted {
            source,
            target,
            edge,
        });
        Ok(())
    }

    fn outgoing(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>> {
        self.edges_of(node, Direction::Outgoing, label)
    }

    fn incoming(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>> {
        self.edges_of(node, Direction::Incoming, label)
    }

    fn index_add(&mut self, index: &str, key: &str, node: NodeId) -> StoreResult<()> {
        self.ensure_writable()?;
        if !self.node_exists(node) {
            return Err(StoreError::NodeNotFound(node));
        }
        if self.state.indexes.add(index, key, node) {
            self.record(Undo::IndexAdded {
                index: SmolStr::new(index),
                key: SmolStr::new(key),
                node,
            });
        }
        Ok(())
    }

    fn index_remove(&mut self, index: &str, key: Option<&str>, node: NodeId) -> StoreResult<()> {
        self.ensure_writable()?;
        let keys = self.state.indexes.remove(index, key, node);
        if !keys.is_empty() {
            self.record(Undo::IndexRemoved {
                index: SmolStr::new(index),
                keys,
                node,
            });
        }
        Ok(())
    }

    fn index_get(&self, index: &str, key: &str) -> Vec<NodeId> {
        self.state.indexes.get(index, key)
    }

    fn index_query(&self, index: &str, pattern: &str) -> Vec<(SmolStr, NodeId)> {
        self.state.indexes.query(index, pattern)
    }

    fn index_names(&self) -> Vec<SmolStr> {
        self.state.indexes.names()
    }

    fn node_count(&self) -> usize {
        self.state.topology.node_count()
    }

    fn edge_count(&self) -> usize {
        self.state.topology.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (SmolStr::new(k), v.clone()))
            .collect()
    }

    #[test]
    fn writes_require_transaction_in_transactional_mode() {
        let mut store = MemoryGraphStore::new();
        let err = store.create_node(NodeLabel::Element, Properties::new());
        assert!(matches!(err, Err(StoreError::NoTransaction)));

        store.begin_tx().unwrap();
        assert!(store.create_node(NodeLabel::Element, Properties::new()).is_ok());
        store.commit_tx().unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn rollback_restores_previous_state() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        let a = store
            .create_node(NodeLabel::Element, props(&[("id", "a".into())]))
            .unwrap();
        store.index_add("fragments", "a", a).unwrap();
        store.commit_tx().unwrap();

        store.begin_tx().unwrap();
        let b = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        store.create_edge(a, b, "ref", Properties::new()).unwrap();
        store.set_property(a, "id", "changed".into()).unwrap();
        store.delete_node(a).unwrap();
        store.rollback_tx().unwrap();

        assert!(store.node_exists(a));
        assert!(!store.node_exists(b));
        assert_eq!(store.property(a, "id").unwrap(), Some("a".into()));
        assert_eq!(store.index_get("fragments", "a"), vec![a]);
        assert_eq!(store.edge_count(), 0);
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[test]
    fn rollback_of_a_node_deletion_restores_its_edges_and_entries() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        let a = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        let b = store
            .create_node(NodeLabel::Element, props(&[("id", "b".into())]))
            .unwrap();
        let out = store
            .create_edge(b, a, "owner", props(&[("containment", true.into())]))
            .unwrap();
        let inc = store.create_edge(a, b, "items", Properties::new()).unwrap();
        let own = store.create_edge(b, b, "self", Properties::new()).unwrap();
        store.index_add("fragments", "b", b).unwrap();
        store.index_add("access", "b##id", b).unwrap();
        store.commit_tx().unwrap();
        let edges_before = store.edge_count();

        store.begin_tx().unwrap();
        store.index_remove("access", None, b).unwrap();
        store.remove_property(b, "id").unwrap();
        store.delete_edge(inc).unwrap();
        store.delete_node(b).unwrap();
        let c = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        store.index_add("fragments", "b", c).unwrap();
        store.rollback_tx().unwrap();

        assert!(!store.node_exists(c));
        assert_eq!(store.property(b, "id").unwrap(), Some("b".into()));
        assert_eq!(store.edge_count(), edges_before);
        let outgoing: Vec<EdgeId> = store
            .outgoing(b, None)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(outgoing, vec![out, own]);
        assert!(store.outgoing(b, Some("owner")).unwrap()[0].flag("containment"));
        assert_eq!(store.incoming(b, Some("items")).unwrap()[0].id, inc);
        assert_eq!(store.index_get("fragments", "b"), vec![b]);
        assert_eq!(store.index_get("access", "b##id"), vec![b]);

        // ids handed out inside the rolled back transaction are reused
        store.begin_tx().unwrap();
        assert_eq!(store.create_node(NodeLabel::File, Properties::new()).unwrap(), c);
        store.commit_tx().unwrap();
    }

    #[test]
    fn mode_switch_is_refused_inside_transaction() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        assert!(matches!(
            store.enter_batch_mode(),
            Err(StoreError::ModeSwitchInTransaction)
        ));
        store.commit_tx().unwrap();

        store.enter_batch_mode().unwrap();
        assert_eq!(store.mode(), StoreMode::Batch);
        // batch mode accepts writes without a transaction
        assert!(store.create_node(NodeLabel::File, Properties::new()).is_ok());
        store.exit_batch_mode().unwrap();
        assert_eq!(store.mode(), StoreMode::Transactional);
    }

    #[test]
    fn delete_node_drops_edges_and_index_entries() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        let a = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        let b = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        let e = store.create_edge(a, b, "ref", Properties::new()).unwrap();
        store.index_add("fragments", "b", b).unwrap();
        store.delete_node(b).unwrap();
        store.commit_tx().unwrap();

        assert!(store.outgoing(a, None).unwrap().is_empty());
        assert!(store.index_get("fragments", "b").is_empty());
        store.begin_tx().unwrap();
        assert!(matches!(
            store.delete_edge(e),
            Err(StoreError::EdgeNotFound(_))
        ));
        store.rollback_tx().unwrap();
    }

    #[test]
    fn adjacency_filters_by_label_in_creation_order() {
        let mut store = MemoryGraphStore::new();
        store.begin_tx().unwrap();
        let a = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        let b = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        let c = store.create_node(NodeLabel::Element, Properties::new()).unwrap();
        store.create_edge(a, b, "items", Properties::new()).unwrap();
        store.create_edge(a, c, "items", Properties::new()).unwrap();
        store.create_edge(a, c, "owner", Properties::new()).unwrap();
        store.commit_tx().unwrap();

        let items: Vec<NodeId> = store
            .outgoing(a, Some("items"))
            .unwrap()
            .into_iter()
            .map(|e| e.target)
            .collect();
        assert_eq!(items, vec![b, c]);
        assert_eq!(store.incoming(c, None).unwrap().len(), 2);
    }
}
