use crate::error::StoreResult;
use crate::models::{EdgeId, NodeId, NodeLabel, Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Global write mode of a graph store.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Every write runs inside an explicit transaction.
    Transactional,
    /// Bulk loading with relaxed write checks.
    Batch,
}

/// An edge as returned by adjacency queries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub label: SmolStr,
    pub properties: Properties,
}

impl EdgeRecord {
    pub fn flag(&self, name: &str) -> bool {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }
}

/// Property graph with transactions and string-keyed node indexes.
///
/// A single writer owns the store; reads are allowed at any time, writes only
/// inside a transaction unless the store says otherwise for batch mode.
pub trait GraphStore: Send {
    fn begin_tx(&mut self) -> StoreResult<()>;
    fn commit_tx(&mut self) -> StoreResult<()>;
    fn rollback_tx(&mut self) -> StoreResult<()>;
    fn in_tx(&self) -> bool;

    fn mode(&self) -> StoreMode;
    /// Fails while a transaction is open.
    fn enter_batch_mode(&mut self) -> StoreResult<()>;
    /// Fails while a transaction is open.
    fn exit_batch_mode(&mut self) -> StoreResult<()>;

    fn create_node(&mut self, label: NodeLabel, properties: Properties) -> StoreResult<NodeId>;
    /// Deletes the node, every edge touching it and all its index entries.
    fn delete_node(&mut self, node: NodeId) -> StoreResult<()>;
    fn node_exists(&self, node: NodeId) -> bool;
    fn node_label(&self, node: NodeId) -> StoreResult<NodeLabel>;
    fn nodes_with_label(&self, label: NodeLabel) -> Vec<NodeId>;

    fn property(&self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>>;
    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> StoreResult<()>;
    fn remove_property(&mut self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>>;
    fn property_keys(&self, node: NodeId) -> StoreResult<Vec<SmolStr>>;

    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: &str,
        properties: Properties,
    ) -> StoreResult<EdgeId>;
    fn delete_edge(&mut self, edge: EdgeId) -> StoreResult<()>;
    fn outgoing(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>>;
    fn incoming(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>>;

    fn index_add(&mut self, index: &str, key: &str, node: NodeId) -> StoreResult<()>;
    /// Removes one entry, or every entry of `node` in `index` when `key` is `None`.
    fn index_remove(&mut self, index: &str, key: Option<&str>, node: NodeId) -> StoreResult<()>;
    fn index_get(&self, index: &str, key: &str) -> Vec<NodeId>;
    /// Exact match, or prefix match when `pattern` ends with `*` (`*` alone matches all).
    fn index_query(&self, index: &str, pattern: &str) -> Vec<(SmolStr, NodeId)>;
    fn index_names(&self) -> Vec<SmolStr>;

    fn node_count(&self) -> usize;
    fn edge_count(&self) -> usize;
}
