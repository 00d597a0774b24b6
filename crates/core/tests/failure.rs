mod common;

use common::*;
use modelsync_api::{
    EdgeId, EdgeRecord, FileKey, GraphStore, NodeId, NodeLabel, Properties, PropertyValue,
    ReferenceTarget, StoreError, StoreMode, StoreResult,
};
use modelsync_core::graph::FileNode;
use modelsync_core::{SyncConfig, SyncEngine};
use modelsync_store::MemoryGraphStore;
use smol_str::SmolStr;

/// Memory store that refuses edges with one label while armed.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryGraphStore,
    fail_label: Option<&'static str>,
}

impl GraphStore for FlakyStore {
    fn begin_tx(&mut self) -> StoreResult<()> {
        self.inner.begin_tx()
    }
    fn commit_tx(&mut self) -> StoreResult<()> {
        self.inner.commit_tx()
    }
    fn rollback_tx(&mut self) -> StoreResult<()> {
        self.inner.rollback_tx()
    }
    fn in_tx(&self) -> bool {
        self.inner.in_tx()
    }
    fn mode(&self) -> StoreMode {
        self.inner.mode()
    }
    fn enter_batch_mode(&mut self) -> StoreResult<()> {
        self.inner.enter_batch_mode()
    }
    fn exit_batch_mode(&mut self) -> StoreResult<()> {
        self.inner.exit_batch_mode()
    }
    fn create_node(&mut self, label: NodeLabel, properties: Properties) -> StoreResult<NodeId> {
        self.inner.create_node(label, properties)
    }
    fn delete_node(&mut self, node: NodeId) -> StoreResult<()> {
        self.inner.delete_node(node)
    }
    fn node_exists(&self, node: NodeId) -> bool {
        self.inner.node_exists(node)
    }
    fn node_label(&self, node: NodeId) -> StoreResult<NodeLabel> {
        self.inner.node_label(node)
    }
    fn nodes_with_label(&self, label: NodeLabel) -> Vec<NodeId> {
        self.inner.nodes_with_label(label)
    }
    fn property(&self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        self.inner.property(node, key)
    }
    fn set_property(&mut self, node: NodeId, key: &str, value: PropertyValue) -> StoreResult<()> {
        self.inner.set_property(node, key, value)
    }
    fn remove_property(&mut self, node: NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        self.inner.remove_property(node, key)
    }
    fn property_keys(&self, node: NodeId) -> StoreResult<Vec<SmolStr>> {
        self.inner.property_keys(node)
    }
    fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        label: &str,
        properties: Properties,
    ) -> StoreResult<EdgeId> {
        if self.fail_label == Some(label) {
            return Err(StoreError::Backend(format!("refusing `{label}` edge")));
        }
        self.inner.create_edge(source, target, label, properties)
    }
    fn delete_edge(&mut self, edge: EdgeId) -> StoreResult<()> {
        self.inner.delete_edge(edge)
    }
    fn outgoing(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>> {
        self.inner.outgoing(node, label)
    }
    fn incoming(&self, node: NodeId, label: Option<&str>) -> StoreResult<Vec<EdgeRecord>> {
        self.inner.incoming(node, label)
    }
    fn index_add(&mut self, index: &str, key: &str, node: NodeId) -> StoreResult<()> {
        self.inner.index_add(index, key, node)
    }
    fn index_remove(&mut self, index: &str, key: Option<&str>, node: NodeId) -> StoreResult<()> {
        self.inner.index_remove(index, key, node)
    }
    fn index_get(&self, index: &str, key: &str) -> Vec<NodeId> {
        self.inner.index_get(index, key)
    }
    fn index_query(&self, index: &str, pattern: &str) -> Vec<(SmolStr, NodeId)> {
        self.inner.index_query(index, pattern)
    }
    fn index_names(&self) -> Vec<SmolStr> {
        self.inner.index_names()
    }
    fn node_count(&self) -> usize {
        self.inner.node_count()
    }
    fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }
}

fn flaky_engine(config: SyncConfig) -> SyncEngine<FlakyStore> {
    let mut engine = SyncEngine::new(FlakyStore::default(), config);
    engine.register_metamodel(&library_metamodel()).unwrap();
    engine
}

#[test]
fn failed_patch_rolls_back_and_reports_failure() {
    let listener = RecordingListener::new();
    let mut engine = flaky_engine(SyncConfig::time_aware()).with_listener(listener.clone());
    engine
        .sync(
            &change("/lib.model", "1"),
            &resource(vec![book("b0", "Dune", 412), person("p", "Frank")]),
        )
        .unwrap();
    let before = snapshot(engine.store());
    listener.clear();

    engine.store_mut().fail_label = Some("author");
    let next = vec![
        book_by("b0", "Dune", 500, ReferenceTarget::local("p")),
        person("p", "Frank Herbert"),
    ];
    assert!(engine.sync(&change("/lib.model", "2"), &resource(next.clone())).is_err());

    assert_eq!(listener.entries().first().map(String::as_str), Some("start"));
    assert_eq!(listener.entries().last().map(String::as_str), Some("failure"));
    assert_eq!(listener.count("success"), 0);
    assert_eq!(snapshot(engine.store()), before);
    assert!(!engine.store().in_tx());

    let file = FileNode::find(engine.store(), &FileKey::new(REPO, "/lib.model")).unwrap();
    let stored = FileNode::load(engine.store(), file).unwrap();
    assert_eq!(stored.revision.as_deref(), Some("1"));

    engine.store_mut().fail_label = None;
    engine.sync(&change("/lib.model", "2"), &resource(next)).unwrap();
    assert!(snapshot(engine.store()).contains("repo||/lib.model#b0 -author-> repo||/lib.model#p"));
}

#[test]
fn failed_first_index_leaves_no_trace() {
    let listener = RecordingListener::new();
    let mut engine = flaky_engine(SyncConfig::default()).with_listener(listener.clone());
    let nodes = engine.store().node_count();
    engine.store_mut().fail_label = Some("typeOf");

    assert!(engine.sync(&change("/shelf.model", "1"), &resource(shelf(3))).is_err());

    assert_eq!(listener.entries(), vec!["start", "failure"]);
    assert_eq!(engine.store().node_count(), nodes);
    assert_eq!(engine.store().mode(), StoreMode::Transactional);
    assert_eq!(engine.stats().files, 0);
}
