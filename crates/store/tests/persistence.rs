use modelsync_api::{GraphStore, NodeLabel, Properties, PropertyValue};
use modelsync_store::MemoryGraphStore;
use smol_str::SmolStr;
use tempfile::TempDir;

fn populated_store() -> MemoryGraphStore {
    let mut store = MemoryGraphStore::new();
    store.begin_tx().unwrap();
    let file = store
        .create_node(
            NodeLabel::File,
            Properties::from([(SmolStr::new("key"), PropertyValue::from("r||/a.json"))]),
        )
        .unwrap();
    let element = store
        .create_node(
            NodeLabel::Element,
            Properties::from([(SmolStr::new("id"), PropertyValue::from("e1"))]),
        )
        .unwrap();
    store
        .create_edge(element, file, "file", Properties::new())
        .unwrap();
    store.index_add("files", "r||/a.json", file).unwrap();
    store.index_add("fragments", "e1", element).unwrap();
    store.commit_tx().unwrap();
    store
}

#[test]
fn saved_store_reopens_with_same_contents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.bin");

    let store = populated_store();
    store.save(&path).unwrap();
    assert!(!path.with_extension("tmp").exists());

    let reopened = MemoryGraphStore::open(&path).unwrap();
    assert_eq!(reopened.node_count(), 2);
    assert_eq!(reopened.edge_count(), 1);

    let file = reopened.index_get("files", "r||/a.json");
    assert_eq!(file.len(), 1);
    let incoming = reopened.incoming(file[0], Some("file")).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(
        reopened.property(incoming[0].source, "id").unwrap(),
        Some(PropertyValue::from("e1"))
    );
}

#[test]
fn ids_keep_growing_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.bin");
    populated_store().save(&path).unwrap();

    let mut reopened = MemoryGraphStore::open(&path).unwrap();
    reopened.begin_tx().unwrap();
    let fresh = reopened
        .create_node(NodeLabel::Element, Properties::new())
        .unwrap();
    reopened.commit_tx().unwrap();

    assert_eq!(reopened.node_count(), 3);
    assert_eq!(reopened.index_get("fragments", "e1").len(), 1);
    assert!(!reopened.index_get("fragments", "e1").contains(&fresh));
}

#[test]
fn corrupt_file_yields_empty_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.bin");
    std::fs::write(&path, b"not a store").unwrap();

    let store = MemoryGraphStore::open(&path).unwrap();
    assert_eq!(store.node_count(), 0);
    assert!(!path.exists());
}

#[test]
fn save_is_refused_inside_transaction() {
    let dir = TempDir::new().unwrap();
    let mut store = populated_store();
    store.begin_tx().unwrap();
    assert!(store.save(&dir.path().join("graph.bin")).is_err());
    store.rollback_tx().unwrap();
}
