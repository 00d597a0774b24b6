#![allow(dead_code)]

use modelsync_api::{
    AttributeDescriptor, ChangeEvent, ChangeListener, FileChange, GraphStore, MetamodelDescriptor,
    ModelElement, NodeId, NodeLabel, ParsedResource, ReferenceDescriptor, ReferenceSlot,
    ReferenceTarget, TypeDescriptor, TypeRef,
};
use modelsync_core::graph::{ElementNode, FileNode, TypeNode};
use modelsync_core::{SyncConfig, SyncEngine};
use modelsync_store::MemoryGraphStore;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

pub const LIB: &str = "http://lib";
pub const REPO: &str = "repo";

pub fn ty(name: &str) -> TypeRef {
    TypeRef::new(LIB, name)
}

fn reference(name: &str, target: &str) -> ReferenceDescriptor {
    ReferenceDescriptor {
        name: name.into(),
        many: false,
        containment: false,
        container: false,
        target: Some(ty(target)),
    }
}

fn named(name: &str) -> TypeDescriptor {
    TypeDescriptor {
        name: name.into(),
        is_abstract: false,
        supertypes: vec![ty("Named")],
        attributes: Vec::new(),
        references: Vec::new(),
    }
}

/// Libraries holding books written by persons; everything has a name.
pub fn library_metamodel() -> MetamodelDescriptor {
    let pages = AttributeDescriptor {
        value_type: "int".into(),
        ..AttributeDescriptor::single("pages")
    };
    MetamodelDescriptor {
        uri: LIB.into(),
        types: vec![
            TypeDescriptor {
                is_abstract: true,
                supertypes: Vec::new(),
                attributes: vec![AttributeDescriptor::single("name")],
                ..named("Named")
            },
            TypeDescriptor {
                attributes: vec![AttributeDescriptor::many("tags", false, true)],
                references: vec![ReferenceDescriptor {
                    many: true,
                    containment: true,
                    ..reference("books", "Book")
                }],
                ..named("Library")
            },
            TypeDescriptor {
                attributes: vec![pages.clone(), AttributeDescriptor::many("chapters", true, false)],
                references: vec![reference("author", "Person")],
                ..named("Book")
            },
            TypeDescriptor {
                attributes: vec![pages],
                ..named("Magazine")
            },
            TypeDescriptor {
                references: vec![reference("favourite", "Book")],
                ..named("Person")
            },
        ],
    }
}

pub fn engine() -> SyncEngine<MemoryGraphStore> {
    engine_with(SyncConfig::default())
}

pub fn engine_with(config: SyncConfig) -> SyncEngine<MemoryGraphStore> {
    let mut engine = SyncEngine::new(MemoryGraphStore::new(), config);
    engine
        .register_metamodel(&library_metamodel())
        .expect("metamodel registers");
    engine
}

pub fn change(path: &str, revision: &str) -> FileChange {
    FileChange::new(REPO, path, revision)
}

pub fn book(id: &str, name: &str, pages: i64) -> ModelElement {
    ModelElement::builder(id, ty("Book"))
        .attr("name", name)
        .attr("pages", pages)
        .build()
}

pub fn book_by(id: &str, name: &str, pages: i64, author: ReferenceTarget) -> ModelElement {
    ModelElement::builder(id, ty("Book"))
        .attr("name", name)
        .attr("pages", pages)
        .reference("author", ReferenceSlot::to([author]))
        .build()
}

pub fn person(id: &str, name: &str) -> ModelElement {
    ModelElement::builder(id, ty("Person"))
        .attr("name", name)
        .build()
}

pub fn library(id: &str, books: &[&str]) -> ModelElement {
    ModelElement::builder(id, ty("Library"))
        .attr("name", id)
        .reference(
            "books",
            ReferenceSlot::containing(books.iter().map(|b| ReferenceTarget::local(*b))),
        )
        .root()
        .build()
}

/// `count` books `b0..` with 100 pages each.
pub fn shelf(count: usize) -> Vec<ModelElement> {
    (0..count)
        .map(|i| book(&format!("b{i}"), &format!("Book {i}"), 100))
        .collect()
}

pub fn resource(elements: Vec<ModelElement>) -> ParsedResource {
    ParsedResource::new(elements)
}

/// Records brackets and events in arrival order.
#[derive(Default)]
pub struct RecordingListener {
    entries: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }
}

impl ChangeListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn change_start(&self) {
        self.push("start".into());
    }

    fn change_success(&self) {
        self.push("success".into());
    }

    fn change_failure(&self) {
        self.push("failure".into());
    }

    fn on_event(&self, _change: &FileChange, event: &ChangeEvent) {
        let entry = match event {
            ChangeEvent::ElementAdded { identifier, .. } => format!("added {identifier}"),
            ChangeEvent::ElementRemoved { identifier, .. } => format!("removed {identifier}"),
            ChangeEvent::AttributeUpdated { attribute, .. } => format!("set {attribute}"),
            ChangeEvent::AttributeRemoved { attribute, .. } => format!("unset {attribute}"),
            ChangeEvent::ReferenceAdded { label, .. } => format!("link {label}"),
            ChangeEvent::ReferenceRemoved { label, .. } => format!("unlink {label}"),
        };
        self.push(entry);
    }
}

fn describe<S: GraphStore>(store: &S, node: NodeId) -> String {
    match store.node_label(node).unwrap() {
        NodeLabel::Element => {
            let element = ElementNode(node);
            format!(
                "{}#{}",
                element.file_key(store).unwrap().unwrap_or_default(),
                element.identifier(store).unwrap()
            )
        }
        NodeLabel::Type => TypeNode::type_ref(store, node).unwrap().to_string(),
        NodeLabel::File => FileNode::load(store, node).unwrap().key.to_string(),
        other => other.to_string(),
    }
}

/// Node-id independent description of every element, its properties and
/// its outgoing edges.
pub fn snapshot<S: GraphStore>(store: &S) -> BTreeSet<String> {
    let mut lines = BTreeSet::new();
    for node in store.nodes_with_label(NodeLabel::Element) {
        let me = describe(store, node);
        for key in store.property_keys(node).unwrap() {
            let value = store.property(node, &key).unwrap().unwrap();
            lines.insert(format!("{me} {key}={value}"));
        }
        for edge in store.outgoing(node, None).unwrap() {
            lines.insert(format!("{me} -{}-> {}", edge.label, describe(store, edge.target)));
        }
    }
    lines
}
