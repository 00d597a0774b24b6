use super::normalize::normalize;
use crate::cache::{TypeCache, TypeInfo};
use crate::change::{ChangeSink, SkippedElement, SyncStats};
use crate::error::{Result, SyncError};
use crate::graph::{DerivedNode, flag_props};
use crate::proxy::{ProxyDictionary, ProxyTuple};
use modelsync_api::schema::*;
use modelsync_api::{
    ChangeEvent, EdgeRecord, GraphStore, ModelElement, NodeId, NodeLabel, Properties,
    PropertyValue, ReferenceSlot, TargetLocation,
};
use smol_str::SmolStr;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Write primitives shared by every sync strategy for one file.
pub struct ElementWriter<'a> {
    pub cache: &'a mut TypeCache,
    pub proxies: &'a mut ProxyDictionary,
    pub sink: ChangeSink<'a>,
    pub stats: SyncStats,
    pub skipped: Vec<SkippedElement>,
    pub file_node: NodeId,
    pub file_key: SmolStr,
    /// Target files that received new proxy records.
    pub touched: BTreeSet<SmolStr>,
}

impl<'a> ElementWriter<'a> {
    pub fn new(
        cache: &'a mut TypeCache,
        proxies: &'a mut ProxyDictionary,
        sink: ChangeSink<'a>,
        file_node: NodeId,
        file_key: SmolStr,
    ) -> Self {
        Self {
            cache,
            proxies,
            sink,
            stats: SyncStats::default(),
            skipped: Vec::new(),
            file_node,
            file_key,
            touched: BTreeSet::new(),
        }
    }

    /// Type information for an element, or `None` after recording it as
    /// skipped when its metamodel is unknown.
    pub fn type_info<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        element: &ModelElement,
    ) -> Result<Option<Arc<TypeInfo>>> {
        match self.cache.type_info(store, &element.type_ref) {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_element_local() => {
                tracing::warn!("Skipping element {}: {}", element.identifier, e);
                self.skip(&element.identifier, &e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn skip(&mut self, identifier: &SmolStr, err: &SyncError) {
        self.stats.skipped_elements += 1;
        self.skipped.push(SkippedElement {
            identifier: identifier.clone(),
            reason: err.to_string(),
        });
    }

    /// Creates the element node with its attributes, bookkeeping edges, index
    /// entries and dirty derived attributes. References are left to the caller.
    pub fn create_element<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        element: &ModelElement,
        info: &TypeInfo,
    ) -> Result<NodeId> {
        let mut properties = Properties::new();
        properties.insert(SmolStr::new_static(PROP_ID), element.identifier.clone().into());
        properties.insert(
            SmolStr::new_static(PROP_SIGNATURE),
            PropertyValue::Bytes(element.signature.as_bytes().to_vec()),
        );
        if element.is_root {
            properties.insert(SmolStr::new_static(PROP_ROOT), true.into());
        }
        let mut attributes = Vec::new();
        for (name, value) in &element.attributes {
            match info.attributes.get(name) {
                Some(decl) => {
                    let value = normalize(decl, value.clone());
                    properties.insert(name.clone(), value.clone());
                    attributes.push((name.clone(), value));
                }
                None => tracing::debug!(
                    "{}: attribute `{}` not declared by {}",
                    element.identifier,
                    name,
                    info.type_ref
                ),
            }
        }

        let node = store.create_node(NodeLabel::Element, properties)?;
        self.link_structural(store, node, EDGE_TYPE_OF, info.node)?;
        for supertype in &info.supertypes {
            self.link_structural(store, node, EDGE_KIND_OF, *supertype)?;
        }
        self.link_structural(store, node, EDGE_FILE, self.file_node)?;

        store.index_add(INDEX_FRAGMENTS, &element.identifier, node)?;
        if element.is_root {
            store.index_add(INDEX_ROOTS, &self.file_key, node)?;
        }
        for (name, value) in attributes {
            if info.attributes.get(&name).is_some_and(|d| d.indexed) {
                index_value(store, &info.attribute_index(&name), &value, node)?;
            }
            self.sink.attribute_updated(node, &name, value);
        }
        for decl in info.derived.values() {
            DerivedNode::create(store, node, decl)?;
        }

        self.sink.record(ChangeEvent::ElementAdded {
            node,
            identifier: element.identifier.clone(),
            type_node: info.node,
        });
        self.stats.added += 1;
        Ok(node)
    }

    fn link_structural<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        source: NodeId,
        label: &str,
        target: NodeId,
    ) -> Result<()> {
        store.create_edge(source, target, label, Properties::new())?;
        self.sink.reference_added(source, target, label, true);
        Ok(())
    }

    /// Target file key a reference target is filed under while pending.
    pub fn target_file(&self, location: &TargetLocation) -> SmolStr {
        match location {
            TargetLocation::SameFile => self.file_key.clone(),
            TargetLocation::File(key) => key.render(),
            TargetLocation::AnyFile => SmolStr::new_static(PROXY_WILDCARD),
        }
    }

    pub fn add_proxy<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        source: NodeId,
        target_file: &str,
        fragment: &str,
        label: &str,
        slot: &ReferenceSlot,
    ) -> Result<()> {
        let tuple = ProxyTuple::new(target_file, fragment, label, slot.containment, slot.container);
        if self.proxies.add(store, source, target_file, tuple)? {
            self.touched.insert(SmolStr::new(target_file));
        }
        Ok(())
    }

    /// Bulk path: every reference becomes a proxy, closed later by the resolver.
    pub fn defer_references<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        node: NodeId,
        element: &ModelElement,
    ) -> Result<()> {
        for (label, slot) in &element.references {
            for target in &slot.targets {
                let target_file = self.target_file(&target.location);
                self.add_proxy(store, node, &target_file, &target.fragment, label, slot)?;
            }
        }
        Ok(())
    }

    /// Transactional path: reconciles the reference edges of `node` with the
    /// element's reference slots.
    ///
    /// `local` maps identifiers of the current file to their nodes. Targets
    /// found there are linked directly, everything else becomes a proxy unless
    /// an existing edge already points at it.
    pub fn set_references<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        node: NodeId,
        element: &ModelElement,
        local: &HashMap<SmolStr, NodeId>,
    ) -> Result<()> {
        let existing: Vec<EdgeRecord> = store
            .outgoing(node, None)?
            .into_iter()
            .filter(|e| !is_structural_edge(&e.label) && !e.flag(EDGE_PROP_DERIVED))
            .collect();
        let mut labels: BTreeSet<SmolStr> = element.references.keys().cloned().collect();
        labels.extend(existing.iter().map(|e| e.label.clone()));

        let empty = ReferenceSlot::default();
        for label in labels {
            let slot = element.references.get(&label).unwrap_or(&empty);
            let flags = (slot.containment, slot.container);
            let mut old: Vec<&EdgeRecord> = existing.iter().filter(|e| e.label == label).collect();
            let mut wanted: Vec<NodeId> = Vec::new();
            let mut pending: Vec<(SmolStr, SmolStr)> = Vec::new();

            for target in &slot.targets {
                let target_file = self.target_file(&target.location);
                if target_file == self.file_key {
                    match local.get(&target.fragment) {
                        Some(n) => wanted.push(*n),
                        None => pending.push((target_file, target.fragment.clone())),
                    }
                    continue;
                }
                match find_linked(store, &old, &wanted, &target_file, &target.fragment)? {
                    Some(n) => wanted.push(n),
                    None => pending.push((target_file, target.fragment.clone())),
                }
            }

            for target in wanted {
                let kept = old.iter().position(|e| {
                    e.target == target
                        && (e.flag(EDGE_PROP_CONTAINMENT), e.flag(EDGE_PROP_CONTAINER)) == flags
                });
                match kept {
                    Some(i) => {
                        old.swap_remove(i);
                    }
                    None => {
                        store.create_edge(node, target, &label, flag_props(flags.0, flags.1))?;
                        self.sink.reference_added(node, target, &label, false);
                    }
                }
            }
            for edge in old {
                store.delete_edge(edge.id)?;
                self.sink.reference_removed(node, edge.target, &label, false);
            }
            for (target_file, fragment) in pending {
                self.add_proxy(store, node, &target_file, &fragment, &label, slot)?;
            }
        }
        Ok(())
    }
}

/// An existing edge target matching a cross-file or fragment-only reference,
/// not already claimed by an earlier target of the same slot.
fn find_linked<S: GraphStore + ?Sized>(
    store: &S,
    old: &[&EdgeRecord],
    claimed: &[NodeId],
    target_file: &str,
    fragment: &str,
) -> Result<Option<NodeId>> {
    for edge in old {
        if claimed.contains(&edge.target) || !store.node_exists(edge.target) {
            continue;
        }
        let element = crate::graph::ElementNode(edge.target);
        if element.identifier(store)? != fragment {
            continue;
        }
        if target_file == PROXY_WILDCARD
            || element.file_key(store)?.as_deref() == Some(target_file)
        {
            return Ok(Some(edge.target));
        }
    }
    Ok(None)
}

/// Adds `node` under every key of `value` in an attribute index.
pub fn index_value<S: GraphStore + ?Sized>(
    store: &mut S,
    index: &str,
    value: &PropertyValue,
    node: NodeId,
) -> Result<()> {
    for key in value.index_keys() {
        store.index_add(index, &key, node)?;
    }
    Ok(())
}

pub fn unindex_value<S: GraphStore + ?Sized>(
    store: &mut S,
    index: &str,
    value: &PropertyValue,
    node: NodeId,
) -> Result<()> {
    for key in value.index_keys() {
        store.index_remove(index, Some(&key), node)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ListenerSet;
    use crate::graph::{FileNode, register_metamodel};
    use modelsync_api::{
        AttributeDescriptor, FileChange, MetamodelDescriptor, ReferenceTarget, TypeDescriptor,
        TypeRef,
    };
    use modelsync_store::MemoryGraphStore;

    fn shelf() -> MetamodelDescriptor {
        MetamodelDescriptor {
            uri: "http://shelf".into(),
            types: vec![TypeDescriptor {
                name: "Item".into(),
                is_abstract: false,
                supertypes: vec![],
                attributes: vec![AttributeDescriptor::many("labels", false, true)],
                references: vec![],
            }],
        }
    }

    #[test]
    fn created_element_carries_structure_and_canonical_attributes() {
        let mut store = MemoryGraphStore::new();
        register_metamodel(&mut store, &shelf()).unwrap();
        let listeners = ListenerSet::new();
        let mut cache = TypeCache::new();
        let mut proxies = ProxyDictionary::new();
        let change = FileChange::new("r", "/a", "1");

        store.begin_tx().unwrap();
        let file = FileNode::create(&mut store, &change).unwrap();
        let sink = ChangeSink::new(&listeners, change.clone());
        let mut writer =
            ElementWriter::new(&mut cache, &mut proxies, sink, file, change.file.render());
        let element = ModelElement::builder("i1", TypeRef::new("http://shelf", "Item"))
            .attr("labels", vec!["b", "a", "b"])
            .attr("colour", "red")
            .reference("next", ReferenceSlot::to([ReferenceTarget::anywhere("i9")]))
            .root()
            .build();
        let info = writer.type_info(&store, &element).unwrap().unwrap();
        let node = writer.create_element(&mut store, &element, &info).unwrap();
        writer.defer_references(&mut store, node, &element).unwrap();
        store.commit_tx().unwrap();

        assert_eq!(
            store.property(node, "labels").unwrap(),
            Some(PropertyValue::from(vec!["a", "b"]))
        );
        assert_eq!(store.property(node, "colour").unwrap(), None);
        assert_eq!(store.index_get(INDEX_ROOTS, "r||/a"), vec![node]);
        assert_eq!(store.index_get(INDEX_FRAGMENTS, "i1"), vec![node]);
        assert!(writer.touched.contains(PROXY_WILDCARD));
        assert_eq!(writer.stats.added, 1);
    }
}
