use super::delta::FileDelta;
use super::insert::{ElementWriter, index_value, unindex_value};
use super::normalize::normalize;
use crate::cache::TypeInfo;
use crate::error::Result;
use modelsync_api::schema::*;
use modelsync_api::{GraphStore, ModelElement, NodeId, PropertyValue};
use smol_str::SmolStr;
use std::collections::HashMap;

impl ElementWriter<'_> {
    /// Applies a delta node by node inside the caller's transaction.
    ///
    /// Retyped elements go first, then attribute updates, insertions,
    /// reference reconciliation and finally removals.
    pub fn apply_patch<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        delta: FileDelta,
    ) -> Result<()> {
        let mut local: HashMap<SmolStr, NodeId> = delta.unchanged.iter().cloned().collect();
        for (node, element) in &delta.updated {
            local.insert(element.identifier.clone(), *node);
        }
        let mut relink: Vec<(NodeId, &ModelElement)> = Vec::new();

        for (old, element) in &delta.retyped {
            self.remove_elements(store, &[old.node])?;
            let Some(info) = self.type_info(store, element)? else {
                continue;
            };
            let node = self.create_element(store, element, &info)?;
            self.stats.removed -= 1;
            self.stats.added -= 1;
            self.stats.retyped += 1;
            local.insert(element.identifier.clone(), node);
            relink.push((node, element));
        }

        for (node, element) in &delta.updated {
            let Some(info) = self.type_info(store, element)? else {
                continue;
            };
            self.update_element(store, *node, element, &info)?;
            relink.push((*node, element));
        }

        for element in &delta.added {
            let Some(info) = self.type_info(store, element)? else {
                continue;
            };
            let node = self.create_element(store, element, &info)?;
            local.insert(element.identifier.clone(), node);
            relink.push((node, element));
        }

        for (node, element) in relink {
            self.set_references(store, node, element, &local)?;
        }

        let removed: Vec<NodeId> = delta.removed.values().map(|s| s.node).collect();
        self.remove_elements(store, &removed)?;

        self.stats.unchanged += delta.unchanged.len();
        Ok(())
    }

    /// Rewrites signature, root flag and attributes of an element whose
    /// signature changed. Only attributes whose canonical value differs are
    /// written.
    fn update_element<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        node: NodeId,
        element: &ModelElement,
        info: &TypeInfo,
    ) -> Result<()> {
        self.proxies.clear_node(store, node)?;
        store.set_property(
            node,
            PROP_SIGNATURE,
            PropertyValue::Bytes(element.signature.as_bytes().to_vec()),
        )?;

        let was_root = store
            .property(node, PROP_ROOT)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if element.is_root && !was_root {
            store.set_property(node, PROP_ROOT, true.into())?;
            store.index_add(INDEX_ROOTS, &self.file_key, node)?;
        } else if !element.is_root && was_root {
            store.remove_property(node, PROP_ROOT)?;
            store.index_remove(INDEX_ROOTS, Some(&self.file_key), node)?;
        }

        for (name, decl) in &info.attributes {
            let new = element
                .attributes
                .get(name)
                .map(|v| normalize(decl, v.clone()));
            let old = store.property(node, name)?;
            if old == new {
                continue;
            }
            let index = decl.indexed.then(|| info.attribute_index(name));
            if let (Some(index), Some(old)) = (&index, &old) {
                unindex_value(store, index, old, node)?;
            }
            match new {
                Some(value) => {
                    store.set_property(node, name, value.clone())?;
                    if let Some(index) = &index {
                        index_value(store, index, &value, node)?;
                    }
                    self.sink.attribute_updated(node, name, value);
                }
                None => {
                    store.remove_property(node, name)?;
                    self.sink.attribute_removed(node, name);
                }
            }
        }

        self.stats.updated += 1;
        Ok(())
    }
}
