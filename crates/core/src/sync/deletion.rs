use super::insert::ElementWriter;
use crate::error::Result;
use crate::graph::ElementNode;
use crate::proxy::ProxyTuple;
use modelsync_api::schema::*;
use modelsync_api::{ChangeEvent, GraphStore, NodeId};
use std::collections::HashSet;

impl ElementWriter<'_> {
    /// Deletes a set of elements of the current file.
    ///
    /// References into the set from surviving elements are turned back into
    /// proxies keyed on the removed element's file, so that the element
    /// relinks if it reappears. References between removed elements vanish.
    pub fn remove_elements<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        nodes: &[NodeId],
    ) -> Result<()> {
        let removed: HashSet<NodeId> = nodes.iter().copied().collect();
        for node in nodes {
            if store.node_exists(*node) {
                self.remove_element(store, *node, &removed)?;
            }
        }
        Ok(())
    }

    fn remove_element<S: GraphStore + ?Sized>(
        &mut self,
        store: &mut S,
        node: NodeId,
        removed: &HashSet<NodeId>,
    ) -> Result<()> {
        let element = ElementNode(node);
        let identifier = element.identifier(store)?;
        let type_node = element.type_node(store)?;
        let file_key = element
            .file_key(store)?
            .unwrap_or_else(|| self.file_key.clone());

        for edge in store.outgoing(node, None)? {
            if edge.flag(EDGE_PROP_DERIVED) {
                continue;
            }
            store.delete_edge(edge.id)?;
            self.sink.reference_removed(
                node,
                edge.target,
                &edge.label,
                is_structural_edge(&edge.label),
            );
        }

        for derived in element.derived_nodes(store)? {
            // also drops its dirty and access index entries
            store.delete_node(derived)?;
        }

        let dropped = self.proxies.clear_node(store, node)?;
        if dropped > 0 {
            tracing::debug!("{}: dropped {} pending proxies", identifier, dropped);
        }

        for edge in store.incoming(node, None)? {
            store.delete_edge(edge.id)?;
            self.sink
                .reference_removed(edge.source, node, &edge.label, false);
            if removed.contains(&edge.source) {
                continue;
            }
            let tuple = ProxyTuple::new(
                &file_key,
                &identifier,
                &edge.label,
                edge.flag(EDGE_PROP_CONTAINMENT),
                edge.flag(EDGE_PROP_CONTAINER),
            );
            if self.proxies.add(store, edge.source, &file_key, tuple)? {
                self.touched.insert(file_key.clone());
            }
        }

        store.delete_node(node)?;
        self.sink.record(ChangeEvent::ElementRemoved {
            node,
            identifier,
            type_node,
        });
        self.stats.removed += 1;
        Ok(())
    }
}
