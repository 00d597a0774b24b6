//! Secondary indexes over attribute values.

use crate::cache::TypeCache;
use crate::error::{Result, SyncError};
use crate::graph::{AttributeDecl, TypeNode};
use crate::sync::insert::index_value;
use crate::tx::StoreTx;
use modelsync_api::schema::ATTR_PREFIX;
use modelsync_api::{GraphStore, NodeId, PropertyValue, TypeRef};
use std::collections::HashSet;

/// Flags `attribute` of a type as indexed and indexes every existing instance.
///
/// The flag lives on the type declaring the attribute, so subtypes share the
/// index. Returns the number of instances written into the index.
pub fn register_indexed_attribute<S: GraphStore + ?Sized>(
    store: &mut S,
    cache: &mut TypeCache,
    metamodel: &str,
    type_name: &str,
    attribute: &str,
) -> Result<usize> {
    let type_ref = TypeRef::new(metamodel, type_name);
    let info = cache.type_info(store, &type_ref)?;
    let Some(decl) = info.attributes.get(attribute) else {
        return Err(SyncError::NotFound(format!(
            "attribute `{}` of {}",
            attribute, type_ref
        )));
    };
    if decl.indexed {
        tracing::debug!("{}.{} is already indexed", type_ref, attribute);
        return Ok(0);
    }
    let owner_ref = info
        .attribute_owners
        .get(attribute)
        .cloned()
        .unwrap_or_else(|| type_ref.clone());
    let owner = cache.type_node(store, &owner_ref)?;
    let index = info.attribute_index(attribute);
    let flagged = AttributeDecl {
        indexed: true,
        ..decl.clone()
    };

    let mut tx = StoreTx::begin(store)?;
    tx.set_property(
        owner,
        &format!("{}{}", ATTR_PREFIX, attribute),
        flagged.to_value(),
    )?;
    let mut indexed = 0;
    for node in TypeNode::instances(&*tx, owner)? {
        if let Some(value) = tx.property(node, attribute)? {
            index_value(&mut *tx, &index, &value, node)?;
            indexed += 1;
        }
    }
    tx.commit()?;
    cache.clear();

    tracing::info!("Indexed {} ({} instances)", index, indexed);
    Ok(indexed)
}

/// Elements of `type_ref` (or a subtype) whose indexed `attribute` holds
/// `value`; for list values, any member.
pub fn lookup<S: GraphStore + ?Sized>(
    store: &S,
    cache: &mut TypeCache,
    type_ref: &TypeRef,
    attribute: &str,
    value: &PropertyValue,
) -> Result<Vec<NodeId>> {
    let info = cache.type_info(store, type_ref)?;
    if !info.attributes.get(attribute).is_some_and(|d| d.indexed) {
        return Err(SyncError::NotFound(format!(
            "index on `{}` of {}",
            attribute, type_ref
        )));
    }
    let index = info.attribute_index(attribute);
    // the index is shared with sibling subtypes of the declaring type
    let members: HashSet<NodeId> = TypeNode::instances(store, cache.type_node(store, type_ref)?)?
        .into_iter()
        .collect();
    let mut nodes = Vec::new();
    for key in value.index_keys() {
        for node in store.index_get(&index, &key) {
            if members.contains(&node) && !nodes.contains(&node) {
                nodes.push(node);
            }
        }
    }
    Ok(nodes)
}
