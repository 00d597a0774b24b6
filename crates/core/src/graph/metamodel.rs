use super::nodes::{AttributeDecl, MetamodelNode, ReferenceDecl, props};
use crate::error::Result;
use crate::tx::StoreTx;
use modelsync_api::schema::*;
use modelsync_api::{GraphStore, MetamodelDescriptor, NodeId, NodeLabel, Properties, PropertyValue};
use serde::Serialize;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredMetamodel {
    pub node: NodeId,
    pub types_created: usize,
    pub already_present: bool,
}

/// Writes a metamodel node and one type node per declared type.
///
/// Registering a URI twice leaves the first registration in place.
pub fn register_metamodel<S: GraphStore + ?Sized>(
    store: &mut S,
    descriptor: &MetamodelDescriptor,
) -> Result<RegisteredMetamodel> {
    if let Some(node) = MetamodelNode::find(store, &descriptor.uri) {
        tracing::debug!("Metamodel {} already registered", descriptor.uri);
        return Ok(RegisteredMetamodel {
            node,
            types_created: 0,
            already_present: true,
        });
    }

    let mut tx = StoreTx::begin(store)?;
    let node = tx.create_node(
        NodeLabel::Metamodel,
        props([(PROP_URI, descriptor.uri.clone().into())]),
    )?;
    tx.index_add(INDEX_METAMODELS, &descriptor.uri, node)?;

    for ty in &descriptor.types {
        let mut properties = Properties::new();
        properties.insert(SmolStr::new_static(PROP_NAME), ty.name.clone().into());
        properties.insert(SmolStr::new_static(PROP_URI), descriptor.uri.clone().into());
        properties.insert(SmolStr::new_static(PROP_ABSTRACT), ty.is_abstract.into());
        properties.insert(
            SmolStr::new_static(PROP_SUPERTYPES),
            PropertyValue::List(
                ty.supertypes
                    .iter()
                    .map(|s| PropertyValue::Str(s.to_string()))
                    .collect(),
            ),
        );
        for attr in &ty.attributes {
            let decl = AttributeDecl {
                name: attr.name.clone(),
                many: attr.many,
                ordered: attr.ordered,
                unique: attr.unique,
                indexed: false,
                value_type: attr.value_type.clone(),
            };
            properties.insert(
                SmolStr::from(format!("{}{}", ATTR_PREFIX, attr.name)),
                decl.to_value(),
            );
        }
        for reference in &ty.references {
            let decl = ReferenceDecl {
                name: reference.name.clone(),
                many: reference.many,
                containment: reference.containment,
                container: reference.container,
                target: reference.target.clone(),
            };
            properties.insert(
                SmolStr::from(format!("{}{}", REF_PREFIX, reference.name)),
                decl.to_value(),
            );
        }

        let type_node = tx.create_node(NodeLabel::Type, properties)?;
        tx.create_edge(type_node, node, EDGE_EPACKAGE, Properties::new())?;
    }
    tx.commit()?;

    tracing::info!(
        "Registered metamodel {} with {} types",
        descriptor.uri,
        descriptor.types.len()
    );
    Ok(RegisteredMetamodel {
        node,
        types_created: descriptor.types.len(),
        already_present: false,
    })
}
