//! Memoized type lookups.

use crate::error::{Result, SyncError};
use crate::graph::{AttributeDecl, DerivedDecl, ReferenceDecl, TypeNode};
use modelsync_api::schema::*;
use modelsync_api::{GraphStore, NodeId, PropertyValue, TypeRef};
use smol_str::SmolStr;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything the synchronizer needs to know about one type, inherited
/// features included.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub node: NodeId,
    pub type_ref: TypeRef,
    pub is_abstract: bool,
    /// Transitive supertypes, nearest first.
    pub supertypes: Vec<NodeId>,
    pub attributes: BTreeMap<SmolStr, AttributeDecl>,
    /// Type declaring each attribute, for inherited ones a supertype.
    pub attribute_owners: BTreeMap<SmolStr, TypeRef>,
    pub references: BTreeMap<SmolStr, ReferenceDecl>,
    pub derived: BTreeMap<SmolStr, DerivedDecl>,
}

impl TypeInfo {
    pub fn indexed_attributes(&self) -> impl Iterator<Item = &AttributeDecl> {
        self.attributes.values().filter(|a| a.indexed)
    }

    /// Index name for an indexed attribute, keyed by the declaring type.
    pub fn attribute_index(&self, attribute: &str) -> String {
        let owner = self.attribute_owners.get(attribute).unwrap_or(&self.type_ref);
        indexed_attribute_index(&owner.metamodel, &owner.name, attribute)
    }

    /// The type node plus all supertype nodes.
    pub fn kinds(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.node).chain(self.supertypes.iter().copied())
    }
}

/// Two-level memo: classifier to type node, type node to its feature map.
///
/// Valid for one sync session; clear it whenever the schema changes.
#[derive(Debug, Default)]
pub struct TypeCache {
    type_nodes: HashMap<TypeRef, NodeId>,
    type_properties: HashMap<NodeId, Arc<TypeInfo>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.type_nodes.clear();
        self.type_properties.clear();
    }

    pub fn len(&self) -> usize {
        self.type_properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.type_properties.is_empty()
    }

    pub fn type_node<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        type_ref: &TypeRef,
    ) -> Result<NodeId> {
        if let Some(node) = self.type_nodes.get(type_ref) {
            return Ok(*node);
        }
        let node = TypeNode::find(store, type_ref)?
            .ok_or_else(|| SyncError::MissingMetamodel(type_ref.clone()))?;
        self.type_nodes.insert(type_ref.clone(), node);
        Ok(node)
    }

    pub fn type_properties<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        type_node: NodeId,
    ) -> Result<Arc<TypeInfo>> {
        let mut visiting = Vec::new();
        self.load(store, type_node, &mut visiting)
    }

    pub fn type_info<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        type_ref: &TypeRef,
    ) -> Result<Arc<TypeInfo>> {
        let node = self.type_node(store, type_ref)?;
        self.type_properties(store, node)
    }

    fn load<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        node: NodeId,
        visiting: &mut Vec<NodeId>,
    ) -> Result<Arc<TypeInfo>> {
        if let Some(info) = self.type_properties.get(&node) {
            return Ok(info.clone());
        }
        visiting.push(node);

        let type_ref = TypeNode::type_ref(store, node)?;
        let is_abstract = store
            .property(node, PROP_ABSTRACT)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let mut attributes = BTreeMap::new();
        let mut references = BTreeMap::new();
        let mut derived = BTreeMap::new();
        for key in store.property_keys(node)? {
            let Some(value) = store.property(node, &key)? else {
                continue;
            };
            if let Some(name) = key.strip_prefix(ATTR_PREFIX) {
                if let Some(decl) = AttributeDecl::from_value(name, &value) {
                    attributes.insert(decl.name.clone(), decl);
                }
            } else if let Some(name) = key.strip_prefix(REF_PREFIX) {
                if let Some(decl) = ReferenceDecl::from_value(name, &value) {
                    references.insert(decl.name.clone(), decl);
                }
            } else if let Some(name) = key.strip_prefix(DERIVED_PREFIX) {
                if let Some(decl) = DerivedDecl::from_value(name, &value) {
                    derived.insert(decl.name.clone(), decl);
                }
            }
        }

        let direct: Vec<TypeRef> = match store.property(node, PROP_SUPERTYPES)? {
            Some(PropertyValue::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().and_then(TypeRef::parse))
                .collect(),
            _ => Vec::new(),
        };

        let mut attribute_owners: BTreeMap<SmolStr, TypeRef> = attributes
            .keys()
            .map(|name| (name.clone(), type_ref.clone()))
            .collect();
        let mut supertypes = Vec::new();
        for super_ref in direct {
            let super_node = match self.type_node(store, &super_ref) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Supertype {} of {} unavailable: {}", super_ref, type_ref, e);
                    continue;
                }
            };
            if visiting.contains(&super_node) {
                tracing::warn!("Cyclic supertype {} of {}", super_ref, type_ref);
                continue;
            }
            let super_info = self.load(store, super_node, visiting)?;
            for n in super_info.kinds() {
                if !supertypes.contains(&n) {
                    supertypes.push(n);
                }
            }
            for (name, decl) in &super_info.attributes {
                if !attributes.contains_key(name) {
                    attributes.insert(name.clone(), decl.clone());
                    let owner = super_info
                        .attribute_owners
                        .get(name)
                        .unwrap_or(&super_info.type_ref);
                    attribute_owners.insert(name.clone(), owner.clone());
                }
            }
            for (name, decl) in &super_info.references {
                references.entry(name.clone()).or_insert_with(|| decl.clone());
            }
            for (name, decl) in &super_info.derived {
                derived.entry(name.clone()).or_insert_with(|| decl.clone());
            }
        }

        visiting.pop();
        let info = Arc::new(TypeInfo {
            node,
            type_ref,
            is_abstract,
            supertypes,
            attributes,
            attribute_owners,
            references,
            derived,
        });
        self.type_properties.insert(node, info.clone());
        Ok(info)
    }
}
