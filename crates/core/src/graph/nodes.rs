//! Typed views over labelled store nodes.

use crate::error::{Result, SyncError};
use modelsync_api::schema::*;
use modelsync_api::{
    DerivedDeclaration, FileChange, FileKey, GraphStore, NodeId, NodeLabel, Properties,
    PropertyValue, Signature, TypeRef,
};
use serde::Serialize;
use smol_str::SmolStr;

pub(crate) fn props<const N: usize>(pairs: [(&str, PropertyValue); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(k, v)| (SmolStr::new(k), v))
        .collect()
}

pub(crate) fn flag_props(containment: bool, container: bool) -> Properties {
    let mut p = Properties::new();
    if containment {
        p.insert(SmolStr::new_static(EDGE_PROP_CONTAINMENT), PropertyValue::Bool(true));
    }
    if container {
        p.insert(SmolStr::new_static(EDGE_PROP_CONTAINER), PropertyValue::Bool(true));
    }
    p
}

fn str_prop<S: GraphStore + ?Sized>(store: &S, node: NodeId, key: &str) -> Result<SmolStr> {
    match store.property(node, key)? {
        Some(PropertyValue::Str(s)) => Ok(SmolStr::from(s)),
        other => Err(SyncError::Corrupt(format!(
            "{} has no string property `{}` (found {:?})",
            node, key, other
        ))),
    }
}

/// Node representing one indexed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileNode {
    pub id: NodeId,
    pub key: FileKey,
    pub revision: Option<SmolStr>,
}

impl FileNode {
    pub fn find<S: GraphStore + ?Sized>(store: &S, key: &FileKey) -> Option<NodeId> {
        Self::find_rendered(store, &key.render())
    }

    pub fn find_rendered<S: GraphStore + ?Sized>(store: &S, rendered: &str) -> Option<NodeId> {
        store.index_get(INDEX_FILES, rendered).first().copied()
    }

    pub fn load<S: GraphStore + ?Sized>(store: &S, id: NodeId) -> Result<Self> {
        let repository = str_prop(store, id, PROP_REPOSITORY)?;
        let path = str_prop(store, id, PROP_PATH)?;
        let revision = store
            .property(id, PROP_REVISION)?
            .and_then(|v| v.as_str().map(SmolStr::new));
        Ok(Self {
            id,
            key: FileKey::new(repository, path),
            revision,
        })
    }

    pub fn all<S: GraphStore + ?Sized>(store: &S) -> Result<Vec<Self>> {
        store
            .nodes_with_label(NodeLabel::File)
            .into_iter()
            .map(|id| Self::load(store, id))
            .collect()
    }

    pub fn create<S: GraphStore + ?Sized>(store: &mut S, change: &FileChange) -> Result<NodeId> {
        let key = change.file.render();
        let id = store.create_node(
            NodeLabel::File,
            props([
                (PROP_REPOSITORY, change.file.repository.clone().into()),
                (PROP_PATH, change.file.path.clone().into()),
                (PROP_FILE_KEY, key.clone().into()),
                (PROP_REVISION, change.revision.clone().into()),
            ]),
        )?;
        store.index_add(INDEX_FILES, &key, id)?;
        Ok(id)
    }

    /// The change tag events about this file are reported under.
    pub fn change(&self) -> FileChange {
        FileChange {
            file: self.key.clone(),
            revision: self.revision.clone().unwrap_or_default(),
        }
    }

    pub fn set_revision<S: GraphStore + ?Sized>(
        store: &mut S,
        id: NodeId,
        revision: &str,
    ) -> Result<()> {
        store.set_property(id, PROP_REVISION, revision.into())?;
        Ok(())
    }

    /// Element nodes owned by the file, in creation order.
    pub fn elements<S: GraphStore + ?Sized>(store: &S, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(store
            .incoming(id, Some(EDGE_FILE))?
            .into_iter()
            .map(|e| e.source)
            .collect())
    }
}

/// View of one model element node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementNode(pub NodeId);

impl ElementNode {
    pub fn identifier<S: GraphStore + ?Sized>(self, store: &S) -> Result<SmolStr> {
        str_prop(store, self.0, PROP_ID)
    }

    pub fn signature<S: GraphStore + ?Sized>(self, store: &S) -> Result<Option<Signature>> {
        Ok(store
            .property(self.0, PROP_SIGNATURE)?
            .and_then(|v| v.as_bytes().and_then(Signature::from_bytes)))
    }

    pub fn type_node<S: GraphStore + ?Sized>(self, store: &S) -> Result<NodeId> {
        store
            .outgoing(self.0, Some(EDGE_TYPE_OF))?
            .first()
            .map(|e| e.target)
            .ok_or_else(|| SyncError::Corrupt(format!("{} has no typeOf edge", self.0)))
    }

    pub fn file_node<S: GraphStore + ?Sized>(self, store: &S) -> Result<Option<NodeId>> {
        Ok(store
            .outgoing(self.0, Some(EDGE_FILE))?
            .first()
            .map(|e| e.target))
    }

    pub fn file_key<S: GraphStore + ?Sized>(self, store: &S) -> Result<Option<SmolStr>> {
        match self.file_node(store)? {
            Some(file) => Ok(Some(str_prop(store, file, PROP_FILE_KEY)?)),
            None => Ok(None),
        }
    }

    /// URI under which other files refer to this element.
    pub fn uri<S: GraphStore + ?Sized>(self, store: &S) -> Result<SmolStr> {
        let id = self.identifier(store)?;
        let key = self.file_key(store)?.unwrap_or_default();
        Ok(SmolStr::from(format!("{}#{}", key, id)))
    }

    /// The element with `fragment` as identifier inside `file`.
    pub fn find_in_file<S: GraphStore + ?Sized>(
        store: &S,
        file: NodeId,
        fragment: &str,
    ) -> Result<Option<ElementNode>> {
        for candidate in store.index_get(INDEX_FRAGMENTS, fragment) {
            if ElementNode(candidate).file_node(store)? == Some(file) {
                return Ok(Some(ElementNode(candidate)));
            }
        }
        Ok(None)
    }

    /// Derived-attribute node attached under `name`, if any.
    pub fn derived_node<S: GraphStore + ?Sized>(
        self,
        store: &S,
        name: &str,
    ) -> Result<Option<NodeId>> {
        Ok(store
            .outgoing(self.0, Some(name))?
            .into_iter()
            .find(|e| e.flag(EDGE_PROP_DERIVED))
            .map(|e| e.target))
    }

    pub fn derived_nodes<S: GraphStore + ?Sized>(self, store: &S) -> Result<Vec<NodeId>> {
        Ok(store
            .outgoing(self.0, None)?
            .into_iter()
            .filter(|e| e.flag(EDGE_PROP_DERIVED))
            .map(|e| e.target)
            .collect())
    }
}

/// Whether a node property holds a model attribute rather than bookkeeping.
pub fn is_attribute_key(key: &str) -> bool {
    !key.starts_with('_') && key != PROP_ID
}

pub struct MetamodelNode;

impl MetamodelNode {
    pub fn find<S: GraphStore + ?Sized>(store: &S, uri: &str) -> Option<NodeId> {
        store.index_get(INDEX_METAMODELS, uri).first().copied()
    }

    pub fn types<S: GraphStore + ?Sized>(store: &S, metamodel: NodeId) -> Result<Vec<NodeId>> {
        Ok(store
            .incoming(metamodel, Some(EDGE_EPACKAGE))?
            .into_iter()
            .map(|e| e.source)
            .collect())
    }
}

pub struct TypeNode;

impl TypeNode {
    /// Looks a type up through the metamodel index; `Ok(None)` if the
    /// metamodel is registered but lacks the type.
    pub fn find<S: GraphStore + ?Sized>(store: &S, type_ref: &TypeRef) -> Result<Option<NodeId>> {
        let Some(metamodel) = MetamodelNode::find(store, &type_ref.metamodel) else {
            return Err(SyncError::MissingMetamodel(type_ref.clone()));
        };
        for ty in MetamodelNode::types(store, metamodel)? {
            if store.property(ty, PROP_NAME)?.as_ref().and_then(|v| v.as_str())
                == Some(type_ref.name.as_str())
            {
                return Ok(Some(ty));
            }
        }
        Ok(None)
    }

    pub fn type_ref<S: GraphStore + ?Sized>(store: &S, ty: NodeId) -> Result<TypeRef> {
        Ok(TypeRef::new(
            str_prop(store, ty, PROP_URI)?,
            str_prop(store, ty, PROP_NAME)?,
        ))
    }

    /// Elements whose type or supertype is `ty`.
    pub fn instances<S: GraphStore + ?Sized>(store: &S, ty: NodeId) -> Result<Vec<NodeId>> {
        let mut nodes: Vec<NodeId> = store
            .incoming(ty, Some(EDGE_TYPE_OF))?
            .into_iter()
            .chain(store.incoming(ty, Some(EDGE_KIND_OF))?)
            .map(|e| e.source)
            .collect();
        nodes.sort();
        nodes.dedup();
        Ok(nodes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeDecl {
    pub name: SmolStr,
    pub many: bool,
    pub ordered: bool,
    pub unique: bool,
    pub indexed: bool,
    pub value_type: SmolStr,
}

impl AttributeDecl {
    pub fn to_value(&self) -> PropertyValue {
        PropertyValue::List(vec![
            self.many.into(),
            self.ordered.into(),
            self.unique.into(),
            self.value_type.clone().into(),
            self.indexed.into(),
        ])
    }

    pub fn from_value(name: &str, value: &PropertyValue) -> Option<Self> {
        match value.as_list()? {
            [many, ordered, unique, value_type, indexed] => Some(Self {
                name: SmolStr::new(name),
                many: many.as_bool()?,
                ordered: ordered.as_bool()?,
                unique: unique.as_bool()?,
                value_type: SmolStr::new(value_type.as_str()?),
                indexed: indexed.as_bool()?,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceDecl {
    pub name: SmolStr,
    pub many: bool,
    pub containment: bool,
    pub container: bool,
    pub target: Option<TypeRef>,
}

impl ReferenceDecl {
    pub fn to_value(&self) -> PropertyValue {
        PropertyValue::List(vec![
            self.many.into(),
            self.containment.into(),
            self.container.into(),
            self.target
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default()
                .into(),
        ])
    }

    pub fn from_value(name: &str, value: &PropertyValue) -> Option<Self> {
        match value.as_list()? {
            [many, containment, container, target] => Some(Self {
                name: SmolStr::new(name),
                many: many.as_bool()?,
                containment: containment.as_bool()?,
                container: container.as_bool()?,
                target: TypeRef::parse(target.as_str()?),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedDecl {
    pub name: SmolStr,
    pub many: bool,
    pub ordered: bool,
    pub unique: bool,
    pub value_type: SmolStr,
    pub language: SmolStr,
    pub logic: String,
}

impl DerivedDecl {
    pub fn to_value(&self) -> PropertyValue {
        PropertyValue::List(vec![
            self.many.into(),
            self.ordered.into(),
            self.unique.into(),
            self.value_type.clone().into(),
            self.language.clone().into(),
            self.logic.clone().into(),
        ])
    }

    pub fn from_value(name: &str, value: &PropertyValue) -> Option<Self> {
        match value.as_list()? {
            [many, ordered, unique, value_type, language, logic] => Some(Self {
                name: SmolStr::new(name),
                many: many.as_bool()?,
                ordered: ordered.as_bool()?,
                unique: unique.as_bool()?,
                value_type: SmolStr::new(value_type.as_str()?),
                language: SmolStr::new(language.as_str()?),
                logic: logic.as_str()?.to_string(),
            }),
            _ => None,
        }
    }

    /// Placeholder stored until the attribute is first computed.
    pub fn sentinel(&self) -> PropertyValue {
        PropertyValue::Str(format!("{}{}", NOT_YET_DERIVED, self.logic))
    }
}

impl From<&DerivedDeclaration> for DerivedDecl {
    fn from(d: &DerivedDeclaration) -> Self {
        Self {
            name: d.attribute.clone(),
            many: d.many,
            ordered: d.ordered,
            unique: d.unique,
            value_type: d.value_type.clone(),
            language: d.language.clone(),
            logic: d.logic.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedState {
    Fresh,
    Dirty,
    Computing,
}

impl DerivedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedState::Fresh => "fresh",
            DerivedState::Dirty => "dirty",
            DerivedState::Computing => "computing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(DerivedState::Fresh),
            "dirty" => Some(DerivedState::Dirty),
            "computing" => Some(DerivedState::Computing),
            _ => None,
        }
    }
}

/// View of one derived-attribute node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedNode(pub NodeId);

impl DerivedNode {
    pub fn state<S: GraphStore + ?Sized>(self, store: &S) -> Result<DerivedState> {
        let raw = str_prop(store, self.0, DERIVED_STATE)?;
        DerivedState::parse(&raw)
            .ok_or_else(|| SyncError::Corrupt(format!("{} has unknown state {}", self.0, raw)))
    }

    pub fn decl<S: GraphStore + ?Sized>(self, store: &S) -> Result<DerivedDecl> {
        let name = str_prop(store, self.0, DERIVED_NAME)?;
        store
            .property(self.0, DERIVED_DECL)?
            .and_then(|v| DerivedDecl::from_value(&name, &v))
            .ok_or_else(|| SyncError::Corrupt(format!("{} has no derivation metadata", self.0)))
    }

    pub fn value<S: GraphStore + ?Sized>(self, store: &S) -> Result<Option<PropertyValue>> {
        Ok(store.property(self.0, DERIVED_VALUE)?)
    }

    /// The element the attribute belongs to.
    pub fn owner<S: GraphStore + ?Sized>(self, store: &S) -> Result<NodeId> {
        store
            .incoming(self.0, None)?
            .into_iter()
            .find(|e| e.flag(EDGE_PROP_DERIVED))
            .map(|e| e.source)
            .ok_or_else(|| SyncError::Corrupt(format!("{} has no owning element", self.0)))
    }

    /// Creates a dirty derived node under `owner`.
    pub fn create<S: GraphStore + ?Sized>(
        store: &mut S,
        owner: NodeId,
        decl: &DerivedDecl,
    ) -> Result<NodeId> {
        let node = store.create_node(
            NodeLabel::Derived,
            props([
                (DERIVED_NAME, decl.name.clone().into()),
                (DERIVED_LANGUAGE, decl.language.clone().into()),
                (DERIVED_LOGIC, decl.logic.clone().into()),
                (DERIVED_DECL, decl.to_value()),
                (DERIVED_VALUE, decl.sentinel()),
                (DERIVED_STATE, DerivedState::Dirty.as_str().into()),
            ]),
        )?;
        store.create_edge(
            owner,
            node,
            &decl.name,
            props([(EDGE_PROP_DERIVED, true.into())]),
        )?;
        store.index_add(INDEX_DERIVED_DIRTY, &decl.language, node)?;
        Ok(node)
    }

    /// Resets an existing node to dirty with (possibly new) metadata.
    pub fn reset<S: GraphStore + ?Sized>(self, store: &mut S, decl: &DerivedDecl) -> Result<()> {
        if let Ok(old) = self.decl(store) {
            if old.language != decl.language {
                store.index_remove(INDEX_DERIVED_DIRTY, Some(&old.language), self.0)?;
            }
        }
        store.set_property(self.0, DERIVED_LANGUAGE, decl.language.clone().into())?;
        store.set_property(self.0, DERIVED_LOGIC, decl.logic.clone().into())?;
        store.set_property(self.0, DERIVED_DECL, decl.to_value())?;
        self.mark_dirty(store, decl)
    }

    pub fn mark_dirty<S: GraphStore + ?Sized>(self, store: &mut S, decl: &DerivedDecl) -> Result<()> {
        store.set_property(self.0, DERIVED_VALUE, decl.sentinel())?;
        store.set_property(self.0, DERIVED_STATE, DerivedState::Dirty.as_str().into())?;
        store.index_add(INDEX_DERIVED_DIRTY, &decl.language, self.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_survive_property_encoding() {
        let attr = AttributeDecl {
            name: "tags".into(),
            many: true,
            ordered: false,
            unique: true,
            indexed: false,
            value_type: "string".into(),
        };
        assert_eq!(AttributeDecl::from_value("tags", &attr.to_value()), Some(attr));

        let reference = ReferenceDecl {
            name: "author".into(),
            many: false,
            containment: false,
            container: false,
            target: Some(TypeRef::new("http://lib", "Person")),
        };
        assert_eq!(
            ReferenceDecl::from_value("author", &reference.to_value()),
            Some(reference)
        );
    }

    #[test]
    fn derived_sentinel_embeds_logic() {
        let decl = DerivedDecl {
            name: "pages".into(),
            many: false,
            ordered: false,
            unique: false,
            value_type: "int".into(),
            language: "path".into(),
            logic: "count(self.chapters)".into(),
        };
        assert_eq!(
            decl.sentinel(),
            PropertyValue::from("_NYD##count(self.chapters)")
        );
        assert_eq!(DerivedState::parse("dirty"), Some(DerivedState::Dirty));
    }
}
