//! Schema and node-kind layer on top of the graph store.

pub mod metamodel;
pub mod nodes;

pub use metamodel::{RegisteredMetamodel, register_metamodel};
pub use nodes::{
    AttributeDecl, DerivedDecl, DerivedNode, DerivedState, ElementNode, FileNode, MetamodelNode,
    ReferenceDecl, TypeNode, is_attribute_key,
};
pub(crate) use nodes::flag_props;
