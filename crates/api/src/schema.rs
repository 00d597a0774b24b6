//! Names of the labels, properties and indexes the synchronizer writes.

// Edge labels
pub const EDGE_TYPE_OF: &str = "typeOf";
pub const EDGE_KIND_OF: &str = "kindOf";
pub const EDGE_FILE: &str = "file";
pub const EDGE_EPACKAGE: &str = "epackage";

/// Edge labels maintained by the synchronizer itself rather than the model.
pub const STRUCTURAL_EDGES: [&str; 3] = [EDGE_TYPE_OF, EDGE_KIND_OF, EDGE_FILE];

// Edge properties
pub const EDGE_PROP_CONTAINMENT: &str = "isContainment";
pub const EDGE_PROP_CONTAINER: &str = "isContainer";
pub const EDGE_PROP_DERIVED: &str = "isDerived";

// Node properties
pub const PROP_ID: &str = "id";
pub const PROP_SIGNATURE: &str = "_signature";
pub const PROP_ROOT: &str = "_root";
pub const PROP_URI: &str = "uri";
pub const PROP_NAME: &str = "name";
pub const PROP_REPOSITORY: &str = "repository";
pub const PROP_PATH: &str = "path";
pub const PROP_FILE_KEY: &str = "key";
pub const PROP_REVISION: &str = "revision";
pub const PROP_ABSTRACT: &str = "abstract";
pub const PROP_SUPERTYPES: &str = "supertypes";

/// Prefix of a proxy record property; the suffix is the target file key.
pub const PROXY_PREFIX: &str = "_proxyRef:";
/// Target file key for fragment-only proxies.
pub const PROXY_WILDCARD: &str = "*";

// Type node declaration prefixes
pub const ATTR_PREFIX: &str = "attr:";
pub const REF_PREFIX: &str = "ref:";
pub const DERIVED_PREFIX: &str = "derived:";

// Derived attribute nodes
pub const DERIVED_NAME: &str = "attribute";
pub const DERIVED_LANGUAGE: &str = "language";
pub const DERIVED_LOGIC: &str = "logic";
pub const DERIVED_VALUE: &str = "value";
pub const DERIVED_STATE: &str = "state";
pub const DERIVED_ACCESSES: &str = "_accesses";
pub const DERIVED_DECL: &str = "decl";
/// Prefix of the placeholder value of a derived attribute awaiting evaluation.
pub const NOT_YET_DERIVED: &str = "_NYD##";
/// Pseudo-property read when a derivation enumerates the instances of a type.
pub const INSTANCES_PROPERTY: &str = "_instances";

// Indexes
pub const INDEX_FILES: &str = "files";
pub const INDEX_METAMODELS: &str = "metamodels";
pub const INDEX_FRAGMENTS: &str = "fragments";
pub const INDEX_ROOTS: &str = "roots";
pub const INDEX_PROXIES: &str = "proxydictionary";
pub const INDEX_DERIVED_DIRTY: &str = "derived_dirty";
pub const INDEX_DERIVED_ACCESS: &str = "derived_access";

/// Name of the index kept for an indexed attribute.
pub fn indexed_attribute_index(metamodel: &str, type_name: &str, attribute: &str) -> String {
    format!("{}##{}##{}", metamodel, type_name, attribute)
}

pub fn is_structural_edge(label: &str) -> bool {
    STRUCTURAL_EDGES.contains(&label)
}
