use super::file::FileKey;
use super::value::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::fmt;

/// Fixed-size hash of an element's serialized state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signature(pub [u8; 16]);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn of(bytes: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(bytes).to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Reference to a type (classifier) of a metamodel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeRef {
    pub metamodel: SmolStr,
    pub name: SmolStr,
}

impl TypeRef {
    pub fn new(metamodel: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            metamodel: metamodel.into(),
            name: name.into(),
        }
    }

    /// Parses the `<metamodel-uri>#<type-name>` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (metamodel, name) = s.rsplit_once('#')?;
        if metamodel.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(metamodel, name))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.metamodel, self.name)
    }
}

/// Where the target of a reference lives.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetLocation {
    /// The resource being synchronized.
    #[default]
    SameFile,
    /// Another file of some repository.
    File(FileKey),
    /// Fragment-only addressing: the element may live in any indexed file.
    AnyFile,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceTarget {
    pub fragment: SmolStr,
    #[serde(default)]
    pub location: TargetLocation,
}

impl ReferenceTarget {
    pub fn local(fragment: impl Into<SmolStr>) -> Self {
        Self {
            fragment: fragment.into(),
            location: TargetLocation::SameFile,
        }
    }

    pub fn in_file(fragment: impl Into<SmolStr>, file: FileKey) -> Self {
        Self {
            fragment: fragment.into(),
            location: TargetLocation::File(file),
        }
    }

    pub fn anywhere(fragment: impl Into<SmolStr>) -> Self {
        Self {
            fragment: fragment.into(),
            location: TargetLocation::AnyFile,
        }
    }
}

/// The value of one set reference feature.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ReferenceSlot {
    #[serde(default)]
    pub containment: bool,
    #[serde(default)]
    pub container: bool,
    pub targets: Vec<ReferenceTarget>,
}

impl ReferenceSlot {
    pub fn to(targets: impl IntoIterator<Item = ReferenceTarget>) -> Self {
        Self {
            containment: false,
            container: false,
            targets: targets.into_iter().collect(),
        }
    }

    pub fn containing(targets: impl IntoIterator<Item = ReferenceTarget>) -> Self {
        Self {
            containment: true,
            ..Self::to(targets)
        }
    }

    pub fn container(target: ReferenceTarget) -> Self {
        Self {
            container: true,
            ..Self::to([target])
        }
    }
}

/// One parsed model element as handed over by a model resource.
///
/// Only set features are present: an attribute or reference missing from the
/// maps is unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelElement {
    pub identifier: SmolStr,
    pub signature: Signature,
    pub type_ref: TypeRef,
    pub attributes: Properties,
    pub references: BTreeMap<SmolStr, ReferenceSlot>,
    pub is_root: bool,
}

impl ModelElement {
    pub fn builder(identifier: impl Into<SmolStr>, type_ref: TypeRef) -> ElementBuilder {
        ElementBuilder {
            identifier: identifier.into(),
            type_ref,
            attributes: Properties::new(),
            references: BTreeMap::new(),
            is_root: false,
        }
    }

    /// Hash of type, attributes, references and root flag.
    pub fn compute_signature(&self) -> Signature {
        let state = (
            &self.type_ref,
            &self.attributes,
            &self.references,
            self.is_root,
        );
        // Keys are strings and floats fall back to `null`, so JSON encoding
        // has no failing case here; the Debug rendering is still state-specific.
        match serde_json::to_vec(&state) {
            Ok(bytes) => Signature::of(&bytes),
            Err(e) => {
                debug_assert!(false, "signature encoding failed: {}", e);
                Signature::of(format!("{:?}", state).as_bytes())
            }
        }
    }
}

pub struct ElementBuilder {
    identifier: SmolStr,
    type_ref: TypeRef,
    attributes: Properties,
    references: BTreeMap<SmolStr, ReferenceSlot>,
    is_root: bool,
}

impl ElementBuilder {
    pub fn attr(mut self, name: impl Into<SmolStr>, value: impl Into<PropertyValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn reference(mut self, name: impl Into<SmolStr>, slot: ReferenceSlot) -> Self {
        self.references.insert(name.into(), slot);
        self
    }

    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn build(self) -> ModelElement {
        let mut element = ModelElement {
            identifier: self.identifier,
            signature: Signature::default(),
            type_ref: self.type_ref,
            attributes: self.attributes,
            references: self.references,
            is_root: self.is_root,
        };
        element.signature = element.compute_signature();
        element
    }
}
