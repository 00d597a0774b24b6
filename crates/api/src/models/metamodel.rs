use super::element::TypeRef;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Schema of one metamodel namespace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetamodelDescriptor {
    pub uri: SmolStr,
    #[serde(default)]
    pub types: Vec<TypeDescriptor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub is_abstract: bool,
    /// Direct supertypes, possibly from other metamodels.
    #[serde(default)]
    pub supertypes: Vec<TypeRef>,
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    #[serde(default)]
    pub references: Vec<ReferenceDescriptor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_value_type")]
    pub value_type: SmolStr,
}

fn default_value_type() -> SmolStr {
    SmolStr::new_static("string")
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReferenceDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub containment: bool,
    #[serde(default)]
    pub container: bool,
    pub target: Option<TypeRef>,
}

/// Declaration of a derived attribute on a type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DerivedDeclaration {
    pub metamodel: SmolStr,
    pub type_name: SmolStr,
    pub attribute: SmolStr,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_value_type")]
    pub value_type: SmolStr,
    pub language: SmolStr,
    pub logic: String,
}

impl DerivedDeclaration {
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::new(self.metamodel.clone(), self.type_name.clone())
    }
}

impl AttributeDescriptor {
    pub fn single(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            many: false,
            ordered: false,
            unique: false,
            value_type: default_value_type(),
        }
    }

    pub fn many(name: impl Into<SmolStr>, ordered: bool, unique: bool) -> Self {
        Self {
            many: true,
            ordered,
            unique,
            ..Self::single(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_from_json() {
        let json = r#"{
            "uri": "http://lib",
            "types": [
                { "name": "Book", "attributes": [ { "name": "title" } ],
                  "references": [ { "name": "author", "target": { "metamodel": "http://lib", "name": "Person" } } ] }
            ]
        }"#;
        let mm: MetamodelDescriptor = serde_json::from_str(json).expect("valid descriptor");
        let book = &mm.types[0];
        assert!(!book.is_abstract);
        assert_eq!(book.attributes[0].value_type, "string");
        assert!(!book.references[0].containment);
    }
}
