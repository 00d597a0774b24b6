//! Model and metamodel files of a project directory.
//!
//! Metamodels are `*.metamodel.json` files holding one
//! [`MetamodelDescriptor`]. Models are `*.model.json` files:
//!
//! ```json
//! { "elements": [
//!     { "id": "b0", "type": "http://lib#Book", "root": true,
//!       "attributes": { "name": "Dune", "pages": 412 },
//!       "references": { "author": { "targets": ["people.model.json#p"] } } }
//! ] }
//! ```
//!
//! A target is `fragment` (same file), `path#fragment` (path relative to the
//! project root) or `*#fragment` (any file).

use modelsync_api::schema::PROXY_WILDCARD;
use modelsync_api::{
    FileChange, FileKey, MetamodelDescriptor, ModelElement, ParsedResource, PropertyValue,
    ReferenceSlot, ReferenceTarget, TypeRef,
};
use serde::Deserialize;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

pub const MODEL_SUFFIX: &str = ".model.json";
pub const METAMODEL_SUFFIX: &str = ".metamodel.json";

#[derive(Deserialize)]
struct ModelFile {
    #[serde(default)]
    elements: Vec<ElementEntry>,
}

#[derive(Deserialize)]
struct ElementEntry {
    id: SmolStr,
    #[serde(rename = "type")]
    type_ref: String,
    #[serde(default)]
    root: bool,
    #[serde(default)]
    attributes: BTreeMap<SmolStr, serde_json::Value>,
    #[serde(default)]
    references: BTreeMap<SmolStr, ReferenceEntry>,
}

#[derive(Deserialize)]
struct ReferenceEntry {
    #[serde(default)]
    containment: bool,
    #[serde(default)]
    container: bool,
    #[serde(default)]
    targets: Vec<String>,
}

/// A model file read from disk.
pub struct LoadedModel {
    pub change: FileChange,
    pub resource: ParsedResource,
}

/// A project root synchronized as one repository.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub repository: SmolStr,
}

impl Project {
    /// `repository` defaults to the name of the root directory.
    pub fn new(root: PathBuf, repository: Option<String>) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        let repository = repository
            .or_else(|| {
                root.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "default".to_string());
        Self {
            root,
            repository: repository.into(),
        }
    }

    fn files_with_suffix(&self, suffix: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_suffix(path, suffix))
            .collect();
        files.sort();
        files
    }

    pub fn model_files(&self) -> Vec<PathBuf> {
        self.files_with_suffix(MODEL_SUFFIX)
    }

    pub fn metamodel_files(&self) -> Vec<PathBuf> {
        self.files_with_suffix(METAMODEL_SUFFIX)
    }

    pub fn is_model_file(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && has_suffix(path, MODEL_SUFFIX)
    }

    /// Store key of a file under the root.
    pub fn file_key(&self, path: &Path) -> FileKey {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        FileKey::new(self.repository.clone(), relative.to_string_lossy())
    }

    pub fn load_metamodels(&self) -> Result<Vec<MetamodelDescriptor>, Box<dyn Error + Send + Sync>> {
        let mut descriptors = Vec::new();
        for path in self.metamodel_files() {
            let text = std::fs::read_to_string(&path)?;
            let descriptor: MetamodelDescriptor = serde_json::from_str(&text)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    /// Reads and converts one model file; the revision is the content hash.
    pub fn load_model(&self, path: &Path) -> Result<LoadedModel, Box<dyn Error + Send + Sync>> {
        let bytes = std::fs::read(path)?;
        let key = self.file_key(path);
        let model: ModelFile = serde_json::from_slice(&bytes)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let mut resource = ParsedResource::new(Vec::with_capacity(model.elements.len()));
        for entry in model.elements {
            resource.push(
                self.convert(entry)
                    .map_err(|e| format!("{}: {}", path.display(), e))?,
            );
        }
        Ok(LoadedModel {
            change: FileChange {
                file: key,
                revision: revision_of(&bytes),
            },
            resource,
        })
    }

    fn convert(&self, entry: ElementEntry) -> Result<ModelElement, String> {
        let type_ref = TypeRef::parse(&entry.type_ref).ok_or_else(|| {
            format!(
                "element `{}`: type `{}` is not <uri>#<name>",
                entry.id, entry.type_ref
            )
        })?;
        let mut builder = ModelElement::builder(entry.id.clone(), type_ref);
        for (name, json) in &entry.attributes {
            let value = json_value(json)
                .map_err(|e| format!("element `{}`, attribute `{}`: {}", entry.id, name, e))?;
            if let Some(value) = value {
                builder = builder.attr(name.clone(), value);
            }
        }
        for (name, reference) in entry.references {
            let slot = ReferenceSlot {
                containment: reference.containment,
                container: reference.container,
                targets: reference
                    .targets
                    .iter()
                    .map(|target| self.target(target))
                    .collect(),
            };
            builder = builder.reference(name, slot);
        }
        if entry.root {
            builder = builder.root();
        }
        Ok(builder.build())
    }

    fn target(&self, text: &str) -> ReferenceTarget {
        match text.split_once('#') {
            Some((PROXY_WILDCARD, fragment)) => ReferenceTarget::anywhere(fragment),
            Some((path, fragment)) => {
                ReferenceTarget::in_file(fragment, FileKey::new(self.repository.clone(), path))
            }
            None => ReferenceTarget::local(text),
        }
    }
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}

/// Hex xxh3 of the file content.
pub fn revision_of(bytes: &[u8]) -> SmolStr {
    SmolStr::from(format!("{:016x}", xxh3_64(bytes)))
}

/// `null` leaves the attribute unset.
fn json_value(json: &serde_json::Value) -> Result<Option<PropertyValue>, String> {
    use serde_json::Value;
    Ok(Some(match json {
        Value::Null => return Ok(None),
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => PropertyValue::Int(i),
            None => PropertyValue::Float(n.as_f64().ok_or("number out of range")?),
        },
        Value::String(s) => PropertyValue::Str(s.clone()),
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                if let Some(value) = json_value(item)? {
                    values.push(value);
                }
            }
            PropertyValue::List(values)
        }
        Value::Object(_) => return Err("objects are not attribute values".to_string()),
    }))
}
