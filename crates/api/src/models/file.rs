use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Separator between repository and path in a rendered file key.
pub const FILE_KEY_SEPARATOR: &str = "||";

/// Identity of an indexed file: repository location plus repository-relative path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileKey {
    pub repository: SmolStr,
    pub path: SmolStr,
}

impl FileKey {
    pub fn new(repository: impl Into<SmolStr>, path: impl AsRef<str>) -> Self {
        Self {
            repository: repository.into(),
            path: normalize_path(path.as_ref()),
        }
    }

    /// Rendered form used as index key and proxy key: `<repository>||<path>`.
    pub fn render(&self) -> SmolStr {
        SmolStr::from(format!(
            "{}{}{}",
            self.repository, FILE_KEY_SEPARATOR, self.path
        ))
    }

    pub fn parse(rendered: &str) -> Option<Self> {
        let (repository, path) = rendered.split_once(FILE_KEY_SEPARATOR)?;
        Some(Self::new(repository, path))
    }

    /// URI of an element living in this file.
    pub fn element_uri(&self, fragment: &str) -> SmolStr {
        SmolStr::from(format!("{}#{}", self.render(), fragment))
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repository, FILE_KEY_SEPARATOR, self.path)
    }
}

fn normalize_path(path: &str) -> SmolStr {
    let path = path.replace('\\', "/");
    if path.starts_with('/') {
        SmolStr::from(path)
    } else {
        SmolStr::from(format!("/{}", path))
    }
}

/// A reported change of one file at a given revision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileChange {
    pub file: FileKey,
    pub revision: SmolStr,
}

impl FileChange {
    pub fn new(
        repository: impl Into<SmolStr>,
        path: impl AsRef<str>,
        revision: impl Into<SmolStr>,
    ) -> Self {
        Self {
            file: FileKey::new(repository, path),
            revision: revision.into(),
        }
    }
}
