//! # Blob Store
//!
//! Named binary payloads under hierarchical namespaces such as
//! `sentences/<id>` or `collections/<long_id>`. The index never treats a blob
//! as authoritative: a payload whose owner is missing from the relational
//! store is an orphan and is never surfaced.

use crate::types::{DimdirError, UnitId, storage};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Bytes(Vec<u8>),
    Vector(Vec<f32>),
}

impl Payload {
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }

    /// Interpret the payload as UTF-8 text.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Bytes(bytes) => String::from_utf8(bytes).ok(),
            Self::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Bytes(_) => None,
        }
    }
}

/// Blob store contract.
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Store a payload, replacing any previous one under the same key.
    fn put(&self, namespace: &str, key: &str, payload: Payload) -> Result<(), DimdirError>;

    /// Fetch a payload. `None` is the NotFound outcome.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Payload>, DimdirError>;

    /// Remove a payload. Returns `false` if it was absent.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool, DimdirError>;

    /// Keys stored directly in `namespace`, sorted.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, DimdirError>;

    /// Names of the namespaces directly below `namespace`, sorted.
    fn children(&self, namespace: &str) -> Result<Vec<String>, DimdirError>;
}

/// Check one namespace or key component.
fn validate_component(component: &str) -> Result<(), DimdirError> {
    let bad = component.is_empty()
        || component == "."
        || component == ".."
        || component
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0' | '\n' | '\r'));
    if bad {
        return Err(DimdirError::InvalidContent(format!(
            "invalid blob path component '{component}'"
        )));
    }
    Ok(())
}

/// Prefix of in-flight temp files in [`FsBlobStore`]. Keys may not use it.
const TEMP_PREFIX: char = '~';

fn validate_namespace(namespace: &str) -> Result<(), DimdirError> {
    namespace.split('/').try_for_each(validate_component)
}

// =============================================================================
// IN-MEMORY BLOBS
// =============================================================================

/// Blob store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<(String, String), Payload>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, namespace: &str, key: &str, payload: Payload) -> Result<(), DimdirError> {
        validate_namespace(namespace)?;
        validate_component(key)?;
        self.blobs
            .write()
            .insert((namespace.to_string(), key.to_string()), payload);
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Payload>, DimdirError> {
        Ok(self
            .blobs
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, DimdirError> {
        Ok(self
            .blobs
            .write()
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, DimdirError> {
        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn children(&self, namespace: &str) -> Result<Vec<String>, DimdirError> {
        let prefix = format!("{namespace}/");
        let names: BTreeSet<String> = self
            .blobs
            .read()
            .keys()
            .filter_map(|(ns, _)| ns.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }
}

// =============================================================================
// FILESYSTEM BLOBS
// =============================================================================

/// Blob store mapping namespaces to directories and keys to files.
///
/// Files carry a postcard-encoded [`Payload`].
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a blob tree rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DimdirError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(storage)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, namespace: &str) -> Result<PathBuf, DimdirError> {
        validate_namespace(namespace)?;
        Ok(namespace
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part)))
    }

    fn file(&self, namespace: &str, key: &str) -> Result<PathBuf, DimdirError> {
        validate_component(key)?;
        if key.starts_with(TEMP_PREFIX) {
            return Err(DimdirError::InvalidContent(format!("invalid blob key '{key}'")));
        }
        Ok(self.dir(namespace)?.join(key))
    }

    fn list(&self, namespace: &str, want_dirs: bool) -> Result<Vec<String>, DimdirError> {
        let dir = self.dir(namespace)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage(e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(storage)?;
            let is_dir = entry.file_type().map_err(storage)?.is_dir();
            if is_dir == want_dirs {
                if let Some(name) = entry.file_name().to_str() {
                    if is_dir || !name.starts_with(TEMP_PREFIX) {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, namespace: &str, key: &str, payload: Payload) -> Result<(), DimdirError> {
        let path = self.file(namespace, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        let bytes = postcard::to_allocvec(&payload).map_err(storage)?;
        // Write to a sibling temp file unique to this call, then rename over
        // the target
        let tmp = path.with_file_name(format!("{TEMP_PREFIX}{key}.{}.tmp", UnitId::mint()));
        fs::write(&tmp, bytes).map_err(storage)?;
        fs::rename(&tmp, &path).map_err(storage)
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Payload>, DimdirError> {
        let path = self.file(namespace, key)?;
        match fs::read(&path) {
            Ok(bytes) => postcard::from_bytes(&bytes).map(Some).map_err(storage),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage(e)),
        }
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, DimdirError> {
        let path = self.file(namespace, key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                // Drop the namespace directory once it is empty
                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent);
                }
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage(e)),
        }
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, DimdirError> {
        self.list(namespace, false)
    }

    fn children(&self, namespace: &str) -> Result<Vec<String>, DimdirError> {
        self.list(namespace, true)
    }
}

// =============================================================================
// TESTS
// =============================================================================
