use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use mime::Mime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::UploadLimits;

/// Failures raised by a file store backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to write `{path}`: {reason}")]
    Write { path: String, reason: String },
    #[error("unable to read `{path}`: {reason}")]
    Read { path: String, reason: String },
    #[error("unable to delete `{path}`: {reason}")]
    Delete { path: String, reason: String },
    #[error("file `{0}` does not exist")]
    Missing(String),
    #[error("storage path `{0}` escapes the store root")]
    InvalidPath(String),
}

/// Blob storage addressed by logical path strings.
///
/// `delete` of a missing path is not an error and reports `false`. `copy` reports `false`
/// when the source does not exist.
pub trait FileStore: Send + Sync {
    fn store(
        &self,
        prefix: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StorageError>;
    fn delete(&self, path: &str) -> Result<bool, StorageError>;
    fn exists(&self, path: &str) -> Result<bool, StorageError>;
    fn copy(&self, source: &str, destination: &str) -> Result<bool, StorageError>;
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

/// Fresh collision-resistant path under `prefix`, keeping `extension` when given.
pub fn unique_path(prefix: &str, extension: Option<&str>) -> String {
    let prefix = prefix.trim_matches('/');
    let name = Uuid::new_v4().simple().to_string();
    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{prefix}/{name}.{}", ext.to_ascii_lowercase()),
        None => format!("{prefix}/{name}"),
    }
}

pub fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|ext| ext.to_str())
}

/// Disk-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_parent(target: &Path, path: &str) -> Result<(), StorageError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::Write {
                path: path.to_string(),
                reason: err.to_string(),
            })?;
        }
        Ok(())
    }
}

impl FileStore for LocalFileStore {
    fn store(
        &self,
        prefix: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let path = unique_path(prefix, extension);
        let target = self.resolve(&path)?;
        Self::ensure_parent(&target, &path)?;
        fs::write(&target, bytes).map_err(|err| StorageError::Write {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        Ok(path)
    }

    fn delete(&self, path: &str) -> Result<bool, StorageError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Delete {
                path: path.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.is_file())
    }

    fn copy(&self, source: &str, destination: &str) -> Result<bool, StorageError> {
        let from = self.resolve(source)?;
        if !from.is_file() {
            return Ok(false);
        }
        let to = self.resolve(destination)?;
        Self::ensure_parent(&to, destination)?;
        fs::copy(&from, &to).map_err(|err| StorageError::Write {
            path: destination.to_string(),
            reason: err.to_string(),
        })?;
        Ok(true)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StorageError::Missing(path.to_string()),
            _ => StorageError::Read {
                path: path.to_string(),
                reason: err.to_string(),
            },
        })
    }
}

/// Process-local store used by the demo and by tests.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn paths(&self) -> Vec<String> {
        self.files
            .lock()
            .expect("file store mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.lock().expect("file store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seeds a file at an exact path, e.g. a user's default profile picture.
    pub fn put(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .expect("file store mutex poisoned")
            .insert(path.into(), bytes.into());
    }
}

impl FileStore for MemoryFileStore {
    fn store(
        &self,
        prefix: &str,
        extension: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let path = unique_path(prefix, extension);
        self.put(path.clone(), bytes.to_vec());
        Ok(path)
    }

    fn delete(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self
            .files
            .lock()
            .expect("file store mutex poisoned")
            .remove(path)
            .is_some())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self
            .files
            .lock()
            .expect("file store mutex poisoned")
            .contains_key(path))
    }

    fn copy(&self, source: &str, destination: &str) -> Result<bool, StorageError> {
        let mut files = self.files.lock().expect("file store mutex poisoned");
        match files.get(source).cloned() {
            Some(bytes) => {
                files.insert(destination.to_string(), bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.files
            .lock()
            .expect("file store mutex poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::Missing(path.to_string()))
    }
}

/// A file received from a client or an administrator, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.file_name)
    }

    fn media_type(&self) -> Option<Mime> {
        mime_guess::from_path(&self.file_name).first().or_else(|| {
            self.content_type
                .as_deref()
                .and_then(|raw| raw.parse::<Mime>().ok())
        })
    }
}

/// Document slots an upload can land in. Each slot has its own storage prefix and rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PrincipalPicture,
    PrincipalEid,
    DependentPicture,
    DependentEid,
    Quote,
    Policy,
}

impl DocumentKind {
    pub const fn prefix(self) -> &'static str {
        match self {
            DocumentKind::PrincipalPicture => "quote-requests/profile-pictures",
            DocumentKind::PrincipalEid => "quote-requests/eid-files",
            DocumentKind::DependentPicture => "dependents/profile-pictures",
            DocumentKind::DependentEid => "dependents/eid-files",
            DocumentKind::Quote => "quote-requests/quotes",
            DocumentKind::Policy => "quote-requests/policies",
        }
    }

    const fn is_image_only(self) -> bool {
        matches!(
            self,
            DocumentKind::PrincipalPicture | DocumentKind::DependentPicture
        )
    }
}

const IMAGE_TYPES: &[Mime] = &[mime::IMAGE_JPEG, mime::IMAGE_PNG];
const DOCUMENT_TYPES: &[Mime] = &[mime::IMAGE_JPEG, mime::IMAGE_PNG, mime::APPLICATION_PDF];

/// Type and size rules for uploads.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadPolicy {
    limits: UploadLimits,
}

impl UploadPolicy {
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Returns a user-facing reason when `upload` is not acceptable for `kind`.
    pub fn check(&self, kind: DocumentKind, upload: &Upload) -> Result<(), String> {
        if upload.bytes.is_empty() {
            return Err("file is empty".to_string());
        }

        let accepted = if kind.is_image_only() {
            IMAGE_TYPES
        } else {
            DOCUMENT_TYPES
        };

        let media_type = upload.media_type();
        let allowed = media_type
            .as_ref()
            .map(|found| {
                accepted
                    .iter()
                    .any(|candidate| candidate.essence_str() == found.essence_str())
            })
            .unwrap_or(false);
        if !allowed {
            let names: Vec<&str> = accepted.iter().map(|m| m.subtype().as_str()).collect();
            return Err(format!("file must be one of: {}", names.join(", ")));
        }

        let cap = if kind.is_image_only() {
            self.limits.max_image_bytes
        } else {
            self.limits.max_document_bytes
        };
        if upload.bytes.len() as u64 > cap {
            return Err(format!("file may not be larger than {} KB", cap / 1024));
        }

        Ok(())
    }
}
