use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::{extension_of, unique_path, FileStore, StorageError, Upload};

/// Files touched by one unit of work.
///
/// `written` paths are removed again on rollback. `retired` paths were replaced or orphaned
/// and are removed only once the owning record has been committed.
#[derive(Debug, Default)]
pub struct StagedFiles {
    written: Vec<String>,
    retired: Vec<String>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn retired(&self) -> &[String] {
        &self.retired
    }
}

/// Where an attachment field gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Upload(Upload),
    Keep(String),
    CopyDefault(String),
    Absent,
}

/// Raised by [`resolve_attachment`] when a required file has no source at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a file is required and none is on file")]
pub struct MissingAttachment;

/// Decide the source of an attachment field without touching storage.
///
/// Precedence: a fresh upload, then the file already stored on the record, then the
/// owner's default document.
pub fn resolve_attachment(
    uploaded: Option<Upload>,
    existing: Option<&str>,
    owner_default: Option<&str>,
    required: bool,
) -> Result<AttachmentSource, MissingAttachment> {
    if let Some(upload) = uploaded {
        return Ok(AttachmentSource::Upload(upload));
    }
    if let Some(path) = existing {
        return Ok(AttachmentSource::Keep(path.to_string()));
    }
    if let Some(path) = owner_default {
        return Ok(AttachmentSource::CopyDefault(path.to_string()));
    }
    if required {
        Err(MissingAttachment)
    } else {
        Ok(AttachmentSource::Absent)
    }
}

/// Replace/copy semantics over a [`FileStore`], shared by principal, dependent, and
/// fulfillment documents.
pub struct AttachmentManager<F> {
    store: Arc<F>,
}

impl<F> AttachmentManager<F>
where
    F: FileStore,
{
    pub fn new(store: Arc<F>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &F {
        &self.store
    }

    /// Store `upload` under a fresh name in `prefix`.
    pub fn put(
        &self,
        staged: &mut StagedFiles,
        upload: &Upload,
        prefix: &str,
    ) -> Result<String, StorageError> {
        let path = self
            .store
            .store(prefix, upload.extension(), &upload.bytes)?;
        debug!(%path, size = upload.bytes.len(), "staged upload");
        staged.written.push(path.clone());
        Ok(path)
    }

    /// Store the new file and retire `old` once the transaction commits.
    pub fn replace(
        &self,
        staged: &mut StagedFiles,
        old: Option<&str>,
        upload: &Upload,
        prefix: &str,
    ) -> Result<String, StorageError> {
        let path = self.put(staged, upload, prefix)?;
        if let Some(old) = old {
            self.retire(staged, old);
        }
        Ok(path)
    }

    /// Copy a default document under a fresh name, keeping its extension.
    /// Returns `None` when the source is not in the store.
    pub fn copy_from_default(
        &self,
        staged: &mut StagedFiles,
        source: &str,
        prefix: &str,
    ) -> Result<Option<String>, StorageError> {
        if !self.store.exists(source)? {
            debug!(%source, "default document missing from store");
            return Ok(None);
        }

        let destination = unique_path(prefix, extension_of(source));
        if !self.store.copy(source, &destination)? {
            return Ok(None);
        }
        staged.written.push(destination.clone());
        Ok(Some(destination))
    }

    pub fn retire(&self, staged: &mut StagedFiles, path: &str) {
        if !staged.retired.iter().any(|entry| entry == path) {
            staged.retired.push(path.to_string());
        }
    }

    /// Materialize a resolved source. `existing` is the path currently on the record.
    pub fn apply(
        &self,
        staged: &mut StagedFiles,
        source: AttachmentSource,
        existing: Option<&str>,
        prefix: &str,
    ) -> Result<Option<String>, StorageError> {
        match source {
            AttachmentSource::Upload(upload) => self
                .replace(staged, existing, &upload, prefix)
                .map(Some),
            AttachmentSource::Keep(path) => Ok(Some(path)),
            AttachmentSource::CopyDefault(source) => {
                let copied = self.copy_from_default(staged, &source, prefix)?;
                if let (Some(_), Some(old)) = (&copied, existing) {
                    self.retire(staged, old);
                }
                Ok(copied)
            }
            AttachmentSource::Absent => {
                if let Some(old) = existing {
                    self.retire(staged, old);
                }
                Ok(None)
            }
        }
    }

    /// Delete retired files. Failures are logged and otherwise ignored.
    pub fn commit(&self, staged: StagedFiles) {
        for path in staged.retired {
            match self.store.delete(&path) {
                Ok(true) => debug!(%path, "deleted replaced file"),
                Ok(false) => debug!(%path, "replaced file already absent"),
                Err(err) => warn!(%path, error = %err, "failed to delete replaced file"),
            }
        }
    }

    /// Remove everything written during a failed unit of work.
    pub fn rollback(&self, staged: StagedFiles) {
        for path in staged.written {
            if let Err(err) = self.store.delete(&path) {
                warn!(%path, error = %err, "failed to remove staged file during rollback");
            }
        }
    }
}
