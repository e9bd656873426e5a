// toolhub-core/src/runtime/artifacts.rs
// ============================================================================
// Module: ToolHub Artifact Store
// Description: Blob persistence with SHA-256 digests and cleanup on failure.
// Purpose: Guarantee that every metadata row has a matching blob.
// Dependencies: chrono, sha2, crate::interfaces
// ============================================================================

//! ## Overview
//! Artifacts are written to `${base_dir}/{run_id}/{artifact_id}` and recorded
//! in the audit store with their SHA-256 and size. A save either produces
//! both the row and a blob matching the digest, or neither: partial files are
//! deleted before returning, and a failed metadata insert deletes the blob.
//! Concurrent writers are safe because every artifact id is unique.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::core::hashing::sha256_hex;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::RunId;
use crate::core::records::ArtifactRecord;
use crate::interfaces::AuditStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Artifact store errors.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    /// Filesystem error while writing or reading a blob.
    #[error("artifact io error: {0}")]
    Io(String),
    /// Metadata store error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The artifact does not exist.
    #[error("artifact not found: {0}")]
    NotFound(String),
    /// The stored URI uses an unsupported scheme.
    #[error("unsupported artifact uri: {0}")]
    UnsupportedUri(String),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Filesystem-backed blob store with metadata rows in the audit store.
#[derive(Clone)]
pub struct ArtifactStore {
    /// Metadata store.
    store: Arc<dyn AuditStore>,
    /// Root directory for run-scoped blob directories.
    base_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at `base_dir`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::Io`] when the directory cannot be
    /// created.
    pub fn new(
        store: Arc<dyn AuditStore>,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Self, ArtifactStoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        Ok(Self {
            store,
            base_dir,
        })
    }

    /// Writes a blob, computes its SHA-256, and inserts the metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError`] when the blob or row cannot be
    /// persisted; no blob survives a failed save.
    pub fn save(
        &self,
        run_id: &RunId,
        name: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<ArtifactRecord, ArtifactStoreError> {
        let artifact_id = ArtifactId::generate();
        let run_dir = self.base_dir.join(run_id.as_str());
        fs::create_dir_all(&run_dir).map_err(|err| ArtifactStoreError::Io(err.to_string()))?;

        let blob_path = run_dir.join(artifact_id.as_str());
        if let Err(err) = fs::write(&blob_path, body) {
            remove_partial(&blob_path);
            return Err(ArtifactStoreError::Io(err.to_string()));
        }

        let record = ArtifactRecord {
            artifact_id,
            run_id: run_id.clone(),
            name: name.to_string(),
            uri: format!("file://{}", blob_path.display()),
            sha256: sha256_hex(body),
            size_bytes: body.len() as u64,
            content_type: content_type.to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.insert_artifact(&record) {
            remove_partial(&blob_path);
            return Err(ArtifactStoreError::Store(err));
        }
        Ok(record)
    }

    /// Reads a blob in full via its metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError`] when the row is missing, the URI
    /// scheme is not `file://`, or the blob cannot be read.
    pub fn read(&self, artifact_id: &ArtifactId) -> Result<Vec<u8>, ArtifactStoreError> {
        let record = self
            .store
            .get_artifact(artifact_id)?
            .ok_or_else(|| ArtifactStoreError::NotFound(artifact_id.to_string()))?;
        read_blob(&record)
    }

    /// Returns the metadata store backing this artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }
}

/// Reads the blob behind an artifact record.
///
/// # Errors
///
/// Returns [`ArtifactStoreError`] when the URI scheme is not `file://` or
/// the blob cannot be read.
pub fn read_blob(record: &ArtifactRecord) -> Result<Vec<u8>, ArtifactStoreError> {
    let Some(path) = record.uri.strip_prefix("file://") else {
        return Err(ArtifactStoreError::UnsupportedUri(record.uri.clone()));
    };
    fs::read(path).map_err(|err| ArtifactStoreError::Io(err.to_string()))
}

/// Deletes a partially written blob, ignoring secondary failures.
fn remove_partial(path: &Path) {
    let _ = fs::remove_file(path);
}
