use std::sync::Arc;

use tracing::debug;

use super::access::{Role, Session, SessionError};
use super::domain::FileUpload;
use super::repository::{RecordStore, RepositoryError};
use super::storage::{self, BlobStore, Bucket, StorageError};

/// Service composing the record store and blob store behind the marketplace workflows.
///
/// Operations are split by domain across `catalog`, `purchase` and `hiring`; every
/// mutating call returns the record as written so callers never refetch.
pub struct MarketplaceService<R, B> {
    pub(super) records: Arc<R>,
    pub(super) blobs: Arc<B>,
}

impl<R, B> MarketplaceService<R, B>
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
{
    pub fn new(records: Arc<R>, blobs: Arc<B>) -> Self {
        Self { records, blobs }
    }

    pub fn records(&self) -> &Arc<R> {
        &self.records
    }

    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }

    /// Writes the upload under a fresh object name and returns that name.
    pub(super) fn store_upload(
        &self,
        bucket: Bucket,
        upload: &FileUpload,
    ) -> Result<String, MarketplaceError> {
        let name = storage::object_name(&upload.file_name);
        self.blobs.upload(bucket, &name, &upload.bytes)?;
        debug!(?bucket, object = %name, bytes = upload.bytes.len(), "blob stored");
        Ok(name)
    }
}

/// Rejects empty or wrongly typed files before any store call.
pub(super) fn check_upload(
    upload: &FileUpload,
    bucket: Bucket,
    kind: &'static str,
) -> Result<(), MarketplaceError> {
    if upload.is_empty() {
        return Err(MarketplaceError::MissingFile(kind));
    }
    let media = storage::media_type(upload);
    if !bucket.accepts(&media) {
        return Err(MarketplaceError::UnsupportedFile {
            file_name: upload.file_name.clone(),
            expected: bucket.expectation(),
        });
    }
    Ok(())
}

pub(super) fn require_role(
    session: &Session,
    allowed: fn(Role) -> bool,
    message: &'static str,
) -> Result<(), MarketplaceError> {
    if allowed(session.role) {
        Ok(())
    } else {
        Err(MarketplaceError::Forbidden(message))
    }
}

pub(super) fn required(value: &str, field: &'static str) -> Result<String, MarketplaceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(MarketplaceError::Validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

pub(super) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Error raised by marketplace operations.
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Validation(String),
    #[error("a {0} file is required")]
    MissingFile(&'static str),
    #[error("{file_name} is not {expected}")]
    UnsupportedFile {
        file_name: String,
        expected: &'static str,
    },
    #[error("sign in to continue")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{record} is already {status}")]
    InvalidTransition {
        record: &'static str,
        status: &'static str,
    },
    #[error("you have already applied to this job")]
    AlreadyApplied,
    #[error("course material is available once your payment is approved")]
    NotPurchased,
    #[error("this course has no downloadable material")]
    MaterialUnavailable,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MarketplaceError {
    /// Store and blob failures are reported to callers without their details.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            MarketplaceError::Repository(_)
                | MarketplaceError::Storage(_)
                | MarketplaceError::Session(SessionError::Unavailable(_))
        )
    }

    pub fn public_message(&self) -> String {
        if self.is_backend_failure() {
            "something went wrong, please try again later".to_string()
        } else {
            self.to_string()
        }
    }
}
