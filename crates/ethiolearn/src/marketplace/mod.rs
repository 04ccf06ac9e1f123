//! Role-gated course purchase, payment approval and job application workflows.
//!
//! The record store, blob store and session provider are reached through traits so the
//! service can run against hosted backends, local infrastructure or in-memory fakes.

pub mod access;
mod catalog;
pub mod domain;
mod hiring;
mod purchase;
pub mod repository;
pub mod router;
pub mod service;
pub mod storage;
pub mod views;

#[cfg(test)]
mod tests;

pub use access::{
    Credentials, Dashboard, Role, Session, SessionError, SessionGrant, SessionProvider, Tab,
};
pub use domain::{
    ApplicationId, ApplicationStatus, Course, CourseDraft, CourseId, Decision, Download,
    FileUpload, Job, JobApplication, JobDraft, JobId, Payment, PaymentId, PaymentStatus, UserId,
};
pub use repository::{RecordStore, RepositoryError};
pub use router::marketplace_router;
pub use service::{MarketplaceError, MarketplaceService};
pub use storage::{BlobStore, Bucket, BucketNames, StorageError};
pub use views::{ApplicationView, CourseView, JobView, PaymentView};
