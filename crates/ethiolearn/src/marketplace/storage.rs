use mime::Mime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::FileUpload;

const MSWORD: &str = "application/msword";
const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Independent object namespaces in the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    CoursePdfs,
    PaymentReceipts,
    Cvs,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::CoursePdfs, Bucket::PaymentReceipts, Bucket::Cvs];

    /// Whether an upload of this media type may be stored in the bucket.
    pub fn accepts(self, media: &Mime) -> bool {
        match self {
            Bucket::CoursePdfs => media.essence_str() == mime::APPLICATION_PDF.essence_str(),
            Bucket::PaymentReceipts => media.type_() == mime::IMAGE,
            Bucket::Cvs => {
                let essence = media.essence_str();
                essence == mime::APPLICATION_PDF.essence_str()
                    || essence == MSWORD
                    || essence == DOCX
            }
        }
    }

    pub const fn expectation(self) -> &'static str {
        match self {
            Bucket::CoursePdfs => "a PDF document",
            Bucket::PaymentReceipts => "an image (PNG or JPEG)",
            Bucket::Cvs => "a PDF or Word document",
        }
    }
}

/// Concrete bucket names as provisioned in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketNames {
    pub course_pdfs: String,
    pub payment_receipts: String,
    pub cvs: String,
}

impl BucketNames {
    pub fn name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::CoursePdfs => &self.course_pdfs,
            Bucket::PaymentReceipts => &self.payment_receipts,
            Bucket::Cvs => &self.cvs,
        }
    }
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            course_pdfs: "course-pdfs".to_string(),
            payment_receipts: "payment-receipts".to_string(),
            cvs: "cvs".to_string(),
        }
    }
}

/// Object storage boundary. Objects are addressed by name within a bucket.
pub trait BlobStore: Send + Sync {
    fn upload(&self, bucket: Bucket, name: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn download(&self, bucket: Bucket, name: &str) -> Result<Vec<u8>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {name} not found in bucket {bucket:?}")]
    NotFound { bucket: Bucket, name: String },
    #[error("object store rejected the upload: {0}")]
    Rejected(String),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Fresh object name: a random v4 uuid carrying over the original extension.
pub fn object_name(file_name: &str) -> String {
    let id = Uuid::new_v4();
    match extension(file_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Media type of an upload: the declared type when specific, otherwise guessed from the name.
pub fn media_type(upload: &FileUpload) -> Mime {
    let declared = upload
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<Mime>().ok())
        .filter(|media| *media != mime::APPLICATION_OCTET_STREAM);

    declared.unwrap_or_else(|| guess_media_type(&upload.file_name))
}

pub fn guess_media_type(name: &str) -> Mime {
    mime_guess::from_path(name).first_or_octet_stream()
}
