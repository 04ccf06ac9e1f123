use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::marketplace::access::{
    Credentials, Role, Session, SessionError, SessionGrant, SessionProvider,
};
use crate::marketplace::domain::{
    ApplicationId, Course, CourseDraft, CourseId, FileUpload, Job, JobApplication, JobDraft,
    JobId, Payment, PaymentId, UserId,
};
use crate::marketplace::repository::{RecordStore, RepositoryError};
use crate::marketplace::storage::{BlobStore, Bucket, StorageError};
use crate::marketplace::{marketplace_router, MarketplaceService};

/// Rows kept in insertion order; listings come back newest first.
#[derive(Default)]
struct Tables {
    courses: Vec<Course>,
    payments: Vec<Payment>,
    jobs: Vec<Job>,
    applications: Vec<JobApplication>,
}

#[derive(Default, Clone)]
pub(super) struct MemoryRecords {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRecords {
    pub(super) fn payment_count(&self) -> usize {
        self.tables.lock().expect("records mutex poisoned").payments.len()
    }
}

fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|row| keep(row)).cloned().collect()
}

impl RecordStore for MemoryRecords {
    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        tables.courses.push(course.clone());
        Ok(course)
    }

    fn fetch_course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(tables.courses.iter().find(|row| &row.id == id).cloned())
    }

    fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(newest_first(&tables.courses, |_| true))
    }

    fn insert_payment(&self, payment: Payment) -> Result<Payment, RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        tables.payments.push(payment.clone());
        Ok(payment)
    }

    fn update_payment(&self, payment: Payment) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        match tables.payments.iter_mut().find(|row| row.id == payment.id) {
            Some(row) => {
                *row = payment;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(tables.payments.iter().find(|row| &row.id == id).cloned())
    }

    fn payments_for_user(&self, user: &UserId) -> Result<Vec<Payment>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(newest_first(&tables.payments, |row| &row.user_id == user))
    }

    fn all_payments(&self) -> Result<Vec<Payment>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(newest_first(&tables.payments, |_| true))
    }

    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        tables.jobs.push(job.clone());
        Ok(job)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(tables.jobs.iter().find(|row| &row.id == id).cloned())
    }

    fn list_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(newest_first(&tables.jobs, |_| true))
    }

    fn insert_application(
        &self,
        application: JobApplication,
    ) -> Result<JobApplication, RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        tables.applications.push(application.clone());
        Ok(application)
    }

    fn update_application(&self, application: JobApplication) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("records mutex poisoned");
        match tables
            .applications
            .iter_mut()
            .find(|row| row.id == application.id)
        {
            Some(row) => {
                *row = application;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(tables.applications.iter().find(|row| &row.id == id).cloned())
    }

    fn applications_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        Ok(newest_first(&tables.applications, |row| &row.user_id == user))
    }

    fn applications_for_employer(
        &self,
        employer: &UserId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        let tables = self.tables.lock().expect("records mutex poisoned");
        let owned: Vec<&JobId> = tables
            .jobs
            .iter()
            .filter(|job| &job.employer_id == employer)
            .map(|job| &job.id)
            .collect();
        Ok(newest_first(&tables.applications, |row| {
            owned.contains(&&row.job_id)
        }))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryBlobs {
    objects: Arc<Mutex<HashMap<(Bucket, String), Vec<u8>>>>,
    downloads: Arc<AtomicUsize>,
}

impl MemoryBlobs {
    pub(super) fn object_count(&self, bucket: Bucket) -> usize {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .keys()
            .filter(|(stored, _)| *stored == bucket)
            .count()
    }

    pub(super) fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl BlobStore for MemoryBlobs {
    fn upload(&self, bucket: Bucket, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .insert((bucket, name.to_string()), bytes.to_vec());
        Ok(())
    }

    fn download(&self, bucket: Bucket, name: &str) -> Result<Vec<u8>, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .expect("blob mutex poisoned")
            .get(&(bucket, name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket,
                name: name.to_string(),
            })
    }
}

pub(super) struct UnavailableBlobs;

impl BlobStore for UnavailableBlobs {
    fn upload(&self, _bucket: Bucket, _name: &str, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("bucket offline".to_string()))
    }

    fn download(&self, _bucket: Bucket, _name: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::Unavailable("bucket offline".to_string()))
    }
}

/// Fixed token -> session table; sign-up is not needed by the unit tests.
#[derive(Default, Clone)]
pub(super) struct StaticSessions {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl StaticSessions {
    pub(super) fn register(&self, token: &str, session: Session) {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(token.to_string(), session);
    }
}

impl SessionProvider for StaticSessions {
    fn sign_up(&self, credentials: Credentials, role: Role) -> Result<SessionGrant, SessionError> {
        let session = Session {
            user_id: UserId(format!("user-{}", credentials.email)),
            email: credentials.email.clone(),
            role,
        };
        let token = format!("token-{}", credentials.email);
        self.register(&token, session.clone());
        Ok(SessionGrant { token, session })
    }

    fn sign_in(&self, credentials: Credentials) -> Result<SessionGrant, SessionError> {
        let token = format!("token-{}", credentials.email);
        let guard = self.sessions.lock().expect("session mutex poisoned");
        match guard.get(&token) {
            Some(session) => Ok(SessionGrant {
                token: token.clone(),
                session: session.clone(),
            }),
            None => Err(SessionError::InvalidCredentials),
        }
    }

    fn resolve(&self, token: &str) -> Result<Option<Session>, SessionError> {
        Ok(self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .get(token)
            .cloned())
    }
}

pub(super) fn session(name: &str, role: Role) -> Session {
    Session {
        user_id: UserId(format!("user-{name}")),
        email: format!("{name}@ethiolearn.et"),
        role,
    }
}

pub(super) fn learner() -> Session {
    session("abebe", Role::Learner)
}

pub(super) fn other_learner() -> Session {
    session("selam", Role::Learner)
}

pub(super) fn instructor() -> Session {
    session("tigist", Role::Instructor)
}

pub(super) fn employer() -> Session {
    session("dawit", Role::Employer)
}

pub(super) fn admin() -> Session {
    session("admin", Role::Admin)
}

pub(super) fn course_draft(price: u32) -> CourseDraft {
    CourseDraft {
        title: "Intro to Rust".to_string(),
        description: "Ownership, borrowing and lifetimes".to_string(),
        price,
        phone_number: "+251912345678".to_string(),
    }
}

pub(super) fn job_draft() -> JobDraft {
    JobDraft {
        title: "Software Developer".to_string(),
        company: "Addis Systems".to_string(),
        location: "Addis Ababa".to_string(),
        requirements: "Two years of backend experience".to_string(),
        description: Some("Build payment integrations".to_string()),
        salary: Some("15,000 - 25,000 ETB".to_string()),
    }
}

pub(super) fn course_pdf() -> FileUpload {
    FileUpload::new("intro-to-rust.pdf", b"%PDF-1.7 course".to_vec())
}

pub(super) fn receipt_image() -> FileUpload {
    FileUpload::new("telebirr-receipt.png", vec![0x89, b'P', b'N', b'G'])
}

pub(super) fn cv_file() -> FileUpload {
    FileUpload::new("abebe-cv.pdf", b"%PDF-1.4 cv".to_vec())
}

pub(super) type TestService = MarketplaceService<MemoryRecords, MemoryBlobs>;

pub(super) fn build_service() -> (TestService, MemoryRecords, MemoryBlobs) {
    let records = MemoryRecords::default();
    let blobs = MemoryBlobs::default();
    let service = MarketplaceService::new(Arc::new(records.clone()), Arc::new(blobs.clone()));
    (service, records, blobs)
}

/// Service seeded with one 500 ETB course carrying a PDF.
pub(super) fn service_with_course() -> (TestService, MemoryRecords, MemoryBlobs, Course) {
    let (service, records, blobs) = build_service();
    let course = service
        .create_course(&instructor(), course_draft(500), Some(course_pdf()))
        .expect("instructor can publish");
    (service, records, blobs, course)
}

pub(super) fn router_with(
    service: TestService,
    sessions: StaticSessions,
) -> axum::Router {
    marketplace_router(Arc::new(service), Arc::new(sessions))
}

pub(super) fn sessions_for(all: &[(&str, Session)]) -> StaticSessions {
    let sessions = StaticSessions::default();
    for (token, session) in all {
        sessions.register(token, session.clone());
    }
    sessions
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
