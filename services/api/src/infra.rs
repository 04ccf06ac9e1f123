use bcrypt::{hash, verify, DEFAULT_COST};
use ethiolearn::config::StorageConfig;
use ethiolearn::marketplace::{
    ApplicationId, BlobStore, Bucket, BucketNames, Course, CourseId, Credentials, Job,
    JobApplication, JobId, Payment, PaymentId, RecordStore, RepositoryError, Role, Session,
    SessionError, SessionGrant, SessionProvider, StorageError, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct Tables {
    courses: Vec<Course>,
    payments: Vec<Payment>,
    jobs: Vec<Job>,
    applications: Vec<JobApplication>,
}

/// Record store kept in process memory. Rows are appended, so reversed iteration yields
/// newest first.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRecordStore {
    tables: Arc<Mutex<Tables>>,
}

fn insert_row<T: Clone>(
    rows: &mut Vec<T>,
    row: T,
    same: impl Fn(&T, &T) -> bool,
) -> Result<T, RepositoryError> {
    if rows.iter().any(|existing| same(existing, &row)) {
        return Err(RepositoryError::Conflict);
    }
    rows.push(row.clone());
    Ok(row)
}

fn replace_row<T>(
    rows: &mut [T],
    row: T,
    same: impl Fn(&T, &T) -> bool,
) -> Result<(), RepositoryError> {
    let slot = rows
        .iter_mut()
        .find(|existing| same(existing, &row))
        .ok_or(RepositoryError::NotFound)?;
    *slot = row;
    Ok(())
}

fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|row| keep(row)).cloned().collect()
}

impl RecordStore for InMemoryRecordStore {
    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        insert_row(&mut guard.courses, course, |a, b| a.id == b.id)
    }

    fn fetch_course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(guard.courses.iter().find(|course| &course.id == id).cloned())
    }

    fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(newest_first(&guard.courses, |_| true))
    }

    fn insert_payment(&self, payment: Payment) -> Result<Payment, RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        insert_row(&mut guard.payments, payment, |a, b| a.id == b.id)
    }

    fn update_payment(&self, payment: Payment) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        replace_row(&mut guard.payments, payment, |a, b| a.id == b.id)
    }

    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(guard.payments.iter().find(|payment| &payment.id == id).cloned())
    }

    fn payments_for_user(&self, user: &UserId) -> Result<Vec<Payment>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(newest_first(&guard.payments, |payment| &payment.user_id == user))
    }

    fn all_payments(&self) -> Result<Vec<Payment>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(newest_first(&guard.payments, |_| true))
    }

    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        insert_row(&mut guard.jobs, job, |a, b| a.id == b.id)
    }

    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(guard.jobs.iter().find(|job| &job.id == id).cloned())
    }

    fn list_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(newest_first(&guard.jobs, |_| true))
    }

    fn insert_application(
        &self,
        application: JobApplication,
    ) -> Result<JobApplication, RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        insert_row(&mut guard.applications, application, |a, b| a.id == b.id)
    }

    fn update_application(&self, application: JobApplication) -> Result<(), RepositoryError> {
        let mut guard = self.tables.lock().expect("record store mutex poisoned");
        replace_row(&mut guard.applications, application, |a, b| a.id == b.id)
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<JobApplication>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(guard
            .applications
            .iter()
            .find(|application| &application.id == id)
            .cloned())
    }

    fn applications_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        Ok(newest_first(&guard.applications, |application| {
            &application.user_id == user
        }))
    }

    fn applications_for_employer(
        &self,
        employer: &UserId,
    ) -> Result<Vec<JobApplication>, RepositoryError> {
        let guard = self.tables.lock().expect("record store mutex poisoned");
        let posted: Vec<&JobId> = guard
            .jobs
            .iter()
            .filter(|job| &job.employer_id == employer)
            .map(|job| &job.id)
            .collect();
        Ok(newest_first(&guard.applications, |application| {
            posted.contains(&&application.job_id)
        }))
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryBlobStore {
    objects: Arc<Mutex<HashMap<(Bucket, String), Vec<u8>>>>,
}

impl BlobStore for InMemoryBlobStore {
    fn upload(&self, bucket: Bucket, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.objects.lock().expect("blob store mutex poisoned");
        guard.insert((bucket, name.to_string()), bytes.to_vec());
        Ok(())
    }

    fn download(&self, bucket: Bucket, name: &str) -> Result<Vec<u8>, StorageError> {
        let guard = self.objects.lock().expect("blob store mutex poisoned");
        guard
            .get(&(bucket, name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket,
                name: name.to_string(),
            })
    }
}

/// Filesystem blob store: one directory per bucket under `root`.
#[derive(Debug, Clone)]
pub(crate) struct LocalBlobStore {
    root: PathBuf,
    buckets: BucketNames,
}

impl LocalBlobStore {
    pub(crate) fn new(root: impl Into<PathBuf>, buckets: BucketNames) -> Self {
        Self {
            root: root.into(),
            buckets,
        }
    }

    fn object_path(&self, bucket: Bucket, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::Rejected(format!(
                "object name '{name}' is not allowed"
            )));
        }
        Ok(self.root.join(self.buckets.name(bucket)).join(name))
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Unavailable(format!("{}: {err}", path.display()))
}

impl BlobStore for LocalBlobStore {
    fn upload(&self, bucket: Bucket, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| unavailable(parent, err))?;
        }
        fs::write(&path, bytes).map_err(|err| unavailable(&path, err))?;
        debug!(path = %path.display(), size = bytes.len(), "object written");
        Ok(())
    }

    fn download(&self, bucket: Bucket, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, name)?;
        fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                bucket,
                name: name.to_string(),
            },
            _ => unavailable(&path, err),
        })
    }
}

/// Blob backend picked from configuration: local disk when `STORAGE_ROOT` is set.
#[derive(Clone)]
pub(crate) enum ConfiguredBlobStore {
    Memory(InMemoryBlobStore),
    Local(LocalBlobStore),
}

impl ConfiguredBlobStore {
    pub(crate) fn from_config(storage: &StorageConfig) -> Self {
        match &storage.root {
            Some(root) => Self::Local(LocalBlobStore::new(root, storage.buckets.clone())),
            None => Self::Memory(InMemoryBlobStore::default()),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Memory(_) => "memory".to_string(),
            Self::Local(store) => store.root.display().to_string(),
        }
    }
}

impl BlobStore for ConfiguredBlobStore {
    fn upload(&self, bucket: Bucket, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        match self {
            Self::Memory(store) => store.upload(bucket, name, bytes),
            Self::Local(store) => store.upload(bucket, name, bytes),
        }
    }

    fn download(&self, bucket: Bucket, name: &str) -> Result<Vec<u8>, StorageError> {
        match self {
            Self::Memory(store) => store.download(bucket, name),
            Self::Local(store) => store.download(bucket, name),
        }
    }
}

struct Account {
    user_id: UserId,
    email: String,
    password_hash: String,
    role: Role,
}

#[derive(Default)]
struct SessionTables {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, Session>,
}

/// Email/password accounts with bcrypt hashes and opaque bearer tokens.
#[derive(Clone)]
pub(crate) struct InMemorySessionProvider {
    tables: Arc<Mutex<SessionTables>>,
    cost: u32,
}

impl Default for InMemorySessionProvider {
    fn default() -> Self {
        Self::with_cost(DEFAULT_COST)
    }
}

impl InMemorySessionProvider {
    pub(crate) fn with_cost(cost: u32) -> Self {
        Self {
            tables: Arc::default(),
            cost,
        }
    }

    fn issue(&self, tables: &mut SessionTables, session: Session) -> SessionGrant {
        let token = Uuid::new_v4().simple().to_string();
        tables.tokens.insert(token.clone(), session.clone());
        SessionGrant { token, session }
    }
}

fn account_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl SessionProvider for InMemorySessionProvider {
    fn sign_up(&self, credentials: Credentials, role: Role) -> Result<SessionGrant, SessionError> {
        credentials.validate()?;
        let key = account_key(&credentials.email);
        let password_hash = hash(&credentials.password, self.cost)
            .map_err(|err| SessionError::Unavailable(err.to_string()))?;

        let mut guard = self.tables.lock().expect("session mutex poisoned");
        if guard.accounts.contains_key(&key) {
            return Err(SessionError::AlreadyRegistered);
        }
        let account = Account {
            user_id: UserId::generate(),
            email: credentials.email.trim().to_string(),
            password_hash,
            role,
        };
        let session = Session {
            user_id: account.user_id.clone(),
            email: account.email.clone(),
            role: account.role,
        };
        guard.accounts.insert(key, account);
        Ok(self.issue(&mut guard, session))
    }

    fn sign_in(&self, credentials: Credentials) -> Result<SessionGrant, SessionError> {
        credentials.validate()?;
        let key = account_key(&credentials.email);

        let (password_hash, session) = {
            let guard = self.tables.lock().expect("session mutex poisoned");
            let account = guard
                .accounts
                .get(&key)
                .ok_or(SessionError::InvalidCredentials)?;
            let session = Session {
                user_id: account.user_id.clone(),
                email: account.email.clone(),
                role: account.role,
            };
            (account.password_hash.clone(), session)
        };

        // bcrypt runs outside the table lock.
        let matches = verify(&credentials.password, &password_hash)
            .map_err(|err| SessionError::Unavailable(err.to_string()))?;
        if !matches {
            return Err(SessionError::InvalidCredentials);
        }

        let mut guard = self.tables.lock().expect("session mutex poisoned");
        Ok(self.issue(&mut guard, session))
    }

    fn resolve(&self, token: &str) -> Result<Option<Session>, SessionError> {
        let guard = self.tables.lock().expect("session mutex poisoned");
        Ok(guard.tokens.get(token).cloned())
    }
}
