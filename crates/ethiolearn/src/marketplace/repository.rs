use super::domain::{
    ApplicationId, Course, CourseId, Job, JobApplication, JobId, Payment, PaymentId, UserId,
};

/// Table-oriented system of record. Listings are ordered by creation time, newest first.
pub trait RecordStore: Send + Sync {
    fn insert_course(&self, course: Course) -> Result<Course, RepositoryError>;
    fn fetch_course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn list_courses(&self) -> Result<Vec<Course>, RepositoryError>;

    fn insert_payment(&self, payment: Payment) -> Result<Payment, RepositoryError>;
    fn update_payment(&self, payment: Payment) -> Result<(), RepositoryError>;
    fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, RepositoryError>;
    fn payments_for_user(&self, user: &UserId) -> Result<Vec<Payment>, RepositoryError>;
    fn all_payments(&self) -> Result<Vec<Payment>, RepositoryError>;

    fn insert_job(&self, job: Job) -> Result<Job, RepositoryError>;
    fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    fn list_jobs(&self) -> Result<Vec<Job>, RepositoryError>;

    fn insert_application(
        &self,
        application: JobApplication,
    ) -> Result<JobApplication, RepositoryError>;
    fn update_application(&self, application: JobApplication) -> Result<(), RepositoryError>;
    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<JobApplication>, RepositoryError>;
    fn applications_for_user(&self, user: &UserId)
        -> Result<Vec<JobApplication>, RepositoryError>;
    /// Applications to any job whose employer is `employer`.
    fn applications_for_employer(
        &self,
        employer: &UserId,
    ) -> Result<Vec<JobApplication>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
