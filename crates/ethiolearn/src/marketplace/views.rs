//! Records decorated with what the calling session may do next.

use serde::Serialize;

use super::access::Session;
use super::domain::{
    ApplicationStatus, Course, CourseId, Job, JobApplication, JobId, Payment, PaymentStatus,
};

/// First payment for `course` in store order (newest first).
pub fn latest_payment<'a>(payments: &'a [Payment], course: &CourseId) -> Option<&'a Payment> {
    payments.iter().find(|payment| &payment.course_id == course)
}

/// Whether any payment for `course` has been approved.
pub fn has_approved_payment(payments: &[Payment], course: &CourseId) -> bool {
    payments
        .iter()
        .any(|payment| &payment.course_id == course && payment.status == PaymentStatus::Approved)
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseView {
    #[serde(flatten)]
    pub course: Course,
    pub payment_status: Option<PaymentStatus>,
    pub can_purchase: bool,
    pub can_download: bool,
}

impl CourseView {
    /// `payments` must be the caller's own payments, newest first.
    pub fn new(course: Course, session: &Session, payments: &[Payment]) -> Self {
        let learner = session.role.can_purchase();
        let payment_status = if learner {
            latest_payment(payments, &course.id).map(|payment| payment.status)
        } else {
            None
        };
        let can_purchase = learner && payment_status.is_none();
        let can_download = learner
            && course.pdf_storage_path.is_some()
            && has_approved_payment(payments, &course.id);

        Self {
            course,
            payment_status,
            can_purchase,
            can_download,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub course_title: Option<String>,
    pub payment_phone: Option<String>,
    pub can_attach_receipt: bool,
    pub can_decide: bool,
    pub can_view_receipt: bool,
}

impl PaymentView {
    pub fn new(payment: Payment, course: Option<&Course>, session: &Session) -> Self {
        let owner = session.owns(&payment.user_id);
        let reviewer = session.role.reviews_payments();
        let has_receipt = payment.receipt_storage_path.is_some();
        let pending = payment.status == PaymentStatus::Pending;

        Self {
            course_title: course.map(|course| course.title.clone()),
            payment_phone: course.and_then(|course| course.phone_number.clone()),
            can_attach_receipt: owner && !reviewer && pending && !has_receipt,
            can_decide: reviewer && pending && has_receipt,
            can_view_receipt: has_receipt && (owner || reviewer),
            payment,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub application_status: Option<ApplicationStatus>,
    pub can_apply: bool,
    pub posted_by_you: bool,
}

impl JobView {
    /// `applications` must be the caller's own applications.
    pub fn new(job: Job, session: &Session, applications: &[JobApplication]) -> Self {
        let application_status = applications
            .iter()
            .find(|application| application.job_id == job.id)
            .map(|application| application.status);
        let can_apply = session.role.can_apply() && application_status.is_none();
        let posted_by_you = session.owns(&job.employer_id);

        Self {
            job,
            application_status,
            can_apply,
            posted_by_you,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: JobApplication,
    pub job_title: Option<String>,
    pub has_cv: bool,
    pub can_decide: bool,
}

impl ApplicationView {
    pub fn new(application: JobApplication, job: Option<&Job>, session: &Session) -> Self {
        let job_owner = job.is_some_and(|job| session.owns(&job.employer_id));
        Self {
            job_title: job.map(|job| job.title.clone()),
            has_cv: application.cv_storage_path.is_some(),
            can_decide: job_owner && application.status == ApplicationStatus::Applied,
            application,
        }
    }
}

pub(super) fn job_lookup<'a>(jobs: &'a [Job], id: &JobId) -> Option<&'a Job> {
    jobs.iter().find(|job| &job.id == id)
}

pub(super) fn course_lookup<'a>(courses: &'a [Course], id: &CourseId) -> Option<&'a Course> {
    courses.iter().find(|course| &course.id == id)
}
