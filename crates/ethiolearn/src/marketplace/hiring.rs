use chrono::Utc;
use tracing::info;

use super::access::{Role, Session};
use super::domain::{
    ApplicationId, ApplicationStatus, Decision, Download, FileUpload, Job, JobApplication,
    JobDraft, JobId,
};
use super::repository::RecordStore;
use super::service::{
    check_upload, optional, require_role, required, MarketplaceError, MarketplaceService,
};
use super::storage::{self, BlobStore, Bucket};
use super::views::{job_lookup, ApplicationView, JobView};

impl<R, B> MarketplaceService<R, B>
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
{
    pub fn post_job(&self, session: &Session, draft: JobDraft) -> Result<Job, MarketplaceError> {
        require_role(session, Role::can_post_jobs, "only employers can post jobs")?;

        let job = Job {
            id: JobId::generate(),
            title: required(&draft.title, "title")?,
            company: required(&draft.company, "company")?,
            location: required(&draft.location, "location")?,
            requirements: required(&draft.requirements, "requirements")?,
            description: optional(draft.description),
            salary: optional(draft.salary),
            employer_id: session.user_id.clone(),
            created_at: Utc::now(),
        };

        let stored = self.records.insert_job(job)?;
        info!(job_id = %stored.id, employer = %stored.employer_id, "job posted");
        Ok(stored)
    }

    pub fn jobs(&self) -> Result<Vec<Job>, MarketplaceError> {
        Ok(self.records.list_jobs()?)
    }

    pub fn job(&self, id: &JobId) -> Result<Job, MarketplaceError> {
        self.records
            .fetch_job(id)?
            .ok_or(MarketplaceError::NotFound("job"))
    }

    pub fn job_views(&self, session: &Session) -> Result<Vec<JobView>, MarketplaceError> {
        let jobs = self.records.list_jobs()?;
        let applications = if session.role.can_apply() {
            self.records.applications_for_user(&session.user_id)?
        } else {
            Vec::new()
        };

        Ok(jobs
            .into_iter()
            .map(|job| JobView::new(job, session, &applications))
            .collect())
    }

    /// Upload the CV, then record the application. One application per learner and job.
    pub fn apply_to_job(
        &self,
        session: &Session,
        job_id: &JobId,
        cv: FileUpload,
    ) -> Result<JobApplication, MarketplaceError> {
        require_role(session, Role::can_apply, "only learners can apply to jobs")?;
        check_upload(&cv, Bucket::Cvs, "CV")?;

        let job = self.job(job_id)?;
        let existing = self.records.applications_for_user(&session.user_id)?;
        if existing.iter().any(|application| application.job_id == job.id) {
            return Err(MarketplaceError::AlreadyApplied);
        }

        let object = self.store_upload(Bucket::Cvs, &cv)?;
        let application = JobApplication {
            id: ApplicationId::generate(),
            user_id: session.user_id.clone(),
            job_id: job.id,
            status: ApplicationStatus::Applied,
            cv_storage_path: Some(object),
            created_at: Utc::now(),
        };

        let stored = self.records.insert_application(application)?;
        info!(
            application_id = %stored.id,
            job_id = %stored.job_id,
            applicant = %stored.user_id,
            "application submitted"
        );
        Ok(stored)
    }

    /// Hiring verdict from the employer who posted the job.
    pub fn decide_application(
        &self,
        session: &Session,
        application_id: &ApplicationId,
        decision: Decision,
    ) -> Result<JobApplication, MarketplaceError> {
        require_role(
            session,
            Role::can_post_jobs,
            "only employers can review applications",
        )?;

        let mut application = self.owned_application(session, application_id)?;
        if application.status.is_terminal() {
            return Err(MarketplaceError::InvalidTransition {
                record: "application",
                status: application.status.label(),
            });
        }

        application.status = decision.application_status();
        self.records.update_application(application.clone())?;

        info!(
            application_id = %application.id,
            employer = %session.user_id,
            status = application.status.label(),
            "application decided"
        );
        Ok(application)
    }

    /// Learners see their own applications; employers see those sent to their jobs.
    pub fn applications(
        &self,
        session: &Session,
    ) -> Result<Vec<JobApplication>, MarketplaceError> {
        match session.role {
            Role::Learner => Ok(self.records.applications_for_user(&session.user_id)?),
            Role::Employer => Ok(self.records.applications_for_employer(&session.user_id)?),
            Role::Instructor | Role::Admin => Err(MarketplaceError::Forbidden(
                "applications are visible to applicants and employers",
            )),
        }
    }

    pub fn application_views(
        &self,
        session: &Session,
    ) -> Result<Vec<ApplicationView>, MarketplaceError> {
        let applications = self.applications(session)?;
        if applications.is_empty() {
            return Ok(Vec::new());
        }
        let jobs = self.records.list_jobs()?;

        Ok(applications
            .into_iter()
            .map(|application| {
                let job = job_lookup(&jobs, &application.job_id);
                ApplicationView::new(application, job, session)
            })
            .collect())
    }

    /// CV for the employer reviewing the application, whatever its status.
    pub fn download_cv(
        &self,
        session: &Session,
        application_id: &ApplicationId,
    ) -> Result<Download, MarketplaceError> {
        require_role(
            session,
            Role::can_post_jobs,
            "only employers can download CVs",
        )?;

        let application = self.owned_application(session, application_id)?;
        let object = application
            .cv_storage_path
            .as_deref()
            .ok_or(MarketplaceError::NotFound("CV"))?;

        let bytes = self.blobs.download(Bucket::Cvs, object)?;
        let extension = object.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("pdf");
        Ok(Download {
            file_name: format!("Applicant_CV.{extension}"),
            content_type: storage::guess_media_type(object).to_string(),
            bytes,
        })
    }

    fn owned_application(
        &self,
        session: &Session,
        application_id: &ApplicationId,
    ) -> Result<JobApplication, MarketplaceError> {
        let application = self
            .records
            .fetch_application(application_id)?
            .ok_or(MarketplaceError::NotFound("application"))?;
        let job = self.job(&application.job_id)?;
        if !session.owns(&job.employer_id) {
            return Err(MarketplaceError::Forbidden(
                "only the employer who posted this job can review its applications",
            ));
        }
        Ok(application)
    }
}
