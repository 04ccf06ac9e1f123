use chrono::Utc;
use tracing::info;

use super::access::{Role, Session};
use super::domain::{Course, CourseDraft, CourseId, FileUpload};
use super::repository::RecordStore;
use super::service::{check_upload, require_role, required, MarketplaceError, MarketplaceService};
use super::storage::{BlobStore, Bucket};
use super::views::CourseView;

impl<R, B> MarketplaceService<R, B>
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
{
    /// Publish a course. The optional PDF is uploaded before the row is written.
    pub fn create_course(
        &self,
        session: &Session,
        draft: CourseDraft,
        pdf: Option<FileUpload>,
    ) -> Result<Course, MarketplaceError> {
        require_role(
            session,
            Role::can_author_courses,
            "only instructors can add courses",
        )?;

        let title = required(&draft.title, "title")?;
        let description = required(&draft.description, "description")?;
        let phone_number = required(&draft.phone_number, "payment phone number")?;
        if draft.price == 0 {
            return Err(MarketplaceError::Validation(
                "price must be a positive amount".to_string(),
            ));
        }
        if let Some(upload) = &pdf {
            check_upload(upload, Bucket::CoursePdfs, "course PDF")?;
        }

        let pdf_storage_path = match &pdf {
            Some(upload) => Some(self.store_upload(Bucket::CoursePdfs, upload)?),
            None => None,
        };

        let course = Course {
            id: CourseId::generate(),
            title,
            description,
            price: draft.price,
            instructor_id: session.user_id.clone(),
            phone_number: Some(phone_number),
            pdf_storage_path,
            created_at: Utc::now(),
        };

        let stored = self.records.insert_course(course)?;
        info!(
            course_id = %stored.id,
            instructor = %stored.instructor_id,
            price = stored.price,
            has_pdf = stored.pdf_storage_path.is_some(),
            "course published"
        );
        Ok(stored)
    }

    pub fn courses(&self) -> Result<Vec<Course>, MarketplaceError> {
        Ok(self.records.list_courses()?)
    }

    pub fn course(&self, id: &CourseId) -> Result<Course, MarketplaceError> {
        self.records
            .fetch_course(id)?
            .ok_or(MarketplaceError::NotFound("course"))
    }

    /// Course listing decorated with the caller's purchase state.
    pub fn course_views(&self, session: &Session) -> Result<Vec<CourseView>, MarketplaceError> {
        let courses = self.records.list_courses()?;
        let payments = if session.role.can_purchase() {
            self.records.payments_for_user(&session.user_id)?
        } else {
            Vec::new()
        };

        Ok(courses
            .into_iter()
            .map(|course| CourseView::new(course, session, &payments))
            .collect())
    }
}
