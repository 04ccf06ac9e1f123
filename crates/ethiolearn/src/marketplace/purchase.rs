use chrono::Utc;
use tracing::{info, warn};

use super::access::{Role, Session};
use super::domain::{
    CourseId, Decision, Download, FileUpload, Payment, PaymentId, PaymentStatus,
};
use super::repository::RecordStore;
use super::service::{check_upload, require_role, MarketplaceError, MarketplaceService};
use super::storage::{self, BlobStore, Bucket};
use super::views::{course_lookup, has_approved_payment, latest_payment, PaymentView};

impl<R, B> MarketplaceService<R, B>
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
{
    /// Record a learner's intent to buy a course. No funds move here; the learner pays
    /// off-platform and proves it with a receipt.
    pub fn initiate_purchase(
        &self,
        session: &Session,
        course_id: &CourseId,
    ) -> Result<Payment, MarketplaceError> {
        require_role(session, Role::can_purchase, "only learners can buy courses")?;

        let course = self.course(course_id)?;
        let payment = Payment {
            id: PaymentId::generate(),
            user_id: session.user_id.clone(),
            course_id: course.id.clone(),
            amount: course.price,
            status: PaymentStatus::Pending,
            receipt_storage_path: None,
            created_at: Utc::now(),
        };

        let stored = self.records.insert_payment(payment)?;
        info!(
            payment_id = %stored.id,
            course_id = %stored.course_id,
            learner = %stored.user_id,
            amount = stored.amount,
            "purchase initiated"
        );
        Ok(stored)
    }

    /// Attach proof of payment to a pending payment. Each call stores a new blob; earlier
    /// receipts stay behind. Settled payments never reopen: after a rejection the learner
    /// starts a new purchase instead.
    pub fn submit_receipt(
        &self,
        session: &Session,
        payment_id: &PaymentId,
        receipt: FileUpload,
    ) -> Result<Payment, MarketplaceError> {
        check_upload(&receipt, Bucket::PaymentReceipts, "receipt")?;

        let mut payment = self.payment(payment_id)?;
        if !session.owns(&payment.user_id) {
            return Err(MarketplaceError::Forbidden(
                "receipts can only be attached to your own payments",
            ));
        }
        if payment.status.is_terminal() {
            warn!(
                payment_id = %payment.id,
                status = payment.status.label(),
                "receipt refused for settled payment"
            );
            return Err(MarketplaceError::InvalidTransition {
                record: "payment",
                status: payment.status.label(),
            });
        }

        let object = self.store_upload(Bucket::PaymentReceipts, &receipt)?;
        payment.receipt_storage_path = Some(object);
        self.records.update_payment(payment.clone())?;

        info!(payment_id = %payment.id, learner = %payment.user_id, "receipt submitted");
        Ok(payment)
    }

    /// Admin verdict on a pending payment. Decided payments are write-once.
    pub fn decide_payment(
        &self,
        session: &Session,
        payment_id: &PaymentId,
        decision: Decision,
    ) -> Result<Payment, MarketplaceError> {
        require_role(
            session,
            Role::reviews_payments,
            "only admins can review payments",
        )?;

        let mut payment = self.payment(payment_id)?;
        if payment.status.is_terminal() {
            warn!(
                payment_id = %payment.id,
                status = payment.status.label(),
                "decision refused on settled payment"
            );
            return Err(MarketplaceError::InvalidTransition {
                record: "payment",
                status: payment.status.label(),
            });
        }

        payment.status = decision.payment_status();
        self.records.update_payment(payment.clone())?;

        info!(
            payment_id = %payment.id,
            reviewer = %session.user_id,
            status = payment.status.label(),
            "payment decided"
        );
        Ok(payment)
    }

    pub fn payment(&self, id: &PaymentId) -> Result<Payment, MarketplaceError> {
        self.records
            .fetch_payment(id)?
            .ok_or(MarketplaceError::NotFound("payment"))
    }

    /// Admins see every payment; everyone else sees their own, newest first.
    pub fn payments(&self, session: &Session) -> Result<Vec<Payment>, MarketplaceError> {
        let payments = if session.role.reviews_payments() {
            self.records.all_payments()?
        } else {
            self.records.payments_for_user(&session.user_id)?
        };
        Ok(payments)
    }

    pub fn payment_views(&self, session: &Session) -> Result<Vec<PaymentView>, MarketplaceError> {
        let payments = self.payments(session)?;
        if payments.is_empty() {
            return Ok(Vec::new());
        }
        let courses = self.records.list_courses()?;

        Ok(payments
            .into_iter()
            .map(|payment| {
                let course = course_lookup(&courses, &payment.course_id);
                PaymentView::new(payment, course, session)
            })
            .collect())
    }

    /// Status of the caller's first matching payment for the course (the newest row).
    pub fn payment_status(
        &self,
        session: &Session,
        course_id: &CourseId,
    ) -> Result<Option<PaymentStatus>, MarketplaceError> {
        let payments = self.records.payments_for_user(&session.user_id)?;
        Ok(latest_payment(&payments, course_id).map(|payment| payment.status))
    }

    /// Fetch a course PDF. Refused without touching the blob store unless an approved
    /// payment exists for this learner and course.
    pub fn download_course_material(
        &self,
        session: &Session,
        course_id: &CourseId,
    ) -> Result<Download, MarketplaceError> {
        let course = self.course(course_id)?;
        let payments = self.records.payments_for_user(&session.user_id)?;
        if !has_approved_payment(&payments, &course.id) {
            warn!(course_id = %course.id, user = %session.user_id, "download refused without approved payment");
            return Err(MarketplaceError::NotPurchased);
        }

        let Some(object) = course.pdf_storage_path.as_deref() else {
            warn!(course_id = %course.id, "course has no stored PDF");
            return Err(MarketplaceError::MaterialUnavailable);
        };

        let bytes = self.blobs.download(Bucket::CoursePdfs, object)?;
        info!(course_id = %course.id, user = %session.user_id, "course material downloaded");
        Ok(Download {
            file_name: format!("{}.pdf", course.title),
            content_type: mime::APPLICATION_PDF.to_string(),
            bytes,
        })
    }

    /// Receipt image for its owner or an admin.
    pub fn view_receipt(
        &self,
        session: &Session,
        payment_id: &PaymentId,
    ) -> Result<Download, MarketplaceError> {
        let payment = self.payment(payment_id)?;
        if !session.owns(&payment.user_id) && !session.role.reviews_payments() {
            return Err(MarketplaceError::Forbidden(
                "receipts are visible to their owner and admins",
            ));
        }
        let object = payment
            .receipt_storage_path
            .as_deref()
            .ok_or(MarketplaceError::NotFound("receipt"))?;

        let bytes = self.blobs.download(Bucket::PaymentReceipts, object)?;
        Ok(Download {
            file_name: format!("receipt-{}", object),
            content_type: storage::guess_media_type(object).to_string(),
            bytes,
        })
    }
}
