use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use data_encoding::BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::access::{Credentials, Role, Session, SessionError, SessionProvider};
use super::domain::{
    ApplicationId, CourseDraft, CourseId, Decision, Download, FileUpload, JobDraft, JobId,
    PaymentId,
};
use super::repository::RecordStore;
use super::service::{MarketplaceError, MarketplaceService};
use super::storage::BlobStore;

/// Shared handler state: the workflow service plus the session provider used to
/// resolve bearer tokens.
pub struct MarketplaceState<R, B, P> {
    pub service: Arc<MarketplaceService<R, B>>,
    pub sessions: Arc<P>,
}

impl<R, B, P> Clone for MarketplaceState<R, B, P> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

/// Router builder exposing the course, payment and hiring endpoints.
pub fn marketplace_router<R, B, P>(
    service: Arc<MarketplaceService<R, B>>,
    sessions: Arc<P>,
) -> Router
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    Router::new()
        .route("/api/v1/auth/sign-up", post(sign_up_handler::<R, B, P>))
        .route("/api/v1/auth/sign-in", post(sign_in_handler::<R, B, P>))
        .route("/api/v1/dashboard", get(dashboard_handler::<R, B, P>))
        .route(
            "/api/v1/courses",
            get(list_courses_handler::<R, B, P>).post(create_course_handler::<R, B, P>),
        )
        .route(
            "/api/v1/courses/:course_id/purchase",
            post(purchase_handler::<R, B, P>),
        )
        .route(
            "/api/v1/courses/:course_id/payment-status",
            get(payment_status_handler::<R, B, P>),
        )
        .route(
            "/api/v1/courses/:course_id/material",
            get(material_handler::<R, B, P>),
        )
        .route("/api/v1/payments", get(list_payments_handler::<R, B, P>))
        .route(
            "/api/v1/payments/:payment_id/receipt",
            get(view_receipt_handler::<R, B, P>).post(submit_receipt_handler::<R, B, P>),
        )
        .route(
            "/api/v1/payments/:payment_id/decision",
            post(decide_payment_handler::<R, B, P>),
        )
        .route(
            "/api/v1/jobs",
            get(list_jobs_handler::<R, B, P>).post(post_job_handler::<R, B, P>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(apply_handler::<R, B, P>),
        )
        .route(
            "/api/v1/applications",
            get(list_applications_handler::<R, B, P>),
        )
        .route(
            "/api/v1/applications/:application_id/decision",
            post(decide_application_handler::<R, B, P>),
        )
        .route(
            "/api/v1/applications/:application_id/cv",
            get(cv_handler::<R, B, P>),
        )
        .with_state(MarketplaceState { service, sessions })
}

/// Base64 file body, the same shape for receipts, CVs and course PDFs.
#[derive(Debug, Deserialize)]
pub struct UploadPayload {
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl UploadPayload {
    pub fn decode(self) -> Result<FileUpload, MarketplaceError> {
        let bytes = BASE64
            .decode(self.data.trim().as_bytes())
            .map_err(|_| MarketplaceError::Validation("file data must be base64".to_string()))?;
        let mut upload = FileUpload::new(self.filename, bytes);
        upload.content_type = self.mime_type;
        Ok(upload)
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    #[serde(flatten)]
    pub draft: CourseDraft,
    #[serde(default)]
    pub pdf: Option<UploadPayload>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

type HandlerResult = Result<Response, MarketplaceError>;

pub(crate) fn authenticate<P: SessionProvider>(
    sessions: &P,
    headers: &HeaderMap,
) -> Result<Session, MarketplaceError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(MarketplaceError::Unauthenticated)?;

    sessions
        .resolve(token)?
        .ok_or(MarketplaceError::Unauthenticated)
}

pub(crate) async fn sign_up_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    Json(request): Json<SignUpRequest>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    request.credentials.validate()?;
    let grant = state.sessions.sign_up(request.credentials, request.role)?;
    info!(user = %grant.session.user_id, role = %grant.session.role, "account registered");
    Ok((StatusCode::CREATED, Json(grant)).into_response())
}

pub(crate) async fn sign_in_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    Json(credentials): Json<Credentials>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    credentials.validate()?;
    let grant = state.sessions.sign_in(credentials)?;
    Ok(Json(grant).into_response())
}

pub(crate) async fn dashboard_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    Ok(Json(session.role.dashboard()).into_response())
}

pub(crate) async fn list_courses_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let views = state.service.course_views(&session)?;
    Ok(Json(views).into_response())
}

pub(crate) async fn create_course_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Json(request): Json<CreateCourseRequest>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let pdf = request.pdf.map(UploadPayload::decode).transpose()?;
    let course = state.service.create_course(&session, request.draft, pdf)?;
    Ok((StatusCode::CREATED, Json(course)).into_response())
}

pub(crate) async fn purchase_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let payment = state
        .service
        .initiate_purchase(&session, &CourseId(course_id))?;
    Ok((StatusCode::CREATED, Json(payment)).into_response())
}

pub(crate) async fn payment_status_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let course_id = CourseId(course_id);
    let status = state.service.payment_status(&session, &course_id)?;
    Ok(Json(json!({
        "course_id": course_id,
        "status": status,
    }))
    .into_response())
}

pub(crate) async fn material_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let download = state
        .service
        .download_course_material(&session, &CourseId(course_id))?;
    Ok(download_response(download))
}

pub(crate) async fn list_payments_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let views = state.service.payment_views(&session)?;
    Ok(Json(views).into_response())
}

pub(crate) async fn submit_receipt_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    Json(payload): Json<UploadPayload>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let receipt = payload.decode()?;
    let payment = state
        .service
        .submit_receipt(&session, &PaymentId(payment_id), receipt)?;
    Ok(Json(payment).into_response())
}

pub(crate) async fn view_receipt_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let download = state
        .service
        .view_receipt(&session, &PaymentId(payment_id))?;
    Ok(download_response(download))
}

pub(crate) async fn decide_payment_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let payment =
        state
            .service
            .decide_payment(&session, &PaymentId(payment_id), request.decision)?;
    Ok(Json(payment).into_response())
}

pub(crate) async fn list_jobs_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let views = state.service.job_views(&session)?;
    Ok(Json(views).into_response())
}

pub(crate) async fn post_job_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Json(draft): Json<JobDraft>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let job = state.service.post_job(&session, draft)?;
    Ok((StatusCode::CREATED, Json(job)).into_response())
}

pub(crate) async fn apply_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(payload): Json<UploadPayload>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let cv = payload.decode()?;
    let application = state.service.apply_to_job(&session, &JobId(job_id), cv)?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

pub(crate) async fn list_applications_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let views = state.service.application_views(&session)?;
    Ok(Json(views).into_response())
}

pub(crate) async fn decide_application_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let application = state.service.decide_application(
        &session,
        &ApplicationId(application_id),
        request.decision,
    )?;
    Ok(Json(application).into_response())
}

pub(crate) async fn cv_handler<R, B, P>(
    State(state): State<MarketplaceState<R, B, P>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> HandlerResult
where
    R: RecordStore + 'static,
    B: BlobStore + 'static,
    P: SessionProvider + 'static,
{
    let session = authenticate(state.sessions.as_ref(), &headers)?;
    let download = state
        .service
        .download_cv(&session, &ApplicationId(application_id))?;
    Ok(download_response(download))
}

fn download_response(download: Download) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_name(&download.file_name)
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, download.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response()
}

/// Header-safe rendition of a download name; anything outside plain ASCII becomes '_'.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

pub(crate) fn status_for(error: &MarketplaceError) -> StatusCode {
    match error {
        MarketplaceError::Validation(_)
        | MarketplaceError::MissingFile(_)
        | MarketplaceError::UnsupportedFile { .. }
        | MarketplaceError::Session(SessionError::Validation(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        MarketplaceError::Unauthenticated
        | MarketplaceError::Session(SessionError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
        MarketplaceError::Forbidden(_) | MarketplaceError::NotPurchased => StatusCode::FORBIDDEN,
        MarketplaceError::NotFound(_) | MarketplaceError::MaterialUnavailable => {
            StatusCode::NOT_FOUND
        }
        MarketplaceError::InvalidTransition { .. }
        | MarketplaceError::AlreadyApplied
        | MarketplaceError::Session(SessionError::AlreadyRegistered) => StatusCode::CONFLICT,
        MarketplaceError::Session(SessionError::Unavailable(_))
        | MarketplaceError::Repository(_)
        | MarketplaceError::Storage(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if self.is_backend_failure() {
            error!(error = %self, "marketplace backend call failed");
        }
        let payload = json!({ "error": self.public_message() });
        (status, Json(payload)).into_response()
    }
}
