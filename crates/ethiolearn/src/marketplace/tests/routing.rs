use super::common::*;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use data_encoding::BASE64;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::marketplace::router::{status_for, UploadPayload};
use crate::marketplace::{
    Decision, MarketplaceError, MarketplaceService, RepositoryError, SessionError,
};

fn all_sessions() -> StaticSessions {
    sessions_for(&[
        ("learner-token", learner()),
        ("instructor-token", instructor()),
        ("employer-token", employer()),
        ("admin-token", admin()),
    ])
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

fn upload(filename: &str, bytes: &[u8]) -> Value {
    json!({
        "filename": filename,
        "data": BASE64.encode(bytes),
    })
}

#[tokio::test]
async fn requests_without_token_are_unauthenticated() {
    let (service, _, _) = build_service();
    let router = router_with(service, all_sessions());

    let response = router
        .clone()
        .oneshot(Request::get("/api/v1/courses").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_status(&response, StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "sign in to continue");

    let response = router
        .oneshot(get("/api/v1/courses", "stale-token"))
        .await
        .unwrap();
    assert_status(&response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dashboard_follows_session_role() {
    let (service, _, _) = build_service();
    let router = router_with(service, all_sessions());

    let response = router
        .oneshot(get("/api/v1/dashboard", "admin-token"))
        .await
        .unwrap();

    assert_status(&response, StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["role"], "admin");
    assert_eq!(body["sections"][2]["title"], "Payment Receipts to Review");
}

#[tokio::test]
async fn sign_up_returns_created_grant() {
    let (service, _, _) = build_service();
    let router = router_with(service, StaticSessions::default());

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/auth/sign-up")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "email": "abebe@ethiolearn.et",
                        "password": "selam123",
                        "role": "user",
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_status(&response, StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["session"]["role"], "learner");
    let token = body["token"].as_str().expect("token").to_string();

    let response = router
        .oneshot(get("/api/v1/dashboard", &token))
        .await
        .unwrap();
    assert_status(&response, StatusCode::OK);
}

#[tokio::test]
async fn sign_up_rejects_blank_password() {
    let (service, _, _) = build_service();
    let router = router_with(service, StaticSessions::default());

    let response = router
        .oneshot(
            Request::post("/api/v1/auth/sign-up")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "email": "abebe@ethiolearn.et",
                        "password": "",
                        "role": "instructor",
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn purchase_flow_over_http() {
    let (service, _, _, course) = service_with_course();
    let router = router_with(service, all_sessions());
    let course_uri = format!("/api/v1/courses/{}", course.id);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("{course_uri}/purchase"),
            "learner-token",
            json!({}),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::CREATED);
    let payment = read_json_body(response).await;
    assert_eq!(payment["amount"], 500);
    assert_eq!(payment["status"], "pending");
    let payment_id = payment["id"].as_str().expect("payment id").to_string();

    let response = router
        .clone()
        .oneshot(get(&format!("{course_uri}/material"), "learner-token"))
        .await
        .unwrap();
    assert_status(&response, StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/payments/{payment_id}/receipt"),
            "learner-token",
            upload("receipt.jpg", &[0xff, 0xd8, 0xff]),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/payments/{payment_id}/decision"),
            "admin-token",
            json!({ "decision": "approved" }),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::OK);
    assert_eq!(read_json_body(response).await["status"], "approved");

    let response = router
        .clone()
        .oneshot(get(&format!("{course_uri}/payment-status"), "learner-token"))
        .await
        .unwrap();
    assert_eq!(read_json_body(response).await["status"], "approved");

    let response = router
        .oneshot(get(&format!("{course_uri}/material"), "learner-token"))
        .await
        .unwrap();
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Intro to Rust.pdf\""
    );
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    assert_eq!(&body[..], b"%PDF-1.7 course");
}

#[tokio::test]
async fn second_decision_conflicts() {
    let (service, _, _, course) = service_with_course();
    let payment = service
        .initiate_purchase(&learner(), &course.id)
        .expect("purchase starts");
    service
        .decide_payment(&admin(), &payment.id, Decision::Reject)
        .expect("admin rejects");
    let router = router_with(service, all_sessions());

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/payments/{}/decision", payment.id),
            "admin-token",
            json!({ "decision": "approve" }),
        ))
        .await
        .unwrap();

    assert_status(&response, StatusCode::CONFLICT);
    assert_eq!(
        read_json_body(response).await["error"],
        "payment is already rejected"
    );
}

#[tokio::test]
async fn receipt_upload_rejects_invalid_base64() {
    let (service, _, _, course) = service_with_course();
    let payment = service
        .initiate_purchase(&learner(), &course.id)
        .expect("purchase starts");
    let router = router_with(service, all_sessions());

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/payments/{}/receipt", payment.id),
            "learner-token",
            json!({ "filename": "receipt.png", "data": "not base64!" }),
        ))
        .await
        .unwrap();

    assert_status(&response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn course_creation_over_http() {
    let (service, _, _) = build_service();
    let router = router_with(service, all_sessions());
    let payload = json!({
        "title": "Amharic for Beginners",
        "description": "Fidel and everyday phrases",
        "price": 350,
        "phone_number": "+251911000000",
        "pdf": upload("amharic.pdf", b"%PDF-1.5"),
    });

    let response = router
        .clone()
        .oneshot(post_json("/api/v1/courses", "learner-token", payload.clone()))
        .await
        .unwrap();
    assert_status(&response, StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(post_json("/api/v1/courses", "instructor-token", payload))
        .await
        .unwrap();
    assert_status(&response, StatusCode::CREATED);

    let response = router
        .oneshot(get("/api/v1/courses", "learner-token"))
        .await
        .unwrap();
    let listing = read_json_body(response).await;
    assert_eq!(listing[0]["title"], "Amharic for Beginners");
    assert_eq!(listing[0]["can_purchase"], true);
    assert_eq!(listing[0]["can_download"], false);
}

#[tokio::test]
async fn hiring_flow_over_http() {
    let (service, _, _) = build_service();
    let router = router_with(service, all_sessions());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/jobs",
            "employer-token",
            json!({
                "title": "Software Developer",
                "company": "Addis Systems",
                "location": "Addis Ababa",
                "requirements": "Rust",
            }),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::CREATED);
    let job_id = read_json_body(response).await["id"]
        .as_str()
        .expect("job id")
        .to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/jobs/{job_id}/applications"),
            "learner-token",
            upload("cv.pdf", b"%PDF-1.4 cv"),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::CREATED);
    let application_id = read_json_body(response).await["id"]
        .as_str()
        .expect("application id")
        .to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/jobs/{job_id}/applications"),
            "learner-token",
            upload("cv.pdf", b"%PDF-1.4 cv"),
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/applications/{application_id}/decision"),
            "employer-token",
            json!({ "decision": "reject" }),
        ))
        .await
        .unwrap();
    assert_eq!(read_json_body(response).await["status"], "rejected");

    let response = router
        .clone()
        .oneshot(get(
            &format!("/api/v1/applications/{application_id}/cv"),
            "employer-token",
        ))
        .await
        .unwrap();
    assert_status(&response, StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Applicant_CV.pdf\""
    );

    let response = router
        .oneshot(get("/api/v1/applications", "instructor-token"))
        .await
        .unwrap();
    assert_status(&response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn backend_failures_hide_details() {
    let records = MemoryRecords::default();
    let service = MarketplaceService::new(Arc::new(records), Arc::new(UnavailableBlobs));
    let router = marketplace_router_for(service);

    let response = router
        .oneshot(post_json(
            "/api/v1/courses",
            "instructor-token",
            json!({
                "title": "Intro to Rust",
                "description": "Ownership",
                "price": 500,
                "phone_number": "+251912345678",
                "pdf": upload("rust.pdf", b"%PDF"),
            }),
        ))
        .await
        .unwrap();

    assert_status(&response, StatusCode::BAD_GATEWAY);
    assert_eq!(
        read_json_body(response).await["error"],
        "something went wrong, please try again later"
    );
}

fn marketplace_router_for(
    service: MarketplaceService<MemoryRecords, UnavailableBlobs>,
) -> axum::Router {
    crate::marketplace::marketplace_router(Arc::new(service), Arc::new(all_sessions()))
}

#[test]
fn status_mapping_covers_session_errors() {
    assert_eq!(
        status_for(&MarketplaceError::Session(SessionError::AlreadyRegistered)),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_for(&MarketplaceError::Session(SessionError::InvalidCredentials)),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_for(&MarketplaceError::Repository(RepositoryError::Unavailable(
            "timeout".to_string()
        ))),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&MarketplaceError::MaterialUnavailable),
        StatusCode::NOT_FOUND
    );
}

#[test]
fn upload_payload_keeps_declared_type() {
    let payload: UploadPayload = serde_json::from_value(json!({
        "filename": "scan",
        "mime_type": "image/jpeg",
        "data": BASE64.encode(b"jpeg"),
    }))
    .unwrap();

    let upload = payload.decode().expect("decodes");

    assert_eq!(upload.file_name, "scan");
    assert_eq!(upload.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(upload.bytes, b"jpeg".to_vec());
}
