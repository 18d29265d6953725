//! Router tests through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use common::{encode_image, ChargeOutcome, TestApp, APPROVAL_SECRET};
use http::{Request, StatusCode};
use image::ImageFormat;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, user_id: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_body(boundary: &str, order_id: &str, file_name: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"order_id\"\r\n\r\n{order_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"slip\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn health_reports_healthy_without_probes() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], "Healthy");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/payments/validate",
            None,
            json!({ "order_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "COMMON.UNAUTHORIZED");
}

#[tokio::test]
async fn validate_returns_chargeable_amount() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let user_id = Uuid::new_v4();
    let order = app.seed_order(user_id, &["1000"]).await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/payments/validate",
            Some(user_id),
            json!({ "order_id": order.id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["order"]["id"], order.id.to_string());
    assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn error_body_carries_code_and_request_id() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let user_id = Uuid::new_v4();
    let order = app.seed_order(user_id, &["10"]).await;

    let mut request = json_request(
        "POST",
        "/api/payments/validate",
        Some(user_id),
        json!({ "order_id": order.id }),
    );
    request
        .headers_mut()
        .insert("x-request-id", "req-fixed-1".parse().unwrap());

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "PAYMENT.BELOW_MINIMUM_AMOUNT");
    assert_eq!(body["request_id"], "req-fixed-1");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn card_payment_end_to_end() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let user_id = Uuid::new_v4();
    let order = app.seed_order(user_id, &["1000"]).await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/payments/card",
            Some(user_id),
            json!({
                "order_id": order.id,
                "card": {
                    "name": "Test Buyer",
                    "number": "4242424242424242",
                    "expiration_month": 12,
                    "expiration_year": 2030,
                    "security_code": "123",
                    "city": "Bangkok",
                    "postal_code": "10320"
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "successful");

    let card = app.gateway.last_card().unwrap();
    assert_eq!(card.city.as_deref(), Some("Bangkok"));
    assert_eq!(card.postal_code.as_deref(), Some("10320"));

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/payments/me")
                .header("x-user-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["meta"]["count"], 1);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/card")
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(Body::from("{\"order_id\": 42"))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "COMMON.VALIDATION_ERROR");
}

#[tokio::test]
async fn payment_listing_is_admin_only() {
    let app = TestApp::new(ChargeOutcome::Paid);

    let student = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/payments?status=pending")
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(student.status(), StatusCode::FORBIDDEN);

    let admin = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/payments?payment_type=bank_transfer&status=pending")
                .header("x-user-id", Uuid::new_v4().to_string())
                .header("x-user-role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(admin.status(), StatusCode::OK);
    assert_eq!(body_json(admin).await["meta"]["count"], 0);
}

#[tokio::test]
async fn bank_transfer_upload_and_approval_webhook() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let user_id = Uuid::new_v4();
    let order = app.seed_order(user_id, &["1000"]).await;

    let boundary = "coursepay-test-boundary";
    let png = encode_image(300, 300, ImageFormat::Png);
    let upload = Request::builder()
        .method("POST")
        .uri("/api/payments/bank-transfer")
        .header("x-user-id", user_id.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(
            boundary,
            &order.id.to_string(),
            "slip.png",
            "image/png",
            &png,
        )))
        .unwrap();

    let response = app.router().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    let decision = json!({ "payment_id": payment_id, "approved": true });

    let mut wrong_secret = json_request("POST", "/webhooks/bank-transfer/approval", None, decision.clone());
    wrong_secret
        .headers_mut()
        .insert("x-approval-secret", "guess".parse().unwrap());
    let response = app.router().oneshot(wrong_secret).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut approved = json_request("POST", "/webhooks/bank-transfer/approval", None, decision);
    approved
        .headers_mut()
        .insert("x-approval-secret", APPROVAL_SECRET.parse().unwrap());
    let response = app.router().oneshot(approved).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["payment"]["status"], "successful");
    assert_eq!(body["data"]["enrollments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn spoofed_upload_is_rejected_over_http() {
    let app = TestApp::new(ChargeOutcome::Paid);
    let user_id = Uuid::new_v4();
    let order = app.seed_order(user_id, &["1000"]).await;

    let boundary = "coursepay-test-boundary";
    let jpeg = encode_image(300, 300, ImageFormat::Jpeg);
    let upload = Request::builder()
        .method("POST")
        .uri("/api/payments/bank-transfer")
        .header("x-user-id", user_id.to_string())
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(
            boundary,
            &order.id.to_string(),
            "slip.png",
            "image/png",
            &jpeg,
        )))
        .unwrap();

    let response = app.router().oneshot(upload).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "UPLOAD.BAD_SIGNATURE");
    assert_eq!(app.storage.object_count().await, 0);
}
