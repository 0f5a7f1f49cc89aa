use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use kyc_gateway::challenge::store::ChallengeStore;
use kyc_gateway::core::config::Config;
use kyc_gateway::core::AppState;
use kyc_gateway::kyc::handlers;
use kyc_gateway::stages::registry::StageRegistry;

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        similarity_threshold: 0.30,
        pending_face_floor: 0.35,
        pending_ocr_floor: 0.5,
        max_upload_size_mb: 10,
        challenge_ttl_seconds: 120,
        challenge_count: 2,
        hmac_secret: "integration-test-secret-value-32b".to_string(),
        liveness_min_frames: 10,
        liveness_face_ratio_floor: 0.5,
        cors_allowed_origins: vec!["*".to_string()],
        request_deadline_seconds: 60,
        inference_gateway_url: "http://127.0.0.1:8081".to_string(),
    }
}

fn test_app() -> Router {
    let config = Arc::new(test_config());
    let stages = Arc::new(StageRegistry::new(&config));
    let challenges = Arc::new(ChallengeStore::new(
        &config.hmac_secret,
        config.challenge_ttl_seconds,
        config.challenge_count,
    ));
    let state = AppState {
        config,
        stages,
        challenges,
    };
    Router::new().nest("/api/v1", handlers::routes()).with_state(state)
}

#[tokio::test]
async fn health_reports_all_stages_loaded() {
    let app = test_app();
    let response = app
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn issuing_a_challenge_returns_signature_and_predicates() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/liveness/challenge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(json["challenge_id"].is_string());
    assert!(json["signature"].is_string());
    assert!(json["challenge_types"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn verify_without_required_fields_is_bad_request() {
    let app = test_app();
    let boundary = "X-BOUNDARY-TEST";
    let body = format!("--{boundary}--\r\n");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/kyc/verify")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn liveness_verify_with_unknown_challenge_is_200_invalid() {
    let app = test_app();
    let payload = serde_json::json!({ "challenge_id": "does-not-exist", "frames": [] });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/liveness/verify")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "invalid");
}

#[tokio::test]
async fn ocr_without_document_field_is_bad_request() {
    let app = test_app();
    let boundary = "X-BOUNDARY-TEST";
    let body = format!("--{boundary}--\r\n");
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/kyc/ocr")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
