use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::error::AppError;
use crate::core::extractors::ApiJson;
use crate::core::AppState;
use crate::kyc::model::{DetectionSummary, HealthReport, OcrResponse};
use crate::kyc::orchestrator::VerificationOrchestrator;
use crate::kyc::liveness::LivenessOrchestrator;
use crate::stages::image::{decode_base64_image, Image};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/kyc/verify", post(verify))
        .route("/kyc/ocr", post(ocr))
        .route("/liveness/challenge", get(issue_challenge))
        .route("/liveness/verify", post(verify_liveness))
        .route("/liveness/detect", post(detect_liveness))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stages = state.stages.readiness();
    let all_loaded = stages.iter().all(|s| s.loaded);
    let report = HealthReport {
        status: if all_loaded { "healthy" } else { "degraded" },
        stages,
    };
    let code = if all_loaded { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

/// Pulls one required and one optional file field from a multipart body,
/// decoding each into an `Image` and enforcing the configured size cap.
async fn read_verify_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(Image, Option<Image>, Image), AppError> {
    let mut id_document = None;
    let mut id_document_back = None;
    let mut selfie_image = None;
    let cap = state.config.max_upload_size_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadInput(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadInput(format!("could not read field {name}: {e}")))?;
        match name.as_str() {
            "id_document" => id_document = Some(Image::decode(bytes.to_vec(), cap)?),
            "id_document_back" => id_document_back = Some(Image::decode(bytes.to_vec(), cap)?),
            "selfie_image" => selfie_image = Some(Image::decode(bytes.to_vec(), cap)?),
            _ => {}
        }
    }

    let id_document = id_document.ok_or_else(|| AppError::BadInput("missing id_document".to_string()))?;
    let selfie_image = selfie_image.ok_or_else(|| AppError::BadInput("missing selfie_image".to_string()))?;
    Ok((id_document, id_document_back, selfie_image))
}

async fn verify(State(state): State<AppState>, multipart: Multipart) -> Result<impl IntoResponse, AppError> {
    let (id_document, _id_document_back, selfie_image) = read_verify_multipart(&state, multipart).await?;

    let orchestrator = VerificationOrchestrator::new(
        Arc::clone(&state.stages),
        state.config.pending_face_floor,
        state.config.pending_ocr_floor,
    );

    let deadline = std::time::Duration::from_secs(state.config.request_deadline_seconds);
    let verdict = tokio::time::timeout(deadline, orchestrator.verify(id_document, selfie_image))
        .await
        .map_err(|_| AppError::Timeout)??;

    info!(status = ?verdict.verification_status, "verification completed");
    Ok(Json(verdict))
}

async fn ocr(State(state): State<AppState>, mut multipart: Multipart) -> Result<impl IntoResponse, AppError> {
    let cap = state.config.max_upload_size_bytes();
    let mut document = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadInput(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("document") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadInput(format!("could not read document field: {e}")))?;
            document = Some(Image::decode(bytes.to_vec(), cap)?);
        }
    }
    let document = document.ok_or_else(|| AppError::BadInput("missing document".to_string()))?;

    let ocr_stage = state.stages.ocr()?;
    let result = ocr_stage.extract(&document, &[])?;

    Ok(Json(OcrResponse {
        ocr_data: crate::kyc::model::OcrData {
            document_type: result.document_type,
            confidence: result.confidence,
            extracted_text: result.extracted_text,
            fields: result.fields,
        },
        processing_time_ms: 0,
        timestamp: chrono::Utc::now(),
    }))
}

async fn issue_challenge(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.stages.detector()?;
    let challenge = state.challenges.issue();

    let challenge_types: Vec<String> = challenge.predicates.iter().map(|p| p.as_str().to_string()).collect();
    let questions = challenge_types
        .iter()
        .map(|t| instruction_for(t))
        .collect::<Vec<_>>();

    Ok(Json(crate::kyc::model::ChallengeResponse {
        challenge_id: challenge.id,
        multi_challenge: challenge.predicates.len() > 1,
        questions: questions.clone(),
        instructions: questions,
        challenge_types,
        timestamp: challenge.issued_at,
        expires_at: challenge.expires_at,
        nonce: challenge.nonce,
        signature: challenge.signature,
    }))
}

fn instruction_for(predicate: &str) -> String {
    match predicate {
        "blink" => "Please blink naturally".to_string(),
        "turn_left" => "Please turn your head to the left".to_string(),
        "turn_right" => "Please turn your head to the right".to_string(),
        other => format!("Please perform: {other}"),
    }
}

#[derive(Debug, Deserialize)]
pub struct LivenessVerifyRequest {
    pub challenge_id: String,
    pub frames: Vec<String>,
}

async fn verify_liveness(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LivenessVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cap = state.config.max_upload_size_bytes();
    let frames = decode_frames(&body.frames, cap)?;

    let orchestrator = LivenessOrchestrator::new(
        Arc::clone(&state.stages),
        Arc::clone(&state.challenges),
        state.config.liveness_min_frames,
        state.config.liveness_face_ratio_floor,
    );

    let verdict = orchestrator.verify_liveness(&body.challenge_id, &frames)?;
    if verdict.status == crate::kyc::model::LivenessStatus::Fail {
        warn!(challenge_id = %body.challenge_id, "liveness check failed");
    }
    Ok(Json(verdict))
}

#[derive(Debug, Deserialize)]
pub struct LivenessDetectRequest {
    pub frames: Vec<String>,
    #[serde(default)]
    pub initial_blink_count: Option<u32>,
}

async fn detect_liveness(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LivenessDetectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let cap = state.config.max_upload_size_bytes();
    if body.frames.len() < state.config.liveness_min_frames {
        return Err(AppError::BadInput(format!(
            "need at least {} frames, got {}",
            state.config.liveness_min_frames,
            body.frames.len()
        )));
    }
    let frames = decode_frames(&body.frames, cap)?;

    let evaluator = state.stages.liveness()?;
    let detection = evaluator.evaluate(&frames)?;
    let blinks = detection.blinks + body.initial_blink_count.unwrap_or(0);

    Ok(Json(DetectionSummary {
        blinks,
        orientations: detection.orientations,
        face_detected: detection.face_detection_ratio > 0.0,
        face_detection_ratio: detection.face_detection_ratio,
        processing_time_ms: 0,
    }))
}

fn decode_frames(frames: &[String], cap: usize) -> Result<Vec<Image>, AppError> {
    frames
        .iter()
        .map(|data| {
            let bytes = decode_base64_image(data)?;
            Image::decode(bytes, cap)
        })
        .collect()
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": { "code": "NOT_FOUND", "message": "no such route" } })),
    )
}
