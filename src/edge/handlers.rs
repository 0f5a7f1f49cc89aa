use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tracing::{info, warn};

use crate::core::error::AppError;
use crate::core::extractors::ApiJson;
use crate::core::EdgeState;
use crate::edge::model::{extract_documents, LegacyVerifyRequest};

pub fn routes() -> Router<EdgeState> {
    Router::new()
        .route("/health", get(health))
        .route("/v2/enduser/verify", post(legacy_verify))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "edge-gateway" }))
}

/// Accepts the legacy base64-in-JSON body, normalizes it into the
/// canonical multipart form, and forwards it to the Inference Gateway.
/// Returns HTTP 200 with `{verificationId, status, message, result}` in
/// every terminal case (approved, rejected, pending); only technical
/// faults propagate as 5xx (§6 "Edge Gateway specifics", §7 translation
/// policy).
async fn legacy_verify(
    State(state): State<EdgeState>,
    ApiJson(body): ApiJson<LegacyVerifyRequest>,
) -> impl IntoResponse {
    let verification_id = uuid::Uuid::new_v4().to_string();

    let outcome = run_legacy_verify(&state, &body).await;

    match outcome {
        Ok((status, result)) => {
            info!(verification_id = %verification_id, status = %status, "legacy verification completed");
            Json(json!({
                "verificationId": verification_id,
                "status": status,
                "message": message_for(&status),
                "result": result,
            }))
        }
        Err(AppError::NoFaceInId) | Err(AppError::NoFaceInSelfie) | Err(AppError::BadInput(_)) => {
            // A deliberate exception to "rejection = 200": a 400 upstream
            // still becomes a 200-with-rejected here so the browser SDK
            // never has to special-case 400s (§7).
            warn!(verification_id = %verification_id, "legacy verification rejected at input validation");
            Json(json!({
                "verificationId": verification_id,
                "status": "rejected",
                "message": "Verification could not be completed: invalid or unusable input",
                "result": null,
            }))
        }
        Err(e) => {
            warn!(verification_id = %verification_id, error = %e, "legacy verification failed with a technical fault");
            Json(json!({
                "verificationId": verification_id,
                "status": "error",
                "message": "A technical fault occurred; please retry",
                "result": null,
            }))
        }
    }
}

async fn run_legacy_verify(
    state: &EdgeState,
    body: &LegacyVerifyRequest,
) -> Result<(String, serde_json::Value), AppError> {
    let (front_id, selfie) = extract_documents(&body.documents)?;
    let id_bytes = front_id.decode()?;
    let selfie_bytes = selfie.decode()?;

    let (http_status, result) = state.client.verify(id_bytes, selfie_bytes).await?;

    if http_status.is_success() {
        let status = result
            .get("verification_status")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("error")
            .to_string();
        Ok((status, result))
    } else if http_status == reqwest::StatusCode::BAD_REQUEST {
        let code = result
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("BAD_INPUT");
        match code {
            "NO_FACE_IN_ID" => Err(AppError::NoFaceInId),
            "NO_FACE_IN_SELFIE" => Err(AppError::NoFaceInSelfie),
            _ => Err(AppError::BadInput(code.to_string())),
        }
    } else {
        Err(AppError::BackendFailure(format!(
            "inference gateway returned {http_status}"
        )))
    }
}

fn message_for(status: &str) -> &'static str {
    match status {
        "approved" => "Identity verification approved",
        "rejected" => "Identity verification rejected",
        "pending" => "Identity verification pending additional review",
        _ => "Identity verification could not be completed",
    }
}
