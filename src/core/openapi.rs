use utoipa::OpenApi;

/// OpenAPI surface served at `/docs` on the Inference Gateway. Kept as a
/// hand-written document description rather than per-struct derives, since
/// the wire shapes in `kyc::model` are defined by spec rather than by this
/// crate's own API design.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "KYC Verification Gateway",
        description = "Biometric matching, OCR, and liveness challenge orchestration",
        version = "0.1.0"
    ),
    tags((name = "kyc", description = "KYC verification orchestration"))
)]
pub struct ApiDoc;
