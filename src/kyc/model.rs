use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stages::liveness_evaluator::Side;
use crate::stages::ocr_extractor::{DocumentFields, DocumentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Approved,
    Rejected,
    Pending,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrData {
    pub document_type: DocumentType,
    pub confidence: f32,
    pub extracted_text: String,
    pub fields: DocumentFields,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMetrics {
    pub cosine_similarity: f32,
    pub euclidean_distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceVerificationDetails {
    pub verified: bool,
    pub confidence: f32,
    pub similarity_metrics: SimilarityMetrics,
    pub threshold_used: f32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationVerdict {
    pub verification_status: VerificationStatus,
    pub confidence_score: f32,
    pub face_match_score: f32,
    pub ocr_data: Option<OcrData>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub face_verification_details: Option<FaceVerificationDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrResponse {
    pub ocr_data: OcrData,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub multi_challenge: bool,
    pub challenge_types: Vec<String>,
    pub questions: Vec<String>,
    pub instructions: Vec<String>,
    pub timestamp: i64,
    pub expires_at: i64,
    pub nonce: String,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LivenessStatus {
    Pass,
    Fail,
    Expired,
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionResults {
    pub blinks: u32,
    pub orientation: Option<Side>,
    pub orientations: Vec<Option<Side>>,
    pub face_detected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessVerdict {
    pub challenge_id: String,
    pub status: LivenessStatus,
    pub message: String,
    pub detection_results: DetectionResults,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionSummary {
    pub blinks: u32,
    pub orientations: Vec<Option<Side>>,
    pub face_detected: bool,
    pub face_detection_ratio: f32,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub stages: Vec<crate::stages::registry::StageStatus>,
}
