use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::core::error::AppError;
use crate::kyc::model::{
    FaceVerificationDetails, OcrData, SimilarityMetrics, VerificationStatus, VerificationVerdict,
};
use crate::stages::image::Image;
use crate::stages::registry::StageRegistry;

/// Runs the full KYC pipeline: detect both faces, fan out matching and OCR,
/// join, and apply the scoring policy (§4.7).
pub struct VerificationOrchestrator {
    stages: Arc<StageRegistry>,
    pending_face_floor: f32,
    pending_ocr_floor: f32,
}

impl VerificationOrchestrator {
    pub fn new(stages: Arc<StageRegistry>, pending_face_floor: f32, pending_ocr_floor: f32) -> Self {
        Self {
            stages,
            pending_face_floor,
            pending_ocr_floor,
        }
    }

    pub async fn verify(&self, id_doc: Image, selfie: Image) -> Result<VerificationVerdict, AppError> {
        let started = Instant::now();

        let detector = self.stages.detector()?;
        let id_face = detector.detect(&id_doc)?.ok_or(AppError::NoFaceInId)?;
        let selfie_face = detector.detect(&selfie)?.ok_or(AppError::NoFaceInSelfie)?;

        // Fan out: matcher and OCR run as independent tasks so neither
        // blocks the other's CPU-bound work (§4.7 step 3, §5). Both stages
        // are plain values behind `Arc`, so each task gets its own clone of
        // the inputs it needs rather than sharing a borrow across an await.
        let stages_for_match = Arc::clone(&self.stages);
        let id_doc_for_match = id_doc.clone();
        let selfie_for_match = selfie.clone();
        let match_task = tokio::task::spawn_blocking(move || -> Result<(f32, f32), AppError> {
            let matcher = stages_for_match.matcher()?;
            let id_embedding = matcher.embed(&id_doc_for_match, &id_face)?;
            let selfie_embedding = matcher.embed(&selfie_for_match, &selfie_face)?;
            let result = matcher.compare(&id_embedding, &selfie_embedding)?;
            Ok((result.cosine, result.euclidean))
        });

        let stages_for_ocr = Arc::clone(&self.stages);
        let id_doc_for_ocr = id_doc.clone();
        let ocr_task = tokio::task::spawn_blocking(move || -> Result<_, AppError> {
            let ocr = stages_for_ocr.ocr()?;
            ocr.extract(&id_doc_for_ocr, &[])
        });

        let (match_result, ocr_result) = tokio::try_join!(flatten(match_task), flatten(ocr_task))?;
        let (cosine, euclidean) = match_result;

        let threshold = self.stages.matcher()?.threshold();
        let ocr_confidence = ocr_result.confidence;

        let verified = cosine >= threshold;
        let confidence_score = 0.6 * cosine + 0.4 * ocr_confidence;

        let status = if verified && (cosine >= self.pending_face_floor || ocr_confidence >= self.pending_ocr_floor) {
            VerificationStatus::Approved
        } else if verified {
            VerificationStatus::Pending
        } else {
            VerificationStatus::Rejected
        };

        let message = if verified {
            format!("Faces match ({:.1}% similarity)", cosine * 100.0)
        } else {
            format!(
                "Faces do not match ({:.1}% similarity, threshold: {:.1}%)",
                cosine * 100.0,
                threshold * 100.0
            )
        };

        Ok(VerificationVerdict {
            verification_status: status,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            face_match_score: cosine.clamp(0.0, 1.0),
            ocr_data: Some(OcrData {
                document_type: ocr_result.document_type,
                confidence: ocr_result.confidence,
                extracted_text: ocr_result.extracted_text,
                fields: ocr_result.fields,
            }),
            processing_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            face_verification_details: Some(FaceVerificationDetails {
                verified,
                confidence: cosine.clamp(0.0, 1.0),
                similarity_metrics: SimilarityMetrics {
                    cosine_similarity: cosine,
                    euclidean_distance: euclidean,
                },
                threshold_used: threshold,
                message,
            }),
        })
    }
}

async fn flatten<T>(handle: tokio::task::JoinHandle<Result<T, AppError>>) -> Result<T, AppError> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(AppError::Internal(format!("stage task panicked: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reproduces §8's scoring policy table directly, independent of the
    /// stage pipeline: identical inputs must yield identical status and
    /// confidence bit-for-bit (invariant 4).
    fn score(cos: f32, ocr_c: f32, threshold: f32, face_floor: f32, ocr_floor: f32) -> (VerificationStatus, f32) {
        let verified = cos >= threshold;
        let confidence = 0.6 * cos + 0.4 * ocr_c;
        let status = if verified && (cos >= face_floor || ocr_c >= ocr_floor) {
            VerificationStatus::Approved
        } else if verified {
            VerificationStatus::Pending
        } else {
            VerificationStatus::Rejected
        };
        (status, confidence)
    }

    #[test]
    fn scenario_s1_approved() {
        let (status, confidence) = score(0.85, 0.92, 0.30, 0.35, 0.5);
        assert_eq!(status, VerificationStatus::Approved);
        assert!((confidence - 0.878).abs() < 1e-6);
    }

    #[test]
    fn scenario_s2_rejected() {
        let (status, _) = score(0.10, 0.88, 0.30, 0.35, 0.5);
        assert_eq!(status, VerificationStatus::Rejected);
    }

    #[test]
    fn scenario_s3_pending() {
        let (status, _) = score(0.33, 0.20, 0.30, 0.35, 0.5);
        assert_eq!(status, VerificationStatus::Pending);
    }

    #[test]
    fn cosine_equal_to_threshold_is_verified_and_not_rejected() {
        let (status, _) = score(0.30, 0.0, 0.30, 0.35, 0.5);
        assert_ne!(status, VerificationStatus::Rejected);
    }

    #[test]
    fn scoring_is_deterministic_for_identical_inputs() {
        let a = score(0.5, 0.6, 0.30, 0.35, 0.5);
        let b = score(0.5, 0.6, 0.30, 0.35, 0.5);
        assert_eq!(a.0, b.0);
        assert_eq!(a.1.to_bits(), b.1.to_bits());
    }
}
