use std::sync::OnceLock;

use serde::Serialize;

use crate::core::config::Config;
use crate::core::error::AppError;
use crate::stages::face_detector::FaceDetectorStage;
use crate::stages::face_matcher::FaceMatcherStage;
use crate::stages::liveness_evaluator::LivenessEvaluatorStage;
use crate::stages::ocr_extractor::OcrExtractorStage;

/// Readiness status for a single stage, as reported by `/health` (§4.1).
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub name: &'static str,
    pub loaded: bool,
    pub error: Option<String>,
}

/// Lazily constructs and owns the four inference stages. Each stage is
/// built at most once: concurrent callers racing on first use share a
/// single construction via `OnceLock`, and a stage whose construction
/// fails is marked not-loaded without poisoning the others (§4.1).
pub struct StageRegistry {
    detector: OnceLock<Result<FaceDetectorStage, String>>,
    matcher: OnceLock<Result<FaceMatcherStage, String>>,
    ocr: OnceLock<Result<OcrExtractorStage, String>>,
    liveness: OnceLock<Result<LivenessEvaluatorStage, String>>,
    similarity_threshold: f32,
}

impl StageRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            detector: OnceLock::new(),
            matcher: OnceLock::new(),
            ocr: OnceLock::new(),
            liveness: OnceLock::new(),
            similarity_threshold: config.similarity_threshold,
        }
    }

    pub fn detector(&self) -> Result<&FaceDetectorStage, AppError> {
        self.detector
            .get_or_init(|| {
                FaceDetectorStage::new(0.5).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| AppError::NotReady(format!("detector: {e}")))
    }

    pub fn matcher(&self) -> Result<&FaceMatcherStage, AppError> {
        self.matcher
            .get_or_init(|| {
                FaceMatcherStage::new(self.similarity_threshold).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| AppError::NotReady(format!("matcher: {e}")))
    }

    pub fn ocr(&self) -> Result<&OcrExtractorStage, AppError> {
        self.ocr
            .get_or_init(|| OcrExtractorStage::new().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AppError::NotReady(format!("ocr: {e}")))
    }

    pub fn liveness(&self) -> Result<&LivenessEvaluatorStage, AppError> {
        self.liveness
            .get_or_init(|| LivenessEvaluatorStage::new().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AppError::NotReady(format!("liveness: {e}")))
    }

    /// Forces construction of every stage and reports readiness for each,
    /// the source of truth for `/api/v1/health` (§4.1).
    pub fn readiness(&self) -> Vec<StageStatus> {
        vec![
            status("detector", self.detector()),
            status("matcher", self.matcher()),
            status("ocr", self.ocr()),
            status("liveness", self.liveness()),
        ]
    }

    pub fn all_loaded(&self) -> bool {
        self.readiness().iter().all(|s| s.loaded)
    }
}

fn status<T>(name: &'static str, result: Result<&T, AppError>) -> StageStatus {
    match result {
        Ok(_) => StageStatus {
            name,
            loaded: true,
            error: None,
        },
        Err(e) => StageStatus {
            name,
            loaded: false,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            hmac_secret: "x".repeat(32),
            liveness_min_frames: 10,
            liveness_face_ratio_floor: 0.5,
            cors_allowed_origins: vec!["*".to_string()],
            request_deadline_seconds: 60,
            inference_gateway_url: "http://127.0.0.1:8081".to_string(),
        }
    }

    #[test]
    fn all_stages_load_and_registry_is_healthy() {
        let registry = StageRegistry::new(&test_config());
        assert!(registry.all_loaded());
        assert_eq!(registry.readiness().len(), 4);
    }

    #[test]
    fn repeated_access_reuses_the_same_construction() {
        let registry = StageRegistry::new(&test_config());
        let a = registry.detector().unwrap() as *const FaceDetectorStage;
        let b = registry.detector().unwrap() as *const FaceDetectorStage;
        assert_eq!(a, b);
    }
}
