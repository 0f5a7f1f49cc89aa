use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::challenge::model::{ConsumeOutcome, Predicate};
use crate::challenge::store::ChallengeStore;
use crate::core::error::AppError;
use crate::kyc::model::{DetectionResults, LivenessStatus, LivenessVerdict};
use crate::stages::image::Image;
use crate::stages::liveness_evaluator::Side;
use crate::stages::registry::StageRegistry;

/// Verifies a batch of frames against a previously issued challenge (§4.8).
pub struct LivenessOrchestrator {
    stages: Arc<StageRegistry>,
    challenges: Arc<ChallengeStore>,
    min_frames: usize,
    face_ratio_floor: f32,
}

impl LivenessOrchestrator {
    pub fn new(
        stages: Arc<StageRegistry>,
        challenges: Arc<ChallengeStore>,
        min_frames: usize,
        face_ratio_floor: f32,
    ) -> Self {
        Self {
            stages,
            challenges,
            min_frames,
            face_ratio_floor,
        }
    }

    pub fn verify_liveness(&self, id: &str, frames: &[Image]) -> Result<LivenessVerdict, AppError> {
        let started = Instant::now();

        let challenge = match self.challenges.lookup(id) {
            Some(c) => c,
            None => return Ok(self.verdict(id, LivenessStatus::Invalid, "Challenge not found or expired", empty_results(), started)),
        };

        if frames.len() < self.min_frames {
            return Ok(self.verdict(id, LivenessStatus::Fail, "not enough frames", empty_results(), started));
        }

        let evaluator = self.stages.liveness()?;
        let detection = evaluator.evaluate(frames)?;

        if detection.face_detection_ratio < self.face_ratio_floor {
            let results = DetectionResults {
                blinks: detection.blinks,
                orientation: detection.orientations.last().copied().flatten(),
                orientations: detection.orientations.clone(),
                face_detected: false,
            };
            return Ok(self.verdict(id, LivenessStatus::Fail, "face not consistently visible", results, started));
        }

        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        for predicate in &challenge.predicates {
            let ok = match predicate {
                Predicate::Blink => detection.blinks >= 1,
                Predicate::TurnLeft => detection.orientations.iter().any(|o| *o == Some(Side::Left)),
                Predicate::TurnRight => detection.orientations.iter().any(|o| *o == Some(Side::Right)),
            };
            if ok {
                satisfied.push(*predicate);
            } else {
                unsatisfied.push(*predicate);
            }
        }

        let results = DetectionResults {
            blinks: detection.blinks,
            orientation: detection.orientations.last().copied().flatten(),
            orientations: detection.orientations.clone(),
            face_detected: true,
        };

        if unsatisfied.is_empty() {
            match self.challenges.consume(id, &challenge.signature) {
                ConsumeOutcome::Ok => {
                    let message = format!(
                        "Completed: {}",
                        satisfied.iter().map(Predicate::as_str).collect::<Vec<_>>().join(", ")
                    );
                    Ok(self.verdict(id, LivenessStatus::Pass, &message, results, started))
                }
                // A racing duplicate verify already consumed this challenge;
                // a PASS that cannot be consumed is downgraded to INVALID (§4.8).
                _ => Ok(self.verdict(id, LivenessStatus::Invalid, "challenge already verified", results, started)),
            }
        } else {
            let message = format!(
                "Completed: {}; missing: {}",
                satisfied.iter().map(Predicate::as_str).collect::<Vec<_>>().join(", "),
                unsatisfied.iter().map(Predicate::as_str).collect::<Vec<_>>().join(", "),
            );
            Ok(self.verdict(id, LivenessStatus::Fail, &message, results, started))
        }
    }

    fn verdict(
        &self,
        id: &str,
        status: LivenessStatus,
        message: &str,
        detection_results: DetectionResults,
        started: Instant,
    ) -> LivenessVerdict {
        LivenessVerdict {
            challenge_id: id.to_string(),
            status,
            message: message.to_string(),
            detection_results,
            processing_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}

fn empty_results() -> DetectionResults {
    DetectionResults {
        blinks: 0,
        orientation: None,
        orientations: Vec::new(),
        face_detected: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use image::{DynamicImage, RgbImage};

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

    fn frame(w: u32, h: u32, fill: u8) -> Image {
        let buf = RgbImage::from_pixel(w, h, image::Rgb([fill, fill, fill]));
        Image {
            raster: DynamicImage::ImageRgb8(buf),
            bytes: vec![],
            content_type: crate::stages::image::ImageContentType::Png,
        }
    }

    fn gradient_frame(w: u32, h: u32, bright_on_left: bool) -> Image {
        let mut buf = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let on_left = x < w / 2;
                let v = if on_left == bright_on_left { 220u8 } else { 30u8 };
                buf.put_pixel(x, y, image::Rgb([v, v, v]));
            }
        }
        Image {
            raster: DynamicImage::ImageRgb8(buf),
            bytes: vec![],
            content_type: crate::stages::image::ImageContentType::Png,
        }
    }

    #[test]
    fn unknown_challenge_is_invalid() {
        let config = test_config();
        let stages = Arc::new(StageRegistry::new(&config));
        let challenges = Arc::new(ChallengeStore::new(&config.hmac_secret, 120, 2));
        let orchestrator = LivenessOrchestrator::new(stages, challenges, 10, 0.5);

        let verdict = orchestrator.verify_liveness("missing", &[]).unwrap();
        assert_eq!(verdict.status, LivenessStatus::Invalid);
    }

    #[test]
    fn fewer_than_minimum_frames_fails() {
        let config = test_config();
        let stages = Arc::new(StageRegistry::new(&config));
        let challenges = Arc::new(ChallengeStore::new(&config.hmac_secret, 120, 2));
        let challenge = challenges.issue();
        let orchestrator = LivenessOrchestrator::new(stages, challenges, 10, 0.5);

        let frames: Vec<Image> = (0..9).map(|_| frame(32, 32, 128)).collect();
        let verdict = orchestrator.verify_liveness(&challenge.id, &frames).unwrap();
        assert_eq!(verdict.status, LivenessStatus::Fail);
    }

    #[test]
    fn second_verify_after_pass_is_not_another_pass() {
        let config = test_config();
        let stages = Arc::new(StageRegistry::new(&config));
        let challenges = Arc::new(ChallengeStore::new(&config.hmac_secret, 120, 0));
        let challenge = challenges.issue();
        let orchestrator = LivenessOrchestrator::new(stages, Arc::clone(&challenges), 10, 0.0);

        // `challenge_count` of 0 is still coerced to one predicate
        // (`ChallengeStore::new` floors it at 1), and which of BLINK,
        // TURN_LEFT, TURN_RIGHT gets drawn is random, so the frame sequence
        // below satisfies all three: a dark->bright transition for a blink,
        // plus a left-bright and a right-bright gradient frame.
        let mut frames: Vec<Image> = vec![
            frame(32, 32, 200),
            frame(32, 32, 10),
            frame(32, 32, 200),
            gradient_frame(32, 32, true),
            gradient_frame(32, 32, false),
        ];
        frames.extend((0..5).map(|_| frame(32, 32, 128)));

        let first = orchestrator.verify_liveness(&challenge.id, &frames).unwrap();
        assert_eq!(first.status, LivenessStatus::Pass);

        let second = orchestrator.verify_liveness(&challenge.id, &frames).unwrap();
        assert_ne!(second.status, LivenessStatus::Pass);
    }
}
