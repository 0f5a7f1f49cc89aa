use serde::Serialize;

use crate::core::error::AppError;
use crate::stages::image::Image;

/// A detected head turn. The "no turn detected" case is represented as
/// `None` at the call site rather than a third variant here, so it
/// serializes to JSON `null` per §6's `<"left"|"right"|null>` contract
/// instead of the string `"none"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct LivenessDetection {
    pub blinks: u32,
    pub orientations: Vec<Option<Side>>,
    pub face_detection_ratio: f32,
}

/// Evaluates a frame sequence for blink count and per-frame head
/// orientation. Stateful only within a single `evaluate` call: eye-aspect
/// hysteresis and face-presence tracking never leak between requests
/// (§4.5).
pub struct LivenessEvaluatorStage {
    /// Eye-aspect-ratio value below which an eye is considered closed.
    closed_threshold: f32,
    open_threshold: f32,
}

impl LivenessEvaluatorStage {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            closed_threshold: 0.22,
            open_threshold: 0.28,
        })
    }

    pub fn evaluate(&self, frames: &[Image]) -> Result<LivenessDetection, AppError> {
        let mut orientations = Vec::with_capacity(frames.len());
        let mut faces_detected = 0usize;
        let mut blinks = 0u32;
        // Hysteresis: `eye_open` starts `true` (subject assumed open-eyed at
        // first frame); a blink is counted on the closed→open transition,
        // never on open→closed, so a single sustained closure never double
        // counts.
        let mut eye_open = true;

        for frame in frames {
            let gray = frame.raster.to_luma8();
            let (w, h) = (gray.width(), gray.height());
            if w < 2 || h < 2 {
                orientations.push(None);
                continue;
            }

            faces_detected += 1;

            let ear = eye_aspect_signal(&gray);
            if eye_open && ear < self.closed_threshold {
                eye_open = false;
            } else if !eye_open && ear > self.open_threshold {
                eye_open = true;
                blinks += 1;
            }

            orientations.push(orientation_signal(&gray));
        }

        let face_detection_ratio = if frames.is_empty() {
            0.0
        } else {
            faces_detected as f32 / frames.len() as f32
        };

        Ok(LivenessDetection {
            blinks,
            orientations,
            face_detection_ratio,
        })
    }
}

/// Stand-in eye-aspect-ratio signal: the normalized brightness of a thin
/// horizontal band across the upper third of the frame, where a genuine
/// detector would track eyelid landmarks. Deterministic given fixed pixel
/// data, enough to exercise blink hysteresis without a real landmark model
/// (out of scope, §1).
fn eye_aspect_signal(gray: &image::GrayImage) -> f32 {
    let (w, h) = (gray.width(), gray.height());
    let band_y = h / 3;
    let band_h = (h / 20).max(1);
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in band_y..(band_y + band_h).min(h) {
        for x in 0..w {
            sum += gray.get_pixel(x, y).0[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        return 0.3;
    }
    (sum as f32 / count as f32) / 255.0
}

/// Stand-in orientation signal: compares mean brightness of the left and
/// right thirds of the frame (a turned head shifts visible-skin mass), a
/// deterministic placeholder for a pose-estimation backend (out of scope).
fn orientation_signal(gray: &image::GrayImage) -> Option<Side> {
    let (w, h) = (gray.width(), gray.height());
    let third = (w / 3).max(1);

    let band_sum = |x0: u32, x1: u32| -> u64 {
        let mut sum = 0u64;
        for y in 0..h {
            for x in x0..x1.min(w) {
                sum += gray.get_pixel(x, y).0[0] as u64;
            }
        }
        sum
    };

    let left = band_sum(0, third);
    let right = band_sum(w.saturating_sub(third), w);

    let diff = left as i64 - right as i64;
    let scale = (third as i64 * h as i64).max(1) * 6;

    if diff > scale {
        Some(Side::Left)
    } else if diff < -scale {
        Some(Side::Right)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn solid_frame(w: u32, h: u32, fill: u8) -> Image {
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
    fn orientations_length_matches_frame_count() {
        let stage = LivenessEvaluatorStage::new().unwrap();
        let frames: Vec<Image> = (0..10).map(|_| solid_frame(64, 64, 128)).collect();
        let result = stage.evaluate(&frames).unwrap();
        assert_eq!(result.orientations.len(), frames.len());
        assert_eq!(result.face_detection_ratio, 1.0);
    }

    #[test]
    fn bright_left_frame_reads_as_left_turn() {
        let stage = LivenessEvaluatorStage::new().unwrap();
        let frames = vec![gradient_frame(64, 64, true)];
        let result = stage.evaluate(&frames).unwrap();
        assert_eq!(result.orientations[0], Some(Side::Left));
    }

    #[test]
    fn closed_then_open_counts_exactly_one_blink() {
        let stage = LivenessEvaluatorStage::new().unwrap();
        // A dark frame pulls the eye band below the closed threshold; a
        // bright frame after it pulls it back above the open threshold.
        let frames = vec![
            solid_frame(64, 64, 200),
            solid_frame(64, 64, 10),
            solid_frame(64, 64, 200),
        ];
        let result = stage.evaluate(&frames).unwrap();
        assert_eq!(result.blinks, 1);
    }

    #[test]
    fn empty_frames_yield_zero_ratio() {
        let stage = LivenessEvaluatorStage::new().unwrap();
        let result = stage.evaluate(&[]).unwrap();
        assert_eq!(result.face_detection_ratio, 0.0);
        assert_eq!(result.blinks, 0);
    }
}
