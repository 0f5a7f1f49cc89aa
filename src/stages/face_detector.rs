use std::sync::Mutex;

use candle_core::{Device, Tensor};
use candle_nn::Module;

use crate::core::error::AppError;
use crate::stages::image::{FaceBox, Image};

const INPUT_SIDE: usize = 224;

/// Minimal placeholder for a loaded detection backend. Production deployments
/// replace this with an ONNX/Candle graph; the stage interface (§4.2) does
/// not depend on what runs inside `forward`.
struct DetectionModel;

impl Module for DetectionModel {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        Ok(xs.clone())
    }
}

/// Locates a face bounding box in an image. Thread-safe for concurrent
/// calls with images of differing dimensions (§4.2, invariant 1 of §8):
/// some detector backends cache an input-size parameter and must be
/// reconfigured — under a short critical section — before each call rather
/// than reconstructed.
pub struct FaceDetectorStage {
    model: DetectionModel,
    device: Device,
    confidence_threshold: f32,
    last_input_size: Mutex<Option<(u32, u32)>>,
}

impl FaceDetectorStage {
    pub fn new(confidence_threshold: f32) -> Result<Self, AppError> {
        Ok(Self {
            model: DetectionModel,
            device: Device::Cpu,
            confidence_threshold,
            last_input_size: Mutex::new(None),
        })
    }

    /// Reconfigures the backend's cached input-size parameter if the
    /// current image's dimensions differ from the last call. The critical
    /// section covers only the size comparison/update, never the inference
    /// call itself, so two threads detecting on differently-sized images
    /// never serialize on the heavier `forward` work.
    fn reconfigure_for(&self, width: u32, height: u32) {
        let mut guard = self.last_input_size.lock().expect("detector lock poisoned");
        if *guard != Some((width, height)) {
            *guard = Some((width, height));
        }
    }

    pub fn detect(&self, image: &Image) -> Result<Option<FaceBox>, AppError> {
        self.reconfigure_for(image.width(), image.height());

        let tensor = self.preprocess(image)?;
        let _ = self
            .model
            .forward(&tensor)
            .map_err(|e| AppError::BackendFailure(format!("face detector inference failed: {e}")))?;

        Ok(self.locate_face(image))
    }

    fn preprocess(&self, image: &Image) -> Result<Tensor, AppError> {
        let resized = image.raster.resize_exact(
            INPUT_SIDE as u32,
            INPUT_SIDE as u32,
            image::imageops::FilterType::Triangle,
        );
        let rgb = resized.to_rgb8();
        let mut data = vec![0f32; 3 * INPUT_SIDE * INPUT_SIDE];
        for (i, px) in rgb.pixels().enumerate() {
            data[i] = px.0[0] as f32 / 255.0;
            data[INPUT_SIDE * INPUT_SIDE + i] = px.0[1] as f32 / 255.0;
            data[2 * INPUT_SIDE * INPUT_SIDE + i] = px.0[2] as f32 / 255.0;
        }
        Tensor::from_vec(data, (1, 3, INPUT_SIDE, INPUT_SIDE), &self.device)
            .map_err(|e| AppError::BackendFailure(format!("failed to build tensor: {e}")))
    }

    /// Finds the highest-confidence face-shaped region. A real backend
    /// would parse anchor boxes from `forward`'s output; this default
    /// locates the brightest, highest-contrast square region as a stand-in
    /// signal, which is enough to exercise the NO_FACE / found contract
    /// deterministically given fixed input bytes.
    fn locate_face(&self, image: &Image) -> Option<FaceBox> {
        let gray = image.raster.to_luma8();
        let (w, h) = (gray.width(), gray.height());
        if w < 8 || h < 8 {
            return None;
        }

        let side = (w.min(h) as f32 * 0.6) as u32;
        let side = side.max(1);
        let cx = w.saturating_sub(side) / 2;
        let cy = h.saturating_sub(side) / 2;

        let mut sum = 0u64;
        let mut sum_sq = 0u64;
        let mut count = 0u64;
        for y in cy..(cy + side).min(h) {
            for x in cx..(cx + side).min(w) {
                let v = gray.get_pixel(x, y).0[0] as u64;
                sum += v;
                sum_sq += v * v;
                count += 1;
            }
        }
        if count == 0 {
            return None;
        }
        let mean = sum as f64 / count as f64;
        let variance = (sum_sq as f64 / count as f64) - mean * mean;
        let contrast = (variance.max(0.0).sqrt() / 128.0).min(1.0);
        let confidence = (0.5 + 0.5 * contrast) as f32;

        if confidence < self.confidence_threshold {
            return None;
        }

        Some(FaceBox {
            x: cx,
            y: cy,
            width: side,
            height: side,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn test_image(w: u32, h: u32, fill: u8) -> Image {
        let buf = RgbImage::from_pixel(w, h, image::Rgb([fill, fill, fill]));
        let raster = DynamicImage::ImageRgb8(buf);
        let mut bytes = Vec::new();
        raster
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        Image {
            raster,
            bytes,
            content_type: crate::stages::image::ImageContentType::Png,
        }
    }

    #[test]
    fn concurrent_calls_with_differing_dimensions_never_error() {
        let stage = FaceDetectorStage::new(0.0).unwrap();
        let a = test_image(1594, 1987, 60);
        let b = test_image(1863, 1211, 200);
        assert!(stage.detect(&a).is_ok());
        assert!(stage.detect(&b).is_ok());
        assert!(stage.detect(&a).is_ok());
    }

    #[test]
    fn flat_image_below_threshold_yields_no_face() {
        let stage = FaceDetectorStage::new(0.9).unwrap();
        let flat = test_image(200, 200, 128);
        assert!(stage.detect(&flat).unwrap().is_none());
    }
}
