use candle_core::{Device, Tensor};
use candle_nn::Module;
use ndarray::Array1;

use crate::core::error::AppError;
use crate::stages::image::{FaceBox, Image};

const EMBEDDING_SIZE: usize = 128;
const INPUT_SIDE: usize = 112;

struct EmbeddingModel;

impl Module for EmbeddingModel {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        // Deterministic average-pool "embedding": collapse the spatial
        // dims into a fixed-length vector of per-channel-band means. Not a
        // real face-recognition backbone (out of scope, §1) but stable and
        // comparable for the contract this stage owns.
        xs.mean(2)?.mean(2)
    }
}

/// Fixed-length vector derived from a face crop, opaque to callers except
/// for length equality and cosine comparability (§3).
#[derive(Debug, Clone)]
pub struct Embedding(pub Vec<f32>);

#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub cosine: f32,
    pub euclidean: f32,
    pub verified: bool,
    pub threshold: f32,
}

pub struct FaceMatcherStage {
    model: EmbeddingModel,
    device: Device,
    threshold: f32,
}

impl FaceMatcherStage {
    pub fn new(threshold: f32) -> Result<Self, AppError> {
        Ok(Self {
            model: EmbeddingModel,
            device: Device::Cpu,
            threshold,
        })
    }

    pub fn embed(&self, image: &Image, face: &FaceBox) -> Result<Embedding, AppError> {
        let crop = image.raster.crop_imm(face.x, face.y, face.width.max(1), face.height.max(1));
        let resized = crop.resize_exact(
            INPUT_SIDE as u32,
            INPUT_SIDE as u32,
            image::imageops::FilterType::Triangle,
        );
        let rgb = resized.to_rgb8();

        let mut data = vec![0f32; 3 * INPUT_SIDE * INPUT_SIDE];
        for (i, px) in rgb.pixels().enumerate() {
            data[i] = (px.0[0] as f32 / 255.0) * 2.0 - 1.0;
            data[INPUT_SIDE * INPUT_SIDE + i] = (px.0[1] as f32 / 255.0) * 2.0 - 1.0;
            data[2 * INPUT_SIDE * INPUT_SIDE + i] = (px.0[2] as f32 / 255.0) * 2.0 - 1.0;
        }

        let tensor = Tensor::from_vec(data, (1, 3, INPUT_SIDE, INPUT_SIDE), &self.device)
            .map_err(|e| AppError::BackendFailure(format!("failed to build tensor: {e}")))?;

        let output = self
            .model
            .forward(&tensor)
            .map_err(|e| AppError::BackendFailure(format!("embedding inference failed: {e}")))?;

        let pooled: Vec<f32> = output
            .flatten_all()
            .and_then(|t| t.to_vec1())
            .map_err(|e| AppError::BackendFailure(format!("failed to read embedding: {e}")))?;

        // Tile/truncate the 3-channel pooled signal to a fixed embedding
        // length so downstream comparisons are always length-compatible.
        let mut raw = Vec::with_capacity(EMBEDDING_SIZE);
        while raw.len() < EMBEDDING_SIZE {
            raw.extend_from_slice(&pooled);
        }
        raw.truncate(EMBEDDING_SIZE);

        Ok(Embedding(normalize(&raw)))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn compare(&self, a: &Embedding, b: &Embedding) -> Result<MatchResult, AppError> {
        if a.0.len() != b.0.len() {
            return Err(AppError::Internal(
                "embedding dimensions do not match".to_string(),
            ));
        }

        let va = Array1::from_vec(a.0.clone());
        let vb = Array1::from_vec(b.0.clone());

        let cosine = cosine_similarity(&va, &vb);
        let euclidean = (&va - &vb).mapv(|d| d * d).sum().sqrt();
        let verified = cosine >= self.threshold;

        Ok(MatchResult {
            cosine,
            euclidean,
            verified,
            threshold: self.threshold,
        })
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

fn cosine_similarity(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let dot = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_embeddings_are_cosine_one() {
        let stage = FaceMatcherStage::new(0.30).unwrap();
        let e = Embedding(normalize(&[1.0, 2.0, 3.0, 4.0]));
        let result = stage.compare(&e, &e).unwrap();
        assert!((result.cosine - 1.0).abs() < 1e-5);
        assert!(result.verified);
    }

    #[test]
    fn mismatched_lengths_error() {
        let stage = FaceMatcherStage::new(0.30).unwrap();
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert!(stage.compare(&a, &b).is_err());
    }

    #[test]
    fn cosine_equal_to_threshold_is_verified() {
        let stage = FaceMatcherStage::new(0.5).unwrap();
        let a = Embedding(vec![1.0, 0.0]);
        // b chosen so cosine(a, b) == 0.5 exactly.
        let b = Embedding(vec![0.5, (0.75f32).sqrt()]);
        let result = stage.compare(&a, &b).unwrap();
        assert!((result.cosine - 0.5).abs() < 1e-4);
        assert!(result.verified);
    }
}
