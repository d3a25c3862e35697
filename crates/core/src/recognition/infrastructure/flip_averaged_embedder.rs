use std::sync::Arc;

use crate::error::BackendError;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_template::l2_normalize;
use crate::shared::frame::Frame;

/// Decorator that averages the embedding of a crop with the embedding of
/// its mirror image, trading one extra inference for pose robustness.
pub struct FlipAveragedEmbedder {
    inner: Arc<dyn FaceEmbedder>,
}

impl FlipAveragedEmbedder {
    pub fn new(inner: Arc<dyn FaceEmbedder>) -> Self {
        Self { inner }
    }
}

impl FaceEmbedder for FlipAveragedEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BackendError> {
        let direct = self.inner.embed(crop)?;
        let mirrored = self.inner.embed(&crop.mirrored())?;
        if direct.len() != mirrored.len() {
            return Err(format!(
                "embedding length changed between passes: {} vs {}",
                direct.len(),
                mirrored.len()
            )
            .into());
        }
        let mut averaged: Vec<f32> = direct
            .iter()
            .zip(&mirrored)
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        l2_normalize(&mut averaged);
        Ok(averaged)
    }
}
