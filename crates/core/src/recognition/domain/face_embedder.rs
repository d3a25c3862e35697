use crate::error::BackendError;
use crate::shared::frame::Frame;

/// Domain interface for turning an aligned face crop into a feature vector.
///
/// Crops are square RGB frames of
/// [`RECOGNITION_INPUT_SIZE`](crate::shared::constants::RECOGNITION_INPUT_SIZE)
/// pixels. Returned vectors are L2-normalized.
pub trait FaceEmbedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BackendError>;
}
