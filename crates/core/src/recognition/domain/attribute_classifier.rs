use crate::error::BackendError;
use crate::shared::frame::Frame;

/// Domain interface for per-face attribute scores.
pub trait AttributeClassifier: Send + Sync {
    /// Likelihood in `[0, 1]` that the face in the aligned crop wears a mask.
    fn mask_probability(&self, crop: &Frame) -> Result<f64, BackendError>;
}
