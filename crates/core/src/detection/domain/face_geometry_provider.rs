use crate::detection::domain::face::FaceGeometry;
use crate::error::BackendError;
use crate::shared::frame::Frame;

/// Hints passed to a geometry provider for one search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchParams {
    /// Smallest face side, in pixels of the frame being searched.
    pub min_face_size: f64,
    pub detect_landmarks: bool,
}

/// Domain interface for locating faces in an upright RGB frame.
///
/// Implementations are shared by every caller of an engine, so they take
/// `&self` and serialize any mutable inference state internally.
pub trait FaceGeometryProvider: Send + Sync {
    fn detect(
        &self,
        frame: &Frame,
        params: &SearchParams,
    ) -> Result<Vec<FaceGeometry>, BackendError>;
}
