use serde::{Deserialize, Serialize};

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::recognition::domain::face_template::FaceTemplate;
use crate::shared::region::Rect;

/// Head pose in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngle {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl EulerAngle {
    /// Largest absolute component.
    pub fn max_abs(&self) -> f64 {
        self.yaw.abs().max(self.pitch.abs()).max(self.roll.abs())
    }
}

/// Raw output of a geometry provider, before filtering and scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceGeometry {
    pub bounds: Rect,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
    /// Pose reported by the backend; estimated from landmarks when absent.
    pub angle: Option<EulerAngle>,
}

impl FaceGeometry {
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            bounds: self.bounds.translated(dx, dy),
            confidence: self.confidence,
            landmarks: self.landmarks.as_ref().map(|l| l.translated(dx, dy)),
            angle: self.angle,
        }
    }
}

/// A detected face. Coordinates are in upright-image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    bounds: Rect,
    angle: EulerAngle,
    confidence: f64,
    quality: f64,
    landmarks: Option<FaceLandmarks>,
    mask_score: Option<f64>,
    template: Option<FaceTemplate>,
    track_id: Option<u64>,
}

impl Face {
    pub fn new(bounds: Rect, angle: EulerAngle, confidence: f64, quality: f64) -> Self {
        Self {
            bounds,
            angle,
            confidence,
            quality,
            landmarks: None,
            mask_score: None,
            template: None,
            track_id: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: Option<FaceLandmarks>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn with_mask_score(mut self, score: f64) -> Self {
        self.mask_score = Some(score);
        self
    }

    pub fn with_template(mut self, template: FaceTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub(crate) fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn angle(&self) -> EulerAngle {
        self.angle
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn landmarks(&self) -> Option<&FaceLandmarks> {
        self.landmarks.as_ref()
    }

    /// Mask likelihood in `[0, 1]`, present when attribute detection ran.
    pub fn mask_score(&self) -> Option<f64> {
        self.mask_score
    }

    pub fn template(&self) -> Option<&FaceTemplate> {
        self.template.as_ref()
    }

    /// Tracking lineage, present on faces returned by a tracking session.
    pub fn track_id(&self) -> Option<u64> {
        self.track_id
    }
}
