use std::cmp::Ordering;
use std::sync::Arc;

use crate::detection::domain::detection_options::DetectionOptions;
use crate::detection::domain::face::{EulerAngle, Face, FaceGeometry};
use crate::detection::domain::face_geometry_provider::{FaceGeometryProvider, SearchParams};
use crate::error::EngineError;
use crate::quality::image_quality::{luma_std_dev, sharpness_of};
use crate::settings::{PoseCompensation, Settings, SizeRange};
use crate::shared::constants::RECOGNITION_INPUT_SIZE;
use crate::shared::frame::Frame;
use crate::shared::region::Rect;

/// Frames whose luma standard deviation is below this are featureless.
pub const PREFILTER_MIN_STD_DEV: f64 = 2.0;

/// Detector thresholds taken from [`Settings`] at engine initialization.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub confidence_threshold: f64,
    pub size_range: SizeRange,
    pub roll_range_large: f64,
    pub roll_range_small: f64,
    pub yaw_range_large: f64,
    pub yaw_range_small: f64,
    pub detect_landmarks: bool,
    pub pose_compensation: bool,
}

impl From<&Settings> for DetectorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            size_range: settings.size_range,
            roll_range_large: settings.roll_range_large,
            roll_range_small: settings.roll_range_small,
            yaw_range_large: settings.yaw_range_large,
            yaw_range_small: settings.yaw_range_small,
            detect_landmarks: settings.landmark_options.detect_landmarks,
            pose_compensation: settings.pose_compensation != PoseCompensation::Off,
        }
    }
}

/// Turns raw provider geometry into filtered, scored and ordered faces.
pub struct FaceDetector {
    provider: Arc<dyn FaceGeometryProvider>,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new(provider: Arc<dyn FaceGeometryProvider>, config: DetectorConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Faces in an upright frame, best first.
    ///
    /// `limit <= 0` returns every face.
    pub fn detect(
        &self,
        frame: &Frame,
        limit: i32,
        options: &DetectionOptions,
    ) -> Result<Vec<Face>, EngineError> {
        if !options.skip_prefilter && is_featureless(frame) {
            log::debug!(
                "pre-filter rejected featureless {}x{} frame",
                frame.width(),
                frame.height()
            );
            return Ok(Vec::new());
        }
        let mut faces = self.detect_in(frame, None, options)?;
        if limit > 0 {
            faces.truncate(limit as usize);
        }
        Ok(faces)
    }

    /// Detection restricted to `region` (clipped to the frame), or the whole
    /// frame when `None`. Coordinates stay in full-frame pixels and the size
    /// range is judged against the full frame.
    pub(crate) fn detect_in(
        &self,
        frame: &Frame,
        region: Option<Rect>,
        options: &DetectionOptions,
    ) -> Result<Vec<Face>, EngineError> {
        let (min_size, max_size) = self.size_limits(frame, options);
        let params = SearchParams {
            min_face_size: min_size,
            detect_landmarks: self.config.detect_landmarks,
        };

        let geometries = match region {
            None => self
                .provider
                .detect(frame, &params)
                .map_err(EngineError::detection_backend)?,
            Some(region) => {
                let Some(clipped) = region.clamped(frame.width() as f64, frame.height() as f64)
                else {
                    return Ok(Vec::new());
                };
                let Some(window) = frame.crop(&clipped) else {
                    return Ok(Vec::new());
                };
                let (dx, dy) = (clipped.x.floor(), clipped.y.floor());
                self.provider
                    .detect(&window, &params)
                    .map_err(EngineError::detection_backend)?
                    .iter()
                    .map(|g| g.translated(dx, dy))
                    .collect()
            }
        };

        let (roll_limit, yaw_limit) = self.pose_limits(options);
        let mut faces: Vec<Face> = geometries
            .into_iter()
            .filter(|g| g.confidence >= self.config.confidence_threshold)
            .filter(|g| {
                let size = g.bounds.short_side();
                size >= min_size && size <= max_size
            })
            .filter_map(|g| {
                let angle = pose_of(&g);
                (angle.roll.abs() <= roll_limit && angle.yaw.abs() <= yaw_limit)
                    .then(|| self.build_face(frame, g, angle))
            })
            .collect();

        sort_faces(&mut faces);
        log::trace!("detected {} face(s)", faces.len());
        Ok(faces)
    }

    fn build_face(&self, frame: &Frame, geometry: FaceGeometry, angle: EulerAngle) -> Face {
        let quality = face_quality(frame, &geometry.bounds, &angle);
        let landmarks = if self.config.detect_landmarks {
            geometry.landmarks
        } else {
            None
        };
        Face::new(geometry.bounds, angle, geometry.confidence, quality).with_landmarks(landmarks)
    }

    /// Accepted face side in pixels, `(min, max)`.
    fn size_limits(&self, frame: &Frame, options: &DetectionOptions) -> (f64, f64) {
        let short_side = frame.width().min(frame.height()) as f64;
        let range = self.config.size_range;
        let min_fraction = if options.reduce_size_range {
            (range.min * 2.0).min(range.max)
        } else {
            range.min
        };
        (min_fraction * short_side, range.max * short_side)
    }

    /// `(roll, yaw)` limits in degrees.
    fn pose_limits(&self, options: &DetectionOptions) -> (f64, f64) {
        if self.config.pose_compensation && !options.disable_pose_compensation {
            (self.config.roll_range_large, self.config.yaw_range_large)
        } else {
            (self.config.roll_range_small, self.config.yaw_range_small)
        }
    }
}

fn pose_of(geometry: &FaceGeometry) -> EulerAngle {
    geometry
        .angle
        .or_else(|| geometry.landmarks.as_ref().and_then(|l| l.estimate_pose()))
        .unwrap_or_default()
}

fn is_featureless(frame: &Frame) -> bool {
    luma_std_dev(&frame.luma_array().view()) < PREFILTER_MIN_STD_DEV
}

/// Mean of pose, crop sharpness and size scores, each in `[0, 1]`.
pub(crate) fn face_quality(frame: &Frame, bounds: &Rect, angle: &EulerAngle) -> f64 {
    let pose_score = (1.0 - angle.max_abs() / 90.0).clamp(0.0, 1.0);
    let sharpness = frame
        .crop(bounds)
        .map_or(0.0, |crop| sharpness_of(&crop.luma_array().view()));
    let size_score = (bounds.short_side() / RECOGNITION_INPUT_SIZE as f64).clamp(0.0, 1.0);
    (pose_score + sharpness + size_score) / 3.0
}

/// Confidence descending; ties by top, then left.
fn sort_faces(faces: &mut [Face]) {
    faces.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.bounds()
                    .y
                    .partial_cmp(&b.bounds().y)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                a.bounds()
                    .x
                    .partial_cmp(&b.bounds().x)
                    .unwrap_or(Ordering::Equal)
            })
    });
}
