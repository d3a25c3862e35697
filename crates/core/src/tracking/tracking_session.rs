use std::collections::VecDeque;

use crate::detection::domain::detection_options::DetectionOptions;
use crate::detection::domain::face::Face;
use crate::detection::face_detector::FaceDetector;
use crate::error::EngineError;
use crate::settings::Settings;
use crate::shared::constants::QUALITY_HISTORY_LEN;
use crate::shared::frame::Frame;
use crate::shared::region::{Rect, DEFAULT_IOU_THRESHOLD};

use super::bounds_smoother::BoundsSmoother;

/// Side of the incremental search window relative to the predicted box.
const SEARCH_WINDOW_SCALE: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingState {
    Empty,
    Tracking,
}

/// Tracking thresholds taken from [`Settings`].
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    pub confidence_threshold: f64,
    pub quality_threshold: f64,
    pub tracking_quality_threshold: f64,
    pub loss_hysteresis: usize,
    pub smoothing: f64,
}

impl From<&Settings> for TrackerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            quality_threshold: settings.quality_threshold,
            tracking_quality_threshold: settings.landmark_tracking_quality_threshold,
            loss_hysteresis: settings.tracking_loss_hysteresis,
            smoothing: settings.tracking_smoothing,
        }
    }
}

#[derive(Clone, Debug)]
struct Lineage {
    id: u64,
    /// Last unsmoothed detection, the basis for motion prediction.
    observed: Rect,
    velocity: (f64, f64),
    misses: usize,
    last_face: Face,
    smoother: BoundsSmoother,
}

impl Lineage {
    /// Last observation moved along the velocity for every frame since.
    fn predicted_bounds(&self) -> Rect {
        let steps = (self.misses + 1) as f64;
        self.observed
            .translated(self.velocity.0 * steps, self.velocity.1 * steps)
    }
}

/// Caller-owned state for following one face across a frame sequence.
///
/// Obtained from [`Engine::start_tracking`](crate::engine::Engine::start_tracking)
/// and advanced with [`Engine::track_face`](crate::engine::Engine::track_face).
/// Frames must be submitted in temporal order.
#[derive(Clone, Debug)]
pub struct TrackingSession {
    lineage: Option<Lineage>,
    next_id: u64,
    frames_processed: u64,
    quality_history: VecDeque<f64>,
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingSession {
    pub fn new() -> Self {
        Self {
            lineage: None,
            next_id: 1,
            frames_processed: 0,
            quality_history: VecDeque::with_capacity(QUALITY_HISTORY_LEN),
        }
    }

    pub fn state(&self) -> TrackingState {
        if self.lineage.is_some() {
            TrackingState::Tracking
        } else {
            TrackingState::Empty
        }
    }

    /// Most recent face of the current lineage, possibly from a frame
    /// that has since been missed.
    pub fn last_face(&self) -> Option<&Face> {
        self.lineage.as_ref().map(|l| &l.last_face)
    }

    pub fn consecutive_misses(&self) -> usize {
        self.lineage.as_ref().map_or(0, |l| l.misses)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Qualities of the most recently tracked faces, oldest first.
    pub fn quality_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.quality_history.iter().copied()
    }

    /// Drops the current lineage; the next face found starts a new one.
    pub fn reset(&mut self) {
        self.lineage = None;
        self.quality_history.clear();
    }

    /// Processes one upright frame.
    ///
    /// Everything that can fail runs before the session is touched, so an
    /// error leaves the state exactly as it was.
    pub(crate) fn advance(
        &mut self,
        detector: &FaceDetector,
        config: &TrackerConfig,
        frame: &Frame,
    ) -> Result<Option<Face>, EngineError> {
        let found = match &self.lineage {
            None => acquire(detector, config, frame)?,
            Some(lineage) => follow(lineage, detector, config, frame)?,
        };
        self.frames_processed += 1;
        Ok(self.commit(found, config))
    }

    fn commit(&mut self, found: Option<Face>, config: &TrackerConfig) -> Option<Face> {
        let Some(face) = found else {
            self.record_miss(config);
            return None;
        };

        let observed = face.bounds();
        let mut lineage = match self.lineage.take() {
            Some(mut lineage) => {
                let steps = (lineage.misses + 1) as f64;
                let (px, py) = lineage.observed.center();
                let (cx, cy) = observed.center();
                lineage.velocity = ((cx - px) / steps, (cy - py) / steps);
                lineage.misses = 0;
                lineage.observed = observed;
                lineage
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                log::debug!("tracking lineage {id} started at {observed:?}");
                Lineage {
                    id,
                    observed,
                    velocity: (0.0, 0.0),
                    misses: 0,
                    last_face: face.clone(),
                    smoother: BoundsSmoother::new(config.smoothing),
                }
            }
        };
        let smoothed = lineage.smoother.smooth(observed);
        let tracked = face.with_bounds(smoothed).with_track_id(lineage.id);

        if self.quality_history.len() == QUALITY_HISTORY_LEN {
            self.quality_history.pop_front();
        }
        self.quality_history.push_back(tracked.quality());
        lineage.last_face = tracked.clone();
        self.lineage = Some(lineage);
        Some(tracked)
    }

    fn record_miss(&mut self, config: &TrackerConfig) {
        let Some(lineage) = self.lineage.as_mut() else {
            return;
        };
        lineage.misses += 1;
        if lineage.misses > config.loss_hysteresis {
            log::debug!(
                "tracking lineage {} lost after {} missed frames",
                lineage.id,
                lineage.misses
            );
            self.lineage = None;
        }
    }
}

/// Best face of a full detection that is good enough to start a lineage.
fn acquire(
    detector: &FaceDetector,
    config: &TrackerConfig,
    frame: &Frame,
) -> Result<Option<Face>, EngineError> {
    let faces = detector.detect(frame, 0, &DetectionOptions::default())?;
    Ok(faces.into_iter().find(|f| qualifies(f, config)))
}

/// Confidence and quality gate applied to every face the session reports.
fn qualifies(face: &Face, config: &TrackerConfig) -> bool {
    face.confidence() >= config.confidence_threshold && face.quality() >= config.quality_threshold
}

/// Continuation of `lineage` in `frame`, if any.
///
/// Searches a window around the predicted position first; when the best
/// candidate there scores below the tracking threshold, falls back to a
/// full-frame detection and accepts only a face overlapping the prediction.
/// Faces failing the confidence or quality gate never continue a lineage.
fn follow(
    lineage: &Lineage,
    detector: &FaceDetector,
    config: &TrackerConfig,
    frame: &Frame,
) -> Result<Option<Face>, EngineError> {
    let predicted = lineage.predicted_bounds();
    let window = predicted.expanded(SEARCH_WINDOW_SCALE);
    let options = DetectionOptions::default();

    let local = detector.detect_in(frame, Some(window), &options)?;
    let best_local = local
        .into_iter()
        .filter(|f| qualifies(f, config))
        .map(|f| {
            let score = f.confidence() * f.bounds().iou(&predicted);
            (f, score)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((face, score)) = best_local {
        if score >= config.tracking_quality_threshold {
            return Ok(Some(face));
        }
        log::trace!("incremental tracking score {score:.3} too low, re-detecting");
    }

    let faces = detector.detect(frame, 0, &options)?;
    Ok(faces
        .into_iter()
        .filter(|f| qualifies(f, config))
        .map(|f| {
            let overlap = f.bounds().iou(&predicted);
            (f, overlap)
        })
        .filter(|(_, overlap)| *overlap >= DEFAULT_IOU_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(f, _)| f))
}
