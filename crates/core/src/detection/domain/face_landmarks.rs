//! 5-point face landmarks and the head pose derived from them.

use serde::{Deserialize, Serialize};

use crate::detection::domain::face::EulerAngle;

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;
const LEFT_MOUTH: usize = 3;
const RIGHT_MOUTH: usize = 4;

/// Nose height between the eye line and the mouth line on a level head.
const NEUTRAL_PITCH_RATIO: f64 = 0.55;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    /// Left and right eye, when both are visible.
    pub fn eyes(&self) -> Option<((f64, f64), (f64, f64))> {
        let left = self.points[LEFT_EYE];
        let right = self.points[RIGHT_EYE];
        (left.0 > 0.0 && right.0 > 0.0).then_some((left, right))
    }

    /// Offsets every visible point; invisible points stay invisible.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let mut points = self.points;
        for p in points.iter_mut().filter(|p| p.0 > 0.0) {
            *p = (p.0 + dx, p.1 + dy);
        }
        Self { points }
    }

    /// In-plane rotation of the eye line, degrees, positive clockwise.
    pub fn roll(&self) -> Option<f64> {
        let (left, right) = self.eyes()?;
        Some((right.1 - left.1).atan2(right.0 - left.0).to_degrees())
    }

    /// Rough head pose from landmark geometry.
    ///
    /// Roll comes from the eye line, yaw from the nose offset against the eye
    /// span, pitch from the nose height between eyes and mouth. Needs both
    /// eyes; yaw needs the nose and pitch the mouth as well.
    pub fn estimate_pose(&self) -> Option<EulerAngle> {
        let roll = self.roll()?;
        let yaw = self.signed_profile_ratio().unwrap_or(0.0) * 90.0;
        let pitch = self.pitch().unwrap_or(0.0);
        Some(EulerAngle { yaw, pitch, roll })
    }

    /// Points rotated by `-roll` around the eye midpoint, leveling the eyes.
    fn leveled(&self) -> Option<[(f64, f64); 5]> {
        let (left, right) = self.eyes()?;
        let roll = self.roll()?.to_radians();
        let (sin, cos) = (-roll).sin_cos();
        let mid = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
        let mut out = self.points;
        for p in out.iter_mut().filter(|p| p.0 > 0.0) {
            let (dx, dy) = (p.0 - mid.0, p.1 - mid.1);
            *p = (dx * cos - dy * sin, dx * sin + dy * cos);
        }
        Some(out)
    }

    fn signed_profile_ratio(&self) -> Option<f64> {
        if self.points[NOSE].0 <= 0.0 {
            return None;
        }
        let pts = self.leveled()?;
        let eye_span = (pts[RIGHT_EYE].0 - pts[LEFT_EYE].0).abs();
        if eye_span <= 0.0 {
            return None;
        }
        let eye_mid_x = (pts[LEFT_EYE].0 + pts[RIGHT_EYE].0) / 2.0;
        Some(((pts[NOSE].0 - eye_mid_x) / eye_span).clamp(-1.0, 1.0))
    }

    fn pitch(&self) -> Option<f64> {
        if self.points[NOSE].0 <= 0.0
            || self.points[LEFT_MOUTH].0 <= 0.0
            || self.points[RIGHT_MOUTH].0 <= 0.0
        {
            return None;
        }
        let pts = self.leveled()?;
        // eye midpoint is the origin after leveling
        let mouth_y = (pts[LEFT_MOUTH].1 + pts[RIGHT_MOUTH].1) / 2.0;
        if mouth_y <= 0.0 {
            return None;
        }
        let ratio = pts[NOSE].1 / mouth_y;
        Some(((ratio - NEUTRAL_PITCH_RATIO) / NEUTRAL_PITCH_RATIO * 90.0).clamp(-90.0, 90.0))
    }
}
