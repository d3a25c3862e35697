use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::recognition::domain::face_template::TemplateVersion;
use crate::shared::constants::{
    DEFAULT_TRACKING_LOSS_HYSTERESIS, DEFAULT_TRACKING_SMOOTHING, SUPPORTED_DETECTOR_VERSION,
};

/// Engine log verbosity, from silent to trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Detail,
    Trace,
}

impl LogLevel {
    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::None => log::LevelFilter::Off,
            LogLevel::Fatal | LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Detail | LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Lighting normalization applied to face crops before template extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingCompensation {
    Off,
    HistogramEqualization,
}

/// Pose normalization applied to face crops before template extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseCompensation {
    Off,
    RollAlignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkOptions {
    pub detect_landmarks: bool,
    pub detect_attributes: bool,
}

impl Default for LandmarkOptions {
    fn default() -> Self {
        Self {
            detect_landmarks: true,
            detect_attributes: false,
        }
    }
}

/// Accepted face size as a fraction of the shorter image side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: f64,
    pub max: f64,
}

impl Default for SizeRange {
    fn default() -> Self {
        Self { min: 0.08, max: 1.0 }
    }
}

/// Configuration bundle read once when the engine initializes.
///
/// Thresholds are in `[0, 1]`; angle ranges are in degrees. A missing
/// `models_location` resolves to the platform default models directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detector_version: u32,
    pub confidence_threshold: f64,
    pub size_range: SizeRange,
    pub roll_range_large: f64,
    pub roll_range_small: f64,
    pub yaw_range_large: f64,
    pub yaw_range_small: f64,
    pub landmark_options: LandmarkOptions,
    pub matrix_template_version: TemplateVersion,
    pub default_template_version: TemplateVersion,
    /// Minimum face quality for a tracking session to adopt a face.
    pub quality_threshold: f64,
    pub face_extract_quality_threshold: f64,
    /// Incremental tracking below this confidence falls back to full detection.
    pub landmark_tracking_quality_threshold: f64,
    pub lighting_compensation: LightingCompensation,
    pub pose_compensation: PoseCompensation,
    pub models_location: Option<PathBuf>,
    pub attempt_multi_threading: bool,
    pub log_level: LogLevel,
    /// Consecutive missed frames a session tolerates before losing its face.
    pub tracking_loss_hysteresis: usize,
    /// EMA weight of the newest observation when smoothing tracked bounds.
    pub tracking_smoothing: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detector_version: 1,
            confidence_threshold: 0.5,
            size_range: SizeRange::default(),
            roll_range_large: 30.0,
            roll_range_small: 15.0,
            yaw_range_large: 45.0,
            yaw_range_small: 20.0,
            landmark_options: LandmarkOptions::default(),
            matrix_template_version: TemplateVersion::V16,
            default_template_version: TemplateVersion::V20,
            quality_threshold: 0.3,
            face_extract_quality_threshold: 0.4,
            landmark_tracking_quality_threshold: 0.5,
            lighting_compensation: LightingCompensation::Off,
            pose_compensation: PoseCompensation::RollAlignment,
            models_location: None,
            attempt_multi_threading: true,
            log_level: LogLevel::Warning,
            tracking_loss_hysteresis: DEFAULT_TRACKING_LOSS_HYSTERESIS,
            tracking_smoothing: DEFAULT_TRACKING_SMOOTHING,
        }
    }
}

impl Settings {
    pub fn with_models_location(models_location: impl Into<PathBuf>) -> Self {
        Self {
            models_location: Some(models_location.into()),
            ..Self::default()
        }
    }

    /// Parse settings from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Template versions the engine must be able to extract.
    pub fn extraction_versions(&self) -> Vec<TemplateVersion> {
        let mut versions = vec![self.default_template_version];
        if self.matrix_template_version != self.default_template_version {
            versions.push(self.matrix_template_version);
        }
        versions
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.detector_version != SUPPORTED_DETECTOR_VERSION {
            return Err(format!(
                "detector_version {} is not supported, expected {SUPPORTED_DETECTOR_VERSION}",
                self.detector_version
            ));
        }

        let unit_fields = [
            ("confidence_threshold", self.confidence_threshold),
            ("quality_threshold", self.quality_threshold),
            (
                "face_extract_quality_threshold",
                self.face_extract_quality_threshold,
            ),
            (
                "landmark_tracking_quality_threshold",
                self.landmark_tracking_quality_threshold,
            ),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be between 0.0 and 1.0, got {value}"));
            }
        }

        let range = self.size_range;
        if !(range.min > 0.0 && range.min <= range.max && range.max <= 1.0) {
            return Err(format!(
                "size_range must satisfy 0 < min <= max <= 1, got {}..{}",
                range.min, range.max
            ));
        }

        for (name, small, large) in [
            ("roll", self.roll_range_small, self.roll_range_large),
            ("yaw", self.yaw_range_small, self.yaw_range_large),
        ] {
            if small < 0.0 || small > large || large > 180.0 {
                return Err(format!(
                    "{name} ranges must satisfy 0 <= small <= large <= 180, got {small}/{large}"
                ));
            }
        }

        for version in self.extraction_versions() {
            if version.dimension().is_none() {
                return Err(format!("{version:?} templates cannot be extracted"));
            }
        }

        if !(self.tracking_smoothing > 0.0 && self.tracking_smoothing <= 1.0) {
            return Err(format!(
                "tracking_smoothing must be in (0, 1], got {}",
                self.tracking_smoothing
            ));
        }
        Ok(())
    }
}
