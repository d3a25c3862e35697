pub const DETECTOR_MODEL_NAME: &str = "face_detector.onnx";
pub const RECOGNIZER_MODEL_NAME: &str = "face_recognizer.onnx";
pub const MASK_MODEL_NAME: &str = "face_mask.onnx";

/// Only detector generation that `face_detector.onnx` may be.
pub const SUPPORTED_DETECTOR_VERSION: u32 = 1;

/// Directory name under the platform data dir holding bundled models.
pub const MODELS_DIR_NAME: &str = "facetrace";

/// Side length of the square face crop fed to template extraction.
pub const RECOGNITION_INPUT_SIZE: usize = 112;

/// Similarity score of two identical templates, in every version family.
pub const MAX_SIMILARITY_SCORE: f32 = 10.0;

/// Verification threshold on the `0..=MAX_SIMILARITY_SCORE` scale.
pub const AUTHENTICATION_SCORE_THRESHOLD: f32 = 4.0;

/// Missed frames tolerated before a tracking session returns to empty.
pub const DEFAULT_TRACKING_LOSS_HYSTERESIS: usize = 3;

pub const DEFAULT_TRACKING_SMOOTHING: f64 = 0.6;

/// Number of adopted-face quality samples a tracking session keeps.
pub const QUALITY_HISTORY_LEN: usize = 30;
