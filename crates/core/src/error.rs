use std::path::PathBuf;

use thiserror::Error;

use crate::recognition::domain::face_template::TemplateVersion;
use crate::shared::pixel_buffer::ImageFormat;

/// Error type returned by pluggable backends (detectors, embedders, classifiers).
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Closed set of failure kinds surfaced at the engine boundary.
///
/// Callers branch on the kind; messages are for humans only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FaceDetectionFailed,
    TemplateExtractionFailed,
    InvalidModelsLocation,
    InitializationFailed,
    FaceTrackingFailed,
    FaceComparisonFailed,
    ImageSharpnessDetectionFailed,
    UnsupportedImageFormat,
    FaceAttributeExtractionFailed,
    FaceTemplateGenerationFailed,
    TemplateVersionMismatch,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face detection failed: {message}")]
    FaceDetectionFailed {
        message: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("template extraction failed: {message}")]
    TemplateExtractionFailed {
        message: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("invalid models location {path}: {reason}")]
    InvalidModelsLocation { path: PathBuf, reason: String },
    #[error("engine initialization failed: {message}")]
    InitializationFailed {
        message: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("face tracking failed: {message}")]
    FaceTrackingFailed {
        message: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("face comparison failed: {message}")]
    FaceComparisonFailed { message: String },
    #[error("image sharpness detection failed: {message}")]
    ImageSharpnessDetectionFailed { message: String },
    #[error("unsupported image format: {0:?}")]
    UnsupportedImageFormat(ImageFormat),
    #[error("face attribute extraction failed: {message}")]
    FaceAttributeExtractionFailed {
        message: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("face template generation failed: {message}")]
    FaceTemplateGenerationFailed { message: String },
    #[error("template version mismatch: expected {expected:?}, found {found:?}")]
    TemplateVersionMismatch {
        expected: TemplateVersion,
        found: TemplateVersion,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FaceDetectionFailed { .. } => ErrorKind::FaceDetectionFailed,
            Self::TemplateExtractionFailed { .. } => ErrorKind::TemplateExtractionFailed,
            Self::InvalidModelsLocation { .. } => ErrorKind::InvalidModelsLocation,
            Self::InitializationFailed { .. } => ErrorKind::InitializationFailed,
            Self::FaceTrackingFailed { .. } => ErrorKind::FaceTrackingFailed,
            Self::FaceComparisonFailed { .. } => ErrorKind::FaceComparisonFailed,
            Self::ImageSharpnessDetectionFailed { .. } => {
                ErrorKind::ImageSharpnessDetectionFailed
            }
            Self::UnsupportedImageFormat(_) => ErrorKind::UnsupportedImageFormat,
            Self::FaceAttributeExtractionFailed { .. } => {
                ErrorKind::FaceAttributeExtractionFailed
            }
            Self::FaceTemplateGenerationFailed { .. } => ErrorKind::FaceTemplateGenerationFailed,
            Self::TemplateVersionMismatch { .. } => ErrorKind::TemplateVersionMismatch,
        }
    }

    pub(crate) fn detection(message: impl Into<String>) -> Self {
        Self::FaceDetectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn detection_backend(source: BackendError) -> Self {
        Self::FaceDetectionFailed {
            message: "geometry provider error".to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn extraction(message: impl Into<String>) -> Self {
        Self::TemplateExtractionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn extraction_backend(source: BackendError) -> Self {
        Self::TemplateExtractionFailed {
            message: "embedding backend error".to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn initialization(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn initialization_backend(message: impl Into<String>, source: BackendError) -> Self {
        Self::InitializationFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn comparison(message: impl Into<String>) -> Self {
        Self::FaceComparisonFailed {
            message: message.into(),
        }
    }

    pub(crate) fn sharpness(message: impl Into<String>) -> Self {
        Self::ImageSharpnessDetectionFailed {
            message: message.into(),
        }
    }

    pub(crate) fn attribute(message: impl Into<String>) -> Self {
        Self::FaceAttributeExtractionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn attribute_backend(source: BackendError) -> Self {
        Self::FaceAttributeExtractionFailed {
            message: "attribute classifier error".to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn generation(message: impl Into<String>) -> Self {
        Self::FaceTemplateGenerationFailed {
            message: message.into(),
        }
    }

    /// Re-labels a detection failure raised while servicing a tracking call.
    ///
    /// Format errors keep their kind so callers can tell bad input from a
    /// tracking problem.
    pub(crate) fn into_tracking(self) -> Self {
        match self {
            Self::FaceDetectionFailed { message, source } => {
                Self::FaceTrackingFailed { message, source }
            }
            other => other,
        }
    }
}
