use std::sync::Arc;

use crate::detection::domain::face::Face;
use crate::error::EngineError;
use crate::recognition::domain::attribute_classifier::AttributeClassifier;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_template::{FaceTemplate, TemplateVersion};
use crate::recognition::face_crop::{aligned_face_crop, CropOptions};
use crate::recognition::infrastructure::flip_averaged_embedder::FlipAveragedEmbedder;
use crate::recognition::infrastructure::gradient_histogram_embedder::GradientHistogramEmbedder;
use crate::settings::{LightingCompensation, PoseCompensation, Settings};
use crate::shared::frame::Frame;

/// Extractor thresholds and versions taken from [`Settings`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractorConfig {
    pub quality_threshold: f64,
    pub default_version: TemplateVersion,
    pub matrix_version: TemplateVersion,
    pub crop: CropOptions,
    pub multithreaded: bool,
}

impl From<&Settings> for ExtractorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            quality_threshold: settings.face_extract_quality_threshold,
            default_version: settings.default_template_version,
            matrix_version: settings.matrix_template_version,
            crop: CropOptions {
                align_roll: settings.pose_compensation == PoseCompensation::RollAlignment,
                equalize_histogram: settings.lighting_compensation
                    == LightingCompensation::HistogramEqualization,
            },
            multithreaded: settings.attempt_multi_threading,
        }
    }
}

/// Produces versioned templates and attribute scores from detected faces.
pub struct TemplateExtractor {
    histogram: GradientHistogramEmbedder,
    embedder: Option<Arc<dyn FaceEmbedder>>,
    flip_averaged: Option<FlipAveragedEmbedder>,
    classifier: Option<Arc<dyn AttributeClassifier>>,
    config: ExtractorConfig,
}

impl TemplateExtractor {
    /// `embedder` backs the V20 family; it may be omitted only when neither
    /// configured version needs it.
    pub fn new(
        embedder: Option<Arc<dyn FaceEmbedder>>,
        classifier: Option<Arc<dyn AttributeClassifier>>,
        config: ExtractorConfig,
    ) -> Self {
        let flip_averaged = embedder.clone().map(FlipAveragedEmbedder::new);
        Self {
            histogram: GradientHistogramEmbedder,
            embedder,
            flip_averaged,
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn has_attribute_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn extract(
        &self,
        face: &Face,
        frame: &Frame,
        version: TemplateVersion,
    ) -> Result<FaceTemplate, EngineError> {
        if version != self.config.default_version && version != self.config.matrix_version {
            return Err(EngineError::extraction(format!(
                "{version:?} is neither the default ({:?}) nor the matrix ({:?}) template version",
                self.config.default_version, self.config.matrix_version
            )));
        }
        if face.quality() < self.config.quality_threshold {
            return Err(EngineError::extraction(format!(
                "face quality {:.3} is below the extraction threshold {:.3}",
                face.quality(),
                self.config.quality_threshold
            )));
        }

        let backend = self.backend_for(version)?;
        let expected = version.dimension().ok_or_else(|| {
            EngineError::extraction(format!("{version:?} templates cannot be extracted"))
        })?;

        let crop = aligned_face_crop(frame, face, &self.config.crop);
        let values = backend
            .embed(&crop)
            .map_err(EngineError::extraction_backend)?;
        if values.len() != expected {
            return Err(EngineError::extraction(format!(
                "backend produced {} values, {version:?} needs {expected}",
                values.len()
            )));
        }
        FaceTemplate::from_values(version, values).map_err(|e| EngineError::extraction(e.to_string()))
    }

    /// Default-version templates for every face, in input order.
    ///
    /// Runs on scoped worker threads when multithreading is enabled; the
    /// result is identical to the sequential path.
    pub fn extract_batch(
        &self,
        faces: &[Face],
        frame: &Frame,
    ) -> Result<Vec<FaceTemplate>, EngineError> {
        let version = self.config.default_version;
        let workers = if self.config.multithreaded {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(faces.len())
        } else {
            1
        };
        if workers <= 1 {
            return faces
                .iter()
                .map(|face| self.extract(face, frame, version))
                .collect();
        }

        let (tx, rx) = crossbeam_channel::unbounded::<(usize, Result<FaceTemplate, EngineError>)>();
        let chunk_size = faces.len().div_ceil(workers);
        std::thread::scope(|scope| {
            for (chunk_index, chunk) in faces.chunks(chunk_size).enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    for (offset, face) in chunk.iter().enumerate() {
                        let result = self.extract(face, frame, version);
                        if tx.send((chunk_index * chunk_size + offset, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<Result<FaceTemplate, EngineError>>> =
            (0..faces.len()).map(|_| None).collect();
        for (index, result) in rx {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(EngineError::extraction("worker produced no result")))
            })
            .collect()
    }

    /// Mask likelihood of `face`, in `[0, 1]`.
    pub fn extract_mask_attribute(&self, face: &Face, frame: &Frame) -> Result<f64, EngineError> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| EngineError::attribute("no attribute classifier is loaded"))?;
        let crop = aligned_face_crop(frame, face, &self.config.crop);
        let p = classifier
            .mask_probability(&crop)
            .map_err(EngineError::attribute_backend)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(EngineError::attribute(format!(
                "mask probability {p} is outside [0, 1]"
            )));
        }
        Ok(p)
    }

    fn backend_for(&self, version: TemplateVersion) -> Result<&dyn FaceEmbedder, EngineError> {
        let missing = || EngineError::extraction(format!("no embedding backend for {version:?}"));
        match version {
            TemplateVersion::V16 => Ok(&self.histogram as &dyn FaceEmbedder),
            TemplateVersion::V20 => self.embedder.as_deref().ok_or_else(missing),
            TemplateVersion::V20A => self
                .flip_averaged
                .as_ref()
                .map(|e| e as &dyn FaceEmbedder)
                .ok_or_else(missing),
            TemplateVersion::Other => Err(missing()),
        }
    }
}
