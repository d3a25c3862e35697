use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::detection::domain::detection_options::DetectionOptions;
use crate::detection::domain::face::Face;
use crate::detection::domain::face_geometry_provider::FaceGeometryProvider;
use crate::detection::face_detector::{DetectorConfig, FaceDetector};
use crate::detection::infrastructure::onnx_yolo_provider::OnnxYoloProvider;
use crate::error::EngineError;
use crate::quality::image_quality::{self, ImageQualityParams};
use crate::recognition::domain::attribute_classifier::AttributeClassifier;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_template::{FaceTemplate, TemplateVersion};
use crate::recognition::domain::recognizable::Recognizable;
use crate::recognition::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use crate::recognition::infrastructure::onnx_mask_classifier::OnnxMaskClassifier;
use crate::recognition::template_comparator;
use crate::recognition::template_extractor::{ExtractorConfig, TemplateExtractor};
use crate::recognition::template_generator;
use crate::settings::Settings;
use crate::shared::constants::{
    AUTHENTICATION_SCORE_THRESHOLD, DETECTOR_MODEL_NAME, MASK_MODEL_NAME, RECOGNIZER_MODEL_NAME,
};
use crate::shared::frame::Frame;
use crate::shared::model_resolver::{
    model_path, optional_model_path, resolve_models_dir, ModelResolveError,
};
use crate::shared::pixel_buffer::PixelBuffer;
use crate::tracking::{TrackerConfig, TrackingSession};

/// Assembles an [`Engine`], optionally with caller-supplied backends.
///
/// Backends that are not supplied are loaded from the models location.
pub struct EngineBuilder {
    settings: Settings,
    geometry_provider: Option<Arc<dyn FaceGeometryProvider>>,
    embedder: Option<Arc<dyn FaceEmbedder>>,
    attribute_classifier: Option<Arc<dyn AttributeClassifier>>,
}

impl EngineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            geometry_provider: None,
            embedder: None,
            attribute_classifier: None,
        }
    }

    pub fn geometry_provider(mut self, provider: Arc<dyn FaceGeometryProvider>) -> Self {
        self.geometry_provider = Some(provider);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn FaceEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn attribute_classifier(mut self, classifier: Arc<dyn AttributeClassifier>) -> Self {
        self.attribute_classifier = Some(classifier);
        self
    }

    /// Validates settings, resolves the models directory and loads every
    /// backend the configuration needs. Nothing is returned unless all of
    /// it succeeds.
    pub fn build(self) -> Result<Engine, EngineError> {
        let settings = self.settings;
        settings
            .validate()
            .map_err(|msg| EngineError::initialization(format!("invalid settings: {msg}")))?;
        log::set_max_level(settings.log_level.level_filter());

        let models_dir = resolve_models_dir(settings.models_location.as_deref()).map_err(|e| {
            EngineError::InvalidModelsLocation {
                path: e.path(),
                reason: e.to_string(),
            }
        })?;
        log::debug!("using models directory {}", models_dir.display());
        let multithreaded = settings.attempt_multi_threading;

        let geometry_provider = match self.geometry_provider {
            Some(provider) => provider,
            None => {
                let path = required_model(&models_dir, DETECTOR_MODEL_NAME)?;
                let provider = OnnxYoloProvider::new(&path, multithreaded)
                    .map_err(|e| load_failure(&path, e))?;
                Arc::new(provider) as Arc<dyn FaceGeometryProvider>
            }
        };

        let needs_embedder = settings
            .extraction_versions()
            .iter()
            .any(|v| matches!(v, TemplateVersion::V20 | TemplateVersion::V20A));
        let embedder = match self.embedder {
            Some(embedder) => Some(embedder),
            None if needs_embedder => {
                let path = required_model(&models_dir, RECOGNIZER_MODEL_NAME)?;
                let embedder = OnnxArcFaceEmbedder::new(&path, multithreaded)
                    .map_err(|e| load_failure(&path, e))?;
                Some(Arc::new(embedder) as Arc<dyn FaceEmbedder>)
            }
            None => None,
        };
        if let Some(embedder) = embedder.as_ref().filter(|_| needs_embedder) {
            let expected = TemplateVersion::V20.dimension().unwrap_or_default();
            if embedder.dimension() != expected {
                return Err(EngineError::initialization(format!(
                    "embedding backend produces {} values, V20 templates need {expected}",
                    embedder.dimension()
                )));
            }
        }

        let attribute_classifier = match self.attribute_classifier {
            Some(classifier) => Some(classifier),
            None if settings.landmark_options.detect_attributes => {
                match optional_model_path(&models_dir, MASK_MODEL_NAME) {
                    Some(path) => {
                        let classifier =
                            OnnxMaskClassifier::new(&path).map_err(|e| load_failure(&path, e))?;
                        Some(Arc::new(classifier) as Arc<dyn AttributeClassifier>)
                    }
                    None => {
                        log::warn!(
                            "attribute detection requested but {MASK_MODEL_NAME} is not in {}",
                            models_dir.display()
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let detector = FaceDetector::new(geometry_provider, DetectorConfig::from(&settings));
        let extractor = TemplateExtractor::new(
            embedder,
            attribute_classifier,
            ExtractorConfig::from(&settings),
        );
        log::info!(
            "engine initialized (detector v{}, default template {:?}, matrix template {:?})",
            settings.detector_version,
            settings.default_template_version,
            settings.matrix_template_version
        );
        Ok(Engine {
            tracker_config: TrackerConfig::from(&settings),
            settings,
            models_dir,
            detector,
            extractor,
        })
    }
}

fn required_model(dir: &Path, name: &str) -> Result<PathBuf, EngineError> {
    model_path(dir, name).map_err(|e| match e {
        ModelResolveError::MissingModel { .. } => EngineError::initialization(e.to_string()),
        other => EngineError::InvalidModelsLocation {
            path: other.path(),
            reason: other.to_string(),
        },
    })
}

fn load_failure(path: &Path, source: crate::error::BackendError) -> EngineError {
    EngineError::initialization_backend(format!("failed to load {}", path.display()), source)
}

/// Face detection, tracking and recognition over borrowed pixel buffers.
///
/// Loaded models are shared read-only, so one engine can serve many threads.
pub struct Engine {
    settings: Settings,
    models_dir: PathBuf,
    detector: FaceDetector,
    extractor: TemplateExtractor,
    tracker_config: TrackerConfig,
}

impl Engine {
    /// Engine with every backend loaded from the models location.
    pub fn initialize(settings: Settings) -> Result<Self, EngineError> {
        EngineBuilder::new(settings).build()
    }

    pub fn builder(settings: Settings) -> EngineBuilder {
        EngineBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Faces in `buffer`, best first. `limit <= 0` returns every face.
    pub fn detect_faces(
        &self,
        buffer: &PixelBuffer<'_>,
        limit: i32,
        options: &DetectionOptions,
    ) -> Result<Vec<Face>, EngineError> {
        let frame = upright_frame(buffer, EngineError::detection)?;
        let faces = self.detector.detect(&frame, limit, options)?;
        let faces = self.with_attributes(faces, &frame);
        if options.extract_templates {
            return self.with_templates(faces, &frame);
        }
        Ok(faces)
    }

    pub fn start_tracking(&self) -> TrackingSession {
        TrackingSession::new()
    }

    /// Advances `session` by one frame; `None` when the tracked face was
    /// not found (or none has been acquired yet).
    ///
    /// A failed call leaves the session unchanged.
    pub fn track_face(
        &self,
        session: &mut TrackingSession,
        buffer: &PixelBuffer<'_>,
    ) -> Result<Option<Face>, EngineError> {
        let frame = upright_frame(buffer, |msg| EngineError::detection(msg).into_tracking())?;
        session
            .advance(&self.detector, &self.tracker_config, &frame)
            .map_err(EngineError::into_tracking)
    }

    /// Template of the configured default version.
    pub fn extract_template(
        &self,
        face: &Face,
        buffer: &PixelBuffer<'_>,
    ) -> Result<FaceTemplate, EngineError> {
        self.extract_template_with_version(face, buffer, self.settings.default_template_version)
    }

    /// Template of `version`, which must be the default or matrix version.
    pub fn extract_template_with_version(
        &self,
        face: &Face,
        buffer: &PixelBuffer<'_>,
        version: TemplateVersion,
    ) -> Result<FaceTemplate, EngineError> {
        let frame = upright_frame(buffer, EngineError::extraction)?;
        self.extractor.extract(face, &frame, version)
    }

    /// Default-version templates for `faces`, in the same order.
    pub fn extract_templates(
        &self,
        faces: &[Face],
        buffer: &PixelBuffer<'_>,
    ) -> Result<Vec<FaceTemplate>, EngineError> {
        let frame = upright_frame(buffer, EngineError::extraction)?;
        self.extractor.extract_batch(faces, &frame)
    }

    pub fn extract_mask_attribute(
        &self,
        face: &Face,
        buffer: &PixelBuffer<'_>,
    ) -> Result<f64, EngineError> {
        let frame = upright_frame(buffer, EngineError::attribute)?;
        self.extractor.extract_mask_attribute(face, &frame)
    }

    /// Best similarity between any subject and any candidate, `0..=10`.
    pub fn compare<S, C>(&self, subjects: &[S], candidates: &[C]) -> Result<f32, EngineError>
    where
        S: Recognizable,
        C: Recognizable,
    {
        template_comparator::compare(subjects, candidates)
    }

    /// Candidates matching `challenge` at or above the authentication
    /// threshold, best first, as `(index, score)`.
    pub fn find_similar<Q, C>(
        &self,
        challenge: &Q,
        candidates: &[C],
    ) -> Result<Vec<(usize, f32)>, EngineError>
    where
        Q: Recognizable,
        C: Recognizable,
    {
        template_comparator::find_similar(challenge, candidates, AUTHENTICATION_SCORE_THRESHOLD)
    }

    /// Scores at or above this count as the same person.
    pub fn authentication_score_threshold(&self) -> f32 {
        AUTHENTICATION_SCORE_THRESHOLD
    }

    /// Decoded values of a stored or live template.
    pub fn raw_template(&self, template: &dyn Recognizable) -> Result<Vec<f32>, EngineError> {
        let decoded = FaceTemplate::from_bytes(&template.recognition_data())
            .map_err(|e| EngineError::comparison(format!("undecodable template: {e}")))?;
        if decoded.version() != template.version() {
            return Err(EngineError::TemplateVersionMismatch {
                expected: template.version(),
                found: decoded.version(),
            });
        }
        Ok(decoded.values().to_vec())
    }

    pub fn generate_random_template(
        &self,
        version: TemplateVersion,
    ) -> Result<FaceTemplate, EngineError> {
        template_generator::generate_random_template(version)
    }

    pub fn generate_template_with_score(
        &self,
        score: f32,
        against: &dyn Recognizable,
    ) -> Result<FaceTemplate, EngineError> {
        template_generator::generate_template_with_score(score, against)
    }

    /// Sharpness of `buffer` in any supported format.
    pub fn sharpness(&self, buffer: &PixelBuffer<'_>) -> Result<f64, EngineError> {
        let (luma, w, h) = luma_plane(buffer)?;
        image_quality::sharpness(&luma, w as usize, h as usize)
    }

    pub fn quality_params(
        &self,
        buffer: &PixelBuffer<'_>,
    ) -> Result<ImageQualityParams, EngineError> {
        let (luma, w, h) = luma_plane(buffer)?;
        image_quality::quality_params(&luma, w as usize, h as usize)
    }

    /// Attaches mask scores. A face the classifier fails on is returned
    /// without one; detection itself does not fail.
    fn with_attributes(&self, faces: Vec<Face>, frame: &Frame) -> Vec<Face> {
        if !self.settings.landmark_options.detect_attributes
            || !self.extractor.has_attribute_classifier()
        {
            return faces;
        }
        faces
            .into_iter()
            .map(|face| match self.extractor.extract_mask_attribute(&face, frame) {
                Ok(score) => face.with_mask_score(score),
                Err(e) => {
                    log::warn!("mask attribute unavailable for face at {:?}: {e}", face.bounds());
                    face
                }
            })
            .collect()
    }

    /// Attaches default-version templates to faces that meet the
    /// extraction quality threshold; the rest are returned without one.
    fn with_templates(&self, faces: Vec<Face>, frame: &Frame) -> Result<Vec<Face>, EngineError> {
        let threshold = self.extractor.config().quality_threshold;
        let (eligible, rest): (Vec<(usize, Face)>, Vec<(usize, Face)>) = faces
            .into_iter()
            .enumerate()
            .partition(|(_, f)| f.quality() >= threshold);
        if !rest.is_empty() {
            log::debug!(
                "{} face(s) below extraction quality {threshold:.2}, returned without templates",
                rest.len()
            );
        }

        let eligible_faces: Vec<Face> = eligible.iter().map(|(_, f)| f.clone()).collect();
        let templates = self.extractor.extract_batch(&eligible_faces, frame)?;
        let mut out: Vec<(usize, Face)> = eligible
            .into_iter()
            .zip(templates)
            .map(|((i, face), template)| (i, face.with_template(template)))
            .chain(rest)
            .collect();
        out.sort_by_key(|(i, _)| *i);
        Ok(out.into_iter().map(|(_, face)| face).collect())
    }
}

/// Rejects unknown formats, then converts to an upright RGB frame; any other
/// buffer problem is reported through `malformed`.
fn upright_frame(
    buffer: &PixelBuffer<'_>,
    malformed: impl FnOnce(String) -> EngineError,
) -> Result<Frame, EngineError> {
    buffer.ensure_supported()?;
    buffer.to_upright_frame().map_err(malformed)
}

fn luma_plane(buffer: &PixelBuffer<'_>) -> Result<(Vec<u8>, u32, u32), EngineError> {
    buffer.ensure_supported()?;
    buffer.to_luma().map_err(EngineError::sharpness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recognition::domain::recognizable::RecognitionData;
    use crate::settings::LandmarkOptions;
    use crate::shared::constants::MAX_SIMILARITY_SCORE;
    use crate::shared::pixel_buffer::ImageFormat;
    use crate::shared::region::Rect;
    use crate::test_support::{
        draw_face, textured_frame, touch_models, FakeClassifier, FakeEmbedder, MarkerFaceProvider,
    };
    use crate::tracking::TrackingState;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    fn fake_engine(settings: Settings) -> (Engine, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            models_location: Some(dir.path().to_path_buf()),
            ..settings
        };
        let engine = Engine::builder(settings)
            .geometry_provider(Arc::new(MarkerFaceProvider))
            .embedder(Arc::new(FakeEmbedder))
            .attribute_classifier(Arc::new(FakeClassifier(0.25)))
            .build()
            .unwrap();
        (engine, dir)
    }

    /// 240x180 RGB frame with two faces; the brighter marker wins.
    fn scene() -> Frame {
        let mut frame = textured_frame(240, 180);
        draw_face(&mut frame, Rect::new(10.0, 20.0, 90.0, 90.0), 220);
        draw_face(&mut frame, Rect::new(130.0, 40.0, 100.0, 100.0), 250);
        frame
    }

    fn rgb(frame: &Frame) -> PixelBuffer<'_> {
        PixelBuffer::packed(frame.data(), frame.width(), frame.height(), ImageFormat::Rgb)
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
        assert_send_sync::<TrackingSession>();
    }

    #[test]
    fn test_missing_models_location_is_invalid() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = Engine::initialize(Settings::with_models_location(&missing))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidModelsLocation);
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_models_location_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("models.bin");
        std::fs::write(&file, b"x").unwrap();
        let err = Engine::initialize(Settings::with_models_location(&file))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidModelsLocation);
    }

    #[test]
    fn test_missing_detector_model_fails_initialization() {
        let dir = TempDir::new().unwrap();
        let err = Engine::initialize(Settings::with_models_location(dir.path()))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InitializationFailed);
    }

    #[test]
    fn test_missing_recognizer_fails_only_when_needed() {
        let dir = TempDir::new().unwrap();
        touch_models(dir.path(), &[DETECTOR_MODEL_NAME]);
        let v20 = Engine::builder(Settings::with_models_location(dir.path()))
            .geometry_provider(Arc::new(MarkerFaceProvider))
            .build();
        assert_eq!(v20.err().unwrap().kind(), ErrorKind::InitializationFailed);

        let v16_only = Settings {
            default_template_version: TemplateVersion::V16,
            matrix_template_version: TemplateVersion::V16,
            ..Settings::with_models_location(dir.path())
        };
        let engine = Engine::builder(v16_only)
            .geometry_provider(Arc::new(MarkerFaceProvider))
            .build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_invalid_settings_fail_initialization() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            confidence_threshold: 3.0,
            ..Settings::with_models_location(dir.path())
        };
        let err = Engine::builder(settings)
            .geometry_provider(Arc::new(MarkerFaceProvider))
            .embedder(Arc::new(FakeEmbedder))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InitializationFailed);
    }

    #[test]
    fn test_detect_faces_sorted_and_limited() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let faces = engine
            .detect_faces(&rgb(&frame), 0, &DetectionOptions::default())
            .unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].bounds(), Rect::new(130.0, 40.0, 100.0, 100.0));
        assert!(faces[0].template().is_none());
        assert!(faces[0].mask_score().is_none());

        let one = engine
            .detect_faces(&rgb(&frame), 1, &DetectionOptions::default())
            .unwrap();
        assert_eq!(one, faces[..1]);
    }

    #[test]
    fn test_detect_faces_accepts_other_layouts() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let bgra: Vec<u8> = frame
            .data()
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0], 255])
            .collect();
        let buffer = PixelBuffer::packed(&bgra, frame.width(), frame.height(), ImageFormat::Bgra);
        let faces = engine
            .detect_faces(&buffer, 0, &DetectionOptions::default())
            .unwrap();
        assert_eq!(faces[0].bounds(), Rect::new(130.0, 40.0, 100.0, 100.0));
    }

    #[test]
    fn test_detect_faces_applies_orientation() {
        let (engine, _dir) = fake_engine(Settings::default());
        let mut frame = textured_frame(160, 100);
        draw_face(&mut frame, Rect::new(10.0, 10.0, 50.0, 50.0), 250);
        let buffer = rgb(&frame).with_orientation(6);
        let faces = engine
            .detect_faces(&buffer, 0, &DetectionOptions::default())
            .unwrap();
        // rotated 90° clockwise: stored (x, y) lands at (99 - y, x)
        assert_eq!(faces[0].bounds(), Rect::new(40.0, 10.0, 50.0, 50.0));
    }

    #[rstest]
    #[case::zero_size(0, 0, 0, 1)]
    #[case::short_buffer(50, 50, 100, 1)]
    #[case::bad_orientation(4, 4, 4 * 4 * 3, 9)]
    fn test_malformed_buffers(
        #[case] width: u32,
        #[case] height: u32,
        #[case] len: usize,
        #[case] orientation: u32,
    ) {
        let (engine, _dir) = fake_engine(Settings::default());
        let data = vec![0u8; len];
        let buffer =
            PixelBuffer::packed(&data, width, height, ImageFormat::Rgb).with_orientation(orientation);
        let err = engine
            .detect_faces(&buffer, 0, &DetectionOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaceDetectionFailed);

        let mut session = engine.start_tracking();
        let err = engine.track_face(&mut session, &buffer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaceTrackingFailed);
    }

    #[test]
    fn test_unknown_format_rejected_everywhere() {
        let (engine, _dir) = fake_engine(Settings::default());
        let data = vec![0u8; 64 * 64 * 3];
        let buffer = PixelBuffer::new(&data, 64, 64, 64 * 3, ImageFormat::Unknown);
        let unsupported = ErrorKind::UnsupportedImageFormat;

        let err = engine
            .detect_faces(&buffer, 0, &DetectionOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), unsupported);
        let mut session = engine.start_tracking();
        assert_eq!(engine.track_face(&mut session, &buffer).unwrap_err().kind(), unsupported);
        assert_eq!(engine.sharpness(&buffer).unwrap_err().kind(), unsupported);
        assert_eq!(engine.quality_params(&buffer).unwrap_err().kind(), unsupported);
    }

    #[test]
    fn test_detect_extract_self_compare_scores_maximum() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let buffer = rgb(&frame);
        let faces = engine
            .detect_faces(&buffer, 1, &DetectionOptions::default())
            .unwrap();
        for version in [TemplateVersion::V20, TemplateVersion::V16] {
            let template = engine
                .extract_template_with_version(&faces[0], &buffer, version)
                .unwrap();
            assert_eq!(template.version(), version);
            let score = engine.compare(&[&template], &[&template]).unwrap();
            assert_relative_eq!(score, MAX_SIMILARITY_SCORE, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_stored_template_roundtrip_compares() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let buffer = rgb(&frame);
        let faces = engine
            .detect_faces(&buffer, 0, &DetectionOptions::default())
            .unwrap();
        let templates = engine.extract_templates(&faces, &buffer).unwrap();
        assert_eq!(templates.len(), 2);

        let stored: Vec<RecognitionData> = templates.iter().map(RecognitionData::from).collect();
        assert_eq!(engine.raw_template(&stored[0]).unwrap(), templates[0].values());
        let score = engine.compare(&stored[..1], &templates[..1]).unwrap();
        assert_relative_eq!(score, MAX_SIMILARITY_SCORE, epsilon = 1e-4);
    }

    #[test]
    fn test_inline_templates_and_attributes() {
        let settings = Settings {
            landmark_options: LandmarkOptions {
                detect_landmarks: true,
                detect_attributes: true,
            },
            ..Settings::default()
        };
        let (engine, _dir) = fake_engine(settings);
        let frame = scene();
        let options = DetectionOptions {
            extract_templates: true,
            ..Default::default()
        };
        let faces = engine.detect_faces(&rgb(&frame), 0, &options).unwrap();
        assert_eq!(faces.len(), 2);
        for face in &faces {
            assert_eq!(face.mask_score(), Some(0.25));
            let template = face.template().unwrap();
            assert_eq!(template.version(), TemplateVersion::V20);
            let direct = engine.extract_template(face, &rgb(&frame)).unwrap();
            assert_eq!(template, &direct);
        }
    }

    #[test]
    fn test_classifier_failure_leaves_mask_score_unset() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            models_location: Some(dir.path().to_path_buf()),
            landmark_options: LandmarkOptions {
                detect_landmarks: true,
                detect_attributes: true,
            },
            ..Settings::default()
        };
        let engine = Engine::builder(settings)
            .geometry_provider(Arc::new(MarkerFaceProvider))
            .embedder(Arc::new(FakeEmbedder))
            .attribute_classifier(Arc::new(FakeClassifier(1.5)))
            .build()
            .unwrap();
        let frame = scene();
        let faces = engine
            .detect_faces(&rgb(&frame), 0, &DetectionOptions::default())
            .unwrap();
        assert_eq!(faces.len(), 2);
        assert!(faces.iter().all(|f| f.mask_score().is_none()));
        let err = engine
            .extract_mask_attribute(&faces[0], &rgb(&frame))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FaceAttributeExtractionFailed);
    }

    #[test]
    fn test_mask_attribute() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let faces = engine
            .detect_faces(&rgb(&frame), 1, &DetectionOptions::default())
            .unwrap();
        let p = engine.extract_mask_attribute(&faces[0], &rgb(&frame)).unwrap();
        assert_relative_eq!(p, 0.25);
    }

    #[test]
    fn test_version_mismatch_through_engine() {
        let (engine, _dir) = fake_engine(Settings::default());
        let a = engine.generate_random_template(TemplateVersion::V16).unwrap();
        let b = engine.generate_random_template(TemplateVersion::V20).unwrap();
        let err = engine.compare(&[&a], &[&b]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateVersionMismatch);
    }

    #[test]
    fn test_generated_template_meets_threshold() {
        let (engine, _dir) = fake_engine(Settings::default());
        let threshold = engine.authentication_score_threshold();
        assert_relative_eq!(threshold, 4.0);
        let reference = engine.generate_random_template(TemplateVersion::V20).unwrap();
        let near = engine
            .generate_template_with_score(threshold + 0.5, &reference)
            .unwrap();
        let far = engine
            .generate_template_with_score(threshold - 0.5, &reference)
            .unwrap();
        assert!(engine.compare(&[&reference], &[&near]).unwrap() >= threshold);
        assert!(engine.compare(&[&reference], &[&far]).unwrap() < threshold);
    }

    #[test]
    fn test_find_similar_uses_authentication_threshold() {
        let (engine, _dir) = fake_engine(Settings::default());
        let challenge = engine.generate_random_template(TemplateVersion::V20).unwrap();
        let candidates: Vec<RecognitionData> = [2.0, 4.5, 3.9, 9.0]
            .iter()
            .map(|score| {
                let t = engine.generate_template_with_score(*score, &challenge).unwrap();
                RecognitionData::from(&t)
            })
            .collect();
        let found = engine.find_similar(&challenge, &candidates).unwrap();
        let order: Vec<usize> = found.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![3, 1]);
    }

    #[test]
    fn test_track_face_follows_lineage() {
        let (engine, _dir) = fake_engine(Settings::default());
        let mut session = engine.start_tracking();
        let mut ids = Vec::new();
        for step in 0..4 {
            let mut frame = textured_frame(240, 180);
            draw_face(
                &mut frame,
                Rect::new(60.0 + step as f64 * 4.0, 40.0, 90.0, 90.0),
                240,
            );
            let face = engine.track_face(&mut session, &rgb(&frame)).unwrap().unwrap();
            ids.push(face.track_id());
        }
        assert!(ids.iter().all(|id| *id == Some(1)));
        assert_eq!(session.state(), TrackingState::Tracking);
        assert_eq!(session.frames_processed(), 4);
    }

    #[test]
    fn test_failed_track_keeps_session() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let mut session = engine.start_tracking();
        engine.track_face(&mut session, &rgb(&frame)).unwrap().unwrap();
        let last = session.last_face().cloned();

        let bad = PixelBuffer::packed(&[], 0, 0, ImageFormat::Rgb);
        assert!(engine.track_face(&mut session, &bad).is_err());
        assert_eq!(session.last_face().cloned(), last);
        assert_eq!(session.frames_processed(), 1);
    }

    #[test]
    fn test_buffer_quality_matches_grayscale_functions() {
        let (engine, _dir) = fake_engine(Settings::default());
        let frame = scene();
        let luma = frame.luma();
        let gray = PixelBuffer::packed(&luma, frame.width(), frame.height(), ImageFormat::Grayscale);
        let from_rgb = engine.quality_params(&rgb(&frame)).unwrap();
        let from_gray = engine.quality_params(&gray).unwrap();
        assert_eq!(from_rgb, from_gray);
        let direct = image_quality::sharpness(&luma, 240, 180).unwrap();
        assert_eq!(engine.sharpness(&gray).unwrap(), direct);
    }

    #[test]
    fn test_raw_template_rejects_garbage() {
        let (engine, _dir) = fake_engine(Settings::default());
        let garbage = RecognitionData::new(vec![9, 9, 9], TemplateVersion::V20);
        assert!(engine.raw_template(&garbage).is_err());
    }
}
