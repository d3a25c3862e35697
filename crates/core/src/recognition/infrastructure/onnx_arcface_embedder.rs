/// ArcFace-style embedding backend using ONNX Runtime.
///
/// Expects a 112×112 RGB input normalized to `[-1, 1]` in NCHW layout and a
/// single embedding output.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::error::BackendError;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_template::{l2_normalize, V20_DIMENSION};
use crate::shared::constants::RECOGNITION_INPUT_SIZE;
use crate::shared::frame::Frame;

const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
    dimension: usize,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path, multithreaded: bool) -> Result<Self, BackendError> {
        let intra_threads = if multithreaded {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            1
        };
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_inter_threads(1)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let dimension = session
            .outputs()
            .first()
            .and_then(|output| match output.dtype() {
                ort::value::ValueType::Tensor { shape, .. } => {
                    shape.last().copied().filter(|&d| d > 0).map(|d| d as usize)
                }
                _ => None,
            })
            .unwrap_or(V20_DIMENSION);
        log::debug!(
            "loaded face recognizer {} ({dimension}-dim)",
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            dimension,
        })
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, crop: &Frame) -> Result<Vec<f32>, BackendError> {
        let tensor = preprocess(crop);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let mut embedding = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?
            .to_vec();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

/// Resize the crop to the model input, normalize, NCHW layout.
pub(crate) fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let size = RECOGNITION_INPUT_SIZE;
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;
    let c = crop.channels() as usize;
    let data = crop.data();

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size, size));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }
    for y in 0..size {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / size as f64) as usize).min(src_h - 1);
        for x in 0..size {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / size as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * c;
            for ch in 0..3 {
                tensor[[0, ch, y, x]] = (data[offset + ch.min(c - 1)] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }
    tensor
}
