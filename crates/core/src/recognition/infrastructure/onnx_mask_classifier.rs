/// Face mask classifier using ONNX Runtime.
///
/// Accepts models with a single output that is either one score (logit or
/// probability) or two class scores ordered `[mask, no_mask]`.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::detection::infrastructure::math::sigmoid;
use crate::error::BackendError;
use crate::recognition::domain::attribute_classifier::AttributeClassifier;
use crate::shared::frame::Frame;

use super::onnx_arcface_embedder::preprocess;

pub struct OnnxMaskClassifier {
    session: Mutex<ort::session::Session>,
}

impl OnnxMaskClassifier {
    pub fn new(model_path: &Path) -> Result<Self, BackendError> {
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        log::debug!("loaded mask classifier {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl AttributeClassifier for OnnxMaskClassifier {
    fn mask_probability(&self, crop: &Frame) -> Result<f64, BackendError> {
        let input_value = ort::value::Tensor::from_array(preprocess(crop))?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores = scores.as_slice().ok_or("Cannot get score slice")?;
        mask_probability_from_scores(scores)
    }
}

fn mask_probability_from_scores(scores: &[f32]) -> Result<f64, BackendError> {
    let p = match scores {
        [p] if (0.0..=1.0).contains(p) => *p,
        [logit] => sigmoid(*logit),
        [mask, no_mask] => {
            let m = mask.max(*no_mask);
            let e_mask = (mask - m).exp();
            let e_no = (no_mask - m).exp();
            e_mask / (e_mask + e_no)
        }
        other => {
            return Err(format!("expected 1 or 2 mask scores, got {}", other.len()).into());
        }
    };
    if !p.is_finite() {
        return Err("mask score is not finite".into());
    }
    Ok(p as f64)
}
